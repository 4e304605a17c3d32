use smallvec::{smallvec, SmallVec};

use crate::error::{GraphError, GraphResult};
use crate::types::{ElementType, PartialShape};

use super::handle::Output;
use super::id::NodeId;
use super::node::NodeData;
use super::view::{describe_long, NodeRef};
use super::Graph;

/// Fails the surrounding inference with a validation error unless `cond` holds.
///
/// ```ignore
/// node_ensure!(cx, rank == 2, "expected rank 2, got {rank}");
/// ```
#[macro_export]
macro_rules! node_ensure {
    ($cx:expr, $cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($cx.validation_error(format!($($arg)+)));
        }
    };
}

/// Inference session for one node.
///
/// Output types are staged here and only written to the node once the op's
/// `validate_and_infer_types` returns successfully and every output has been assigned.
pub struct InferContext<'g> {
    graph: &'g Graph,
    node: &'g NodeData,
    outputs: SmallVec<[Option<(ElementType, PartialShape)>; 1]>,
    relevance: SmallVec<[(bool, bool); 4]>,
}

pub(crate) struct StagedInference {
    outputs: SmallVec<[(ElementType, PartialShape); 1]>,
    relevance: SmallVec<[(bool, bool); 4]>,
}

impl StagedInference {
    pub(crate) fn apply(self, data: &mut NodeData) {
        for (slot, (element_type, shape)) in data.outputs.iter_mut().zip(self.outputs) {
            slot.tensor.set_tensor_type(element_type, shape);
        }
        for (slot, (shape, value)) in data.inputs.iter_mut().zip(self.relevance) {
            slot.relevant_to_shape = shape;
            slot.relevant_to_value = value;
        }
    }
}

impl<'g> InferContext<'g> {
    pub(crate) fn new(graph: &'g Graph, node: &'g NodeData) -> Self {
        Self {
            graph,
            node,
            outputs: smallvec![None; node.outputs.len()],
            relevance: smallvec![(true, true); node.inputs.len()],
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node.id
    }

    pub fn node(&self) -> NodeRef<'g> {
        NodeRef {
            graph: self.graph,
            data: self.node,
        }
    }

    pub fn input_size(&self) -> usize {
        self.node.inputs.len()
    }

    pub fn output_size(&self) -> usize {
        self.node.outputs.len()
    }

    pub fn input_value(&self, index: usize) -> GraphResult<Output> {
        self.node().input_value(index)
    }

    /// Producing node of input `index`, e.g. to inspect a constant argument.
    pub fn input_node(&self, index: usize) -> GraphResult<NodeRef<'g>> {
        self.graph.try_node(self.input_value(index)?.node)
    }

    pub fn input_element_type(&self, index: usize) -> GraphResult<ElementType> {
        self.node().input_element_type(index)
    }

    pub fn input_partial_shape(&self, index: usize) -> GraphResult<&'g PartialShape> {
        self.node().input_partial_shape(index)
    }

    /// Publishes the inferred type of output `index`.
    pub fn set_output_type(
        &mut self,
        index: usize,
        element_type: ElementType,
        shape: PartialShape,
    ) -> GraphResult<()> {
        let size = self.outputs.len();
        let slot = self
            .outputs
            .get_mut(index)
            .ok_or(GraphError::OutputIndexOutOfRange {
                node: self.node.id,
                index,
                size,
            })?;
        *slot = Some((element_type, shape));
        Ok(())
    }

    fn relevance_mut(&mut self, index: usize) -> GraphResult<&mut (bool, bool)> {
        let size = self.relevance.len();
        self.relevance
            .get_mut(index)
            .ok_or(GraphError::InputIndexOutOfRange {
                node: self.node.id,
                index,
                size,
            })
    }

    pub fn set_input_is_relevant_to_shape(&mut self, index: usize, relevant: bool) -> GraphResult<()> {
        self.relevance_mut(index)?.0 = relevant;
        Ok(())
    }

    pub fn set_input_is_relevant_to_value(&mut self, index: usize, relevant: bool) -> GraphResult<()> {
        self.relevance_mut(index)?.1 = relevant;
        Ok(())
    }

    /// Builds a validation error naming this node and its argument types.
    pub fn validation_error(&self, explanation: impl Into<String>) -> GraphError {
        GraphError::NodeValidation {
            node: describe_long(self.graph, self.node),
            explanation: explanation.into(),
        }
    }

    pub fn check_input_count(&self, expected: usize) -> GraphResult<()> {
        let actual = self.input_size();
        node_ensure!(
            self,
            actual == expected,
            "Wrong number of arguments (expected {expected}, got {actual})"
        );
        Ok(())
    }

    /// Common element type and broadcast shape of all arguments.
    ///
    /// Every argument must share one element type and all shapes must broadcast together.
    pub fn elementwise_args(&self) -> GraphResult<(ElementType, PartialShape)> {
        node_ensure!(
            self,
            self.input_size() > 0,
            "Elementwise operations require at least one argument"
        );
        let mut element_type = self.input_element_type(0)?;
        let mut shape = self.input_partial_shape(0)?.clone();
        for index in 1..self.input_size() {
            let arg_type = self.input_element_type(index)?;
            element_type = match element_type.merge(arg_type) {
                Some(merged) => merged,
                None => {
                    return Err(self.validation_error(format!(
                        "Argument element types are inconsistent ({element_type} vs {arg_type})"
                    )))
                }
            };
            let arg_shape = self.input_partial_shape(index)?;
            shape = match shape.broadcast_merge(arg_shape) {
                Some(merged) => merged,
                None => {
                    return Err(self.validation_error(format!(
                        "Argument shapes are inconsistent ({shape} vs {arg_shape})"
                    )))
                }
            };
        }
        Ok((element_type, shape))
    }

    /// Elementwise arithmetic: non-boolean arguments, output of the merged type and shape.
    pub fn infer_elementwise_arithmetic(&mut self) -> GraphResult<()> {
        let (element_type, shape) = self.elementwise_args()?;
        node_ensure!(
            self,
            element_type != ElementType::Boolean,
            "Arguments cannot have boolean element type (argument element type: {element_type})"
        );
        self.set_output_type(0, element_type, shape)
    }

    /// Elementwise logic: boolean arguments, boolean output.
    pub fn infer_elementwise_logical(&mut self) -> GraphResult<()> {
        let (element_type, shape) = self.elementwise_args()?;
        node_ensure!(
            self,
            element_type.is_dynamic() || element_type == ElementType::Boolean,
            "Operands for logical operators must have boolean element type but have element type {element_type}"
        );
        self.set_output_type(0, ElementType::Boolean, shape)
    }

    pub(crate) fn finish(self) -> GraphResult<StagedInference> {
        let mut outputs = SmallVec::with_capacity(self.outputs.len());
        for (index, staged) in self.outputs.iter().enumerate() {
            match staged {
                Some(ty) => outputs.push(ty.clone()),
                None => {
                    return Err(self.validation_error(format!(
                        "output {index} was not assigned a type"
                    )))
                }
            }
        }
        Ok(StagedInference {
            outputs,
            relevance: self.relevance,
        })
    }
}
