use std::any::Any;

use crate::autodiff::AdjointContext;
use crate::error::GraphResult;
use crate::graph::{Graph, InferContext, NodeId, Output};
use crate::op::{check_new_args_count, Op};
use crate::types::{ElementType, PartialShape};

/// Graph input of a declared element type and (partial) shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    element_type: ElementType,
    shape: PartialShape,
}

impl Parameter {
    pub fn new(element_type: ElementType, shape: impl Into<PartialShape>) -> Self {
        Self {
            element_type,
            shape: shape.into(),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn partial_shape(&self) -> &PartialShape {
        &self.shape
    }
}

impl Op for Parameter {
    fn type_name(&self) -> &'static str {
        "Parameter"
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(0)?;
        cx.set_output_type(0, self.element_type, self.shape.clone())
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 0)?;
        graph.add_node(self.clone(), new_args)
    }

    fn generate_adjoints(&self, _cx: &mut AdjointContext<'_>) -> GraphResult<()> {
        Ok(())
    }

    fn is_parameter(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Graph output marker; passes its argument through unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultOp;

impl ResultOp {
    pub fn new() -> Self {
        Self
    }
}

impl Op for ResultOp {
    fn type_name(&self) -> &'static str {
        "Result"
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(1)?;
        let element_type = cx.input_element_type(0)?;
        let shape = cx.input_partial_shape(0)?.clone();
        cx.set_output_type(0, element_type, shape)
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 1)?;
        graph.add_node(*self, new_args)
    }

    fn generate_adjoints(&self, cx: &mut AdjointContext<'_>) -> GraphResult<()> {
        let delta = cx.delta(0)?;
        cx.add_input_delta(0, delta)
    }

    fn is_output(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
