use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use crate::descriptor::TensorDescriptor;
use crate::error::{GraphError, GraphResult};
use crate::op::Op;
use crate::placement::Placement;
use crate::types::{ElementType, PartialShape, Shape};

use super::handle::{Input, InputMut, InputRef, Output, OutputMut, OutputRef};
use super::id::{InstanceId, NodeId};
use super::node::{InputSlot, NodeData, OutputSlot};
use super::Graph;

/// Read-only view of a node and its slots.
#[derive(Clone, Copy)]
pub struct NodeRef<'g> {
    pub(crate) graph: &'g Graph,
    pub(crate) data: &'g NodeData,
}

impl<'g> NodeRef<'g> {
    pub fn id(&self) -> NodeId {
        self.data.id
    }

    pub fn instance_id(&self) -> InstanceId {
        self.data.id.instance()
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn op(&self) -> &'g Arc<dyn Op> {
        &self.data.op
    }

    /// Downcasts the operation to a concrete op type.
    pub fn op_as<T: Op>(&self) -> Option<&'g T> {
        self.data.op.as_any().downcast_ref::<T>()
    }

    /// Operation kind, e.g. `"Add"`.
    pub fn description(&self) -> &'static str {
        self.data.op.type_name()
    }

    /// Friendly name if one was assigned, otherwise the unique name.
    pub fn name(&self) -> &'g str {
        self.data.name()
    }

    /// `"{Kind}_{instance}"`, fixed for the node's lifetime.
    pub fn unique_name(&self) -> &'g str {
        &self.data.unique_name
    }

    pub fn friendly_name(&self) -> Option<&'g str> {
        self.data.friendly_name.as_deref()
    }

    pub fn is_parameter(&self) -> bool {
        self.data.op.is_parameter()
    }

    pub fn is_output(&self) -> bool {
        self.data.op.is_output()
    }

    pub fn is_constant(&self) -> bool {
        self.data.op.is_constant()
    }

    pub fn is_commutative(&self) -> bool {
        self.data.op.is_commutative()
    }

    pub fn input_size(&self) -> usize {
        self.data.inputs.len()
    }

    pub fn output_size(&self) -> usize {
        self.data.outputs.len()
    }

    fn input_slot(&self, index: usize) -> GraphResult<&'g InputSlot> {
        self.data
            .inputs
            .get(index)
            .ok_or(GraphError::InputIndexOutOfRange {
                node: self.data.id,
                index,
                size: self.data.inputs.len(),
            })
    }

    fn output_slot(&self, index: usize) -> GraphResult<&'g OutputSlot> {
        self.data
            .outputs
            .get(index)
            .ok_or(GraphError::OutputIndexOutOfRange {
                node: self.data.id,
                index,
                size: self.data.outputs.len(),
            })
    }

    pub fn input(&self, index: usize) -> GraphResult<InputRef<'g>> {
        Ok(InputRef {
            graph: self.graph,
            handle: Input::new(self.data.id, index),
            slot: self.input_slot(index)?,
        })
    }

    pub fn inputs(&self) -> impl Iterator<Item = InputRef<'g>> + 'g {
        let graph = self.graph;
        let id = self.data.id;
        self.data
            .inputs
            .iter()
            .enumerate()
            .map(move |(index, slot)| InputRef {
                graph,
                handle: Input::new(id, index),
                slot,
            })
    }

    pub fn output(&self, index: usize) -> GraphResult<OutputRef<'g>> {
        Ok(OutputRef {
            graph: self.graph,
            handle: Output::new(self.data.id, index),
            slot: self.output_slot(index)?,
        })
    }

    pub fn outputs(&self) -> impl Iterator<Item = OutputRef<'g>> + 'g {
        let graph = self.graph;
        let id = self.data.id;
        self.data
            .outputs
            .iter()
            .enumerate()
            .map(move |(index, slot)| OutputRef {
                graph,
                handle: Output::new(id, index),
                slot,
            })
    }

    /// Source outputs of every input, in input order.
    pub fn input_values(&self) -> Vec<Output> {
        self.data.inputs.iter().map(|slot| slot.source).collect()
    }

    pub fn input_value(&self, index: usize) -> GraphResult<Output> {
        Ok(self.input_slot(index)?.source)
    }

    /// Producing node of each input.
    pub fn arguments(&self) -> Vec<NodeId> {
        self.data.inputs.iter().map(|slot| slot.source.node).collect()
    }

    pub fn argument(&self, index: usize) -> GraphResult<NodeId> {
        Ok(self.input_slot(index)?.source.node)
    }

    pub fn input_element_type(&self, index: usize) -> GraphResult<ElementType> {
        self.input(index)?.element_type()
    }

    pub fn input_partial_shape(&self, index: usize) -> GraphResult<&'g PartialShape> {
        self.input(index)?.partial_shape()
    }

    pub fn input_shape(&self, index: usize) -> GraphResult<Shape> {
        self.input(index)?.shape()
    }

    pub fn input_is_relevant_to_shape(&self, index: usize) -> GraphResult<bool> {
        Ok(self.input_slot(index)?.relevant_to_shape)
    }

    pub fn input_is_relevant_to_value(&self, index: usize) -> GraphResult<bool> {
        Ok(self.input_slot(index)?.relevant_to_value)
    }

    pub fn output_tensor(&self, index: usize) -> GraphResult<&'g TensorDescriptor> {
        Ok(&self.output_slot(index)?.tensor)
    }

    pub fn output_element_type(&self, index: usize) -> GraphResult<ElementType> {
        Ok(self.output_slot(index)?.tensor.element_type())
    }

    pub fn output_partial_shape(&self, index: usize) -> GraphResult<&'g PartialShape> {
        Ok(self.output_slot(index)?.tensor.partial_shape())
    }

    pub fn output_shape(&self, index: usize) -> GraphResult<Shape> {
        self.output(index)?.shape()
    }

    pub fn output_target_inputs(&self, index: usize) -> GraphResult<&'g BTreeSet<Input>> {
        Ok(&self.output_slot(index)?.targets)
    }

    fn ensure_single_output(&self) -> GraphResult<()> {
        if self.data.outputs.len() == 1 {
            Ok(())
        } else {
            Err(GraphError::NotSingleOutput {
                node: self.data.id,
                outputs: self.data.outputs.len(),
            })
        }
    }

    /// Element type of a single-output node.
    pub fn element_type(&self) -> GraphResult<ElementType> {
        self.ensure_single_output()?;
        self.output_element_type(0)
    }

    /// Static shape of a single-output node.
    pub fn shape(&self) -> GraphResult<Shape> {
        self.ensure_single_output()?;
        self.output_shape(0)
    }

    /// `true` when both nodes have the same output count, element types and shapes.
    pub fn has_same_type(&self, other: &NodeRef<'_>) -> bool {
        self.output_size() == other.output_size()
            && self.data.outputs.iter().zip(other.data.outputs.iter()).all(
                |(lhs, rhs)| {
                    lhs.tensor.element_type() == rhs.tensor.element_type()
                        && lhs.tensor.partial_shape() == rhs.tensor.partial_shape()
                },
            )
    }

    /// See [`Graph::users`].
    pub fn users(&self, check_is_used: bool) -> BTreeSet<NodeId> {
        self.graph.users_of_data(self.data, check_is_used)
    }

    pub fn control_dependencies(&self) -> &'g BTreeSet<NodeId> {
        &self.data.control_deps
    }

    pub fn provenance_tags(&self) -> &'g BTreeSet<String> {
        &self.data.provenance
    }

    pub fn placement(&self) -> Placement {
        self.data.placement
    }

    pub fn placement_index(&self) -> Option<usize> {
        self.data.placement_index
    }

    /// `"{Kind} {name}"`.
    pub fn short_description(&self) -> String {
        format!("{} {}", self.description(), self.name())
    }

    /// Kind, name, argument types and output types; used in validation diagnostics.
    pub fn long_description(&self) -> String {
        describe_long(self.graph, self.data)
    }
}

pub(crate) fn describe_long(graph: &Graph, data: &NodeData) -> String {
    let mut out = format!("{} {}(", data.op.type_name(), data.name());
    for (index, slot) in data.inputs.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        match graph.output(slot.source) {
            Ok(source) => {
                let _ = write!(
                    out,
                    "{}: {}{}",
                    source.node().name(),
                    source.element_type(),
                    source.partial_shape()
                );
            }
            Err(_) => out.push_str("<detached>"),
        }
    }
    out.push_str(") -> (");
    for (index, slot) in data.outputs.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        let _ = write!(
            out,
            "{}{}",
            slot.tensor.element_type(),
            slot.tensor.partial_shape()
        );
    }
    out.push(')');
    out
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.data.id)
            .field("op", &self.data.op)
            .field("name", &self.name())
            .finish()
    }
}

impl fmt::Display for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.long_description())
    }
}

/// Mutable view of a node. Every method forwards to the corresponding [`Graph`] entry point.
pub struct NodeMut<'g> {
    pub(crate) graph: &'g mut Graph,
    pub(crate) id: NodeId,
}

impl NodeMut<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn view(&self) -> NodeRef<'_> {
        self.graph.node(self.id)
    }

    pub fn input(&mut self, index: usize) -> GraphResult<InputMut<'_>> {
        self.graph.input_mut(Input::new(self.id, index))
    }

    pub fn output(&mut self, index: usize) -> GraphResult<OutputMut<'_>> {
        self.graph.output_mut(Output::new(self.id, index))
    }

    pub fn set_friendly_name(&mut self, name: impl Into<String>) -> GraphResult<()> {
        self.graph.set_friendly_name(self.id, name)
    }

    pub fn add_control_dependency(&mut self, dependency: NodeId) -> GraphResult<()> {
        self.graph.add_control_dependency(self.id, dependency)
    }

    pub fn remove_control_dependency(&mut self, dependency: NodeId) -> GraphResult<bool> {
        self.graph.remove_control_dependency(self.id, dependency)
    }

    pub fn add_provenance_tag(&mut self, tag: impl Into<String>) -> GraphResult<()> {
        self.graph.add_provenance_tag(self.id, tag)
    }

    pub fn remove_provenance_tag(&mut self, tag: &str) -> GraphResult<bool> {
        self.graph.remove_provenance_tag(self.id, tag)
    }

    pub fn set_placement(&mut self, placement: Placement) -> GraphResult<()> {
        self.graph.set_placement(self.id, placement)
    }

    pub fn set_placement_index(&mut self, index: Option<usize>) -> GraphResult<()> {
        self.graph.set_placement_index(self.id, index)
    }

    pub fn revalidate_and_infer_types(&mut self) -> GraphResult<()> {
        self.graph.revalidate_and_infer_types(self.id)
    }
}
