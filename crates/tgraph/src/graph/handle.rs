use std::collections::BTreeSet;
use std::fmt;

use crate::descriptor::TensorDescriptor;
use crate::error::GraphResult;
use crate::types::{ElementType, PartialShape, Shape};

use super::id::NodeId;
use super::node::{InputSlot, OutputSlot};
use super::view::NodeRef;
use super::Graph;

/// Identifies output `index` of `node`. Ordered by (node instance, index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Output {
    pub node: NodeId,
    pub index: usize,
}

impl Output {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output {} of {}", self.index, self.node)
    }
}

/// Identifies input `index` of `node`. Ordered by (node instance, index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Input {
    pub node: NodeId,
    pub index: usize,
}

impl Input {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input {} of {}", self.index, self.node)
    }
}

/// Read-only view of an input slot.
#[derive(Clone, Copy)]
pub struct InputRef<'g> {
    pub(crate) graph: &'g Graph,
    pub(crate) handle: Input,
    pub(crate) slot: &'g InputSlot,
}

impl<'g> InputRef<'g> {
    pub fn handle(&self) -> Input {
        self.handle
    }

    pub fn index(&self) -> usize {
        self.handle.index
    }

    pub fn node(&self) -> NodeRef<'g> {
        self.graph.node(self.handle.node)
    }

    /// The output this input currently reads.
    pub fn source_output(&self) -> Output {
        self.slot.source
    }

    pub fn source(&self) -> GraphResult<OutputRef<'g>> {
        self.graph.output(self.slot.source)
    }

    pub fn element_type(&self) -> GraphResult<ElementType> {
        Ok(self.source()?.element_type())
    }

    pub fn partial_shape(&self) -> GraphResult<&'g PartialShape> {
        Ok(self.source()?.partial_shape())
    }

    pub fn shape(&self) -> GraphResult<Shape> {
        self.source()?.shape()
    }

    pub fn is_relevant_to_shape(&self) -> bool {
        self.slot.relevant_to_shape
    }

    pub fn is_relevant_to_value(&self) -> bool {
        self.slot.relevant_to_value
    }
}

impl fmt::Debug for InputRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputRef")
            .field("handle", &self.handle)
            .field("source", &self.slot.source)
            .finish()
    }
}

/// Read-only view of an output slot.
#[derive(Clone, Copy)]
pub struct OutputRef<'g> {
    pub(crate) graph: &'g Graph,
    pub(crate) handle: Output,
    pub(crate) slot: &'g OutputSlot,
}

impl<'g> OutputRef<'g> {
    pub fn handle(&self) -> Output {
        self.handle
    }

    pub fn index(&self) -> usize {
        self.handle.index
    }

    pub fn node(&self) -> NodeRef<'g> {
        self.graph.node(self.handle.node)
    }

    pub fn tensor(&self) -> &'g TensorDescriptor {
        &self.slot.tensor
    }

    pub fn element_type(&self) -> ElementType {
        self.slot.tensor.element_type()
    }

    pub fn partial_shape(&self) -> &'g PartialShape {
        self.slot.tensor.partial_shape()
    }

    pub fn shape(&self) -> GraphResult<Shape> {
        self.slot.tensor.shape(self.handle)
    }

    /// Every input currently sourced from this output.
    pub fn target_inputs(&self) -> &'g BTreeSet<Input> {
        &self.slot.targets
    }

    pub fn has_users(&self) -> bool {
        !self.slot.targets.is_empty()
    }
}

impl fmt::Debug for OutputRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputRef")
            .field("handle", &self.handle)
            .field("element_type", &self.element_type())
            .field("partial_shape", self.partial_shape())
            .field("targets", &self.slot.targets)
            .finish()
    }
}

/// Mutable view of an input slot.
pub struct InputMut<'g> {
    pub(crate) graph: &'g mut Graph,
    pub(crate) handle: Input,
}

impl InputMut<'_> {
    pub fn handle(&self) -> Input {
        self.handle
    }

    pub fn view(&self) -> GraphResult<InputRef<'_>> {
        self.graph.input(self.handle)
    }

    /// See [`Graph::replace_input_source_output`].
    pub fn replace_source_output(&mut self, new_source: Output) -> GraphResult<()> {
        self.graph.replace_input_source_output(self.handle, new_source)
    }
}

/// Mutable view of an output slot.
pub struct OutputMut<'g> {
    pub(crate) graph: &'g mut Graph,
    pub(crate) handle: Output,
}

impl OutputMut<'_> {
    pub fn handle(&self) -> Output {
        self.handle
    }

    pub fn view(&self) -> GraphResult<OutputRef<'_>> {
        self.graph.output(self.handle)
    }

    /// Redirects every consumer of this output to `replacement`.
    pub fn replace_uses_with(&mut self, replacement: Output) -> GraphResult<usize> {
        self.graph.replace_output_uses(self.handle, replacement)
    }

    /// Descriptor access for liveness bookkeeping.
    pub fn tensor_mut(&mut self) -> GraphResult<&mut TensorDescriptor> {
        Ok(&mut self.graph.output_slot_mut(self.handle)?.tensor)
    }
}
