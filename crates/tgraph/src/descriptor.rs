use std::collections::BTreeSet;

use crate::error::{GraphError, GraphResult};
use crate::graph::Output;
use crate::types::{ElementType, PartialShape, Shape};

/// Type, shape and liveness bookkeeping owned by one output slot.
///
/// The liveness sets are filled in by allocation passes; the graph only stores them.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDescriptor {
    name: String,
    element_type: ElementType,
    partial_shape: PartialShape,
    liveness_new: BTreeSet<Output>,
    liveness_freed: BTreeSet<Output>,
}

impl TensorDescriptor {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            element_type: ElementType::Dynamic,
            partial_shape: PartialShape::dynamic(),
            liveness_new: BTreeSet::new(),
            liveness_freed: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn partial_shape(&self) -> &PartialShape {
        &self.partial_shape
    }

    /// Static shape of the tensor; errors while any extent is unknown.
    pub fn shape(&self, output: Output) -> GraphResult<Shape> {
        self.partial_shape
            .to_shape()
            .ok_or(GraphError::DynamicShape { output })
    }

    pub fn is_static(&self) -> bool {
        self.element_type.is_static() && self.partial_shape.is_static()
    }

    pub(crate) fn set_tensor_type(&mut self, element_type: ElementType, shape: PartialShape) {
        self.element_type = element_type;
        self.partial_shape = shape;
    }

    pub fn liveness_new(&self) -> &BTreeSet<Output> {
        &self.liveness_new
    }

    pub fn liveness_freed(&self) -> &BTreeSet<Output> {
        &self.liveness_freed
    }

    pub fn liveness_new_mut(&mut self) -> &mut BTreeSet<Output> {
        &mut self.liveness_new
    }

    pub fn liveness_freed_mut(&mut self) -> &mut BTreeSet<Output> {
        &mut self.liveness_freed
    }
}
