use std::any::Any;

use crate::error::GraphResult;
use crate::graph::{Graph, InferContext, NodeId, Output};
use crate::node_ensure;
use crate::op::{check_new_args_count, Decompose, Op};
use crate::ops::{self, Constant};
use crate::types::ElementType;

/// Limits every element to `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clamp {
    min: f64,
    max: f64,
}

impl Clamp {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Bounds representable in `element_type`: integral types round inward.
    pub fn bounds_for(&self, element_type: ElementType) -> (f64, f64) {
        if element_type.is_integral() {
            (self.min.ceil(), self.max.floor())
        } else {
            (self.min, self.max)
        }
    }
}

impl Op for Clamp {
    fn type_name(&self) -> &'static str {
        "Clamp"
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(1)?;
        node_ensure!(
            cx,
            self.min <= self.max,
            "The 'min' parameter needs to be less than 'max' for Clamp (min: {}, max: {})",
            self.min,
            self.max
        );
        let element_type = cx.input_element_type(0)?;
        node_ensure!(
            cx,
            element_type != ElementType::Boolean,
            "Arguments cannot have boolean element type (argument element type: {element_type})"
        );
        let shape = cx.input_partial_shape(0)?.clone();
        cx.set_output_type(0, element_type, shape)
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 1)?;
        graph.add_node(*self, new_args)
    }

    fn as_decomposable(&self) -> Option<&dyn Decompose> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Decompose for Clamp {
    /// `min(max(data, min), max)` with both bounds as constants of the data shape.
    fn decompose(&self, graph: &mut Graph, node: NodeId) -> GraphResult<Vec<Output>> {
        let data = graph.try_node(node)?.input_value(0)?;
        let (element_type, shape) = {
            let output = graph.output(data)?;
            (output.element_type(), output.shape()?)
        };
        let (min, max) = self.bounds_for(element_type);
        let lower = ops::constant(graph, Constant::splat(element_type, shape.clone(), min))?;
        let upper = ops::constant(graph, Constant::splat(element_type, shape, max))?;
        let floored = ops::maximum(graph, data, lower)?;
        let clamped = ops::minimum(graph, floored, upper)?;
        Ok(vec![clamped])
    }
}
