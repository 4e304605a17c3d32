use std::any::Any;

use crate::autodiff::AdjointContext;
use crate::error::GraphResult;
use crate::graph::{Graph, InferContext, NodeId, Output};
use crate::node_ensure;
use crate::op::{check_new_args_count, Op};
use crate::types::{ElementType, Shape};

/// Literal tensor. Holds either one value broadcast over the shape or one value per element.
///
/// Values are stored as `f64`; boolean constants use `0.0` and `1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    element_type: ElementType,
    shape: Shape,
    values: Vec<f64>,
}

impl Constant {
    pub fn new(element_type: ElementType, shape: impl Into<Shape>, values: Vec<f64>) -> Self {
        Self {
            element_type,
            shape: shape.into(),
            values,
        }
    }

    pub fn splat(element_type: ElementType, shape: impl Into<Shape>, value: f64) -> Self {
        Self::new(element_type, shape, vec![value])
    }

    pub fn scalar(element_type: ElementType, value: f64) -> Self {
        Self::new(element_type, Shape::scalar(), vec![value])
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The single value every element holds, if the constant is uniform.
    pub fn splat_value(&self) -> Option<f64> {
        let (first, rest) = self.values.split_first()?;
        rest.iter().all(|value| value == first).then_some(*first)
    }

    /// One value per element in row-major order.
    pub fn expanded_values(&self) -> Vec<f64> {
        let count = self.shape.element_count();
        if self.values.len() == 1 {
            vec![self.values[0]; count]
        } else {
            self.values.clone()
        }
    }
}

impl Op for Constant {
    fn type_name(&self) -> &'static str {
        "Constant"
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(0)?;
        node_ensure!(
            cx,
            self.element_type.is_static(),
            "Constant element type must be static"
        );
        let count = self.shape.element_count();
        node_ensure!(
            cx,
            self.values.len() == 1 || self.values.len() == count,
            "Did not get the expected number of literals for a constant of shape {} (got {}, expected 1 or {})",
            self.shape,
            self.values.len(),
            count
        );
        if self.element_type == ElementType::Boolean {
            node_ensure!(
                cx,
                self.values.iter().all(|value| *value == 0.0 || *value == 1.0),
                "Boolean constants only hold 0 or 1"
            );
        } else if self.element_type.is_integral() {
            node_ensure!(
                cx,
                self.values.iter().all(|value| value.fract() == 0.0),
                "Integral constants cannot hold fractional values"
            );
        }
        cx.set_output_type(0, self.element_type, (&self.shape).into())
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 0)?;
        graph.add_node(self.clone(), new_args)
    }

    fn generate_adjoints(&self, _cx: &mut AdjointContext<'_>) -> GraphResult<()> {
        Ok(())
    }

    fn is_constant(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
