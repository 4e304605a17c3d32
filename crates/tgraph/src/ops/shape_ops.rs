use std::any::Any;
use std::collections::BTreeSet;

use crate::autodiff::AdjointContext;
use crate::error::GraphResult;
use crate::graph::{Graph, InferContext, NodeId, Output};
use crate::node_ensure;
use crate::op::{check_new_args_count, Op};
use crate::types::{Dimension, ElementType, PartialShape, Shape};

/// Sum over `axes`; reduced axes are dropped from the output shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sum {
    axes: BTreeSet<usize>,
}

impl Sum {
    pub fn new(axes: impl IntoIterator<Item = usize>) -> Self {
        Self {
            axes: axes.into_iter().collect(),
        }
    }

    pub fn axes(&self) -> &BTreeSet<usize> {
        &self.axes
    }
}

impl Op for Sum {
    fn type_name(&self) -> &'static str {
        "Sum"
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(1)?;
        let element_type = cx.input_element_type(0)?;
        node_ensure!(
            cx,
            element_type != ElementType::Boolean,
            "Sum does not accept boolean arguments"
        );
        let input = cx.input_partial_shape(0)?;
        let Some(dims) = input.dims() else {
            return cx.set_output_type(0, element_type, PartialShape::dynamic());
        };
        for axis in &self.axes {
            node_ensure!(
                cx,
                *axis < dims.len(),
                "Reduction axis ({axis}) is out of bounds (argument shape: {input})"
            );
        }
        let reduced = dims
            .iter()
            .enumerate()
            .filter(|(axis, _)| !self.axes.contains(axis))
            .map(|(_, dim)| *dim)
            .collect::<Vec<_>>();
        cx.set_output_type(0, element_type, PartialShape::new(reduced))
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 1)?;
        graph.add_node(self.clone(), new_args)
    }

    fn generate_adjoints(&self, cx: &mut AdjointContext<'_>) -> GraphResult<()> {
        let delta = cx.delta(0)?;
        let input = cx.input_value(0)?;
        let shape = cx.graph().output(input)?.shape()?;
        let spread = super::broadcast(cx.graph(), delta, shape, self.axes.iter().copied())?;
        cx.add_input_delta(0, spread)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Broadcasts its argument to `shape` by inserting the axes listed in `axes`.
///
/// The argument's dimensions map, in order, onto the output axes not listed in `axes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    shape: Shape,
    axes: BTreeSet<usize>,
}

impl Broadcast {
    pub fn new(shape: impl Into<Shape>, axes: impl IntoIterator<Item = usize>) -> Self {
        Self {
            shape: shape.into(),
            axes: axes.into_iter().collect(),
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn axes(&self) -> &BTreeSet<usize> {
        &self.axes
    }
}

impl Op for Broadcast {
    fn type_name(&self) -> &'static str {
        "Broadcast"
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(1)?;
        let rank = self.shape.rank();
        for axis in &self.axes {
            node_ensure!(
                cx,
                *axis < rank,
                "Broadcast axis index ({axis}) exceeds specified output shape rank ({rank})"
            );
        }
        let kept = self
            .shape
            .dims()
            .iter()
            .enumerate()
            .filter(|(axis, _)| !self.axes.contains(axis))
            .map(|(_, len)| Dimension::Static(*len))
            .collect::<Vec<_>>();
        let input = cx.input_partial_shape(0)?;
        node_ensure!(
            cx,
            input.compatible(&PartialShape::new(kept)),
            "Broadcast argument shape, specified output shape, and axes are incompatible (argument shape: {input}, output shape: {}, broadcast axes: {:?})",
            self.shape,
            self.axes
        );
        let element_type = cx.input_element_type(0)?;
        cx.set_output_type(0, element_type, (&self.shape).into())
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 1)?;
        graph.add_node(self.clone(), new_args)
    }

    fn generate_adjoints(&self, cx: &mut AdjointContext<'_>) -> GraphResult<()> {
        let delta = cx.delta(0)?;
        let folded = super::sum(cx.graph(), delta, self.axes.iter().copied())?;
        cx.add_input_delta(0, folded)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shape of its argument as a rank-1 `i64` tensor.
///
/// Only the argument's shape matters, so the input is marked irrelevant to the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeOf;

impl Op for ShapeOf {
    fn type_name(&self) -> &'static str {
        "ShapeOf"
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(1)?;
        cx.set_input_is_relevant_to_value(0, false)?;
        let rank = match cx.input_partial_shape(0)?.rank() {
            Some(rank) => Dimension::Static(rank),
            None => Dimension::Dynamic,
        };
        cx.set_output_type(0, ElementType::I64, PartialShape::new(vec![rank]))
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 1)?;
        graph.add_node(*self, new_args)
    }

    fn generate_adjoints(&self, _cx: &mut AdjointContext<'_>) -> GraphResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
