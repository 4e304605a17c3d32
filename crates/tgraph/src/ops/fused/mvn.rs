use std::any::Any;
use std::collections::BTreeSet;

use crate::error::GraphResult;
use crate::graph::{Graph, InferContext, NodeId, Output};
use crate::node_ensure;
use crate::op::{check_new_args_count, Decompose, Op};
use crate::ops::{self, Constant};

/// Mean-variance normalization.
///
/// Subtracts the mean over the reduction axes and, when `normalize_variance` is set, divides
/// by `sqrt(variance + eps)`. By default the reduction covers every axis except 0, and also
/// skips axis 1 unless `across_channels` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Mvn {
    across_channels: bool,
    normalize_variance: bool,
    eps: f64,
    reduction_axes: Option<BTreeSet<usize>>,
}

impl Mvn {
    pub const DEFAULT_EPS: f64 = 1e-9;

    pub fn new(across_channels: bool, normalize_variance: bool, eps: f64) -> Self {
        Self {
            across_channels,
            normalize_variance,
            eps,
            reduction_axes: None,
        }
    }

    /// Normalizes over exactly `axes`.
    pub fn with_reduction_axes(
        axes: impl IntoIterator<Item = usize>,
        normalize_variance: bool,
        eps: f64,
    ) -> Self {
        let axes = axes.into_iter().collect::<BTreeSet<_>>();
        Self {
            across_channels: axes.contains(&1),
            normalize_variance,
            eps,
            reduction_axes: Some(axes),
        }
    }

    pub fn across_channels(&self) -> bool {
        self.across_channels
    }

    pub fn normalize_variance(&self) -> bool {
        self.normalize_variance
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Axes the statistics are taken over for an argument of the given rank.
    pub fn reduction_axes(&self, rank: usize) -> BTreeSet<usize> {
        match &self.reduction_axes {
            Some(axes) => axes.clone(),
            None => (1..rank)
                .filter(|axis| self.across_channels || *axis != 1)
                .collect(),
        }
    }
}

impl Op for Mvn {
    fn type_name(&self) -> &'static str {
        "MVN"
    }

    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        cx.check_input_count(1)?;
        let element_type = cx.input_element_type(0)?;
        node_ensure!(
            cx,
            element_type.is_dynamic() || element_type.is_real(),
            "MVN requires a floating-point argument (got {element_type})"
        );
        let shape = cx.input_partial_shape(0)?;
        if let (Some(axes), Some(rank)) = (&self.reduction_axes, shape.rank()) {
            if let Some(axis) = axes.iter().find(|axis| **axis >= rank) {
                return Err(cx.validation_error(format!(
                    "Reduction axis ({axis}) is out of bounds (argument shape: {shape})"
                )));
            }
        }
        cx.set_output_type(0, element_type, shape.clone())
    }

    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId> {
        check_new_args_count(self, new_args, 1)?;
        graph.add_node(self.clone(), new_args)
    }

    fn as_decomposable(&self) -> Option<&dyn Decompose> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Decompose for Mvn {
    fn decompose(&self, graph: &mut Graph, node: NodeId) -> GraphResult<Vec<Output>> {
        let data = graph.try_node(node)?.input_value(0)?;
        let (element_type, shape) = {
            let output = graph.output(data)?;
            (output.element_type(), output.shape()?)
        };
        let axes = self.reduction_axes(shape.rank());
        let reduced_dims = shape
            .dims()
            .iter()
            .enumerate()
            .filter(|(axis, _)| !axes.contains(axis))
            .map(|(_, len)| *len)
            .collect::<Vec<_>>();
        let count = axes.iter().map(|axis| shape.dims()[*axis]).product::<usize>();
        let count = ops::constant(
            graph,
            Constant::splat(element_type, reduced_dims.clone(), count as f64),
        )?;

        // mean = sum(data) / count, broadcast back to the data shape
        let total = ops::sum(graph, data, axes.iter().copied())?;
        let mean = ops::divide(graph, total, count)?;
        let mean = ops::broadcast(graph, mean, shape.clone(), axes.iter().copied())?;
        let centered = ops::subtract(graph, data, mean)?;
        if !self.normalize_variance {
            return Ok(vec![centered]);
        }

        // std = sqrt(sum(centered^2) / count + eps)
        let squared = ops::multiply(graph, centered, centered)?;
        let squared_total = ops::sum(graph, squared, axes.iter().copied())?;
        let variance = ops::divide(graph, squared_total, count)?;
        let eps = ops::constant(
            graph,
            Constant::splat(element_type, reduced_dims, self.eps),
        )?;
        let variance = ops::add(graph, variance, eps)?;
        let std = ops::sqrt(graph, variance)?;
        let std = ops::broadcast(graph, std, shape, axes.iter().copied())?;
        Ok(vec![ops::divide(graph, centered, std)?])
    }
}
