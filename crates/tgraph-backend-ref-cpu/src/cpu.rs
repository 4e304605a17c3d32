use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tgraph::graph::{Graph, NodeId, NodeRef, Output};
use tgraph::op::Op;
use tgraph::ops::{
    Binary, BinaryKind, Broadcast, Constant, Logical, LogicalKind, ResultOp, ShapeOf, Sum, Unary,
    UnaryKind,
};
use tgraph::runtime::{
    ensure_finalized, Backend, BackendError, BackendResult, Executable, HostTensor, TensorData,
    TensorSpec,
};
use tgraph::types::{ElementType, Shape};

pub type CpuTensor = HostTensor;

/// Hook for replacing or extending the reference kernels.
///
/// `try_execute` runs before the built-in kernel for every node; returning `None` falls
/// through to it. Ops without a built-in kernel (fused ops, for instance) only compile when
/// `supports` claims them.
pub trait CpuKernelInterceptor: Send + Sync {
    fn supports(&self, _op: &dyn Op) -> bool {
        false
    }

    fn try_execute(
        &self,
        node: &NodeRef<'_>,
        inputs: &[CpuTensor],
        outputs: &[TensorSpec],
    ) -> Option<BackendResult<Vec<CpuTensor>>>;
}

#[derive(Default)]
pub struct NoopInterceptor;

impl CpuKernelInterceptor for NoopInterceptor {
    fn try_execute(
        &self,
        _node: &NodeRef<'_>,
        _inputs: &[CpuTensor],
        _outputs: &[TensorSpec],
    ) -> Option<BackendResult<Vec<CpuTensor>>> {
        None
    }
}

/// Reference interpreter over host memory. Every value is computed in `f64` and narrowed to
/// the node's output type.
#[derive(Clone)]
pub struct GenericCpuBackend<I: CpuKernelInterceptor> {
    interceptor: Arc<I>,
}

impl<I: CpuKernelInterceptor> GenericCpuBackend<I> {
    pub fn with_interceptor(interceptor: I) -> Self {
        Self::with_arc(Arc::new(interceptor))
    }

    pub fn with_arc(interceptor: Arc<I>) -> Self {
        Self { interceptor }
    }

    pub fn interceptor(&self) -> &I {
        self.interceptor.as_ref()
    }
}

impl GenericCpuBackend<NoopInterceptor> {
    pub fn new() -> Self {
        Self::with_interceptor(NoopInterceptor)
    }
}

impl Default for GenericCpuBackend<NoopInterceptor> {
    fn default() -> Self {
        Self::new()
    }
}

pub type CpuBackend = GenericCpuBackend<NoopInterceptor>;

impl<I: CpuKernelInterceptor + 'static> Backend for GenericCpuBackend<I> {
    type Tensor = CpuTensor;
    type Executable = CpuExecutable<I>;

    fn backend_name(&self) -> &str {
        "cpu"
    }

    fn create_tensor(&self, element_type: ElementType, shape: &Shape) -> BackendResult<CpuTensor> {
        HostTensor::zeros(element_type, shape.clone())
    }

    fn create_tensor_from_host(&self, host: &HostTensor) -> BackendResult<CpuTensor> {
        Ok(host.clone())
    }

    fn tensor_spec(&self, tensor: &CpuTensor) -> BackendResult<TensorSpec> {
        Ok(tensor.spec())
    }

    fn read(&self, tensor: &CpuTensor) -> BackendResult<HostTensor> {
        Ok(tensor.clone())
    }

    fn compile(&self, graph: &Graph) -> BackendResult<CpuExecutable<I>> {
        ensure_finalized(graph)?;
        let order = graph.topological_order()?;
        for id in &order {
            let node = graph.node(*id);
            if !has_kernel(node.op().as_ref()) && !self.interceptor.supports(node.op().as_ref()) {
                return Err(BackendError::unimplemented(
                    node.description(),
                    format!(
                        "no reference kernel for {}; decompose it before compiling",
                        node.name()
                    ),
                ));
            }
        }
        debug!("cpu: compiled graph with {} node(s)", order.len());
        Ok(CpuExecutable {
            parameters: graph.parameters(),
            results: graph.results(),
            graph: graph.clone(),
            order,
            interceptor: Arc::clone(&self.interceptor),
        })
    }
}

fn has_kernel(op: &dyn Op) -> bool {
    let any = op.as_any();
    op.is_parameter()
        || any.is::<ResultOp>()
        || any.is::<Constant>()
        || any.is::<Binary>()
        || any.is::<Unary>()
        || any.is::<Logical>()
        || any.is::<Sum>()
        || any.is::<Broadcast>()
        || any.is::<ShapeOf>()
}

pub struct CpuExecutable<I: CpuKernelInterceptor> {
    graph: Graph,
    order: Vec<NodeId>,
    parameters: Vec<NodeId>,
    results: Vec<NodeId>,
    interceptor: Arc<I>,
}

impl<I: CpuKernelInterceptor> CpuExecutable<I> {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    fn bind_inputs(&self, inputs: &[CpuTensor]) -> BackendResult<HashMap<Output, CpuTensor>> {
        if inputs.len() != self.parameters.len() {
            return Err(BackendError::shape_mismatch(
                format!("{} input(s)", self.parameters.len()),
                format!("{} input(s)", inputs.len()),
            ));
        }
        let mut values = HashMap::with_capacity(self.order.len());
        for (parameter, tensor) in self.parameters.iter().zip(inputs) {
            let node = self.graph.node(*parameter);
            let expected = TensorSpec::new(node.output_element_type(0)?, node.output_shape(0)?);
            if tensor.spec() != expected {
                return Err(BackendError::shape_mismatch(expected, tensor.spec()));
            }
            values.insert(parameter.output(0), tensor.clone());
        }
        Ok(values)
    }
}

impl<I: CpuKernelInterceptor> Executable for CpuExecutable<I> {
    type Tensor = CpuTensor;

    fn call(&self, inputs: &[CpuTensor]) -> BackendResult<Vec<CpuTensor>> {
        let mut values = self.bind_inputs(inputs)?;
        for id in &self.order {
            let node = self.graph.node(*id);
            if node.is_parameter() {
                continue;
            }
            let args = node
                .input_values()
                .iter()
                .map(|value| {
                    values.get(value).cloned().ok_or_else(|| {
                        BackendError::execution(format!("{value} was not computed"))
                    })
                })
                .collect::<BackendResult<Vec<_>>>()?;
            let specs = node
                .outputs()
                .map(|output| Ok(TensorSpec::new(output.element_type(), output.shape()?)))
                .collect::<BackendResult<Vec<_>>>()?;
            let outputs = match self.interceptor.try_execute(&node, &args, &specs) {
                Some(result) => result?,
                None => execute_node(&node, &args, &specs)?,
            };
            if outputs.len() != specs.len() {
                return Err(BackendError::execution(format!(
                    "{} produced {} output(s), expected {}",
                    node.name(),
                    outputs.len(),
                    specs.len()
                )));
            }
            for (index, tensor) in outputs.into_iter().enumerate() {
                values.insert(id.output(index), tensor);
            }
        }
        self.results
            .iter()
            .map(|result| {
                values.remove(&result.output(0)).ok_or_else(|| {
                    BackendError::execution(format!("result {result} was not computed"))
                })
            })
            .collect()
    }
}

fn execute_node(
    node: &NodeRef<'_>,
    args: &[CpuTensor],
    specs: &[TensorSpec],
) -> BackendResult<Vec<CpuTensor>> {
    let spec = specs
        .first()
        .ok_or_else(|| BackendError::execution(format!("{} has no outputs", node.name())))?;
    let values = if let Some(constant) = node.op_as::<Constant>() {
        constant.expanded_values()
    } else if node.op_as::<ResultOp>().is_some() {
        return Ok(vec![arg(node, args, 0)?.clone()]);
    } else if let Some(binary) = node.op_as::<Binary>() {
        let kind = binary.kind();
        broadcast_binary(arg(node, args, 0)?, arg(node, args, 1)?, &spec.shape, |a, b| {
            apply_binary(kind, a, b)
        })
    } else if let Some(logical) = node.op_as::<Logical>() {
        let kind = logical.kind();
        broadcast_binary(arg(node, args, 0)?, arg(node, args, 1)?, &spec.shape, |a, b| {
            apply_logical(kind, a != 0.0, b != 0.0)
        })
    } else if let Some(unary) = node.op_as::<Unary>() {
        let kind = unary.kind();
        arg(node, args, 0)?
            .to_f64_vec()
            .into_iter()
            .map(|value| apply_unary(kind, value))
            .collect()
    } else if let Some(sum) = node.op_as::<Sum>() {
        reduce_sum(arg(node, args, 0)?, sum, &spec.shape)
    } else if let Some(broadcast) = node.op_as::<Broadcast>() {
        broadcast_axes(arg(node, args, 0)?, broadcast)
    } else if node.op_as::<ShapeOf>().is_some() {
        arg(node, args, 0)?
            .shape()
            .dims()
            .iter()
            .map(|dim| *dim as f64)
            .collect()
    } else {
        return Err(BackendError::unimplemented(
            node.description(),
            "no reference kernel",
        ));
    };
    let data = TensorData::from_f64(spec.element_type, &values)?;
    Ok(vec![HostTensor::new(spec.shape.clone(), data)?])
}

fn arg<'a>(node: &NodeRef<'_>, args: &'a [CpuTensor], index: usize) -> BackendResult<&'a CpuTensor> {
    args.get(index).ok_or_else(|| {
        BackendError::execution(format!("{} is missing argument {index}", node.name()))
    })
}

fn apply_binary(kind: BinaryKind, a: f64, b: f64) -> f64 {
    match kind {
        BinaryKind::Add => a + b,
        BinaryKind::Subtract => a - b,
        BinaryKind::Multiply => a * b,
        BinaryKind::Divide => a / b,
        BinaryKind::Maximum => a.max(b),
        BinaryKind::Minimum => a.min(b),
        BinaryKind::Power => a.powf(b),
    }
}

fn apply_unary(kind: UnaryKind, value: f64) -> f64 {
    match kind {
        UnaryKind::Negative => -value,
        UnaryKind::Abs => value.abs(),
        UnaryKind::Sqrt => value.sqrt(),
        UnaryKind::Exp => value.exp(),
        UnaryKind::Log => value.ln(),
    }
}

fn apply_logical(kind: LogicalKind, a: bool, b: bool) -> f64 {
    let value = match kind {
        LogicalKind::And => a && b,
        LogicalKind::Or => a || b,
        LogicalKind::Xor => a ^ b,
    };
    f64::from(u8::from(value))
}

fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0usize; dims.len()];
    let mut stride = 1usize;
    for (axis, dim) in dims.iter().enumerate().rev() {
        strides[axis] = stride;
        stride *= *dim;
    }
    strides
}

/// Right-aligns `input_dims` against `out_dims`; size-1 axes get stride 0 so they repeat.
fn broadcast_strides(input_dims: &[usize], out_dims: &[usize]) -> Vec<usize> {
    let rank_diff = out_dims.len().saturating_sub(input_dims.len());
    let mut aligned = vec![1usize; out_dims.len()];
    aligned[rank_diff..].copy_from_slice(input_dims);
    let mut strides = compute_strides(&aligned);
    for (stride, dim) in strides.iter_mut().zip(&aligned) {
        if *dim == 1 {
            *stride = 0;
        }
    }
    strides
}

fn broadcast_binary(
    lhs: &CpuTensor,
    rhs: &CpuTensor,
    out_shape: &Shape,
    f: impl Fn(f64, f64) -> f64,
) -> Vec<f64> {
    let lhs_values = lhs.to_f64_vec();
    let rhs_values = rhs.to_f64_vec();
    let out_dims = out_shape.dims();
    let out_strides = compute_strides(out_dims);
    let lhs_strides = broadcast_strides(lhs.shape().dims(), out_dims);
    let rhs_strides = broadcast_strides(rhs.shape().dims(), out_dims);
    (0..out_shape.element_count())
        .map(|flat| {
            let mut lhs_index = 0;
            let mut rhs_index = 0;
            let mut rest = flat;
            for axis in 0..out_dims.len() {
                let coord = rest / out_strides[axis];
                rest %= out_strides[axis];
                lhs_index += coord * lhs_strides[axis];
                rhs_index += coord * rhs_strides[axis];
            }
            f(lhs_values[lhs_index], rhs_values[rhs_index])
        })
        .collect()
}

fn reduce_sum(input: &CpuTensor, sum: &Sum, out_shape: &Shape) -> Vec<f64> {
    let in_dims = input.shape().dims();
    let in_strides = compute_strides(in_dims);
    let out_strides = compute_strides(out_shape.dims());
    let mut out = vec![0.0f64; out_shape.element_count()];
    for (flat, value) in input.to_f64_vec().into_iter().enumerate() {
        let mut out_index = 0;
        let mut out_axis = 0;
        let mut rest = flat;
        for axis in 0..in_dims.len() {
            let coord = rest / in_strides[axis];
            rest %= in_strides[axis];
            if !sum.axes().contains(&axis) {
                out_index += coord * out_strides[out_axis];
                out_axis += 1;
            }
        }
        out[out_index] += value;
    }
    out
}

fn broadcast_axes(input: &CpuTensor, broadcast: &Broadcast) -> Vec<f64> {
    let values = input.to_f64_vec();
    let out_dims = broadcast.shape().dims();
    let out_strides = compute_strides(out_dims);
    let in_strides = compute_strides(input.shape().dims());
    (0..broadcast.shape().element_count())
        .map(|flat| {
            let mut in_index = 0;
            let mut in_axis = 0;
            let mut rest = flat;
            for axis in 0..out_dims.len() {
                let coord = rest / out_strides[axis];
                rest %= out_strides[axis];
                if !broadcast.axes().contains(&axis) {
                    in_index += coord * in_strides[in_axis];
                    in_axis += 1;
                }
            }
            values[in_index]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_are_row_major() {
        assert_eq!(compute_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(compute_strides(&[]), Vec::<usize>::new());
    }

    #[test]
    fn broadcast_strides_repeat_unit_axes() {
        assert_eq!(broadcast_strides(&[3], &[2, 3]), vec![0, 1]);
        assert_eq!(broadcast_strides(&[2, 1], &[2, 3]), vec![1, 0]);
    }
}
