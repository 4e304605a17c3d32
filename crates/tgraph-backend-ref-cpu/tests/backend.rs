use anyhow::Result;
use tgraph::graph::Graph;
use tgraph::ops::{self, Constant, LogicalKind};
use tgraph::runtime::{Backend, BackendError, Executable, HostTensor, TensorData};
use tgraph::types::{Dimension, ElementType, PartialShape, Shape};
use tgraph::GraphError;
use tgraph_backend_ref_cpu::CpuBackend;

fn f32_input(backend: &CpuBackend, dims: Vec<usize>, values: Vec<f32>) -> HostTensor {
    backend
        .create_tensor_from_host(&HostTensor::from_f32(dims, values).expect("host tensor"))
        .expect("tensor")
}

#[test]
fn elementwise_ops_broadcast_trailing_axes() -> Result<()> {
    let backend = CpuBackend::new();
    let mut graph = Graph::new();
    let a = ops::parameter(&mut graph, ElementType::F32, Shape::new([2, 3]))?;
    let b = ops::parameter(&mut graph, ElementType::F32, Shape::new([3]))?;
    let scale = ops::constant(&mut graph, Constant::scalar(ElementType::F32, 2.0))?;
    let sum = ops::add(&mut graph, a, b)?;
    let scaled = ops::multiply(&mut graph, sum, scale)?;
    let largest = ops::maximum(&mut graph, scaled, b)?;
    ops::result(&mut graph, scaled)?;
    ops::result(&mut graph, largest)?;

    let executable = backend.compile(&graph)?;
    let outputs = executable.call(&[
        f32_input(&backend, vec![2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]),
        f32_input(&backend, vec![3], vec![10.0, 0.0, -10.0]),
    ])?;
    assert_eq!(outputs.len(), 2);
    assert_eq!(
        outputs[0].as_f32(),
        Some(&[20.0, 2.0, -16.0, 26.0, 8.0, -10.0][..])
    );
    assert_eq!(
        outputs[1].as_f32(),
        Some(&[20.0, 2.0, -10.0, 26.0, 8.0, -10.0][..])
    );
    Ok(())
}

#[test]
fn reductions_and_broadcasts_follow_their_axes() -> Result<()> {
    let backend = CpuBackend::new();
    let mut graph = Graph::new();
    let a = ops::parameter(&mut graph, ElementType::F64, Shape::new([2, 3]))?;
    let rows = ops::sum(&mut graph, a, [1])?;
    let columns = ops::sum(&mut graph, a, [0])?;
    let spread = ops::broadcast(&mut graph, rows, vec![2, 2], [1])?;
    ops::result(&mut graph, rows)?;
    ops::result(&mut graph, columns)?;
    ops::result(&mut graph, spread)?;

    let executable = backend.compile(&graph)?;
    let input = HostTensor::from_f64(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    let outputs = executable.call(&[input])?;
    assert_eq!(outputs[0].to_f64_vec(), vec![6.0, 15.0]);
    assert_eq!(outputs[1].to_f64_vec(), vec![5.0, 7.0, 9.0]);
    assert_eq!(outputs[2].to_f64_vec(), vec![6.0, 6.0, 15.0, 15.0]);
    Ok(())
}

#[test]
fn shape_of_and_logic_produce_typed_outputs() -> Result<()> {
    let backend = CpuBackend::new();
    let mut graph = Graph::new();
    let flags = ops::parameter(&mut graph, ElementType::Boolean, Shape::new([4]))?;
    let mask = ops::parameter(&mut graph, ElementType::Boolean, Shape::new([4]))?;
    let either = ops::logical(&mut graph, LogicalKind::Xor, flags, mask)?;
    let shape = ops::shape_of(&mut graph, flags)?;
    ops::result(&mut graph, either)?;
    ops::result(&mut graph, shape)?;

    let executable = backend.compile(&graph)?;
    let outputs = executable.call(&[
        HostTensor::from_bool(vec![4], vec![true, true, false, false])?,
        HostTensor::from_bool(vec![4], vec![true, false, true, false])?,
    ])?;
    assert_eq!(
        outputs[0].data(),
        &TensorData::Boolean(vec![false, true, true, false].into())
    );
    assert_eq!(outputs[1].data(), &TensorData::I64(vec![4].into()));
    Ok(())
}

#[test]
fn inputs_must_match_the_parameters() -> Result<()> {
    let backend = CpuBackend::new();
    let mut graph = Graph::new();
    let a = ops::parameter(&mut graph, ElementType::F32, Shape::new([2]))?;
    let negated = ops::negative(&mut graph, a)?;
    ops::result(&mut graph, negated)?;
    let executable = backend.compile(&graph)?;

    let err = executable
        .call(&[])
        .expect_err("one input expected");
    assert!(matches!(err, BackendError::ShapeMismatch { .. }));

    let err = executable
        .call(&[f32_input(&backend, vec![3], vec![0.0; 3])])
        .expect_err("wrong shape");
    assert!(matches!(err, BackendError::ShapeMismatch { .. }));

    let err = executable
        .call(&[HostTensor::from_i64(vec![2], vec![1, 2])?])
        .expect_err("wrong element type");
    assert!(matches!(err, BackendError::ShapeMismatch { .. }));
    Ok(())
}

#[test]
fn dynamic_graphs_are_rejected_by_static_backends() -> Result<()> {
    let backend = CpuBackend::new();
    let mut graph = Graph::new();
    let a = ops::parameter(
        &mut graph,
        ElementType::F32,
        PartialShape::new(vec![Dimension::Dynamic]),
    )?;
    ops::result(&mut graph, a)?;

    let err = backend.compile(&graph).err().expect("dynamic graph");
    assert!(matches!(
        err,
        BackendError::Graph(GraphError::DynamicShape { .. })
    ));
    Ok(())
}

#[test]
fn created_tensors_are_zeroed() -> Result<()> {
    let backend = CpuBackend::new();
    let tensor = backend.create_tensor(ElementType::I64, &Shape::new([2, 2]))?;
    assert_eq!(backend.read(&tensor)?.to_f64_vec(), vec![0.0; 4]);
    assert_eq!(backend.tensor_spec(&tensor)?.shape, Shape::new([2, 2]));
    Ok(())
}
