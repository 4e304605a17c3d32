//! Operator set and small builder helpers.
//!
//! The helpers wrap [`Graph::add_node`] for single-output ops and return the new node's
//! output 0, which keeps decompositions readable:
//!
//! ```ignore
//! let centered = ops::subtract(graph, data, mean)?;
//! ```

mod constant;
mod elementwise;
pub mod fused;
mod parameter;
mod shape_ops;

pub use constant::Constant;
pub use elementwise::{Binary, BinaryKind, Logical, LogicalKind, Unary, UnaryKind};
pub use fused::{Clamp, Mvn};
pub use parameter::{Parameter, ResultOp};
pub use shape_ops::{Broadcast, ShapeOf, Sum};

use crate::error::GraphResult;
use crate::graph::{Graph, NodeId, Output};
use crate::types::{ElementType, PartialShape, Shape};

fn single(graph: &mut Graph, op: impl crate::op::Op, args: &[Output]) -> GraphResult<Output> {
    Ok(graph.add_node(op, args)?.output(0))
}

pub fn parameter(
    graph: &mut Graph,
    element_type: ElementType,
    shape: impl Into<PartialShape>,
) -> GraphResult<Output> {
    single(graph, Parameter::new(element_type, shape), &[])
}

pub fn constant(graph: &mut Graph, constant: Constant) -> GraphResult<Output> {
    single(graph, constant, &[])
}

/// Adds a result node reading `value` and returns the node.
pub fn result(graph: &mut Graph, value: Output) -> GraphResult<NodeId> {
    graph.add_node(ResultOp::new(), &[value])
}

pub fn binary(graph: &mut Graph, kind: BinaryKind, lhs: Output, rhs: Output) -> GraphResult<Output> {
    single(graph, Binary::new(kind), &[lhs, rhs])
}

pub fn add(graph: &mut Graph, lhs: Output, rhs: Output) -> GraphResult<Output> {
    binary(graph, BinaryKind::Add, lhs, rhs)
}

pub fn subtract(graph: &mut Graph, lhs: Output, rhs: Output) -> GraphResult<Output> {
    binary(graph, BinaryKind::Subtract, lhs, rhs)
}

pub fn multiply(graph: &mut Graph, lhs: Output, rhs: Output) -> GraphResult<Output> {
    binary(graph, BinaryKind::Multiply, lhs, rhs)
}

pub fn divide(graph: &mut Graph, lhs: Output, rhs: Output) -> GraphResult<Output> {
    binary(graph, BinaryKind::Divide, lhs, rhs)
}

pub fn maximum(graph: &mut Graph, lhs: Output, rhs: Output) -> GraphResult<Output> {
    binary(graph, BinaryKind::Maximum, lhs, rhs)
}

pub fn minimum(graph: &mut Graph, lhs: Output, rhs: Output) -> GraphResult<Output> {
    binary(graph, BinaryKind::Minimum, lhs, rhs)
}

pub fn unary(graph: &mut Graph, kind: UnaryKind, arg: Output) -> GraphResult<Output> {
    single(graph, Unary::new(kind), &[arg])
}

pub fn negative(graph: &mut Graph, arg: Output) -> GraphResult<Output> {
    unary(graph, UnaryKind::Negative, arg)
}

pub fn sqrt(graph: &mut Graph, arg: Output) -> GraphResult<Output> {
    unary(graph, UnaryKind::Sqrt, arg)
}

pub fn logical(graph: &mut Graph, kind: LogicalKind, lhs: Output, rhs: Output) -> GraphResult<Output> {
    single(graph, Logical::new(kind), &[lhs, rhs])
}

pub fn sum(
    graph: &mut Graph,
    arg: Output,
    axes: impl IntoIterator<Item = usize>,
) -> GraphResult<Output> {
    single(graph, Sum::new(axes), &[arg])
}

pub fn broadcast(
    graph: &mut Graph,
    arg: Output,
    shape: impl Into<Shape>,
    axes: impl IntoIterator<Item = usize>,
) -> GraphResult<Output> {
    single(graph, Broadcast::new(shape, axes), &[arg])
}

pub fn shape_of(graph: &mut Graph, arg: Output) -> GraphResult<Output> {
    single(graph, ShapeOf, &[arg])
}

pub fn clamp(graph: &mut Graph, arg: Output, min: f64, max: f64) -> GraphResult<Output> {
    single(graph, Clamp::new(min, max), &[arg])
}

pub fn mvn(graph: &mut Graph, arg: Output, mvn: Mvn) -> GraphResult<Output> {
    single(graph, mvn, &[arg])
}
