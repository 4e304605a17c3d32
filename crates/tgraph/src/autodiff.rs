//! Adjoint accumulation hook.
//!
//! The graph stores no adjoint state. A differentiation driver walks nodes in reverse order
//! and calls [`generate_node_adjoints`] for each; the node's [`Op::generate_adjoints`]
//! contributes deltas for the outputs feeding its inputs into an [`Adjoints`] map.
//!
//! [`Op::generate_adjoints`]: crate::op::Op::generate_adjoints

use std::collections::BTreeMap;

use log::trace;

use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, NodeId, Output};
use crate::ops;

/// Accumulated delta per output. Repeated contributions are summed with `Add` nodes.
#[derive(Debug, Clone, Default)]
pub struct Adjoints {
    deltas: BTreeMap<Output, Output>,
}

impl Adjoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or accumulates the delta of `value`.
    pub fn add_delta(&mut self, graph: &mut Graph, value: Output, delta: Output) -> GraphResult<()> {
        let accumulated = match self.deltas.get(&value) {
            Some(existing) => ops::add(graph, *existing, delta)?,
            None => delta,
        };
        trace!("delta of {value} is now {accumulated}");
        self.deltas.insert(value, accumulated);
        Ok(())
    }

    pub fn get(&self, value: Output) -> Option<Output> {
        self.deltas.get(&value).copied()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Output, Output)> + '_ {
        self.deltas.iter().map(|(value, delta)| (*value, *delta))
    }
}

/// What an op sees while generating its adjoints.
pub struct AdjointContext<'a> {
    graph: &'a mut Graph,
    adjoints: &'a mut Adjoints,
    node: NodeId,
    deltas: &'a [Output],
}

impl AdjointContext<'_> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn graph(&mut self) -> &mut Graph {
        self.graph
    }

    /// Delta of this node's output `index`.
    pub fn delta(&self, index: usize) -> GraphResult<Output> {
        self.deltas
            .get(index)
            .copied()
            .ok_or(GraphError::OutputIndexOutOfRange {
                node: self.node,
                index,
                size: self.deltas.len(),
            })
    }

    /// Output read by this node's input `index`.
    pub fn input_value(&self, index: usize) -> GraphResult<Output> {
        self.graph.try_node(self.node)?.input_value(index)
    }

    /// Adds `delta` to the adjoint of whatever feeds input `index`.
    pub fn add_input_delta(&mut self, index: usize, delta: Output) -> GraphResult<()> {
        let value = self.input_value(index)?;
        self.adjoints.add_delta(self.graph, value, delta)
    }

    /// Fails unless every input has the same static shape as output 0.
    ///
    /// Hooks that do not undo broadcasting call this first.
    pub fn require_unbroadcast(&self, op: &'static str) -> GraphResult<()> {
        let node = self.graph.try_node(self.node)?;
        let output = node.output_partial_shape(0)?;
        for input in node.inputs() {
            if input.partial_shape()? != output || !output.is_static() {
                return Err(GraphError::Unsupported {
                    op,
                    what: "adjoints through broadcasting or dynamic shapes".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Runs `node`'s adjoint hook with one delta per output.
pub fn generate_node_adjoints(
    graph: &mut Graph,
    adjoints: &mut Adjoints,
    node: NodeId,
    deltas: &[Output],
) -> GraphResult<()> {
    let op = graph.try_node(node)?.op().clone();
    let outputs = graph.try_node(node)?.output_size();
    if deltas.len() != outputs {
        return Err(GraphError::Unsupported {
            op: op.type_name(),
            what: format!("{} delta(s) for {} output(s)", deltas.len(), outputs),
        });
    }
    for delta in deltas {
        graph.output(*delta)?;
    }
    let mut cx = AdjointContext {
        graph,
        adjoints,
        node,
        deltas,
    };
    op.generate_adjoints(&mut cx)
}
