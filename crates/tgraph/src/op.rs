//! The operation contract every node kind implements.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::autodiff::AdjointContext;
use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, InferContext, InstanceId, NodeId, Output};
use crate::types::{ElementType, PartialShape};

/// Kind-specific behavior of a node.
///
/// Ops are immutable attribute bundles shared behind `Arc<dyn Op>`; all per-node state lives
/// in the [`Graph`].
pub trait Op: fmt::Debug + Send + Sync + 'static {
    /// Kind label, also the prefix of the node's unique name.
    fn type_name(&self) -> &'static str;

    /// Checks the arguments and assigns a type to every output.
    ///
    /// The default marks every output as dynamic.
    fn validate_and_infer_types(&self, cx: &mut InferContext<'_>) -> GraphResult<()> {
        for index in 0..cx.output_size() {
            cx.set_output_type(index, ElementType::Dynamic, PartialShape::dynamic())?;
        }
        Ok(())
    }

    /// Adds a node of the same kind and attributes to `graph`, reading `new_args`.
    ///
    /// Must fail with [`GraphError::CopyArity`] when `new_args` has the wrong length.
    fn copy_with_new_args(&self, graph: &mut Graph, new_args: &[Output]) -> GraphResult<NodeId>;

    fn as_decomposable(&self) -> Option<&dyn Decompose> {
        None
    }

    /// Contributes input deltas given the deltas of this node's outputs.
    fn generate_adjoints(&self, _cx: &mut AdjointContext<'_>) -> GraphResult<()> {
        Err(GraphError::Unsupported {
            op: self.type_name(),
            what: "adjoint generation".to_string(),
        })
    }

    fn is_commutative(&self) -> bool {
        false
    }

    fn is_parameter(&self) -> bool {
        false
    }

    fn is_output(&self) -> bool {
        false
    }

    fn is_constant(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// Capability of ops that can be expanded into a subgraph of simpler ops.
pub trait Decompose {
    /// Builds the replacement subgraph over `node`'s inputs and returns one output per output
    /// of `node`. The node itself is left untouched.
    fn decompose(&self, graph: &mut Graph, node: NodeId) -> GraphResult<Vec<Output>>;
}

/// Arity check for [`Op::copy_with_new_args`] implementations.
pub fn check_new_args_count(op: &dyn Op, new_args: &[Output], expected: usize) -> GraphResult<()> {
    if new_args.len() == expected {
        Ok(())
    } else {
        Err(GraphError::CopyArity {
            op: op.type_name(),
            expected,
            actual: new_args.len(),
        })
    }
}

/// Replaces a decomposable node by its decomposition.
///
/// Consumers are redirected to the new subgraph, the new nodes inherit the node's provenance
/// tags and the node is removed. Returns `false` when the op has no decomposition.
///
/// When the decomposition fails, or yields the wrong number of outputs, every node it created
/// is removed again and the graph is left as it was.
pub fn decompose_node(graph: &mut Graph, id: NodeId) -> GraphResult<bool> {
    let op = Arc::clone(graph.try_node(id)?.op());
    let Some(decomposable) = op.as_decomposable() else {
        return Ok(false);
    };
    let watermark = graph.context().peek_next();
    let replacements = match decomposable.decompose(graph, id) {
        Ok(replacements) => replacements,
        Err(err) => {
            discard_created(graph, watermark)?;
            return Err(err);
        }
    };
    let expected = graph.try_node(id)?.output_size();
    if replacements.len() != expected {
        discard_created(graph, watermark)?;
        return Err(GraphError::DecompositionArity {
            op: op.type_name(),
            expected,
            actual: replacements.len(),
        });
    }
    for (index, replacement) in replacements.iter().enumerate() {
        graph.replace_output_uses(id.output(index), *replacement)?;
    }

    let tags = graph.try_node(id)?.provenance_tags().clone();
    let created = created_since(graph, watermark);
    for node in &created {
        graph.add_provenance_tags(*node, tags.iter().cloned())?;
    }
    graph.remove_node(id)?;
    debug!(
        "decomposed {} {} into {} node(s)",
        op.type_name(),
        id,
        created.len()
    );
    Ok(true)
}

fn created_since(graph: &Graph, watermark: InstanceId) -> Vec<NodeId> {
    graph
        .nodes()
        .filter(|node| node.instance_id() >= watermark)
        .map(|node| node.id())
        .collect()
}

/// Removes the nodes created since `watermark`, consumers before producers.
fn discard_created(graph: &mut Graph, watermark: InstanceId) -> GraphResult<()> {
    let created = created_since(graph, watermark);
    for node in created.iter().rev() {
        graph.remove_node(*node)?;
    }
    if !created.is_empty() {
        debug!("discarded {} node(s) of a failed decomposition", created.len());
    }
    Ok(())
}
