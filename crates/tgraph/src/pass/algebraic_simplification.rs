use anyhow::Result;
use log::trace;

use crate::error::GraphResult;
use crate::graph::{Graph, NodeId, Output};
use crate::ops::{Binary, BinaryKind, Constant};

use super::{GraphPass, PassProperty, PassPropertyMask, PassResult};

/// Removes arithmetic identities: `x + 0`, `0 + x`, `x - 0`, `x * 1`, `1 * x`, `x / 1`.
///
/// A rewrite only fires when the surviving operand already has the node's output shape, so no
/// broadcast is lost.
#[derive(Debug, Default)]
pub struct AlgebraicSimplificationPass;

impl AlgebraicSimplificationPass {
    const NAME: &'static str = "algebraic_simplification";
}

impl GraphPass for AlgebraicSimplificationPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> PassPropertyMask {
        PassProperty::RegularFusions | PassProperty::RequireStaticShape
    }

    fn run(&self, graph: &mut Graph) -> Result<PassResult> {
        let mut result = PassResult {
            iterations: 1,
            ..PassResult::default()
        };
        for id in graph.topological_order()? {
            let Some(survivor) = identity_operand(graph, id) else {
                continue;
            };
            let moved = graph.replace_output_uses(id.output(0), survivor)?;
            trace!("{}: folded {} into {} ({} use(s))", Self::NAME, id, survivor, moved);
            forward_control_dependencies(graph, id)?;
            graph.remove_node(id)?;
            result.changed = true;
            result.rewrites_applied += 1;
            result.removed_nodes += 1;
        }
        Ok(result)
    }
}

/// Gives every node ordered after `id` the control dependencies of `id`, so removing `id`
/// keeps the ordering it carried.
fn forward_control_dependencies(graph: &mut Graph, id: NodeId) -> GraphResult<()> {
    let dependencies = graph.try_node(id)?.control_dependencies().clone();
    if dependencies.is_empty() {
        return Ok(());
    }
    let dependents = graph
        .nodes()
        .filter(|node| node.control_dependencies().contains(&id))
        .map(|node| node.id())
        .collect::<Vec<_>>();
    for dependent in dependents {
        for dependency in &dependencies {
            graph.add_control_dependency(dependent, *dependency)?;
        }
    }
    Ok(())
}

fn splat_of(graph: &Graph, value: Output) -> Option<f64> {
    graph
        .try_node(value.node)
        .ok()?
        .op_as::<Constant>()?
        .splat_value()
}

/// The operand a binary identity reduces to, if `id` is one.
fn identity_operand(graph: &Graph, id: NodeId) -> Option<Output> {
    let node = graph.try_node(id).ok()?;
    let kind = node.op_as::<Binary>()?.kind();
    let lhs = node.input_value(0).ok()?;
    let rhs = node.input_value(1).ok()?;
    // (operand kept, operand that must be the neutral constant, neutral value)
    let candidates: Vec<(Output, Output, f64)> = match kind {
        BinaryKind::Add => vec![(lhs, rhs, 0.0), (rhs, lhs, 0.0)],
        BinaryKind::Multiply => vec![(lhs, rhs, 1.0), (rhs, lhs, 1.0)],
        BinaryKind::Subtract => vec![(lhs, rhs, 0.0)],
        BinaryKind::Divide => vec![(lhs, rhs, 1.0)],
        _ => return None,
    };
    let output_shape = node.output_partial_shape(0).ok()?;
    candidates
        .iter()
        .find(|(keep, identity, neutral)| {
            splat_of(graph, *identity) == Some(*neutral)
                && graph
                    .output(*keep)
                    .is_ok_and(|keep| keep.partial_shape() == output_shape)
        })
        .map(|(keep, _, _)| *keep)
}
