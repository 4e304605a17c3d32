use std::collections::BTreeSet;

use anyhow::Result;

use crate::graph::{Graph, NodeId};

use super::{GraphPass, PassResult};

/// Removes nodes no result depends on, through data edges or control dependencies.
///
/// Parameters are part of the graph's interface and are always kept.
#[derive(Debug, Default)]
pub struct DeadNodeEliminationPass;

impl DeadNodeEliminationPass {
    const NAME: &'static str = "dead_node_elimination";
}

impl GraphPass for DeadNodeEliminationPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, graph: &mut Graph) -> Result<PassResult> {
        let mut worklist: Vec<NodeId> = graph.results();
        let mut live: BTreeSet<NodeId> = BTreeSet::new();
        while let Some(id) = worklist.pop() {
            if !live.insert(id) {
                continue;
            }
            let node = graph.node(id);
            worklist.extend(node.arguments());
            worklist.extend(node.control_dependencies().iter().copied());
        }

        let mut removed = 0;
        for id in graph.topological_order()?.into_iter().rev() {
            if live.contains(&id) || graph.node(id).is_parameter() {
                continue;
            }
            graph.remove_node(id)?;
            removed += 1;
        }

        Ok(PassResult {
            changed: removed > 0,
            iterations: 1,
            rewrites_applied: 0,
            removed_nodes: removed,
        })
    }
}
