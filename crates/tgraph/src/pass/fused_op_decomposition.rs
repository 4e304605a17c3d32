use anyhow::{bail, Result};

use crate::graph::Graph;
use crate::op::{decompose_node, Op};

use super::{GraphPass, PassProperty, PassPropertyMask, PassResult};

type OpFilter = Box<dyn Fn(&dyn Op) -> bool + Send + Sync>;

/// Replaces decomposable ops by their decomposition until none is left.
///
/// With a filter, only ops for which the filter returns `true` are decomposed; a backend that
/// implements some fused ops natively keeps those.
#[derive(Default)]
pub struct FusedOpDecompositionPass {
    filter: Option<OpFilter>,
}

impl FusedOpDecompositionPass {
    const NAME: &'static str = "fused_op_decomposition";
    const MAX_SWEEPS: usize = 16;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter<F>(filter: F) -> Self
    where
        F: Fn(&dyn Op) -> bool + Send + Sync + 'static,
    {
        Self {
            filter: Some(Box::new(filter)),
        }
    }

    fn selected(&self, op: &dyn Op) -> bool {
        op.as_decomposable().is_some() && self.filter.as_ref().map_or(true, |filter| filter(op))
    }
}

impl GraphPass for FusedOpDecompositionPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> PassPropertyMask {
        PassProperty::RegularFusions.into()
    }

    fn run(&self, graph: &mut Graph) -> Result<PassResult> {
        let mut result = PassResult::default();
        loop {
            result.iterations += 1;
            let pending = graph
                .topological_order()?
                .into_iter()
                .filter(|id| self.selected(graph.node(*id).op().as_ref()))
                .collect::<Vec<_>>();
            if pending.is_empty() {
                break;
            }
            if result.iterations > Self::MAX_SWEEPS {
                bail!(
                    "decomposition did not converge after {} sweeps ({} op(s) left)",
                    Self::MAX_SWEEPS,
                    pending.len()
                );
            }
            for id in pending {
                if decompose_node(graph, id)? {
                    result.changed = true;
                    result.rewrites_applied += 1;
                    result.removed_nodes += 1;
                }
            }
        }
        Ok(result)
    }
}
