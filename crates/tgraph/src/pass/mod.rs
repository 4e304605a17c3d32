//! Whole-graph passes and the property mask they declare.
//!
//! A pass states what it does and what it needs through a [`PassPropertyMask`]. The
//! [`run_pass`] entry point checks the needs against the graph before running the pass, and
//! [`PassManager`] sequences several passes with a bounded fixed point.

mod algebraic_simplification;
mod dead_node_elimination;
mod fused_op_decomposition;

use std::fmt;
use std::ops::BitOr;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::GraphError;
use crate::graph::Graph;

pub use algebraic_simplification::AlgebraicSimplificationPass;
pub use dead_node_elimination::DeadNodeEliminationPass;
pub use fused_op_decomposition::FusedOpDecompositionPass;

/// One declarative fact about a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassProperty {
    /// Performs regular structural fusions or decompositions.
    RegularFusions,
    /// Needs every output in the graph to have a static type and shape.
    RequireStaticShape,
    /// May turn static shapes dynamic or the reverse.
    ChangeDynamicState,
}

impl PassProperty {
    const fn bit(self) -> u32 {
        match self {
            PassProperty::RegularFusions => 1 << 0,
            PassProperty::RequireStaticShape => 1 << 1,
            PassProperty::ChangeDynamicState => 1 << 2,
        }
    }
}

/// Set of [`PassProperty`] bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PassPropertyMask(u32);

impl PassPropertyMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn with(self, property: PassProperty) -> Self {
        Self(self.0 | property.bit())
    }

    pub fn set(&mut self, property: PassProperty) {
        self.0 |= property.bit();
    }

    pub fn clear(&mut self, property: PassProperty) {
        self.0 &= !property.bit();
    }

    pub const fn is_set(self, property: PassProperty) -> bool {
        self.0 & property.bit() != 0
    }

    /// `true` when every bit of `other` is also set here.
    pub const fn contains(self, other: PassPropertyMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl From<PassProperty> for PassPropertyMask {
    fn from(property: PassProperty) -> Self {
        Self::empty().with(property)
    }
}

impl BitOr for PassProperty {
    type Output = PassPropertyMask;

    fn bitor(self, rhs: PassProperty) -> PassPropertyMask {
        PassPropertyMask::from(self).with(rhs)
    }
}

impl BitOr<PassProperty> for PassPropertyMask {
    type Output = PassPropertyMask;

    fn bitor(self, rhs: PassProperty) -> PassPropertyMask {
        self.with(rhs)
    }
}

/// Statistics returned by a [`GraphPass`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassResult {
    /// Whether the pass changed the graph.
    pub changed: bool,
    /// Rewrite iterations executed.
    pub iterations: usize,
    /// Rewrites applied (simplifications, decompositions).
    pub rewrites_applied: usize,
    /// Nodes removed from the graph.
    pub removed_nodes: usize,
}

impl PassResult {
    /// Merges two run results, accumulating statistics.
    pub fn merge(self, other: PassResult) -> PassResult {
        PassResult {
            changed: self.changed || other.changed,
            iterations: self.iterations + other.iterations,
            rewrites_applied: self.rewrites_applied + other.rewrites_applied,
            removed_nodes: self.removed_nodes + other.removed_nodes,
        }
    }
}

impl fmt::Display for PassResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "changed={} iterations={} rewrites={} removed={}",
            self.changed, self.iterations, self.rewrites_applied, self.removed_nodes
        )
    }
}

/// A rewrite or analysis over a whole graph.
pub trait GraphPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn properties(&self) -> PassPropertyMask {
        PassPropertyMask::empty()
    }

    fn run(&self, graph: &mut Graph) -> Result<PassResult>;
}

/// Checks what `pass` declares it needs against the current graph.
pub fn check_pass_preconditions(pass: &dyn GraphPass, graph: &Graph) -> Result<(), GraphError> {
    if pass.properties().is_set(PassProperty::RequireStaticShape) {
        graph
            .check_static()
            .map_err(|err| GraphError::PassPrecondition {
                pass: pass.name(),
                reason: err.to_string(),
            })?;
    }
    Ok(())
}

/// Checks preconditions, then runs `pass`.
pub fn run_pass(pass: &dyn GraphPass, graph: &mut Graph) -> Result<PassResult> {
    check_pass_preconditions(pass, graph)?;
    let result = pass
        .run(graph)
        .with_context(|| format!("pass '{}' failed", pass.name()))?;
    if env::pass_stats_enabled() {
        info!("pass {}: {}", pass.name(), result);
    } else {
        debug!("pass {}: {}", pass.name(), result);
    }
    Ok(result)
}

#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Upper bound on sweeps over the whole pass list in [`PassManager::run`].
    pub max_iterations: usize,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self { max_iterations: 4 }
    }
}

/// Ordered list of passes run until none of them changes the graph.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn GraphPass>>,
    config: PassConfig,
}

impl PassManager {
    pub fn new(config: PassConfig) -> Self {
        Self {
            passes: Vec::new(),
            config,
        }
    }

    pub fn register<P: GraphPass + 'static>(&mut self, pass: P) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Runs every registered pass in order, repeating while any of them changes the graph.
    ///
    /// In the returned result `iterations` counts sweeps over the pass list.
    pub fn run(&self, graph: &mut Graph) -> Result<PassResult> {
        let mut total = PassResult::default();
        let mut sweeps = 0;
        for _ in 0..self.config.max_iterations.max(1) {
            sweeps += 1;
            let mut sweep = PassResult::default();
            for pass in &self.passes {
                sweep = sweep.merge(run_pass(pass.as_ref(), graph)?);
            }
            total = total.merge(sweep);
            if !sweep.changed {
                break;
            }
        }
        total.iterations = sweeps;
        Ok(total)
    }
}
