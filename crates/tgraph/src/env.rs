use std::env;
use std::sync::OnceLock;

static TGRAPH_VERIFY_EDGES: OnceLock<bool> = OnceLock::new();
static TGRAPH_PASS_STATS: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn read_flag(cell: &OnceLock<bool>, name: &str) -> bool {
    *cell.get_or_init(|| match env::var(name) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

/// Whether every edge mutation re-checks the bidirectional edge index.
pub(crate) fn verify_edges_enabled() -> bool {
    read_flag(&TGRAPH_VERIFY_EDGES, "TGRAPH_VERIFY_EDGES")
}

pub(crate) fn pass_stats_enabled() -> bool {
    read_flag(&TGRAPH_PASS_STATS, "TGRAPH_PASS_STATS")
}

/// Per-graph behavior toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// Run [`crate::graph::Graph::verify_edges`] after each mutation primitive.
    pub verify_edges: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            verify_edges: verify_edges_enabled(),
        }
    }
}
