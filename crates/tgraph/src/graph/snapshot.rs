use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::placement::Placement;
use crate::types::{ElementType, PartialShape};

use super::handle::{Input, Output};
use super::id::InstanceId;
use super::view::NodeRef;
use super::Graph;

/// Serializable picture of a graph keyed by instance id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub instance: InstanceId,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    pub inputs: Vec<EdgeSnapshot>,
    pub outputs: Vec<OutputSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub control_deps: Vec<InstanceId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provenance: Vec<String>,
    pub placement: Placement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_index: Option<usize>,
}

/// One end of an edge: a node instance and a slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub node: InstanceId,
    pub index: usize,
}

impl From<Output> for EdgeSnapshot {
    fn from(output: Output) -> Self {
        Self {
            node: output.node.instance(),
            index: output.index,
        }
    }
}

impl From<Input> for EdgeSnapshot {
    fn from(input: Input) -> Self {
        Self {
            node: input.node.instance(),
            index: input.index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSnapshot {
    pub element_type: ElementType,
    pub shape: PartialShape,
    pub targets: Vec<EdgeSnapshot>,
}

impl NodeSnapshot {
    fn capture(node: &NodeRef<'_>) -> Self {
        Self {
            instance: node.instance_id(),
            kind: node.description().to_string(),
            name: node.unique_name().to_string(),
            friendly_name: node.friendly_name().map(str::to_string),
            inputs: node.input_values().into_iter().map(Into::into).collect(),
            outputs: node
                .outputs()
                .map(|output| OutputSnapshot {
                    element_type: output.element_type(),
                    shape: output.partial_shape().clone(),
                    targets: output.target_inputs().iter().copied().map(Into::into).collect(),
                })
                .collect(),
            control_deps: node
                .control_dependencies()
                .iter()
                .map(|dep| dep.instance())
                .collect(),
            provenance: node.provenance_tags().iter().cloned().collect(),
            placement: node.placement(),
            placement_index: node.placement_index(),
        }
    }
}

impl Graph {
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self
                .nodes()
                .map(|node| NodeSnapshot::capture(&node))
                .collect(),
        }
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    /// One line per node, topologically ordered when the graph is acyclic.
    pub fn to_text(&self) -> String {
        let order = self.topological_order().unwrap_or_else(|_| self.node_ids());
        let mut out = String::new();
        for id in order {
            let node = self.node(id);
            let args = node
                .input_values()
                .into_iter()
                .map(|source| format!("{}:{}", self.node(source.node).unique_name(), source.index))
                .collect::<Vec<_>>()
                .join(", ");
            let results = node
                .outputs()
                .map(|output| format!("{}{}", output.element_type(), output.partial_shape()))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, "{} = {}({}) -> ({})", node.unique_name(), node.description(), args, results);
            if let Some(name) = node.friendly_name() {
                let _ = write!(out, "  // {name}");
            }
            out.push('\n');
        }
        out
    }
}
