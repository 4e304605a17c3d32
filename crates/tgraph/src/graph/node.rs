use std::collections::BTreeSet;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::descriptor::TensorDescriptor;
use crate::op::Op;
use crate::placement::Placement;

use super::handle::{Input, Output};
use super::id::NodeId;

#[derive(Debug, Clone)]
pub(crate) struct InputSlot {
    pub(crate) source: Output,
    pub(crate) relevant_to_shape: bool,
    pub(crate) relevant_to_value: bool,
}

impl InputSlot {
    pub(crate) fn new(source: Output) -> Self {
        Self {
            source,
            relevant_to_shape: true,
            relevant_to_value: true,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OutputSlot {
    pub(crate) tensor: TensorDescriptor,
    pub(crate) targets: BTreeSet<Input>,
}

impl OutputSlot {
    pub(crate) fn new(tensor_name: String) -> Self {
        Self {
            tensor: TensorDescriptor::new(tensor_name),
            targets: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    /// Created, constructor validation has not run yet.
    Constructing { output_size_set: bool },
    Inferred,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) id: NodeId,
    pub(crate) op: Arc<dyn Op>,
    pub(crate) unique_name: String,
    pub(crate) friendly_name: Option<String>,
    pub(crate) inputs: SmallVec<[InputSlot; 4]>,
    pub(crate) outputs: SmallVec<[OutputSlot; 1]>,
    pub(crate) control_deps: BTreeSet<NodeId>,
    pub(crate) provenance: BTreeSet<String>,
    pub(crate) placement: Placement,
    pub(crate) placement_index: Option<usize>,
    pub(crate) state: NodeState,
}

impl NodeData {
    pub(crate) fn new(id: NodeId, op: Arc<dyn Op>, args: &[Output]) -> Self {
        let unique_name = format!("{}_{}", op.type_name(), id.instance());
        let outputs = std::iter::once(OutputSlot::new(format!("{unique_name}_0"))).collect();
        Self {
            id,
            op,
            inputs: args.iter().copied().map(InputSlot::new).collect(),
            outputs,
            unique_name,
            friendly_name: None,
            control_deps: BTreeSet::new(),
            provenance: BTreeSet::new(),
            placement: Placement::Default,
            placement_index: None,
            state: NodeState::Constructing {
                output_size_set: false,
            },
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.unique_name)
    }

    pub(crate) fn user_edge_count(&self) -> usize {
        self.outputs.iter().map(|slot| slot.targets.len()).sum()
    }
}
