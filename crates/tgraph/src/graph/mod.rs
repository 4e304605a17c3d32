//! Node arena and the bidirectional edge index.
//!
//! Every node lives in a slot of the [`Graph`] arena and is addressed by a [`NodeId`]. Edge
//! state is stored on both ends and kept in sync by this module alone:
//!
//! ```text
//!   producer P                          consumer C
//!   +-------------------+               +-------------------+
//!   | outputs[i]        |   source      | inputs[j]         |
//!   |   tensor          | <------------ |   source = (P, i) |
//!   |   targets {(C,j)} | ------------> |   relevance flags |
//!   +-------------------+   targets     +-------------------+
//! ```
//!
//! For every input `(C, j)` reading `(P, i)`, `P.outputs[i].targets` contains `(C, j)` and
//! nothing else is in any target set. Construction, the edge-surgery primitives, node
//! removal and [`Graph::absorb`] are the only code paths that touch either side.
//!
//! ## Lifecycle
//!
//! 1. [`Graph::create_node`] allocates an instance id, wires the inputs and registers them
//!    with their producers.
//! 2. The op may call [`Graph::set_output_size`] once.
//! 3. [`Graph::constructor_validate_and_infer_types`] runs the op's inference. On failure the
//!    node is retired again, so callers never observe a partially typed node.
//! 4. Passes rewire edges and call [`Graph::revalidate_and_infer_types`].
//! 5. [`Graph::remove_node`] retires a node once nothing consumes its outputs.
//!
//! [`Graph::add_node`] bundles steps 1 and 3.

mod handle;
mod id;
mod infer;
mod mutation;
mod node;
mod snapshot;
mod verify;
mod view;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, trace};

use crate::env::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::op::Op;
use crate::placement::Placement;

pub use handle::{Input, InputMut, InputRef, Output, OutputMut, OutputRef};
pub use id::{BuildContext, InstanceId, NodeId};
pub use infer::InferContext;
pub use snapshot::{EdgeSnapshot, GraphSnapshot, NodeSnapshot, OutputSnapshot};
pub use view::{NodeMut, NodeRef};

use node::{InputSlot, NodeData, NodeState, OutputSlot};

/// Arena-backed dataflow graph.
///
/// Single writer: mutation requires `&mut Graph`. Cloning a graph keeps every [`NodeId`]
/// valid in the clone and shares the [`BuildContext`], so nodes added to either copy keep
/// receiving fresh instance ids.
#[derive(Debug, Clone)]
pub struct Graph {
    context: BuildContext,
    config: GraphConfig,
    slots: Vec<Option<NodeData>>,
    free_slots: Vec<u32>,
    order: BTreeMap<InstanceId, NodeId>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates an empty graph with its own build context.
    pub fn new() -> Self {
        Self::with_context(BuildContext::new())
    }

    pub fn with_context(context: BuildContext) -> Self {
        Self {
            context,
            config: GraphConfig::default(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            order: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn config(&self) -> GraphConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.data(id).is_ok()
    }

    pub(crate) fn data(&self, id: NodeId) -> GraphResult<&NodeData> {
        self.slots
            .get(id.slot())
            .and_then(Option::as_ref)
            .filter(|data| data.id == id)
            .ok_or(GraphError::StaleNode { node: id })
    }

    pub(crate) fn data_mut(&mut self, id: NodeId) -> GraphResult<&mut NodeData> {
        self.slots
            .get_mut(id.slot())
            .and_then(Option::as_mut)
            .filter(|data| data.id == id)
            .ok_or(GraphError::StaleNode { node: id })
    }

    /// Returns a view of `id`.
    ///
    /// # Panics
    ///
    /// Panics when `id` does not name a live node of this graph; use [`Graph::try_node`] to
    /// handle stale ids.
    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        self.try_node(id).expect("node id must be valid")
    }

    pub fn try_node(&self, id: NodeId) -> GraphResult<NodeRef<'_>> {
        Ok(NodeRef {
            graph: self,
            data: self.data(id)?,
        })
    }

    pub fn node_mut(&mut self, id: NodeId) -> GraphResult<NodeMut<'_>> {
        self.data(id)?;
        Ok(NodeMut { graph: self, id })
    }

    pub fn input(&self, input: Input) -> GraphResult<InputRef<'_>> {
        self.try_node(input.node)?.input(input.index)
    }

    pub fn output(&self, output: Output) -> GraphResult<OutputRef<'_>> {
        self.try_node(output.node)?.output(output.index)
    }

    pub fn input_mut(&mut self, input: Input) -> GraphResult<InputMut<'_>> {
        self.input(input)?;
        Ok(InputMut {
            graph: self,
            handle: input,
        })
    }

    pub fn output_mut(&mut self, output: Output) -> GraphResult<OutputMut<'_>> {
        self.output(output)?;
        Ok(OutputMut {
            graph: self,
            handle: output,
        })
    }

    pub(crate) fn input_slot_mut(&mut self, input: Input) -> GraphResult<&mut InputSlot> {
        let data = self.data_mut(input.node)?;
        let size = data.inputs.len();
        data.inputs
            .get_mut(input.index)
            .ok_or(GraphError::InputIndexOutOfRange {
                node: input.node,
                index: input.index,
                size,
            })
    }

    pub(crate) fn output_slot_mut(&mut self, output: Output) -> GraphResult<&mut OutputSlot> {
        let data = self.data_mut(output.node)?;
        let size = data.outputs.len();
        data.outputs
            .get_mut(output.index)
            .ok_or(GraphError::OutputIndexOutOfRange {
                node: output.node,
                index: output.index,
                size,
            })
    }

    /// Live nodes in instance-id order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> + '_ {
        self.order
            .values()
            .filter_map(move |id| self.try_node(*id).ok())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.order.values().copied().collect()
    }

    /// Parameter nodes in instance-id order.
    pub fn parameters(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|node| node.is_parameter())
            .map(|node| node.id())
            .collect()
    }

    /// Result nodes in instance-id order.
    pub fn results(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|node| node.is_output())
            .map(|node| node.id())
            .collect()
    }

    fn allocate_slot(&mut self) -> u32 {
        match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                (self.slots.len() - 1) as u32
            }
        }
    }

    /// Creates a node of kind `op` reading `args`, without running inference.
    ///
    /// The node starts with one output of dynamic type. Follow up with
    /// [`Graph::set_output_size`] if needed and [`Graph::constructor_validate_and_infer_types`].
    pub fn create_node(&mut self, op: Arc<dyn Op>, args: &[Output]) -> GraphResult<NodeId> {
        for arg in args {
            self.output(*arg)?;
        }
        let instance = self.context.next_instance_id();
        let slot = self.allocate_slot();
        let id = NodeId::new(instance, slot);
        self.slots[slot as usize] = Some(NodeData::new(id, op, args));
        self.order.insert(instance, id);
        for (index, arg) in args.iter().enumerate() {
            self.output_slot_mut(*arg)?
                .targets
                .insert(Input::new(id, index));
        }
        trace!("created {} with {} input(s)", id, args.len());
        Ok(id)
    }

    /// Sets the number of outputs. Allowed once, before the first inference.
    pub fn set_output_size(&mut self, id: NodeId, size: usize) -> GraphResult<()> {
        let data = self.data_mut(id)?;
        match data.state {
            NodeState::Inferred => Err(GraphError::OutputSizeFrozen { node: id }),
            NodeState::Constructing {
                output_size_set: true,
            } => Err(GraphError::OutputSizeAlreadySet { node: id }),
            NodeState::Constructing { .. } => {
                if let Some(dropped) = data.outputs.get(size..) {
                    let users = dropped.iter().map(|slot| slot.targets.len()).sum::<usize>();
                    if users > 0 {
                        return Err(GraphError::NodeInUse { node: id, users });
                    }
                }
                data.outputs.truncate(size);
                for index in data.outputs.len()..size {
                    let name = format!("{}_{index}", data.unique_name);
                    data.outputs.push(OutputSlot::new(name));
                }
                data.state = NodeState::Constructing {
                    output_size_set: true,
                };
                Ok(())
            }
        }
    }

    /// Runs inference for a freshly created node.
    ///
    /// On failure the node is retired again (its input registrations are undone) and the
    /// validation error is returned.
    pub fn constructor_validate_and_infer_types(&mut self, id: NodeId) -> GraphResult<()> {
        if self.data(id)?.state == NodeState::Inferred {
            return Err(GraphError::ConstructionFinished { node: id });
        }
        match self.run_inference(id) {
            Ok(()) => {
                self.data_mut(id)?.state = NodeState::Inferred;
                Ok(())
            }
            Err(err) => {
                debug!("construction of {id} failed: {err}");
                if self.data(id)?.user_edge_count() == 0 {
                    self.detach(id)?;
                }
                Err(err)
            }
        }
    }

    /// Creates `op` over `args` and runs constructor validation.
    pub fn add_node<O: Op>(&mut self, op: O, args: &[Output]) -> GraphResult<NodeId> {
        self.add_node_arc(Arc::new(op), args)
    }

    pub fn add_node_arc(&mut self, op: Arc<dyn Op>, args: &[Output]) -> GraphResult<NodeId> {
        let id = self.create_node(op, args)?;
        self.constructor_validate_and_infer_types(id)?;
        Ok(id)
    }

    /// Re-runs the op's inference over the node's current inputs.
    ///
    /// Every output is recomputed from scratch. On failure the previous types stay in place.
    pub fn revalidate_and_infer_types(&mut self, id: NodeId) -> GraphResult<()> {
        self.run_inference(id)?;
        self.data_mut(id)?.state = NodeState::Inferred;
        Ok(())
    }

    /// Revalidates every node in topological order.
    pub fn revalidate_all(&mut self) -> GraphResult<()> {
        for id in self.topological_order()? {
            self.revalidate_and_infer_types(id)?;
        }
        Ok(())
    }

    fn run_inference(&mut self, id: NodeId) -> GraphResult<()> {
        let staged = {
            let data = self.data(id)?;
            let mut cx = InferContext::new(self, data);
            data.op.validate_and_infer_types(&mut cx)?;
            cx.finish()?
        };
        staged.apply(self.data_mut(id)?);
        Ok(())
    }

    /// Structural copy of `id` bound to `new_args`; provenance tags carry over to the copy.
    pub fn copy_with_new_args(&mut self, id: NodeId, new_args: &[Output]) -> GraphResult<NodeId> {
        let op = Arc::clone(&self.data(id)?.op);
        let copy = op.copy_with_new_args(self, new_args)?;
        self.merge_provenance_tags(id, copy)?;
        Ok(copy)
    }

    pub fn set_friendly_name(&mut self, id: NodeId, name: impl Into<String>) -> GraphResult<()> {
        let data = self.data_mut(id)?;
        if let Some(existing) = &data.friendly_name {
            return Err(GraphError::FriendlyNameAlreadySet {
                node: id,
                name: existing.clone(),
            });
        }
        data.friendly_name = Some(name.into());
        Ok(())
    }

    /// Orders `dependency` before `id` without a data edge.
    pub fn add_control_dependency(&mut self, id: NodeId, dependency: NodeId) -> GraphResult<()> {
        self.data(dependency)?;
        self.data_mut(id)?.control_deps.insert(dependency);
        Ok(())
    }

    pub fn remove_control_dependency(
        &mut self,
        id: NodeId,
        dependency: NodeId,
    ) -> GraphResult<bool> {
        Ok(self.data_mut(id)?.control_deps.remove(&dependency))
    }

    pub fn add_provenance_tag(&mut self, id: NodeId, tag: impl Into<String>) -> GraphResult<()> {
        self.data_mut(id)?.provenance.insert(tag.into());
        Ok(())
    }

    pub fn add_provenance_tags<I>(&mut self, id: NodeId, tags: I) -> GraphResult<()>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let data = self.data_mut(id)?;
        data.provenance.extend(tags.into_iter().map(Into::into));
        Ok(())
    }

    pub fn remove_provenance_tag(&mut self, id: NodeId, tag: &str) -> GraphResult<bool> {
        Ok(self.data_mut(id)?.provenance.remove(tag))
    }

    /// Adds every provenance tag of `from` to `into`.
    pub fn merge_provenance_tags(&mut self, from: NodeId, into: NodeId) -> GraphResult<()> {
        let tags = self.data(from)?.provenance.clone();
        self.data_mut(into)?.provenance.extend(tags);
        Ok(())
    }

    pub fn set_placement(&mut self, id: NodeId, placement: Placement) -> GraphResult<()> {
        self.data_mut(id)?.placement = placement;
        Ok(())
    }

    pub fn set_placement_index(&mut self, id: NodeId, index: Option<usize>) -> GraphResult<()> {
        self.data_mut(id)?.placement_index = index;
        Ok(())
    }

    /// Nodes with at least one input reading an output of `id`.
    ///
    /// With `check_is_used`, a user only counts when some result node is reachable from it.
    pub fn users(&self, id: NodeId, check_is_used: bool) -> GraphResult<BTreeSet<NodeId>> {
        Ok(self.users_of_data(self.data(id)?, check_is_used))
    }

    pub(crate) fn users_of_data(&self, data: &NodeData, check_is_used: bool) -> BTreeSet<NodeId> {
        data.outputs
            .iter()
            .flat_map(|slot| slot.targets.iter().map(|input| input.node))
            .filter(|user| !check_is_used || self.reaches_result(*user))
            .collect()
    }

    fn reaches_result(&self, start: NodeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Ok(data) = self.data(id) else {
                continue;
            };
            if data.op.is_output() {
                return true;
            }
            stack.extend(
                data.outputs
                    .iter()
                    .flat_map(|slot| slot.targets.iter().map(|input| input.node)),
            );
        }
        false
    }

    /// Retires `id`. Fails while any output still has consumers.
    ///
    /// The node's inputs are unregistered from their producers and it is dropped from every
    /// other node's control dependencies.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<()> {
        let users = self.data(id)?.user_edge_count();
        if users > 0 {
            return Err(GraphError::NodeInUse { node: id, users });
        }
        self.detach(id)?;
        self.after_mutation()
    }

    fn detach(&mut self, id: NodeId) -> GraphResult<()> {
        self.data(id)?;
        let Some(data) = self.slots[id.slot()].take() else {
            return Err(GraphError::StaleNode { node: id });
        };
        self.order.remove(&id.instance());
        self.free_slots.push(id.slot() as u32);
        for (index, slot) in data.inputs.iter().enumerate() {
            if let Ok(source) = self.output_slot_mut(slot.source) {
                source.targets.remove(&Input::new(id, index));
            }
        }
        for other in self.slots.iter_mut().flatten() {
            other.control_deps.remove(&id);
        }
        trace!("retired {id}");
        Ok(())
    }

    /// Deterministic topological order over data edges and control dependencies.
    ///
    /// Among ready nodes the lowest instance id goes first.
    pub fn topological_order(&self) -> GraphResult<Vec<NodeId>> {
        let mut pending: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for node in self.nodes() {
            let id = node.id();
            let deps = node
                .arguments()
                .into_iter()
                .chain(node.control_dependencies().iter().copied())
                .filter(|dep| self.contains(*dep))
                .collect::<Vec<_>>();
            pending.insert(id, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(id);
            }
        }

        let mut ready: BTreeSet<NodeId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(pending.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for dependent in dependents.get(&id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if order.len() < pending.len() {
            let stuck = pending
                .iter()
                .find(|(_, count)| **count > 0)
                .map(|(id, _)| *id);
            if let Some(node) = stuck {
                return Err(GraphError::CycleDetected { node });
            }
        }
        Ok(order)
    }

    /// `true` when every output in the graph has a static element type and shape.
    pub fn is_static(&self) -> bool {
        self.check_static().is_ok()
    }

    /// Reports the first output whose type or shape is still dynamic.
    pub fn check_static(&self) -> GraphResult<()> {
        for node in self.nodes() {
            for output in node.outputs() {
                if !output.tensor().is_static() {
                    return Err(GraphError::DynamicShape {
                        output: output.handle(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Moves every node of `other` into `self`.
    ///
    /// Both graphs must come from the same [`BuildContext`]; instance ids are kept, arena
    /// handles are reassigned. Returns the mapping from `other`'s handles to the new ones.
    pub fn absorb(&mut self, other: Graph) -> GraphResult<BTreeMap<NodeId, NodeId>> {
        if !self.context.same_context(&other.context) {
            return Err(GraphError::ContextMismatch);
        }
        if let Some(instance) = other
            .order
            .keys()
            .find(|instance| self.order.contains_key(instance))
        {
            return Err(GraphError::DuplicateInstance {
                instance: *instance,
            });
        }

        let incoming = other.slots.into_iter().flatten().collect::<Vec<_>>();
        let mut mapping = BTreeMap::new();
        let mut placed = Vec::with_capacity(incoming.len());
        for data in incoming {
            let slot = self.allocate_slot();
            mapping.insert(data.id, NodeId::new(data.id.instance(), slot));
            placed.push((slot, data));
        }

        let remap = |id: NodeId| mapping.get(&id).copied().unwrap_or(id);
        let remap_output = |output: Output| Output::new(remap(output.node), output.index);
        for (slot, mut data) in placed {
            data.id = remap(data.id);
            for input in data.inputs.iter_mut() {
                input.source = remap_output(input.source);
            }
            for output in data.outputs.iter_mut() {
                output.targets = output
                    .targets
                    .iter()
                    .map(|input| Input::new(remap(input.node), input.index))
                    .collect();
                let tensor = &mut output.tensor;
                let live_new = tensor.liveness_new().iter().copied().map(remap_output).collect();
                let live_freed = tensor
                    .liveness_freed()
                    .iter()
                    .copied()
                    .map(remap_output)
                    .collect();
                *tensor.liveness_new_mut() = live_new;
                *tensor.liveness_freed_mut() = live_freed;
            }
            data.control_deps = data.control_deps.iter().copied().map(remap).collect();
            self.order.insert(data.id.instance(), data.id);
            self.slots[slot as usize] = Some(data);
        }
        debug!("absorbed {} node(s)", mapping.len());
        self.after_mutation()?;
        Ok(mapping)
    }

    fn after_mutation(&self) -> GraphResult<()> {
        if self.config.verify_edges {
            self.verify_edges()
        } else {
            Ok(())
        }
    }
}
