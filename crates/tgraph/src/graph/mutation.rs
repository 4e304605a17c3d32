//! Edge-surgery primitives.
//!
//! These are the only entry points that change which output an input reads. Each one keeps
//! both sides of the edge index in sync; none of them re-runs inference, so callers
//! revalidate the affected nodes afterwards.

use log::trace;

use crate::error::{GraphError, GraphResult};
use crate::ops::{Parameter, ResultOp};

use super::handle::{Input, Output};
use super::id::NodeId;
use super::Graph;

impl Graph {
    /// Moves `input` from its current source to `new_source`. Returns the previous source.
    fn relink(&mut self, input: Input, new_source: Output) -> GraphResult<Output> {
        let old_source = self.input(input)?.source_output();
        if old_source == new_source {
            return Ok(old_source);
        }
        if let Ok(slot) = self.output_slot_mut(old_source) {
            slot.targets.remove(&input);
        }
        self.input_slot_mut(input)?.source = new_source;
        self.output_slot_mut(new_source)?.targets.insert(input);
        trace!("{input}: {old_source} -> {new_source}");
        Ok(old_source)
    }

    /// Points `input` at `new_source`.
    ///
    /// No type check is made; the consumer keeps its old output types until it is
    /// revalidated.
    pub fn replace_input_source_output(
        &mut self,
        input: Input,
        new_source: Output,
    ) -> GraphResult<()> {
        self.output(new_source)?;
        self.relink(input, new_source)?;
        self.after_mutation()
    }

    /// Redirects every consumer of `from` to `to`. Returns the number of moved edges.
    pub fn replace_output_uses(&mut self, from: Output, to: Output) -> GraphResult<usize> {
        self.output(to)?;
        let targets = self
            .output(from)?
            .target_inputs()
            .iter()
            .copied()
            .collect::<Vec<_>>();
        if from == to {
            return Ok(0);
        }
        for input in &targets {
            self.relink(*input, to)?;
        }
        self.after_mutation()?;
        Ok(targets.len())
    }

    /// Output of `src` read by the lowest-indexed input of `dst` that reads `src` at all.
    fn targeted_output(&self, src: NodeId, dst: NodeId) -> GraphResult<Output> {
        self.try_node(src)?;
        self.try_node(dst)?
            .input_values()
            .into_iter()
            .find(|source| source.node == src)
            .ok_or(GraphError::NotConnected { src, dst })
    }

    fn inputs_reading(&self, dst: NodeId, source: Output) -> GraphResult<Vec<Input>> {
        Ok(self
            .try_node(dst)?
            .inputs()
            .filter(|input| input.source_output() == source)
            .map(|input| input.handle())
            .collect())
    }

    /// Splices `new_node` into the `src -> dst` edge.
    ///
    /// `new_node` must already read the targeted output of `src` and differ from `dst`. Every
    /// input of `dst` reading that output is moved to `new_node`'s output 0.
    pub fn insert_new_node_between(
        &mut self,
        src: NodeId,
        dst: NodeId,
        new_node: NodeId,
    ) -> GraphResult<()> {
        let targeted = self.targeted_output(src, dst)?;
        if new_node == dst {
            return Err(GraphError::SelfSplice { node: dst });
        }
        let spliced = self.try_node(new_node)?;
        if !spliced.input_values().contains(&targeted) {
            return Err(GraphError::NotSpliced {
                new_node,
                output: targeted,
            });
        }
        let replacement = spliced.output(0)?.handle();
        for input in self.inputs_reading(dst, targeted)? {
            self.relink(input, replacement)?;
        }
        self.after_mutation()
    }

    /// Redirects every consumer of `target` to the same-indexed output of `replacement`,
    /// then merges `target`'s provenance tags into `replacement`.
    pub fn replace_node_users_arguments(
        &mut self,
        target: NodeId,
        replacement: NodeId,
    ) -> GraphResult<()> {
        let target_outputs = self.try_node(target)?.output_size();
        let replacement_outputs = self.try_node(replacement)?.output_size();
        if target_outputs != replacement_outputs {
            return Err(GraphError::OutputCountMismatch {
                target,
                target_outputs,
                replacement,
                replacement_outputs,
            });
        }
        for index in 0..target_outputs {
            let targets = self
                .output(target.output(index))?
                .target_inputs()
                .iter()
                .copied()
                .collect::<Vec<_>>();
            for input in targets {
                self.relink(input, replacement.output(index))?;
            }
        }
        self.merge_provenance_tags(target, replacement)?;
        self.after_mutation()
    }

    /// Cuts the `src -> dst` edge at a placement boundary.
    ///
    /// A new result node placed like `src` consumes the targeted output. A new parameter
    /// placed like `dst`, with the same element type and shape, feeds every input of `dst`
    /// that read it. Returns `(result, parameter)`.
    pub fn insert_result_parameter_split(
        &mut self,
        src: NodeId,
        dst: NodeId,
    ) -> GraphResult<(NodeId, NodeId)> {
        let targeted = self.targeted_output(src, dst)?;
        let (element_type, shape) = {
            let output = self.output(targeted)?;
            (output.element_type(), output.partial_shape().clone())
        };
        let src_placement = self.try_node(src)?.placement();
        let dst_placement = self.try_node(dst)?.placement();

        let parameter = self.add_node(Parameter::new(element_type, shape), &[])?;
        self.set_placement(parameter, dst_placement)?;
        for input in self.inputs_reading(dst, targeted)? {
            self.relink(input, parameter.output(0))?;
        }

        let result = self.add_node(ResultOp::new(), &[targeted])?;
        self.set_placement(result, src_placement)?;
        self.after_mutation()?;
        Ok((result, parameter))
    }
}
