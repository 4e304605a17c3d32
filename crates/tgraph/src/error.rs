use thiserror::Error;

use crate::graph::{Input, InstanceId, NodeId, Output};

/// Failures raised by graph construction, edge surgery and type inference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An operation rejected its arguments during `validate_and_infer_types`.
    #[error("While validating node '{node}': {explanation}")]
    NodeValidation { node: String, explanation: String },
    /// `copy_with_new_args` received the wrong number of replacement arguments.
    #[error("Expected {expected} element(s) in new_args for the {op} op but got {actual}")]
    CopyArity {
        op: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("node {node} is not part of this graph")]
    StaleNode { node: NodeId },
    #[error("input index {index} out of range for {node} with {size} input(s)")]
    InputIndexOutOfRange {
        node: NodeId,
        index: usize,
        size: usize,
    },
    #[error("output index {index} out of range for {node} with {size} output(s)")]
    OutputIndexOutOfRange {
        node: NodeId,
        index: usize,
        size: usize,
    },
    #[error("output size of {node} is frozen after the first inference")]
    OutputSizeFrozen { node: NodeId },
    #[error("output size of {node} was already set")]
    OutputSizeAlreadySet { node: NodeId },
    #[error("constructor validation already ran for {node}")]
    ConstructionFinished { node: NodeId },
    #[error("friendly name of {node} is already set to '{name}'")]
    FriendlyNameAlreadySet { node: NodeId, name: String },
    #[error("{target} has {target_outputs} output(s) but {replacement} has {replacement_outputs}")]
    OutputCountMismatch {
        target: NodeId,
        target_outputs: usize,
        replacement: NodeId,
        replacement_outputs: usize,
    },
    #[error("{dst} has no input sourced from {src}")]
    NotConnected { src: NodeId, dst: NodeId },
    #[error("{new_node} does not consume {output}")]
    NotSpliced { new_node: NodeId, output: Output },
    #[error("{node} cannot be spliced in front of itself")]
    SelfSplice { node: NodeId },
    #[error("{node} still has {users} user edge(s)")]
    NodeInUse { node: NodeId, users: usize },
    #[error("{node} has {outputs} outputs; a single-output accessor was used")]
    NotSingleOutput { node: NodeId, outputs: usize },
    #[error("{output} does not have a static type and shape")]
    DynamicShape { output: Output },
    #[error("graph contains a cycle through {node}")]
    CycleDetected { node: NodeId },
    #[error("graphs were built from different build contexts")]
    ContextMismatch,
    #[error("instance {instance} is already present in the graph")]
    DuplicateInstance { instance: InstanceId },
    #[error("edge index is inconsistent at {input}: {detail}")]
    InconsistentEdges { input: Input, detail: String },
    #[error("pass '{pass}' precondition failed: {reason}")]
    PassPrecondition { pass: &'static str, reason: String },
    #[error("{op} decomposition produced {actual} output(s) for {expected} result(s)")]
    DecompositionArity {
        op: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{op} does not support {what}")]
    Unsupported { op: &'static str, what: String },
}

pub type GraphResult<T> = Result<T, GraphError>;
