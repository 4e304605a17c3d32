//! Backend contract for compiling and running finalized graphs.
//!
//! A backend receives a graph in which every output has a static type and shape (see
//! [`ensure_finalized`]) and turns it into an [`Executable`]. Backends compose:
//! [`DynamicWrapperBackend`] wraps any other backend and adds support for graphs whose shapes
//! are only known when they run.

mod dynamic_wrapper;
mod host_tensor;

use std::fmt;

use thiserror::Error;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::types::{ElementType, PartialShape, Shape};

pub use dynamic_wrapper::{
    specialize, DynamicExecutable, DynamicTensor, DynamicWrapperBackend, WrappedExecutable,
    WrappedTensor, DEFAULT_SPECIALIZATION_CACHE_CAPACITY,
};
pub use host_tensor::{HostTensor, TensorData};

/// Element type and static shape of a materialized tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorSpec {
    pub element_type: ElementType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(element_type: ElementType, shape: impl Into<Shape>) -> Self {
        Self {
            element_type,
            shape: shape.into(),
        }
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.element_type, self.shape)
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: &'static str, reason: String },
    #[error("backend execution failure: {message}")]
    Execution { message: String },
    #[error("expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl BackendError {
    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }

    pub fn shape_mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        BackendError::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Compiled form of a graph.
///
/// Inputs bind to the graph's parameters in instance-id order and outputs come back in the
/// order of its result nodes.
pub trait Executable: Send + Sync {
    type Tensor;

    fn call(&self, inputs: &[Self::Tensor]) -> BackendResult<Vec<Self::Tensor>>;
}

pub trait Backend: Send + Sync {
    type Tensor: Clone + fmt::Debug + Send + Sync + 'static;
    type Executable: Executable<Tensor = Self::Tensor> + 'static;

    fn backend_name(&self) -> &str;

    /// Zero-initialized tensor of a static type and shape.
    fn create_tensor(&self, element_type: ElementType, shape: &Shape)
        -> BackendResult<Self::Tensor>;

    fn create_tensor_from_host(&self, host: &HostTensor) -> BackendResult<Self::Tensor>;

    /// Tensor whose shape is only fixed once data is written into it.
    fn create_dynamic_tensor(
        &self,
        _element_type: ElementType,
        _shape: &PartialShape,
    ) -> BackendResult<Self::Tensor> {
        Err(BackendError::unimplemented(
            "create_dynamic_tensor",
            format!("backend '{}' only supports static tensors", self.backend_name()),
        ))
    }

    fn tensor_spec(&self, tensor: &Self::Tensor) -> BackendResult<TensorSpec>;

    fn read(&self, tensor: &Self::Tensor) -> BackendResult<HostTensor>;

    fn compile(&self, graph: &Graph) -> BackendResult<Self::Executable>;
}

/// Fails unless every output in `graph` has a static type and shape.
pub fn ensure_finalized(graph: &Graph) -> BackendResult<()> {
    graph.check_static()?;
    Ok(())
}
