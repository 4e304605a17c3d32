//! Reference CPU backend for `tgraph`.
//!
//! Interprets finalized graphs node by node in host memory. Intended as the correctness
//! baseline for decompositions and for backends layered on top, such as
//! [`tgraph::runtime::DynamicWrapperBackend`].

pub mod cpu;

pub use cpu::{
    CpuBackend, CpuExecutable, CpuKernelInterceptor, CpuTensor, GenericCpuBackend,
    NoopInterceptor,
};
