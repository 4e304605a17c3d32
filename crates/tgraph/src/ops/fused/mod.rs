//! Ops that carry their own decomposition into primitive ops.

mod clamp;
mod mvn;

pub use clamp::Clamp;
pub use mvn::Mvn;
