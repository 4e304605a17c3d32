//! Element types and (partial) shapes carried by tensor descriptors.

mod element;
mod shape;

pub use element::ElementType;
pub use shape::{Dimension, PartialShape, Shape};
