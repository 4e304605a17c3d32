//! Mutable tensor dataflow graph IR.
//!
//! A [`Graph`] owns an arena of nodes. Each node pairs an [`Op`] (kind and attributes) with
//! ordered input and output slots; edges are indexed on both ends and only change through
//! the primitives on [`Graph`]:
//!
//! - [`Graph::replace_input_source_output`]
//! - [`Graph::insert_new_node_between`]
//! - [`Graph::replace_node_users_arguments`]
//! - [`Graph::insert_result_parameter_split`]
//!
//! Node construction runs type and shape inference immediately; passes rewire edges and
//! revalidate. Backends consume finalized graphs through [`runtime::Backend`].

pub mod autodiff;
pub mod descriptor;
mod env;
pub mod error;
pub mod graph;
pub mod op;
pub mod ops;
pub mod pass;
pub mod placement;
pub mod runtime;
pub mod types;

pub use env::GraphConfig;
pub use error::{GraphError, GraphResult};
pub use graph::{BuildContext, Graph, Input, InstanceId, NodeId, NodeRef, Output};
pub use op::{Decompose, Op};
pub use placement::Placement;
pub use types::{Dimension, ElementType, PartialShape, Shape};
