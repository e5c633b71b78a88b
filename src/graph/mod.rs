//! Graph module for managing flow maps.
//!
//! A flow map is a directed multigraph: nodes are geographic points and
//! flows are value-weighted curved connectors between them. Nodes are
//! deduplicated by coordinates, so flows sharing an endpoint share the node.

pub mod aggregate;
pub mod flow;
pub mod node;
pub mod registry;
pub mod serialization;
pub mod structure;
pub mod tables;

// Re-export commonly used types
pub use aggregate::{AggregateCache, Aggregates, LengthRange};
pub use flow::{Flow, FlowRecord};
pub use node::{Node, PointRecord};
pub use registry::{DedupPolicy, PointRegistry};
pub use serialization::FlowMapDocument;
pub use structure::FlowGraph;
pub use tables::{Table, TableColumn, TableRow};
