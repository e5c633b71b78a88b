//! Error types for flowmap.
//!
//! Uses thiserror for structured errors with context. Errors are designed to:
//! - Name the offending node, flow or batch entry
//! - Separate user-recoverable conditions from programming errors
//! - Convert into the top-level [`FlowMapError`] with `?`

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a node in the point registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a node ID from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for a flow in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub Uuid);

impl FlowId {
    /// Create a new random flow ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Identity of a [`FlowMap`](crate::model::FlowMap) instance.
///
/// Background jobs carry the id of the model they copied so that a result is
/// only ever committed back into that model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapId(pub Uuid);

impl MapId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MapId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type for flowmap.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum FlowMapError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors related to graph structure and operations.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Flow {0} not found")]
    FlowNotFound(FlowId),

    #[error("Flows and locks have different lengths: {flows} flows, {locks} locks")]
    LockCountMismatch { flows: usize, locks: usize },
}

/// Which end of a flow an ingestion problem refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endpoint {
    /// The start point of a flow.
    Start,
    /// The end point of a flow.
    End,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => f.write_str("start"),
            Endpoint::End => f.write_str("end"),
        }
    }
}

/// Malformed point or flow data.
///
/// Raised before any node or flow is linked, so a failing batch never leaves
/// the graph partially updated.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IngestError {
    #[error("Flow {index}: {endpoint} point is missing '{field}'")]
    MissingCoordinate {
        index: usize,
        endpoint: Endpoint,
        field: String,
    },

    #[error("Flow {index}: {endpoint} point has a non-finite {field}")]
    NonFiniteCoordinate {
        index: usize,
        endpoint: Endpoint,
        field: String,
    },

    #[error("Flow {index} is missing its value")]
    MissingValue { index: usize },

    #[error("Flow {index} has a non-finite value")]
    NonFiniteValue { index: usize },

    #[error("Point is missing '{field}'")]
    MissingPointCoordinate { field: String },
}

/// Errors while reading or applying settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Missing settings key '{0}'")]
    MissingKey(String),

    #[error("Invalid value for settings key '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Settings record must be a JSON object")]
    NotAnObject,

    #[error("Settings file could not be parsed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error reading settings: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from background jobs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Job cancelled during {phase}")]
    Cancelled { phase: String },

    #[error("Model changed since the job started (revision {expected}, now {actual})")]
    Stale { expected: u64, actual: u64 },

    #[error("Job result belongs to map {expected}, not map {actual}")]
    ForeignModel { expected: MapId, actual: MapId },

    #[error("Worker thread disconnected before delivering a result")]
    Disconnected,
}

/// A broken adjacency or identity invariant.
///
/// Never returned to callers as a recoverable error: the graph asserts on it
/// in debug builds and tests check it explicitly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("Flow {flow} references node {node} which is not registered")]
    DanglingEndpoint { flow: FlowId, node: NodeId },

    #[error("Flow {flow} appears {count} times in the outgoing list of node {node}")]
    OutgoingCount { flow: FlowId, node: NodeId, count: usize },

    #[error("Flow {flow} appears {count} times in the incoming list of node {node}")]
    IncomingCount { flow: FlowId, node: NodeId, count: usize },

    #[error("Node {node} lists flow {flow} which is not linked to it")]
    StaleAdjacency { node: NodeId, flow: FlowId },

    #[error("Nodes {first} and {second} share coordinates")]
    DuplicateCoordinates { first: NodeId, second: NodeId },

    #[error("Opposite link of flow {flow} is not symmetric")]
    AsymmetricOpposite { flow: FlowId },
}

// ============================================================================
// Error Utilities
// ============================================================================

impl IngestError {
    /// Index of the offending entry within its batch, if applicable.
    pub fn batch_index(&self) -> Option<usize> {
        match self {
            IngestError::MissingCoordinate { index, .. }
            | IngestError::NonFiniteCoordinate { index, .. }
            | IngestError::MissingValue { index }
            | IngestError::NonFiniteValue { index } => Some(*index),
            IngestError::MissingPointCoordinate { .. } => None,
        }
    }
}

impl JobError {
    /// Whether retrying the job against the current model can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Stale { .. } | JobError::Cancelled { .. })
    }
}

/// Result type alias for flowmap operations.
pub type FlowMapResult<T> = Result<T, FlowMapError>;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for ingestion.
pub type IngestResult<T> = Result<T, IngestError>;

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new();
        let display = format!("{}", id);
        assert_eq!(display.len(), 8);
    }

    #[test]
    fn test_ingest_error_index() {
        let error = IngestError::MissingCoordinate {
            index: 3,
            endpoint: Endpoint::End,
            field: "lat".to_string(),
        };
        assert_eq!(error.batch_index(), Some(3));
        assert!(error.to_string().contains("end point"));
        assert!(error.to_string().contains("lat"));
    }

    #[test]
    fn test_error_conversion() {
        let error: FlowMapError = GraphError::LockCountMismatch { flows: 2, locks: 3 }.into();
        assert!(matches!(error, FlowMapError::Graph(_)));
        assert!(error.to_string().contains("different lengths"));
    }

    #[test]
    fn test_job_error_retryable() {
        assert!(JobError::Stale { expected: 1, actual: 2 }.is_retryable());
        assert!(!JobError::Disconnected.is_retryable());
        assert!(!JobError::ForeignModel {
            expected: MapId::new(),
            actual: MapId::new(),
        }
        .is_retryable());
    }
}
