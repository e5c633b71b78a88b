//! Core types for the flowmap model.
//!
//! This module contains the foundational pieces every other module builds on:
//! - Identifier newtypes and error types
//! - Projected points, bounding boxes and record ids
//! - The projection contract
//! - Layout, appearance, arrow and draw settings

pub mod error;
pub mod projection;
pub mod settings;
pub mod types;

// Re-export commonly used types
pub use error::{FlowId, FlowMapError, GraphError, IngestError, JobError, MapId, NodeId, SettingsError};
pub use projection::{Equirectangular, Projection, WebMercator};
pub use settings::{ArrowSettings, DrawSettings, Settings};
pub use types::{BoundingBox, NodeGeometry, Point, RecordId, SortOrder};
