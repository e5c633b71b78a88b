//! # Flowmap - Flow Map Graph Engine
//!
//! Flowmap is the model behind cartographic flow maps: value-weighted curved
//! flows drawn between geographic points. It keeps the graph of nodes and
//! flows consistent, derives the statistics that size symbols and strokes,
//! and computes the clipped geometry a renderer or layout optimizer needs.
//!
//! ## Features
//!
//! - **Deduplicated nodes**: Points with the same coordinates are one node,
//!   found through a hash index
//! - **Transactional ingestion**: A batch of flows is validated up front and
//!   applied all-or-nothing
//! - **Consistent adjacency**: Deleting a node cascades to its flows and
//!   patches every surviving endpoint
//! - **Cached statistics**: Aggregates are tagged with the graph revision and
//!   recomputed only when stale
//! - **Background jobs**: Long passes run on a copy of the model and are
//!   committed only if the model did not change meanwhile
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowmap::prelude::*;
//!
//! let mut map = FlowMap::new();
//! map.add_flows(&[
//!     FlowRecord::new(PointRecord::new(46.95, 7.45), PointRecord::new(47.37, 8.54), 120.0),
//!     FlowRecord::new(PointRecord::new(47.37, 8.54), PointRecord::new(46.95, 7.45), 80.0),
//! ])?;
//!
//! let stats = map.aggregates();
//! println!("{} flows, mean value {:?}", stats.flow_count, stats.mean_flow_value());
//!
//! map.prepare();
//! map.save("flows.json")?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: Ids, errors, settings, projections and shared value types
//! - [`graph`]: Point registry, flow graph, aggregates, documents and tables
//! - [`geometry`]: Curves, proportional symbol formulas and arrowheads
//! - [`execution`]: Background jobs, progress and cancellation
//! - [`model`]: The [`FlowMap`](model::FlowMap) facade

#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod geometry;
pub mod graph;
pub mod model;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use flowmap::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{BoundingBox, NodeGeometry, Point, RecordId, SortOrder};

    // Settings and projections
    pub use crate::core::projection::{Equirectangular, Projection, WebMercator};
    pub use crate::core::settings::{state_map_scale, ArrowSettings, DrawSettings, Settings};

    // Errors
    pub use crate::core::error::{
        FlowId, FlowMapError, FlowMapResult, GraphError, IngestError, JobError, MapId, NodeId,
        SettingsError,
    };

    // Graph
    pub use crate::graph::aggregate::{AggregateCache, Aggregates, LengthRange};
    pub use crate::graph::flow::{Flow, FlowRecord};
    pub use crate::graph::node::{Node, PointRecord};
    pub use crate::graph::registry::{DedupPolicy, PointRegistry};
    pub use crate::graph::serialization::FlowMapDocument;
    pub use crate::graph::structure::FlowGraph;
    pub use crate::graph::tables::{Table, TableColumn, TableRow};

    // Geometry
    pub use crate::geometry::arrow::{Arrow, ArrowBuilder, ArrowParams, TaperedArrowBuilder};
    pub use crate::geometry::curve::QuadraticBezier;
    pub use crate::geometry::formulas::{GeometryContext, NodeSymbol};

    // Execution
    pub use crate::execution::jobs::{spawn_add_flows, spawn_prepare, JobHandle, JobOptions, PreparedFlowMap};
    pub use crate::execution::progress::{CancelToken, Phase, ProgressCallback, ProgressUpdate};

    // Model
    pub use crate::model::FlowMap;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
