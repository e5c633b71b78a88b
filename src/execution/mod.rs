//! Background execution of long-running model passes.
//!
//! Jobs run on a worker thread against a copy of the model, report progress
//! phase by phase and can be cancelled between phases and per flow.

pub mod jobs;
pub mod progress;

pub use jobs::{spawn_add_flows, spawn_prepare, JobHandle, JobOptions, PreparedFlowMap};
pub use progress::{CancelToken, Phase, ProgressCallback, ProgressTracker, ProgressUpdate};
