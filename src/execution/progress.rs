//! Progress tracking and cancellation for background jobs.

use crate::core::error::JobError;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared cancellation flag.
///
/// Cloning yields a handle to the same flag, so one clone can be moved into
/// a worker while the caller keeps the other.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// `Err(JobError::Cancelled)` once cancellation was requested.
    pub fn check(&self, phase: &str) -> Result<(), JobError> {
        if self.is_cancelled() {
            Err(JobError::Cancelled {
                phase: phase.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Steps of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Ingest,
    RepairValues,
    Aggregates,
    Sort,
    LineSegments,
    BoundingBoxes,
    Arrows,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Ingest => "ingest",
            Phase::RepairValues => "repair values",
            Phase::Aggregates => "aggregates",
            Phase::Sort => "sort",
            Phase::LineSegments => "line segments",
            Phase::BoundingBoxes => "bounding boxes",
            Phase::Arrows => "arrows",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A progress update event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// The job has started.
    Started { total_phases: usize },
    /// A phase has started.
    PhaseStarted { phase: Phase, index: usize, total: usize },
    /// A phase has completed.
    PhaseCompleted { phase: Phase, duration_ms: u64 },
    /// Overall progress percentage.
    Progress { percent: f32, elapsed_ms: u64 },
    /// The job has completed.
    Completed { total_duration_ms: u64 },
    /// The job was cancelled.
    Cancelled { phase: Phase },
}

/// Callback type for progress updates.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Tracks job progress phase by phase.
pub struct ProgressTracker {
    total_phases: usize,
    completed_phases: AtomicU64,
    token: CancelToken,
    start_time: parking_lot::Mutex<Option<Instant>>,
    callback: Option<ProgressCallback>,
    /// Phase durations in completion order.
    phase_times: parking_lot::Mutex<Vec<(Phase, u64)>>,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("total_phases", &self.total_phases)
            .field("completed_phases", &self.completed_phases)
            .field("token", &self.token)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl ProgressTracker {
    pub fn new(total_phases: usize, token: CancelToken) -> Self {
        Self {
            total_phases,
            completed_phases: AtomicU64::new(0),
            token,
            start_time: parking_lot::Mutex::new(None),
            callback: None,
            phase_times: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn with_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn start(&self) {
        *self.start_time.lock() = Some(Instant::now());
        self.send_update(ProgressUpdate::Started {
            total_phases: self.total_phases,
        });
    }

    /// Enter a phase, failing if the job was cancelled.
    pub fn begin(&self, phase: Phase) -> Result<Instant, JobError> {
        if self.token.is_cancelled() {
            log::info!("Job cancelled before {}", phase);
            self.send_update(ProgressUpdate::Cancelled { phase });
            return Err(JobError::Cancelled {
                phase: phase.name().to_string(),
            });
        }
        self.send_update(ProgressUpdate::PhaseStarted {
            phase,
            index: self.completed_phases.load(Ordering::Relaxed) as usize,
            total: self.total_phases,
        });
        Ok(Instant::now())
    }

    /// Leave a phase entered with [`begin`](Self::begin).
    pub fn finish(&self, phase: Phase, started: Instant) {
        let duration_ms = started.elapsed().as_millis() as u64;
        self.completed_phases.fetch_add(1, Ordering::Relaxed);
        self.phase_times.lock().push((phase, duration_ms));
        log::debug!("Phase {} took {} ms", phase, duration_ms);

        self.send_update(ProgressUpdate::PhaseCompleted { phase, duration_ms });
        self.send_update(ProgressUpdate::Progress {
            percent: self.progress_percent(),
            elapsed_ms: self.elapsed_ms(),
        });
    }

    pub fn complete(&self) {
        self.send_update(ProgressUpdate::Completed {
            total_duration_ms: self.elapsed_ms(),
        });
    }

    /// Check a cancellation point inside a phase.
    pub fn check(&self, phase: Phase) -> Result<(), JobError> {
        self.token.check(phase.name())
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn progress_percent(&self) -> f32 {
        if self.total_phases == 0 {
            return 100.0;
        }
        let completed = self.completed_phases.load(Ordering::Relaxed);
        (completed as f32 / self.total_phases as f32) * 100.0
    }

    /// Phase durations recorded so far.
    pub fn phase_times(&self) -> Vec<(Phase, u64)> {
        self.phase_times.lock().clone()
    }

    fn elapsed_ms(&self) -> u64 {
        self.start_time
            .lock()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    fn send_update(&self, update: ProgressUpdate) {
        if let Some(ref callback) = self.callback {
            callback(update);
        }
    }
}
