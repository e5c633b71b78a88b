//! Background jobs.
//!
//! A job copies the model without its cached geometry, runs its phases on a
//! worker thread and sends the finished copy back over a channel. The
//! caller's model is never touched until [`FlowMap::commit`] swaps the copy
//! in, and commit refuses results computed from another map or from an
//! outdated revision.

use crate::core::error::{FlowMapResult, JobError, MapId};
use crate::core::types::SortOrder;
use crate::execution::progress::{CancelToken, Phase, ProgressCallback, ProgressTracker};
use crate::graph::flow::FlowRecord;
use crate::model::FlowMap;
use crossbeam::channel::{self, Receiver, TryRecvError};
use std::fmt;
use std::time::Duration;

/// Phases of a prepare job.
const PREPARE_PHASES: [Phase; 6] = [
    Phase::RepairValues,
    Phase::Sort,
    Phase::Aggregates,
    Phase::LineSegments,
    Phase::BoundingBoxes,
    Phase::Arrows,
];

/// A model copy produced by a job, tagged with the map and revision it
/// started from.
#[derive(Debug, Clone)]
pub struct PreparedFlowMap {
    origin: MapId,
    base_revision: u64,
    model: FlowMap,
}

impl PreparedFlowMap {
    /// The map the job copied.
    pub fn origin(&self) -> MapId {
        self.origin
    }

    pub fn base_revision(&self) -> u64 {
        self.base_revision
    }

    pub fn model(&self) -> &FlowMap {
        &self.model
    }

    pub(crate) fn into_parts(self) -> (MapId, u64, FlowMap) {
        (self.origin, self.base_revision, self.model)
    }
}

/// Job options.
#[derive(Clone, Default)]
pub struct JobOptions {
    /// Re-sort the flows before caching geometry.
    pub sort: Option<SortOrder>,
    /// Progress callback, invoked on the worker thread.
    pub progress: Option<ProgressCallback>,
    /// Cancellation flag shared with the returned handle.
    pub token: CancelToken,
}

impl fmt::Debug for JobOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobOptions")
            .field("sort", &self.sort)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .field("token", &self.token)
            .finish()
    }
}

impl JobOptions {
    pub fn with_sort(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = token;
        self
    }
}

/// Handle to a running job.
#[derive(Debug)]
pub struct JobHandle<T> {
    receiver: Receiver<FlowMapResult<T>>,
    token: CancelToken,
}

impl<T> JobHandle<T> {
    /// Ask the worker to stop at its next cancellation point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Block until the job finishes.
    pub fn wait(self) -> FlowMapResult<T> {
        self.receiver.recv().map_err(|_| JobError::Disconnected)?
    }

    /// Block for at most `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<FlowMapResult<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(channel::RecvTimeoutError::Timeout) => None,
            Err(channel::RecvTimeoutError::Disconnected) => Some(Err(JobError::Disconnected.into())),
        }
    }

    /// The result if the job has finished, without blocking.
    pub fn try_result(&self) -> Option<FlowMapResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(JobError::Disconnected.into())),
        }
    }
}

fn spawn<T, F>(name: &str, token: CancelToken, work: F) -> JobHandle<T>
where
    T: Send + 'static,
    F: FnOnce() -> FlowMapResult<T> + Send + 'static,
{
    let (sender, receiver) = channel::bounded(1);
    let spawned = std::thread::Builder::new()
        .name(format!("flowmap-{}", name))
        .spawn(move || {
            let result = work();
            if let Err(e) = &result {
                log::warn!("Job failed: {}", e);
            }
            if sender.send(result).is_err() {
                log::debug!("Job handle dropped before the result arrived");
            }
        });
    // On failure the sender is dropped with the closure and the handle
    // reports `Disconnected`.
    if let Err(e) = spawned {
        log::error!("Could not start {} job: {}", name, e);
    }
    JobHandle { receiver, token }
}

/// Recompute aggregates and cache all flow geometry on a copy of `model`.
pub fn spawn_prepare(model: &FlowMap, options: JobOptions) -> JobHandle<PreparedFlowMap> {
    let (origin, base_revision) = (model.id(), model.revision());
    let mut copy = model.job_copy();
    spawn("prepare", options.token.clone(), move || {
        let tracker = ProgressTracker::new(PREPARE_PHASES.len(), options.token.clone())
            .with_callback(options.progress.clone());
        tracker.start();
        run_prepare(&mut copy, &tracker, options.sort)?;
        tracker.complete();
        Ok(PreparedFlowMap {
            origin,
            base_revision,
            model: copy,
        })
    })
}

/// Ingest a batch into a copy of `model`, then prepare it.
pub fn spawn_add_flows(model: &FlowMap, batch: Vec<FlowRecord>, options: JobOptions) -> JobHandle<PreparedFlowMap> {
    let (origin, base_revision) = (model.id(), model.revision());
    let mut copy = model.job_copy();
    spawn("add-flows", options.token.clone(), move || {
        let tracker = ProgressTracker::new(PREPARE_PHASES.len() + 1, options.token.clone())
            .with_callback(options.progress.clone());
        tracker.start();

        let started = tracker.begin(Phase::Ingest)?;
        copy.add_flows_with_cancel(&batch, tracker.token())?;
        tracker.finish(Phase::Ingest, started);

        run_prepare(&mut copy, &tracker, options.sort)?;
        tracker.complete();
        Ok(PreparedFlowMap {
            origin,
            base_revision,
            model: copy,
        })
    })
}

fn run_prepare(model: &mut FlowMap, tracker: &ProgressTracker, sort: Option<SortOrder>) -> Result<(), JobError> {
    let token = tracker.token().clone();
    for phase in PREPARE_PHASES {
        let started = tracker.begin(phase)?;
        match phase {
            Phase::RepairValues => {
                model.repair_node_values();
            }
            Phase::Sort => {
                if let Some(order) = sort {
                    model.sort_flows(order);
                }
            }
            Phase::Aggregates => {
                model.recompute();
            }
            Phase::LineSegments => {
                model.cache_line_segments_until(Some(&token));
            }
            Phase::BoundingBoxes => {
                model.cache_bounding_boxes_until(Some(&token));
            }
            Phase::Arrows => {
                model.configure_arrows_until(Some(&token));
            }
            Phase::Ingest => {}
        }
        // Per-flow passes skip remaining flows once cancelled.
        tracker.check(phase)?;
        tracker.finish(phase, started);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::FlowMapError;
    use crate::core::projection::Equirectangular;
    use crate::execution::progress::ProgressUpdate;
    use crate::graph::node::PointRecord;
    use std::sync::Arc;

    fn rec(a: (f64, f64), b: (f64, f64), value: f64) -> FlowRecord {
        FlowRecord::new(PointRecord::new(a.0, a.1), PointRecord::new(b.0, b.1), value)
    }

    fn model() -> FlowMap {
        let mut map = FlowMap::new().with_projection(Arc::new(Equirectangular::new(10.0)));
        map.add_flows(&[rec((0.0, 0.0), (0.0, 20.0), 4.0), rec((0.0, 20.0), (15.0, 5.0), 8.0)])
            .unwrap();
        map
    }

    #[test]
    fn test_prepare_and_commit() {
        let mut map = model();
        let handle = spawn_prepare(&map, JobOptions::default().with_sort(SortOrder::Ascending));
        let prepared = handle.wait().unwrap();
        assert_eq!(prepared.base_revision(), map.revision());

        // Nothing changes until commit.
        assert!(map.graph().flows().all(|f| f.arrow().is_none()));

        map.commit(prepared).unwrap();
        assert!(map.graph().flows().all(|f| f.arrow().is_some() && f.line_segments().is_some()));
        let values: Vec<f64> = map.graph().flows().map(|f| f.value).collect();
        assert_eq!(values, vec![4.0, 8.0]);
    }

    #[test]
    fn test_stale_commit_rejected() {
        let mut map = model();
        let prepared = spawn_prepare(&map, JobOptions::default()).wait().unwrap();

        let id = map.graph().flow_ids().next().unwrap();
        map.set_flow_value(id, 100.0).unwrap();

        let err = map.commit(prepared).unwrap_err();
        assert!(matches!(err, JobError::Stale { .. }));
        assert!(err.is_retryable());
        assert_eq!(map.graph().flow(id).unwrap().value, 100.0);
    }

    #[test]
    fn test_commit_into_other_map_rejected() {
        let first = model();
        let mut second = model();
        assert_eq!(first.revision(), second.revision());

        let prepared = spawn_prepare(&first, JobOptions::default()).wait().unwrap();
        assert_eq!(prepared.origin(), first.id());
        let err = second.commit(prepared).unwrap_err();
        assert!(matches!(err, JobError::ForeignModel { .. }));
        assert!(!err.is_retryable());
        assert!(second.graph().flows().all(|f| f.arrow().is_none()));

        // A clone is another map too.
        let mut clone = first.clone();
        let prepared = spawn_prepare(&first, JobOptions::default()).wait().unwrap();
        assert!(matches!(clone.commit(prepared), Err(JobError::ForeignModel { .. })));
    }

    #[test]
    fn test_commit_keeps_map_id() {
        let mut map = model();
        let id = map.id();
        let prepared = spawn_prepare(&map, JobOptions::default()).wait().unwrap();
        map.commit(prepared.clone()).unwrap();
        assert_eq!(map.id(), id);

        // The committed map still accepts its own later jobs.
        let prepared = spawn_prepare(&map, JobOptions::default()).wait().unwrap();
        map.commit(prepared).unwrap();
    }

    #[test]
    fn test_cancelled_job_leaves_model_untouched() {
        let map = model();
        let revision = map.revision();
        let token = CancelToken::new();
        token.cancel();

        let handle = spawn_add_flows(
            &map,
            vec![rec((1.0, 1.0), (2.0, 2.0), 1.0)],
            JobOptions::default().with_token(token),
        );
        let result = handle.wait();
        assert!(matches!(result, Err(FlowMapError::Job(JobError::Cancelled { .. }))));
        assert_eq!(map.revision(), revision);
        assert_eq!(map.graph().flow_count(), 2);
    }

    #[test]
    fn test_add_flows_job_rejects_malformed_batch() {
        let map = model();
        let mut bad = rec((1.0, 1.0), (2.0, 2.0), 1.0);
        bad.start_pt.lng = None;
        let result = spawn_add_flows(&map, vec![bad], JobOptions::default()).wait();
        assert!(matches!(result, Err(FlowMapError::Ingest(_))));
    }

    #[test]
    fn test_add_flows_job_commit() {
        let mut map = model();
        let handle = spawn_add_flows(&map, vec![rec((0.0, 20.0), (0.0, 0.0), 6.0)], JobOptions::default());
        let result = loop {
            if let Some(result) = handle.try_result() {
                break result;
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        map.commit(result.unwrap()).unwrap();

        assert_eq!(map.graph().flow_count(), 3);
        assert_eq!(map.graph().node_count(), 3);
        let paired = map.graph().flows().filter(|f| f.opposite().is_some()).count();
        assert_eq!(paired, 2);
    }

    #[test]
    fn test_progress_reported() {
        let map = model();
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = updates.clone();
        let options = JobOptions::default().with_progress(Arc::new(move |u| sink.lock().push(u)));

        spawn_prepare(&map, options).wait().unwrap();

        let updates = updates.lock();
        let phases = updates
            .iter()
            .filter(|u| matches!(u, ProgressUpdate::PhaseCompleted { .. }))
            .count();
        assert_eq!(phases, PREPARE_PHASES.len());
        assert!(matches!(updates.last(), Some(ProgressUpdate::Completed { .. })));
    }
}
