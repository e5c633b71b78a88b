//! Aggregate statistics over nodes and flows.
//!
//! The statistics are derived data. [`AggregateCache`] stores them together
//! with the graph revision they were computed at; any mutation bumps the
//! revision and makes the snapshot stale until the next refresh. The
//! full pass and the narrower length-only pass share that one freshness
//! token, so they can never disagree for the same revision.

use crate::graph::node::{needs_value_repair, DEFAULT_NODE_VALUE};
use crate::graph::registry::PointRegistry;
use crate::graph::structure::FlowGraph;
use serde::Serialize;

/// Min/max/sum statistics over the live flows and nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub flow_count: usize,
    pub min_flow_value: f64,
    pub max_flow_value: f64,
    pub flow_value_sum: f64,
    pub min_flow_length: f64,
    pub max_flow_length: f64,
    pub node_count: usize,
    pub min_node_value: f64,
    pub max_node_value: f64,
    pub node_value_sum: f64,
}

/// Shortest and longest flow baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LengthRange {
    pub min: f64,
    pub max: f64,
}

impl Aggregates {
    /// Single pass over flows and nodes. Does not modify the graph.
    ///
    /// Node values that still need repair are counted as 1.
    pub fn compute(graph: &FlowGraph) -> Self {
        let mut stats = Aggregates::default();

        for (i, flow) in graph.flows().enumerate() {
            let v = flow.value;
            if i == 0 {
                stats.min_flow_value = v;
                stats.max_flow_value = v;
            } else {
                stats.min_flow_value = stats.min_flow_value.min(v);
                stats.max_flow_value = stats.max_flow_value.max(v);
            }
            stats.flow_value_sum += v;
            stats.flow_count += 1;
        }
        let lengths = flow_length_range(graph);
        stats.min_flow_length = lengths.min;
        stats.max_flow_length = lengths.max;

        for (i, node) in graph.registry().nodes().enumerate() {
            let v = if needs_value_repair(node.value) { DEFAULT_NODE_VALUE } else { node.value };
            if i == 0 {
                stats.min_node_value = v;
                stats.max_node_value = v;
            } else {
                stats.min_node_value = stats.min_node_value.min(v);
                stats.max_node_value = stats.max_node_value.max(v);
            }
            stats.node_value_sum += v;
            stats.node_count += 1;
        }

        stats
    }

    /// Mean flow value, `None` without flows.
    pub fn mean_flow_value(&self) -> Option<f64> {
        (self.flow_count > 0).then(|| self.flow_value_sum / self.flow_count as f64)
    }

    /// Mean node value, `None` without nodes.
    pub fn mean_node_value(&self) -> Option<f64> {
        (self.node_count > 0).then(|| self.node_value_sum / self.node_count as f64)
    }

    pub fn length_range(&self) -> LengthRange {
        LengthRange {
            min: self.min_flow_length,
            max: self.max_flow_length,
        }
    }
}

/// Min/max baseline length only. Zero for both when there are no flows.
pub fn flow_length_range(graph: &FlowGraph) -> LengthRange {
    let mut range: Option<LengthRange> = None;
    for flow in graph.flows() {
        let l = graph.baseline_length(flow);
        range = Some(match range {
            None => LengthRange { min: l, max: l },
            Some(r) => LengthRange {
                min: r.min.min(l),
                max: r.max.max(l),
            },
        });
    }
    range.unwrap_or_default()
}

/// Rewrite missing, zero or NaN node values to 1.
///
/// Returns how many nodes were repaired.
pub fn repair_node_values(registry: &mut PointRegistry) -> usize {
    let mut repaired = 0;
    for node in registry.nodes_mut() {
        if node.repair_value() {
            repaired += 1;
        }
    }
    if repaired > 0 {
        log::debug!("Repaired {} node values to {}", repaired, DEFAULT_NODE_VALUE);
    }
    repaired
}

/// Revision-tagged storage for [`Aggregates`].
#[derive(Debug, Clone, Default)]
pub struct AggregateCache {
    snapshot: Option<(u64, Aggregates)>,
    lengths: Option<(u64, LengthRange)>,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the full snapshot matches `revision`.
    pub fn is_fresh(&self, revision: u64) -> bool {
        matches!(self.snapshot, Some((r, _)) if r == revision)
    }

    /// The snapshot if it matches `revision`.
    pub fn fresh(&self, revision: u64) -> Option<&Aggregates> {
        match &self.snapshot {
            Some((r, stats)) if *r == revision => Some(stats),
            _ => None,
        }
    }

    /// The last computed snapshot, fresh or not.
    pub fn last(&self) -> Option<&Aggregates> {
        self.snapshot.as_ref().map(|(_, stats)| stats)
    }

    /// Recompute unconditionally.
    pub fn recompute(&mut self, graph: &FlowGraph) -> &Aggregates {
        let stats = Aggregates::compute(graph);
        log::debug!(
            "Aggregates at revision {}: {} flows, {} nodes",
            graph.revision(),
            stats.flow_count,
            stats.node_count
        );
        self.lengths = Some((graph.revision(), stats.length_range()));
        &self.snapshot.insert((graph.revision(), stats)).1
    }

    /// Recompute only when stale.
    pub fn refresh(&mut self, graph: &FlowGraph) -> Aggregates {
        match self.snapshot {
            Some((r, stats)) if r == graph.revision() => stats,
            _ => *self.recompute(graph),
        }
    }

    /// Flow length range for the current revision.
    ///
    /// Served from the full snapshot when fresh, otherwise from a length-only
    /// pass cached under the same revision.
    pub fn length_range(&mut self, graph: &FlowGraph) -> LengthRange {
        let revision = graph.revision();
        if let Some(stats) = self.fresh(revision) {
            return stats.length_range();
        }
        match self.lengths {
            Some((r, range)) if r == revision => range,
            _ => {
                let range = flow_length_range(graph);
                self.lengths = Some((revision, range));
                range
            }
        }
    }

    pub fn invalidate(&mut self) {
        self.snapshot = None;
        self.lengths = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::Equirectangular;
    use crate::graph::flow::FlowRecord;
    use crate::graph::node::PointRecord;

    fn graph_with_values(values: &[f64]) -> FlowGraph {
        let mut graph = FlowGraph::new();
        let projection = Equirectangular::default();
        for (i, v) in values.iter().enumerate() {
            let start = PointRecord::new(0.0, i as f64);
            let end = PointRecord::new(1.0, i as f64);
            graph
                .add_flow(&FlowRecord::new(start, end, *v), &projection)
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_flow_value_statistics() {
        let graph = graph_with_values(&[2.0, 5.0, 9.0]);
        let stats = Aggregates::compute(&graph);
        assert_eq!(stats.min_flow_value, 2.0);
        assert_eq!(stats.max_flow_value, 9.0);
        assert_eq!(stats.mean_flow_value(), Some(16.0 / 3.0));
        assert_eq!(stats.min_flow_length, 1.0);
        assert_eq!(stats.max_flow_length, 1.0);
    }

    #[test]
    fn test_empty_graph_statistics() {
        let stats = Aggregates::compute(&FlowGraph::new());
        assert_eq!(stats.min_flow_value, 0.0);
        assert_eq!(stats.max_flow_value, 0.0);
        assert_eq!(stats.min_node_value, 0.0);
        assert_eq!(stats.max_node_value, 0.0);
        assert_eq!(stats.mean_flow_value(), None);
        assert_eq!(stats.mean_node_value(), None);
    }

    #[test]
    fn test_repair_then_statistics() {
        let mut graph = graph_with_values(&[4.0]);
        let id = graph.registry().ids().next().unwrap();
        graph.registry_mut().get_mut(id).unwrap().value = 0.0;

        // The pure pass counts it as 1 but leaves the value alone.
        let stats = Aggregates::compute(&graph);
        assert_eq!(stats.min_node_value, 1.0);
        assert_eq!(graph.registry().get(id).unwrap().value, 0.0);

        assert_eq!(repair_node_values(graph.registry_mut()), 1);
        assert_eq!(graph.registry().get(id).unwrap().value, 1.0);
        let stats = Aggregates::compute(&graph);
        assert_eq!(stats.mean_node_value(), Some(1.0));
    }

    #[test]
    fn test_cache_freshness_follows_revision() {
        let mut graph = graph_with_values(&[3.0]);
        let mut cache = AggregateCache::new();
        assert!(!cache.is_fresh(graph.revision()));

        cache.refresh(&graph);
        assert!(cache.is_fresh(graph.revision()));

        let projection = Equirectangular::default();
        graph
            .add_flow(
                &FlowRecord::new(PointRecord::new(5.0, 5.0), PointRecord::new(5.0, 8.0), 7.0),
                &projection,
            )
            .unwrap();
        assert!(!cache.is_fresh(graph.revision()));
        assert!(cache.fresh(graph.revision()).is_none());

        // The length-only pass sees the new flow even though the full
        // snapshot is stale.
        let range = cache.length_range(&graph);
        assert_eq!(range.max, 3.0);

        assert_eq!(cache.refresh(&graph).max_flow_value, 7.0);
        assert_eq!(cache.length_range(&graph), range);
    }

    #[test]
    fn test_refresh_reuses_fresh_snapshot() {
        let graph = graph_with_values(&[2.0, 6.0]);
        let mut cache = AggregateCache::new();

        let first = cache.refresh(&graph);
        assert_eq!(first.flow_count, 2);
        assert_eq!(cache.last(), Some(&first));

        // Same revision: served from the cache without a new pass.
        let second = cache.refresh(&graph);
        assert_eq!(second, first);
        assert!(cache.is_fresh(graph.revision()));

        cache.invalidate();
        assert!(cache.last().is_none());
        assert_eq!(cache.refresh(&graph).max_flow_value, 6.0);
    }
}
