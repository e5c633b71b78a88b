//! Flow graph structure: nodes, flows and their adjacency.
//!
//! The FlowGraph is the central data structure of a flow map. It owns the
//! point registry and the ordered set of live flows, and keeps every node's
//! outgoing/incoming lists in step with the flows. Every mutation bumps the
//! graph revision, which derived data (aggregates, background jobs) uses as
//! its freshness token.

use crate::core::error::{
    Endpoint, FlowId, FlowMapError, FlowMapResult, GraphError, GraphResult, IngestError,
    IngestResult, InvariantViolation, NodeId,
};
use crate::core::projection::Projection;
use crate::core::types::{NodeGeometry, Point, RecordId, SortOrder};
use crate::execution::progress::CancelToken;
use crate::geometry::curve::QuadraticBezier;
use crate::graph::aggregate;
use crate::graph::flow::{Flow, FlowRecord};
use crate::graph::node::{Node, PointRecord, DEFAULT_NODE_VALUE};
use crate::graph::registry::{CoordinateKey, DedupPolicy, PointRegistry};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A flow record whose coordinates and value passed validation.
struct CheckedFlow<'a> {
    record: &'a FlowRecord,
    start: (f64, f64),
    end: (f64, f64),
    value: f64,
}

impl<'a> CheckedFlow<'a> {
    fn new(record: &'a FlowRecord, index: usize) -> IngestResult<Self> {
        record.validate(index)?;
        let start = record.start_pt.checked_lat_lng(index, Endpoint::Start)?;
        let end = record.end_pt.checked_lat_lng(index, Endpoint::End)?;
        let value = record.value.ok_or(IngestError::MissingValue { index })?;
        Ok(Self {
            record,
            start,
            end,
            value,
        })
    }
}

/// The flow graph.
///
/// Uses IndexMap so that flow order is meaningful (sorted by value after
/// batch ingestion) and iteration is deterministic.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    registry: PointRegistry,
    flows: IndexMap<FlowId, Flow>,
    revision: u64,
}

impl FlowGraph {
    /// Create an empty graph with exact coordinate matching.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with a specific dedup policy.
    pub fn with_dedup_policy(policy: DedupPolicy) -> Self {
        Self {
            registry: PointRegistry::with_policy(policy),
            ..Self::default()
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Mutation counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn registry(&self) -> &PointRegistry {
        &self.registry
    }

    /// Direct registry access. Counts as a mutation.
    #[cfg(test)]
    pub(crate) fn registry_mut(&mut self) -> &mut PointRegistry {
        self.touch();
        &mut self.registry
    }

    /// Live flows in their current order.
    pub fn flows(&self) -> impl Iterator<Item = &Flow> {
        self.flows.values()
    }

    pub fn flow_ids(&self) -> impl Iterator<Item = FlowId> + '_ {
        self.flows.keys().copied()
    }

    pub fn flow(&self, id: FlowId) -> Option<&Flow> {
        self.flows.get(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.registry.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.registry.nodes()
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn node_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty() && self.registry.is_empty()
    }

    /// Start and end node of a flow.
    pub fn flow_endpoints(&self, id: FlowId) -> Option<(&Node, &Node)> {
        let flow = self.flows.get(&id)?;
        Some((self.registry.get(flow.start)?, self.registry.get(flow.end)?))
    }

    /// Straight-line distance between a flow's endpoint positions.
    pub fn baseline_length(&self, flow: &Flow) -> f64 {
        match (self.registry.get(flow.start), self.registry.get(flow.end)) {
            (Some(s), Some(e)) => s.position.distance(e.position),
            _ => 0.0,
        }
    }

    /// The flow's curve in projected coordinates.
    pub fn curve(&self, flow: &Flow) -> Option<QuadraticBezier> {
        let start = self.registry.get(flow.start)?;
        let end = self.registry.get(flow.end)?;
        Some(flow.curve(start.position, end.position))
    }

    /// First node carrying the given record id.
    pub fn find_node_by_record_id(&self, record_id: &RecordId) -> Option<&Node> {
        self.registry.find_by_record_id(record_id)
    }

    /// Registry and flows borrowed apart, for per-flow caching passes.
    ///
    /// Cached geometry is derived data, so this does not bump the revision.
    pub(crate) fn split_flows_mut(&mut self) -> (&PointRegistry, &mut IndexMap<FlowId, Flow>) {
        (&self.registry, &mut self.flows)
    }

    /// A copy of the graph without any flow's cached geometry.
    ///
    /// Keeps the revision, so the copy is interchangeable with the original
    /// until either one is mutated.
    pub(crate) fn clone_without_geometry(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            flows: self
                .flows
                .iter()
                .map(|(id, flow)| (*id, flow.clone_without_geometry()))
                .collect(),
            revision: self.revision,
        }
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Register a standalone point and return its canonical node.
    pub fn register_point(&mut self, record: &PointRecord, projection: &dyn Projection) -> IngestResult<NodeId> {
        let (id, adopted) = self.registry.register(record, projection)?;
        if adopted {
            self.touch();
            log::debug!("Registered node {}", id);
        }
        Ok(id)
    }

    /// Add a single flow.
    ///
    /// Endpoints are resolved to canonical nodes and the flow is linked into
    /// their adjacency lists. Unlike [`add_flows`](Self::add_flows) this does
    /// not pair opposite flows and does not re-sort the flow set.
    pub fn add_flow(&mut self, record: &FlowRecord, projection: &dyn Projection) -> IngestResult<FlowId> {
        let checked = CheckedFlow::new(record, 0)?;
        let id = self.link(&checked, projection);
        self.touch();
        self.debug_check_invariants();
        Ok(id)
    }

    /// Add a batch of flows as one transaction.
    ///
    /// Every record is validated before anything is linked. Opposite flows
    /// are paired and the flow set is sorted by value, largest first. On
    /// error the graph is unchanged.
    pub fn add_flows(&mut self, batch: &[FlowRecord], projection: &dyn Projection) -> IngestResult<Vec<FlowId>> {
        let (staged, ids) = self.stage_batch(batch, projection, || Ok::<(), IngestError>(()))?;
        *self = staged;
        Ok(ids)
    }

    /// [`add_flows`](Self::add_flows) with a cancellation check per flow.
    ///
    /// A cancelled batch leaves the graph unchanged.
    pub fn add_flows_with_cancel(
        &mut self,
        batch: &[FlowRecord],
        projection: &dyn Projection,
        cancel: &CancelToken,
    ) -> FlowMapResult<Vec<FlowId>> {
        let (staged, ids) = self.stage_batch(batch, projection, || cancel.check("ingest").map_err(FlowMapError::from))?;
        *self = staged;
        Ok(ids)
    }

    /// Build the post-batch graph on a copy of this one.
    fn stage_batch<E>(
        &self,
        batch: &[FlowRecord],
        projection: &dyn Projection,
        mut checkpoint: impl FnMut() -> Result<(), E>,
    ) -> Result<(FlowGraph, Vec<FlowId>), E>
    where
        E: From<IngestError>,
    {
        let checked = batch
            .iter()
            .enumerate()
            .map(|(i, record)| CheckedFlow::new(record, i))
            .collect::<IngestResult<Vec<_>>>()?;

        let mut staged = self.clone();
        if checked.is_empty() {
            return Ok((staged, Vec::new()));
        }

        let mut ids = Vec::with_capacity(checked.len());
        for flow in &checked {
            checkpoint()?;
            let id = staged.link(flow, projection);
            staged.pair_opposite(id);
            ids.push(id);
        }

        checkpoint()?;
        staged.sort_in_place(SortOrder::Descending);
        staged.touch();
        staged.debug_check_invariants();

        log::info!(
            "Added {} flows ({} flows, {} nodes total)",
            ids.len(),
            staged.flow_count(),
            staged.node_count()
        );
        Ok((staged, ids))
    }

    /// Resolve endpoints, store the flow and link it. Does not bump the revision.
    fn link(&mut self, checked: &CheckedFlow<'_>, projection: &dyn Projection) -> FlowId {
        let record = checked.record;
        let (slat, slng) = checked.start;
        let (elat, elng) = checked.end;
        let (start, _) = self.registry.register_checked(&record.start_pt, slat, slng, projection);
        let (end, _) = self.registry.register_checked(&record.end_pt, elat, elng, projection);

        let start_pos = self.registry.get(start).map(|n| n.position).unwrap_or_default();
        let end_pos = self.registry.get(end).map(|n| n.position).unwrap_or_default();
        let ctrl = record.c_pt.unwrap_or_else(|| start_pos.midpoint(end_pos));

        let mut flow = Flow::new(start, end, ctrl, checked.value);
        flow.record_id = record.id.clone();
        let id = flow.id;
        self.flows.insert(id, flow);

        if let Some(node) = self.registry.get_mut(start) {
            node.outgoing.push(id);
        }
        if let Some(node) = self.registry.get_mut(end) {
            node.incoming.push(id);
        }
        id
    }

    /// Pair `id` with the first unpaired flow running the other way.
    fn pair_opposite(&mut self, id: FlowId) {
        let (start, end) = match self.flows.get(&id) {
            Some(flow) if flow.opposite.is_none() => (flow.start, flow.end),
            _ => return,
        };
        let Some(end_node) = self.registry.get(end) else {
            return;
        };
        let candidate = end_node.outgoing.iter().copied().find(|c| {
            *c != id
                && self
                    .flows
                    .get(c)
                    .map_or(false, |other| other.end == start && other.opposite.is_none())
        });
        if let Some(other) = candidate {
            if let Some(flow) = self.flows.get_mut(&id) {
                flow.opposite = Some(other);
            }
            if let Some(flow) = self.flows.get_mut(&other) {
                flow.opposite = Some(id);
            }
            log::debug!("Paired opposite flows {} and {}", id, other);
        }
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Delete a node and every flow that starts or ends at it.
    ///
    /// The flows are unlinked from their other endpoint, and any surviving
    /// opposite partner loses its link.
    pub fn delete_node(&mut self, id: NodeId) -> GraphResult<Node> {
        let node = self.registry.get(id).ok_or(GraphError::NodeNotFound(id))?;
        let mut incident: Vec<FlowId> = node.outgoing.iter().chain(node.incoming.iter()).copied().collect();
        incident.sort();
        incident.dedup();

        for flow in &incident {
            self.detach_flow(*flow);
        }
        let node = self.registry.remove(id).ok_or(GraphError::NodeNotFound(id))?;
        self.touch();
        self.debug_check_invariants();

        log::debug!("Deleted node {} with {} incident flows", id, incident.len());
        Ok(node)
    }

    fn detach_flow(&mut self, id: FlowId) {
        let Some(flow) = self.flows.shift_remove(&id) else {
            return;
        };
        for endpoint in [flow.start, flow.end] {
            if let Some(node) = self.registry.get_mut(endpoint) {
                node.unlink(id);
            }
        }
        if let Some(partner) = flow.opposite.and_then(|o| self.flows.get_mut(&o)) {
            partner.opposite = None;
        }
    }

    /// Remove every flow and node.
    pub fn delete_all(&mut self) {
        self.flows.clear();
        self.registry.clear();
        self.touch();
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Stable sort of the flow set by value.
    pub fn sort_flows(&mut self, order: SortOrder) {
        self.sort_in_place(order);
        self.touch();
    }

    fn sort_in_place(&mut self, order: SortOrder) {
        self.flows.sort_by(|_, a, _, b| compare_values(a, b, order));
    }

    // ========================================================================
    // Locks and selection
    // ========================================================================

    /// Locked flag of every flow, in flow order.
    pub fn locks(&self) -> Vec<bool> {
        self.flows.values().map(|f| f.locked).collect()
    }

    /// Set the locked flag of every flow, in flow order.
    pub fn apply_locks(&mut self, locks: &[bool]) -> GraphResult<()> {
        if locks.len() != self.flows.len() {
            log::warn!(
                "Flows and locks have different lengths: {} flows, {} locks",
                self.flows.len(),
                locks.len()
            );
            return Err(GraphError::LockCountMismatch {
                flows: self.flows.len(),
                locks: locks.len(),
            });
        }
        for (flow, locked) in self.flows.values_mut().zip(locks) {
            flow.locked = *locked;
        }
        self.touch();
        Ok(())
    }

    pub fn selected_flows(&self) -> Vec<FlowId> {
        self.flows.values().filter(|f| f.selected).map(|f| f.id).collect()
    }

    pub fn selected_nodes(&self) -> Vec<NodeId> {
        self.registry.nodes().filter(|n| n.selected).map(|n| n.id).collect()
    }

    pub fn set_flow_selected(&mut self, id: FlowId, selected: bool) -> GraphResult<()> {
        self.flow_mut(id)?.selected = selected;
        self.touch();
        Ok(())
    }

    pub fn set_node_selected(&mut self, id: NodeId, selected: bool) -> GraphResult<()> {
        self.node_mut(id)?.selected = selected;
        self.touch();
        Ok(())
    }

    pub fn deselect_all(&mut self) {
        for flow in self.flows.values_mut() {
            flow.selected = false;
        }
        for node in self.registry.nodes_mut() {
            node.selected = false;
        }
        self.touch();
    }

    // ========================================================================
    // Edits
    // ========================================================================

    /// Control point of every flow, in flow order.
    pub fn control_points(&self) -> Vec<Point> {
        self.flows.values().map(|f| f.ctrl).collect()
    }

    pub fn set_control_point(&mut self, id: FlowId, ctrl: Point) -> GraphResult<()> {
        self.flow_mut(id)?.set_ctrl(ctrl);
        self.touch();
        Ok(())
    }

    pub fn set_flow_value(&mut self, id: FlowId, value: f64) -> GraphResult<()> {
        let flow = self.flow_mut(id)?;
        flow.value = value;
        flow.invalidate_geometry();
        self.touch();
        Ok(())
    }

    /// Set a node's value. Zero and NaN become 1.
    pub fn set_node_value(&mut self, id: NodeId, value: f64) -> GraphResult<()> {
        let node = self.node_mut(id)?;
        node.value = value;
        if node.repair_value() {
            log::debug!("Node {} value {} replaced with {}", id, value, DEFAULT_NODE_VALUE);
        }
        self.invalidate_incident(id);
        self.touch();
        Ok(())
    }

    /// Switch a node between proportional and externally sized symbols.
    pub fn set_node_geometry(&mut self, id: NodeId, geometry: NodeGeometry) -> GraphResult<()> {
        self.node_mut(id)?.geometry = geometry;
        self.invalidate_incident(id);
        self.touch();
        Ok(())
    }

    /// Recompute every node position. Control points are not moved.
    pub fn reproject(&mut self, projection: &dyn Projection) {
        self.registry.reproject(projection);
        self.invalidate_geometry();
        self.touch();
    }

    /// Rewrite missing, zero or NaN node values to 1.
    pub fn repair_node_values(&mut self) -> usize {
        let repaired = aggregate::repair_node_values(&mut self.registry);
        if repaired > 0 {
            self.touch();
        }
        repaired
    }

    /// Drop every flow's cached segments, bounding box and arrow.
    pub fn invalidate_geometry(&mut self) {
        for flow in self.flows.values_mut() {
            flow.invalidate_geometry();
        }
    }

    fn invalidate_incident(&mut self, id: NodeId) {
        for flow in self.flows.values_mut().filter(|f| f.touches(id)) {
            flow.invalidate_geometry();
        }
    }

    fn flow_mut(&mut self, id: FlowId) -> GraphResult<&mut Flow> {
        self.flows.get_mut(&id).ok_or(GraphError::FlowNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> GraphResult<&mut Node> {
        self.registry.get_mut(id).ok_or(GraphError::NodeNotFound(id))
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Check adjacency, identity and opposite-link consistency.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for flow in self.flows.values() {
            let start = self.registry.get(flow.start).ok_or(InvariantViolation::DanglingEndpoint {
                flow: flow.id,
                node: flow.start,
            })?;
            let end = self.registry.get(flow.end).ok_or(InvariantViolation::DanglingEndpoint {
                flow: flow.id,
                node: flow.end,
            })?;

            let count = start.outgoing.iter().filter(|f| **f == flow.id).count();
            if count != 1 {
                return Err(InvariantViolation::OutgoingCount {
                    flow: flow.id,
                    node: start.id,
                    count,
                });
            }
            let count = end.incoming.iter().filter(|f| **f == flow.id).count();
            if count != 1 {
                return Err(InvariantViolation::IncomingCount {
                    flow: flow.id,
                    node: end.id,
                    count,
                });
            }

            if let Some(other) = flow.opposite {
                let symmetric = self.flows.get(&other).map_or(false, |o| {
                    o.opposite == Some(flow.id) && o.start == flow.end && o.end == flow.start
                });
                if !symmetric || other == flow.id {
                    return Err(InvariantViolation::AsymmetricOpposite { flow: flow.id });
                }
            }
        }

        let mut seen: HashMap<CoordinateKey, NodeId> = HashMap::new();
        let policy = self.registry.policy();
        for node in self.registry.nodes() {
            let stale = |f: &FlowId, outgoing: bool| {
                self.flows.get(f).map_or(true, |flow| {
                    if outgoing {
                        flow.start != node.id
                    } else {
                        flow.end != node.id
                    }
                })
            };
            if let Some(f) = node.outgoing.iter().find(|f| stale(*f, true)) {
                return Err(InvariantViolation::StaleAdjacency { node: node.id, flow: *f });
            }
            if let Some(f) = node.incoming.iter().find(|f| stale(*f, false)) {
                return Err(InvariantViolation::StaleAdjacency { node: node.id, flow: *f });
            }

            let key = CoordinateKey::new(node.lat, node.lng, policy);
            if let Some(first) = seen.insert(key, node.id) {
                return Err(InvariantViolation::DuplicateCoordinates {
                    first,
                    second: node.id,
                });
            }
        }
        Ok(())
    }

    fn debug_check_invariants(&self) {
        if cfg!(debug_assertions) {
            if let Err(violation) = self.check_invariants() {
                panic!("flow graph invariant broken: {}", violation);
            }
        }
    }
}

/// Order two flows by value.
pub fn compare_values(a: &Flow, b: &Flow, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Ascending => a.value.total_cmp(&b.value),
        SortOrder::Descending => b.value.total_cmp(&a.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::JobError;
    use crate::core::projection::Equirectangular;
    use proptest::prelude::*;

    fn pt(lat: f64, lng: f64) -> PointRecord {
        PointRecord::new(lat, lng)
    }

    fn rec(a: (f64, f64), b: (f64, f64), value: f64) -> FlowRecord {
        FlowRecord::new(pt(a.0, a.1), pt(b.0, b.1), value)
    }

    const A: (f64, f64) = (0.0, 0.0);
    const B: (f64, f64) = (0.0, 10.0);
    const C: (f64, f64) = (10.0, 10.0);

    #[test]
    fn test_shared_endpoints_are_one_node() {
        let mut graph = FlowGraph::new();
        let projection = Equirectangular::default();
        graph
            .add_flows(&[rec(A, B, 1.0), rec(A, C, 2.0), rec(C, B, 3.0)], &projection)
            .unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.flow_count(), 3);
        assert!(graph.check_invariants().is_ok());

        let a = graph.registry().find(A.0, A.1).unwrap();
        assert_eq!(graph.node(a).unwrap().outgoing_flows().len(), 2);
        assert!(graph.node(a).unwrap().incoming_flows().is_empty());
    }

    #[test]
    fn test_missing_ctrl_point_defaults_to_midpoint() {
        let mut graph = FlowGraph::new();
        let id = graph.add_flow(&rec(A, B, 1.0), &Equirectangular::default()).unwrap();
        assert_eq!(graph.flow(id).unwrap().ctrl, Point::new(5.0, 0.0));

        let with_ctrl = rec(A, C, 1.0).with_ctrl_pt(Point::new(1.0, 2.0));
        let id = graph.add_flow(&with_ctrl, &Equirectangular::default()).unwrap();
        assert_eq!(graph.flow(id).unwrap().ctrl, Point::new(1.0, 2.0));
    }

    #[test]
    fn test_add_flows_pairs_opposites_and_sorts() {
        let mut graph = FlowGraph::new();
        let ids = graph
            .add_flows(&[rec(A, B, 3.0), rec(B, A, 7.0), rec(A, C, 5.0)], &Equirectangular::default())
            .unwrap();

        let ab = graph.flow(ids[0]).unwrap();
        let ba = graph.flow(ids[1]).unwrap();
        assert_eq!(ab.opposite(), Some(ids[1]));
        assert_eq!(ba.opposite(), Some(ids[0]));
        assert_eq!(graph.flow(ids[2]).unwrap().opposite(), None);

        let values: Vec<f64> = graph.flows().map(|f| f.value).collect();
        assert_eq!(values, vec![7.0, 5.0, 3.0]);
    }

    #[test]
    fn test_opposite_pairing_takes_first_unpaired() {
        let mut graph = FlowGraph::new();
        let ids = graph
            .add_flows(
                &[rec(A, B, 1.0), rec(A, B, 2.0), rec(B, A, 3.0), rec(B, A, 4.0)],
                &Equirectangular::default(),
            )
            .unwrap();
        assert_eq!(graph.flow(ids[2]).unwrap().opposite(), Some(ids[0]));
        assert_eq!(graph.flow(ids[3]).unwrap().opposite(), Some(ids[1]));
        assert!(graph.check_invariants().is_ok());
    }

    #[test]
    fn test_single_add_does_not_pair_or_sort() {
        let mut graph = FlowGraph::new();
        let projection = Equirectangular::default();
        let first = graph.add_flow(&rec(A, B, 1.0), &projection).unwrap();
        let second = graph.add_flow(&rec(B, A, 9.0), &projection).unwrap();

        assert_eq!(graph.flow(first).unwrap().opposite(), None);
        assert_eq!(graph.flow(second).unwrap().opposite(), None);
        let order: Vec<FlowId> = graph.flow_ids().collect();
        assert_eq!(order, vec![first, second]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut graph = FlowGraph::new();
        let ids = graph
            .add_flows(&[rec(A, B, 2.0), rec(A, C, 2.0), rec(B, C, 1.0)], &Equirectangular::default())
            .unwrap();
        let order: Vec<FlowId> = graph.flow_ids().collect();
        assert_eq!(order, ids);

        graph.sort_flows(SortOrder::Ascending);
        let order: Vec<FlowId> = graph.flow_ids().collect();
        assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn test_malformed_batch_leaves_graph_unchanged() {
        let mut graph = FlowGraph::new();
        let projection = Equirectangular::default();
        graph.add_flow(&rec(A, B, 1.0), &projection).unwrap();
        let revision = graph.revision();

        let mut bad = rec(B, C, 2.0);
        bad.end_pt.lat = None;
        let err = graph
            .add_flows(&[rec(A, C, 4.0), bad, rec(C, A, 1.0)], &projection)
            .unwrap_err();

        assert_eq!(err.batch_index(), Some(1));
        assert_eq!(graph.flow_count(), 1);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.revision(), revision);
    }

    #[test]
    fn test_cancelled_batch_leaves_graph_unchanged() {
        let mut graph = FlowGraph::new();
        let token = CancelToken::new();
        token.cancel();

        let result = graph.add_flows_with_cancel(&[rec(A, B, 1.0)], &Equirectangular::default(), &token);
        assert!(matches!(result, Err(FlowMapError::Job(JobError::Cancelled { .. }))));
        assert!(graph.is_empty());
        assert_eq!(graph.revision(), 0);
    }

    #[test]
    fn test_delete_node_cascades() {
        let mut graph = FlowGraph::new();
        let ids = graph
            .add_flows(&[rec(A, B, 1.0), rec(B, A, 2.0), rec(A, C, 3.0), rec(B, C, 4.0)], &Equirectangular::default())
            .unwrap();
        let a = graph.registry().find(A.0, A.1).unwrap();
        let b = graph.registry().find(B.0, B.1).unwrap();
        let c = graph.registry().find(C.0, C.1).unwrap();

        graph.delete_node(a).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.flow_count(), 1);
        assert!(graph.flow(ids[3]).is_some());
        assert!(graph.check_invariants().is_ok());

        // No stale entries on the surviving endpoints.
        let b_node = graph.node(b).unwrap();
        assert_eq!(b_node.outgoing_flows(), &[ids[3]]);
        assert!(b_node.incoming_flows().is_empty());
        assert_eq!(graph.node(c).unwrap().incoming_flows(), &[ids[3]]);
    }

    #[test]
    fn test_delete_clears_surviving_opposite() {
        let mut graph = FlowGraph::new();
        let ids = graph
            .add_flows(&[rec(A, B, 1.0), rec(B, A, 2.0)], &Equirectangular::default())
            .unwrap();
        graph.detach_flow(ids[0]);
        assert_eq!(graph.flow(ids[1]).unwrap().opposite(), None);
        assert!(graph.check_invariants().is_ok());
    }

    #[test]
    fn test_clone_without_geometry() {
        let mut graph = FlowGraph::new();
        let ids = graph
            .add_flows(&[rec(A, B, 1.0), rec(B, A, 2.0)], &Equirectangular::default())
            .unwrap();
        let (_, flows) = graph.split_flows_mut();
        for flow in flows.values_mut() {
            flow.cache_line_segments(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        }

        let copy = graph.clone_without_geometry();
        assert_eq!(copy.revision(), graph.revision());
        assert_eq!(copy.flow_ids().collect::<Vec<_>>(), graph.flow_ids().collect::<Vec<_>>());
        assert_eq!(copy.flow(ids[0]).unwrap().opposite(), Some(ids[1]));
        assert!(copy.flows().all(|f| f.line_segments().is_none()));
        assert!(graph.flows().all(|f| f.line_segments().is_some()));
        assert!(copy.check_invariants().is_ok());
    }

    #[test]
    fn test_delete_unknown_node() {
        let mut graph = FlowGraph::new();
        let id = NodeId::new();
        assert_eq!(graph.delete_node(id), Err(GraphError::NodeNotFound(id)));
    }

    #[test]
    fn test_delete_all() {
        let mut graph = FlowGraph::new();
        graph.add_flows(&[rec(A, B, 1.0)], &Equirectangular::default()).unwrap();
        graph.delete_all();
        assert!(graph.is_empty());
        assert!(graph.check_invariants().is_ok());
    }

    #[test]
    fn test_self_loop_links_once_each_way() {
        let mut graph = FlowGraph::new();
        let id = graph.add_flow(&rec(A, A, 1.0), &Equirectangular::default()).unwrap();
        let a = graph.registry().find(A.0, A.1).unwrap();
        assert_eq!(graph.node(a).unwrap().outgoing_flows(), &[id]);
        assert_eq!(graph.node(a).unwrap().incoming_flows(), &[id]);
        graph.delete_node(a).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_locks_length_mismatch() {
        let mut graph = FlowGraph::new();
        graph
            .add_flows(&[rec(A, B, 1.0), rec(B, C, 2.0)], &Equirectangular::default())
            .unwrap();
        assert_eq!(
            graph.apply_locks(&[true]),
            Err(GraphError::LockCountMismatch { flows: 2, locks: 1 })
        );
        assert_eq!(graph.locks(), vec![false, false]);

        graph.apply_locks(&[true, false]).unwrap();
        assert_eq!(graph.locks(), vec![true, false]);
    }

    #[test]
    fn test_selection() {
        let mut graph = FlowGraph::new();
        let ids = graph.add_flows(&[rec(A, B, 1.0)], &Equirectangular::default()).unwrap();
        let a = graph.registry().find(A.0, A.1).unwrap();
        graph.set_flow_selected(ids[0], true).unwrap();
        graph.set_node_selected(a, true).unwrap();
        assert_eq!(graph.selected_flows(), ids);
        assert_eq!(graph.selected_nodes(), vec![a]);

        graph.deselect_all();
        assert!(graph.selected_flows().is_empty());
        assert!(graph.selected_nodes().is_empty());
    }

    #[test]
    fn test_set_node_value_repairs() {
        let mut graph = FlowGraph::new();
        graph.add_flow(&rec(A, B, 1.0), &Equirectangular::default()).unwrap();
        let a = graph.registry().find(A.0, A.1).unwrap();
        graph.set_node_value(a, 0.0).unwrap();
        assert_eq!(graph.node(a).unwrap().value, 1.0);
        graph.set_node_value(a, 12.0).unwrap();
        assert_eq!(graph.node(a).unwrap().value, 12.0);
    }

    #[test]
    fn test_every_mutation_bumps_revision() {
        let mut graph = FlowGraph::new();
        let projection = Equirectangular::default();
        let id = graph.add_flow(&rec(A, B, 1.0), &projection).unwrap();
        let mut last = graph.revision();

        graph.set_control_point(id, Point::new(3.0, 3.0)).unwrap();
        assert!(graph.revision() > last);
        last = graph.revision();

        graph.reproject(&Equirectangular::new(2.0));
        assert!(graph.revision() > last);
        assert_eq!(graph.baseline_length(graph.flow(id).unwrap()), 20.0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8, u8, f64),
        Batch(Vec<(u8, u8, f64)>),
        Delete(u8),
    }

    fn grid(k: u8) -> (f64, f64) {
        (f64::from(k % 3), f64::from(k / 3))
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6, 0u8..6, 1.0f64..100.0).prop_map(|(a, b, v)| Op::Add(a, b, v)),
            prop::collection::vec((0u8..6, 0u8..6, 1.0f64..100.0), 0..6).prop_map(Op::Batch),
            (0u8..6).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn prop_adjacency_survives_random_edits(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut graph = FlowGraph::new();
            let projection = Equirectangular::default();
            for op in ops {
                match op {
                    Op::Add(a, b, v) => {
                        graph.add_flow(&rec(grid(a), grid(b), v), &projection).unwrap();
                    }
                    Op::Batch(items) => {
                        let batch: Vec<FlowRecord> =
                            items.iter().map(|(a, b, v)| rec(grid(*a), grid(*b), *v)).collect();
                        graph.add_flows(&batch, &projection).unwrap();
                    }
                    Op::Delete(k) => {
                        let (lat, lng) = grid(k);
                        if let Some(id) = graph.registry().find(lat, lng) {
                            graph.delete_node(id).unwrap();
                            prop_assert!(graph.flows().all(|f| !f.touches(id)));
                        }
                    }
                }
                prop_assert!(graph.check_invariants().is_ok());
                prop_assert!(graph.node_count() <= 6);
            }
        }

        #[test]
        fn prop_opposites_are_symmetric_and_unique(pairs in prop::collection::vec((0u8..4, 0u8..4), 1..20)) {
            let mut graph = FlowGraph::new();
            let batch: Vec<FlowRecord> = pairs
                .iter()
                .enumerate()
                .map(|(i, (a, b))| rec(grid(*a), grid(*b), i as f64 + 1.0))
                .collect();
            graph.add_flows(&batch, &Equirectangular::default()).unwrap();

            let mut partners = std::collections::HashSet::new();
            for flow in graph.flows() {
                if let Some(other) = flow.opposite() {
                    let o = graph.flow(other).unwrap();
                    prop_assert_eq!(o.opposite(), Some(flow.id));
                    prop_assert!(partners.insert(other));
                }
            }
        }
    }
}
