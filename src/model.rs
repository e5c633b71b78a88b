//! The flow map model.
//!
//! [`FlowMap`] ties the flow graph to its settings, projection, arrow builder
//! and aggregate cache. It is the entry point for ingestion, editing,
//! geometry queries and persistence. Every mutating call leaves the
//! aggregate snapshot fresh.

use crate::core::error::{
    FlowId, FlowMapResult, GraphResult, IngestResult, JobError, MapId, NodeId, SettingsResult,
};
use crate::core::projection::{Projection, WebMercator};
use crate::core::settings::{ArrowSettings, DrawSettings, Settings};
use crate::core::types::{NodeGeometry, Point, RecordId, SortOrder};
use crate::execution::jobs::PreparedFlowMap;
use crate::execution::progress::CancelToken;
use crate::geometry::arrow::{ArrowBuilder, TaperedArrowBuilder};
use crate::geometry::formulas::{GeometryContext, NodeSymbol};
use crate::graph::aggregate::{AggregateCache, Aggregates, LengthRange};
use crate::graph::flow::FlowRecord;
use crate::graph::node::{Node, PointRecord};
use crate::graph::registry::DedupPolicy;
use crate::graph::serialization::FlowMapDocument;
use crate::graph::structure::FlowGraph;
use crate::graph::tables::{self, Table};
use rayon::prelude::*;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// A flow map: graph, settings and derived data.
///
/// Cloning gives the copy a new [`MapId`], so job results taken from one map
/// are never committed into a clone of it.
#[derive(Debug)]
pub struct FlowMap {
    instance: MapId,
    graph: FlowGraph,
    settings: Settings,
    arrow_settings: ArrowSettings,
    draw_settings: DrawSettings,
    projection: Arc<dyn Projection>,
    arrow_builder: Arc<dyn ArrowBuilder>,
    cache: AggregateCache,
    /// Bumped by settings changes, which the graph revision does not see.
    settings_revision: u64,
}

impl Clone for FlowMap {
    fn clone(&self) -> Self {
        Self {
            instance: MapId::new(),
            graph: self.graph.clone(),
            settings: self.settings.clone(),
            arrow_settings: self.arrow_settings,
            draw_settings: self.draw_settings,
            projection: self.projection.clone(),
            arrow_builder: self.arrow_builder.clone(),
            cache: self.cache.clone(),
            settings_revision: self.settings_revision,
        }
    }
}

impl Default for FlowMap {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowMap {
    /// Empty map with default settings and a Web Mercator projection.
    pub fn new() -> Self {
        Self {
            instance: MapId::new(),
            graph: FlowGraph::new(),
            settings: Settings::default(),
            arrow_settings: ArrowSettings::default(),
            draw_settings: DrawSettings::default(),
            projection: Arc::new(WebMercator::default()),
            arrow_builder: Arc::new(TaperedArrowBuilder),
            cache: AggregateCache::new(),
            settings_revision: 0,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_projection(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_arrow_builder(mut self, builder: Arc<dyn ArrowBuilder>) -> Self {
        self.arrow_builder = builder;
        self
    }

    /// Replace the (empty) graph with one using another dedup policy.
    pub fn with_dedup_policy(mut self, policy: DedupPolicy) -> Self {
        self.graph = FlowGraph::with_dedup_policy(policy);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn arrow_settings(&self) -> &ArrowSettings {
        &self.arrow_settings
    }

    pub fn draw_settings(&self) -> &DrawSettings {
        &self.draw_settings
    }

    pub fn projection(&self) -> &Arc<dyn Projection> {
        &self.projection
    }

    pub fn id(&self) -> MapId {
        self.instance
    }

    /// Changes whenever the graph or the settings change.
    pub fn revision(&self) -> u64 {
        self.graph.revision().wrapping_add(self.settings_revision)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node(id)
    }

    pub fn find_node_by_record_id(&self, record_id: &RecordId) -> Option<&Node> {
        self.graph.find_node_by_record_id(record_id)
    }

    // ========================================================================
    // Ingestion and deletion
    // ========================================================================

    pub fn register_point(&mut self, record: &PointRecord) -> IngestResult<NodeId> {
        let id = self.graph.register_point(record, self.projection.as_ref())?;
        self.refresh();
        Ok(id)
    }

    /// Add one flow. Does not pair opposite flows or re-sort.
    pub fn add_flow(&mut self, record: &FlowRecord) -> IngestResult<FlowId> {
        let id = self.graph.add_flow(record, self.projection.as_ref())?;
        self.refresh();
        Ok(id)
    }

    /// Add a batch of flows as one transaction.
    pub fn add_flows(&mut self, batch: &[FlowRecord]) -> IngestResult<Vec<FlowId>> {
        let ids = self.graph.add_flows(batch, self.projection.as_ref())?;
        self.refresh();
        Ok(ids)
    }

    /// Add a batch of flows, giving up when `cancel` fires.
    pub fn add_flows_with_cancel(&mut self, batch: &[FlowRecord], cancel: &CancelToken) -> FlowMapResult<Vec<FlowId>> {
        let ids = self
            .graph
            .add_flows_with_cancel(batch, self.projection.as_ref(), cancel)?;
        self.refresh();
        Ok(ids)
    }

    /// Delete a node and all flows touching it.
    pub fn delete_node(&mut self, id: NodeId) -> GraphResult<Node> {
        let node = self.graph.delete_node(id)?;
        self.refresh();
        Ok(node)
    }

    pub fn delete_all(&mut self) {
        self.graph.delete_all();
        self.refresh();
    }

    // ========================================================================
    // Aggregates and geometry
    // ========================================================================

    /// Rewrite missing, zero or NaN node values to 1.
    pub fn repair_node_values(&mut self) -> usize {
        let repaired = self.graph.repair_node_values();
        self.refresh();
        repaired
    }

    /// Repair node values, then recompute every aggregate.
    pub fn recompute(&mut self) -> Aggregates {
        self.graph.repair_node_values();
        *self.cache.recompute(&self.graph)
    }

    /// The current aggregate snapshot.
    pub fn aggregates(&self) -> Aggregates {
        self.cache
            .fresh(self.graph.revision())
            .copied()
            .unwrap_or_else(|| Aggregates::compute(&self.graph))
    }

    /// Shortest and longest flow baseline.
    pub fn flow_length_range(&mut self) -> LengthRange {
        self.cache.length_range(&self.graph)
    }

    /// Geometry formulas bound to the current settings and aggregates.
    pub fn geometry(&self) -> GeometryContext<'_> {
        GeometryContext::new(&self.settings, self.aggregates())
    }

    pub fn node_radius(&self, value: f64) -> f64 {
        self.geometry().node_radius(value)
    }

    pub fn node_symbol(&self, id: NodeId) -> Option<NodeSymbol> {
        Some(self.geometry().node_symbol(self.graph.node(id)?))
    }

    /// Stroke width of a flow.
    pub fn flow_stroke_width(&self, id: FlowId) -> Option<f64> {
        Some(self.geometry().flow_stroke_width(self.graph.flow(id)?.value))
    }

    /// Start and end clip radius of a flow.
    pub fn clip_radii(&self, id: FlowId) -> Option<(f64, f64)> {
        let (start, end) = self.graph.flow_endpoints(id)?;
        let ctx = self.geometry();
        Some((ctx.start_clip_radius(start), ctx.end_clip_radius(end)))
    }

    pub fn flow_point_gap(&self) -> f64 {
        self.geometry().flow_point_gap()
    }

    /// Build and cache an arrowhead for every flow.
    ///
    /// Returns how many flows got an arrow; flows swallowed by their clip
    /// circles get none.
    pub fn configure_arrows(&mut self) -> usize {
        self.configure_arrows_until(None)
    }

    /// Cache the clipped polyline of every flow.
    pub fn cache_all_line_segments(&mut self) -> usize {
        self.cache_line_segments_until(None)
    }

    /// Cache the bounding box of every flow.
    pub fn cache_all_bounding_boxes(&mut self) -> usize {
        self.cache_bounding_boxes_until(None)
    }

    pub(crate) fn configure_arrows_until(&mut self, cancel: Option<&CancelToken>) -> usize {
        let ctx = GeometryContext::new(&self.settings, self.aggregates());
        let shape = self.arrow_settings;
        let builder = self.arrow_builder.as_ref();
        let (registry, flows) = self.graph.split_flows_mut();

        flows
            .par_values_mut()
            .map(|flow| {
                if cancel.map_or(false, CancelToken::is_cancelled) {
                    return 0;
                }
                let (Some(start), Some(end)) = (registry.get(flow.start()), registry.get(flow.end())) else {
                    return 0;
                };
                let curve = flow.curve(start.position, end.position);
                let arrow = builder.build(&curve, &ctx.arrow_params(flow.value, end, shape));
                let built = usize::from(arrow.is_some());
                flow.cache_arrow(arrow);
                built
            })
            .sum()
    }

    pub(crate) fn cache_line_segments_until(&mut self, cancel: Option<&CancelToken>) -> usize {
        let ctx = GeometryContext::new(&self.settings, self.aggregates());
        let gap = ctx.flow_point_gap();
        let (registry, flows) = self.graph.split_flows_mut();

        flows
            .par_values_mut()
            .map(|flow| {
                if cancel.map_or(false, CancelToken::is_cancelled) {
                    return 0;
                }
                let (Some(start), Some(end)) = (registry.get(flow.start()), registry.get(flow.end())) else {
                    return 0;
                };
                let (rs, re) = ctx.segment_clip_radii(start, end);
                let points = flow.curve(start.position, end.position).clipped_polyline(rs, re, gap);
                flow.cache_line_segments(points);
                1
            })
            .sum()
    }

    pub(crate) fn cache_bounding_boxes_until(&mut self, cancel: Option<&CancelToken>) -> usize {
        let (registry, flows) = self.graph.split_flows_mut();

        flows
            .par_values_mut()
            .map(|flow| {
                if cancel.map_or(false, CancelToken::is_cancelled) {
                    return 0;
                }
                let (Some(start), Some(end)) = (registry.get(flow.start()), registry.get(flow.end())) else {
                    return 0;
                };
                let bbox = flow.curve(start.position, end.position).bounding_box();
                flow.cache_bounding_box(bbox);
                1
            })
            .sum()
    }

    /// Run every derived-data pass on this thread.
    pub fn prepare(&mut self) {
        self.recompute();
        let segments = self.cache_all_line_segments();
        self.cache_all_bounding_boxes();
        let arrows = self.configure_arrows();
        log::info!(
            "Prepared {} flows: {} polylines, {} arrows",
            self.graph.flow_count(),
            segments,
            arrows
        );
    }

    // ========================================================================
    // Edits
    // ========================================================================

    pub fn sort_flows(&mut self, order: SortOrder) {
        self.graph.sort_flows(order);
        self.refresh();
    }

    pub fn locks(&self) -> Vec<bool> {
        self.graph.locks()
    }

    pub fn apply_locks(&mut self, locks: &[bool]) -> GraphResult<()> {
        self.graph.apply_locks(locks)?;
        self.refresh();
        Ok(())
    }

    pub fn selected_flows(&self) -> Vec<FlowId> {
        self.graph.selected_flows()
    }

    pub fn selected_nodes(&self) -> Vec<NodeId> {
        self.graph.selected_nodes()
    }

    pub fn set_flow_selected(&mut self, id: FlowId, selected: bool) -> GraphResult<()> {
        self.graph.set_flow_selected(id, selected)?;
        self.refresh();
        Ok(())
    }

    pub fn set_node_selected(&mut self, id: NodeId, selected: bool) -> GraphResult<()> {
        self.graph.set_node_selected(id, selected)?;
        self.refresh();
        Ok(())
    }

    pub fn deselect_all(&mut self) {
        self.graph.deselect_all();
        self.refresh();
    }

    pub fn control_points(&self) -> Vec<Point> {
        self.graph.control_points()
    }

    pub fn set_control_point(&mut self, id: FlowId, ctrl: Point) -> GraphResult<()> {
        self.graph.set_control_point(id, ctrl)?;
        self.refresh();
        Ok(())
    }

    pub fn set_flow_value(&mut self, id: FlowId, value: f64) -> GraphResult<()> {
        self.graph.set_flow_value(id, value)?;
        self.refresh();
        Ok(())
    }

    pub fn set_node_value(&mut self, id: NodeId, value: f64) -> GraphResult<()> {
        self.graph.set_node_value(id, value)?;
        self.refresh();
        Ok(())
    }

    /// Attach or clear a necklace-map symbol override.
    pub fn set_node_geometry(&mut self, id: NodeId, geometry: NodeGeometry) -> GraphResult<()> {
        self.graph.set_node_geometry(id, geometry)?;
        self.refresh();
        Ok(())
    }

    /// Switch projection and recompute every node position.
    pub fn reproject(&mut self, projection: Arc<dyn Projection>) {
        self.projection = projection;
        self.graph.reproject(self.projection.as_ref());
        self.refresh();
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Overwrite every recognized setting from a flat record.
    ///
    /// A missing key leaves the settings unchanged.
    pub fn apply_settings(&mut self, record: &Value) -> SettingsResult<()> {
        self.settings.apply_record(record)?;
        self.settings_changed();
        Ok(())
    }

    pub fn set_settings(&mut self, settings: Settings) -> SettingsResult<()> {
        settings.validate()?;
        self.settings = settings;
        self.settings_changed();
        Ok(())
    }

    pub fn set_arrow_settings(&mut self, arrow: ArrowSettings) {
        self.arrow_settings = arrow;
        self.settings_changed();
    }

    pub fn set_draw_settings(&mut self, draw: DrawSettings) {
        self.draw_settings = draw;
        self.settings_revision = self.settings_revision.wrapping_add(1);
    }

    /// Use the preset map scale of a US state, if there is one.
    pub fn use_state_map_scale(&mut self, state: &str) -> bool {
        let applied = self.settings.use_state_map_scale(state);
        if applied {
            self.settings_changed();
        }
        applied
    }

    fn settings_changed(&mut self) {
        self.settings_revision = self.settings_revision.wrapping_add(1);
        self.graph.invalidate_geometry();
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// The model as a document.
    pub fn serialize(&self) -> FlowMapDocument {
        FlowMapDocument::new(&self.settings)
            .with_arrow_settings(self.arrow_settings)
            .with_draw_settings(self.draw_settings)
            .with_flows_from(&self.graph)
    }

    /// Merge a document into the model.
    ///
    /// The document's flows go through the batch path on top of the current
    /// graph, so they share nodes and pair with flows already present. Then
    /// the settings are applied. Nothing changes if either step fails.
    pub fn deserialize(&mut self, document: &FlowMapDocument) -> FlowMapResult<()> {
        let mut graph = self.graph.clone();
        graph.add_flows(&document.flows, self.projection.as_ref())?;

        let mut settings = self.settings.clone();
        settings.apply_record(&document.settings)?;

        self.graph = graph;
        self.settings = settings;
        if let Some(arrow) = document.arrow_settings {
            self.arrow_settings = arrow;
        }
        if let Some(draw) = document.draw_settings {
            self.draw_settings = draw;
        }
        self.settings_revision = self.settings_revision.wrapping_add(1);
        self.refresh();

        log::info!(
            "Loaded {} flows ({} flows, {} nodes total)",
            document.flows.len(),
            self.graph.flow_count(),
            self.graph.node_count()
        );
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> FlowMapResult<()> {
        self.serialize().save(path)
    }

    /// Load a document into a new model with the default projection.
    pub fn load(path: impl AsRef<Path>) -> FlowMapResult<Self> {
        let document = FlowMapDocument::load(path)?;
        let mut map = Self::new();
        map.deserialize(&document)?;
        Ok(map)
    }

    pub fn node_table(&self, editable: bool) -> Table {
        tables::node_table(&self.graph, editable)
    }

    pub fn flow_table(&self) -> Table {
        tables::flow_table(&self.graph)
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// The copy a background job works on.
    ///
    /// Keeps this map's id and revision. Cached flow geometry is left out
    /// since every job recomputes it.
    pub(crate) fn job_copy(&self) -> Self {
        Self {
            instance: self.instance,
            graph: self.graph.clone_without_geometry(),
            settings: self.settings.clone(),
            arrow_settings: self.arrow_settings,
            draw_settings: self.draw_settings,
            projection: self.projection.clone(),
            arrow_builder: self.arrow_builder.clone(),
            cache: self.cache.clone(),
            settings_revision: self.settings_revision,
        }
    }

    /// Swap in the result of a background job.
    ///
    /// Fails with [`JobError::ForeignModel`] when the job copied another map,
    /// and with [`JobError::Stale`] when this map changed after the job took
    /// its copy.
    pub fn commit(&mut self, prepared: PreparedFlowMap) -> Result<(), JobError> {
        let (origin, base_revision, model) = prepared.into_parts();
        if origin != self.instance {
            return Err(JobError::ForeignModel {
                expected: origin,
                actual: self.instance,
            });
        }
        if base_revision != self.revision() {
            return Err(JobError::Stale {
                expected: base_revision,
                actual: self.revision(),
            });
        }
        *self = Self {
            instance: self.instance,
            ..model
        };
        log::debug!("Committed job result at revision {}", self.revision());
        Ok(())
    }

    fn refresh(&mut self) {
        self.cache.refresh(&self.graph);
    }
}
