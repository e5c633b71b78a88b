//! Flows: directed, value-weighted curved connectors between nodes.

use crate::core::error::{Endpoint, FlowId, IngestError, IngestResult, NodeId};
use crate::core::types::{BoundingBox, Point, RecordId};
use crate::geometry::arrow::Arrow;
use crate::geometry::curve::QuadraticBezier;
use crate::graph::node::PointRecord;
use serde::{Deserialize, Serialize};

/// A flow as it appears in input data and in the persisted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRecord {
    pub start_pt: PointRecord,
    pub end_pt: PointRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_pt: Option<Point>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
}

impl FlowRecord {
    pub fn new(start: PointRecord, end: PointRecord, value: f64) -> Self {
        Self {
            start_pt: start,
            end_pt: end,
            c_pt: None,
            value: Some(value),
            id: None,
        }
    }

    pub fn with_ctrl_pt(mut self, ctrl: Point) -> Self {
        self.c_pt = Some(ctrl);
        self
    }

    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Check that the record can be ingested. `index` is its batch position.
    pub fn validate(&self, index: usize) -> IngestResult<()> {
        self.start_pt.checked_lat_lng(index, Endpoint::Start)?;
        self.end_pt.checked_lat_lng(index, Endpoint::End)?;
        match self.value {
            None => Err(IngestError::MissingValue { index }),
            Some(v) if !v.is_finite() => Err(IngestError::NonFiniteValue { index }),
            Some(_) => Ok(()),
        }
    }
}

/// A live flow in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub id: FlowId,
    /// Identifier carried over from the input data.
    pub record_id: Option<RecordId>,
    pub(crate) start: NodeId,
    pub(crate) end: NodeId,
    /// Control point of the quadratic curve, moved by the layout optimizer.
    pub ctrl: Point,
    pub value: f64,
    pub locked: bool,
    pub selected: bool,
    pub(crate) opposite: Option<FlowId>,
    line_segments: Option<Vec<Point>>,
    bounding_box: Option<BoundingBox>,
    arrow: Option<Arrow>,
}

impl Flow {
    pub(crate) fn new(start: NodeId, end: NodeId, ctrl: Point, value: f64) -> Self {
        Self {
            id: FlowId::new(),
            record_id: None,
            start,
            end,
            ctrl,
            value,
            locked: false,
            selected: false,
            opposite: None,
            line_segments: None,
            bounding_box: None,
            arrow: None,
        }
    }

    /// Canonical start node.
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Canonical end node.
    pub fn end(&self) -> NodeId {
        self.end
    }

    /// The flow running the other way between the same nodes, if paired.
    pub fn opposite(&self) -> Option<FlowId> {
        self.opposite
    }

    /// Whether the flow starts or ends at `node`.
    pub fn touches(&self, node: NodeId) -> bool {
        self.start == node || self.end == node
    }

    /// The flow's curve given its endpoint positions.
    pub fn curve(&self, start: Point, end: Point) -> QuadraticBezier {
        QuadraticBezier::new(start, self.ctrl, end)
    }

    /// Clipped polyline from the last `cache_all_line_segments` pass.
    pub fn line_segments(&self) -> Option<&[Point]> {
        self.line_segments.as_deref()
    }

    /// Bounding box from the last `cache_all_bounding_boxes` pass.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box
    }

    /// Arrowhead from the last `configure_arrows` pass.
    pub fn arrow(&self) -> Option<&Arrow> {
        self.arrow.as_ref()
    }

    /// Move the control point. Cached geometry is dropped.
    pub fn set_ctrl(&mut self, ctrl: Point) {
        self.ctrl = ctrl;
        self.invalidate_geometry();
    }

    pub(crate) fn cache_line_segments(&mut self, points: Vec<Point>) {
        self.line_segments = Some(points);
    }

    pub(crate) fn cache_bounding_box(&mut self, bbox: BoundingBox) {
        self.bounding_box = Some(bbox);
    }

    pub(crate) fn cache_arrow(&mut self, arrow: Option<Arrow>) {
        self.arrow = arrow;
    }

    /// A copy without cached segments, bounding box and arrow.
    pub(crate) fn clone_without_geometry(&self) -> Self {
        Self {
            id: self.id,
            record_id: self.record_id.clone(),
            start: self.start,
            end: self.end,
            ctrl: self.ctrl,
            value: self.value,
            locked: self.locked,
            selected: self.selected,
            opposite: self.opposite,
            line_segments: None,
            bounding_box: None,
            arrow: None,
        }
    }

    pub(crate) fn invalidate_geometry(&mut self) {
        self.line_segments = None;
        self.bounding_box = None;
        self.arrow = None;
    }
}
