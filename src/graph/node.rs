//! Geographic nodes and the point records they are built from.

use crate::core::error::{Endpoint, FlowId, IngestError, IngestResult, NodeId};
use crate::core::types::{NodeGeometry, Point, RecordId};
use serde::{Deserialize, Serialize};

/// Value given to nodes whose value is missing, zero or NaN.
pub const DEFAULT_NODE_VALUE: f64 = 1.0;

/// A point as it appears in input data and in the persisted document.
///
/// Everything is optional so malformed input can be reported precisely
/// instead of failing deserialization as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PointRecord {
    /// A record with just coordinates.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat: Some(lat),
            lng: Some(lng),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_position(mut self, position: Point) -> Self {
        self.x = Some(position.x);
        self.y = Some(position.y);
        self
    }

    /// Projected position, when both coordinates are supplied.
    pub fn position(&self) -> Option<Point> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Point::new(x, y)),
            _ => None,
        }
    }

    /// Latitude and longitude of a flow endpoint, checked for presence.
    pub fn checked_lat_lng(&self, index: usize, endpoint: Endpoint) -> IngestResult<(f64, f64)> {
        let field = |name: &str, value: Option<f64>| match value {
            None => Err(IngestError::MissingCoordinate {
                index,
                endpoint,
                field: name.to_string(),
            }),
            Some(v) if !v.is_finite() => Err(IngestError::NonFiniteCoordinate {
                index,
                endpoint,
                field: name.to_string(),
            }),
            Some(v) => Ok(v),
        };
        Ok((field("lat", self.lat)?, field("lng", self.lng)?))
    }
}

/// A canonical node in the point registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Arena key.
    pub id: NodeId,
    pub lat: f64,
    pub lng: f64,
    /// Projected position.
    pub position: Point,
    pub value: f64,
    /// Identifier carried over from the input data.
    pub record_id: Option<RecordId>,
    pub region_code: Option<String>,
    pub name: Option<String>,
    pub selected: bool,
    pub geometry: NodeGeometry,
    pub(crate) outgoing: Vec<FlowId>,
    pub(crate) incoming: Vec<FlowId>,
}

impl Node {
    /// Build a node from a record whose coordinates were already checked.
    pub(crate) fn from_record(record: &PointRecord, lat: f64, lng: f64, position: Point) -> Self {
        Self {
            id: NodeId::new(),
            lat,
            lng,
            position,
            value: record.value.unwrap_or(f64::NAN),
            record_id: record.id.clone(),
            region_code: record.region_code.clone(),
            name: record.name.clone(),
            selected: false,
            geometry: NodeGeometry::Proportional,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Flows starting at this node, in insertion order.
    pub fn outgoing_flows(&self) -> &[FlowId] {
        &self.outgoing
    }

    /// Flows ending at this node, in insertion order.
    pub fn incoming_flows(&self) -> &[FlowId] {
        &self.incoming
    }

    /// Number of incident flows.
    pub fn degree(&self) -> usize {
        self.outgoing.len() + self.incoming.len()
    }

    /// Replace a missing value with [`DEFAULT_NODE_VALUE`].
    ///
    /// Returns `true` when the value was rewritten.
    pub fn repair_value(&mut self) -> bool {
        if needs_value_repair(self.value) {
            self.value = DEFAULT_NODE_VALUE;
            true
        } else {
            false
        }
    }

    /// The node as a persisted point record.
    pub fn to_record(&self) -> PointRecord {
        PointRecord {
            x: Some(self.position.x),
            y: Some(self.position.y),
            value: Some(self.value),
            lat: Some(self.lat),
            lng: Some(self.lng),
            id: self.record_id.clone(),
            region_code: self.region_code.clone(),
            name: self.name.clone(),
        }
    }

    pub(crate) fn unlink(&mut self, flow: FlowId) {
        self.outgoing.retain(|f| *f != flow);
        self.incoming.retain(|f| *f != flow);
    }
}

/// Zero and NaN count as "no value".
pub fn needs_value_repair(value: f64) -> bool {
    value == 0.0 || value.is_nan()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_value() {
        let record = PointRecord::new(1.0, 2.0);
        let mut node = Node::from_record(&record, 1.0, 2.0, Point::default());
        assert!(node.value.is_nan());
        assert!(node.repair_value());
        assert_eq!(node.value, 1.0);
        assert!(!node.repair_value());

        node.value = 0.0;
        assert!(node.repair_value());
        node.value = -3.0;
        assert!(!node.repair_value());
    }

    #[test]
    fn test_checked_lat_lng() {
        let good = PointRecord::new(46.5, 7.4);
        assert_eq!(good.checked_lat_lng(0, Endpoint::Start).unwrap(), (46.5, 7.4));

        let missing = PointRecord {
            lat: Some(1.0),
            ..PointRecord::default()
        };
        assert!(matches!(
            missing.checked_lat_lng(4, Endpoint::End),
            Err(IngestError::MissingCoordinate { index: 4, endpoint: Endpoint::End, ref field }) if field == "lng"
        ));

        let nan = PointRecord::new(f64::NAN, 0.0);
        assert!(matches!(
            nan.checked_lat_lng(0, Endpoint::Start),
            Err(IngestError::NonFiniteCoordinate { .. })
        ));
    }

    #[test]
    fn test_record_json_shape() {
        let json = r#"{"x":10,"y":20,"value":3,"lat":1.5,"lng":-2.5,"id":"A","regionCode":"WV","name":"Charleston"}"#;
        let record: PointRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.position(), Some(Point::new(10.0, 20.0)));
        assert_eq!(record.region_code.as_deref(), Some("WV"));
        assert_eq!(record.id, Some(RecordId::Text("A".to_string())));
    }
}
