//! Core value types shared by the graph and the geometry formulas.
//!
//! Positions are plain `f64` pairs in projected (pixel) space. Geographic
//! coordinates stay on the node and are only touched by the projection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in projected map space.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Linear interpolation towards `other`; `t = 0` is `self`.
    pub fn lerp(&self, other: Point, t: f64) -> Point {
        Point::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }

    /// Midpoint between two points.
    pub fn midpoint(&self, other: Point) -> Point {
        self.lerp(other, 0.5)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned bounding box in projected space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Smallest box containing a single point.
    pub fn from_point(p: Point) -> Self {
        Self {
            min_x: p.x,
            min_y: p.y,
            max_x: p.x,
            max_y: p.y,
        }
    }

    /// Grow the box to include `p`.
    pub fn include(&mut self, p: Point) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Whether two boxes overlap (touching edges count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

/// Opaque record identifier carried through from the input data.
///
/// Datasets use both numeric and textual ids, so both are accepted and
/// written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Number(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

/// How a node symbol is sized.
///
/// `External` is attached by the necklace-map layout; the geometry formulas
/// use its radius and stroke width verbatim instead of the proportional
/// symbol.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeGeometry {
    #[default]
    Proportional,
    External { radius: f64, stroke_width: f64 },
}

impl NodeGeometry {
    pub fn is_external(&self) -> bool {
        matches!(self, NodeGeometry::External { .. })
    }
}

/// Sort direction for the flow set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance(b), 5.0);
        assert_eq!(a.midpoint(b), Point::new(1.5, 2.0));
    }

    #[test]
    fn test_bounding_box_intersection() {
        let mut a = BoundingBox::from_point(Point::new(0.0, 0.0));
        a.include(Point::new(2.0, 2.0));
        let mut b = BoundingBox::from_point(Point::new(2.0, 1.0));
        b.include(Point::new(5.0, 5.0));
        let c = BoundingBox::from_point(Point::new(9.0, 9.0));

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.width(), 2.0);
        assert!(a.contains(Point::new(1.0, 1.0)));
    }

    #[test]
    fn test_record_id_untagged() {
        let n: RecordId = serde_json::from_str("7").unwrap();
        let s: RecordId = serde_json::from_str("\"WV\"").unwrap();
        assert_eq!(n, RecordId::Number(7));
        assert_eq!(s, RecordId::Text("WV".to_string()));
        assert_eq!(serde_json::to_string(&n).unwrap(), "7");
    }

    #[test]
    fn test_node_geometry_default() {
        assert_eq!(NodeGeometry::default(), NodeGeometry::Proportional);
        assert!(NodeGeometry::External {
            radius: 3.0,
            stroke_width: 1.0
        }
        .is_external());
    }
}
