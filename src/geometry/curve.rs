//! Quadratic Bezier geometry for a single flow.
//!
//! A flow is drawn as a quadratic curve from its start node through one
//! control point to its end node. Everything here is pure math on three
//! points; the graph decides which points to pass in.

use crate::core::types::{BoundingBox, Point};

/// Samples used when searching the curve for a clip circle crossing.
const SEARCH_STEPS: usize = 64;

/// Bisection rounds after the coarse search.
const BISECTION_STEPS: usize = 40;

/// Upper bound on segments produced for one flow.
const MAX_SEGMENTS: usize = 10_000;

/// A quadratic Bezier curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticBezier {
    pub start: Point,
    pub ctrl: Point,
    pub end: Point,
}

impl QuadraticBezier {
    pub fn new(start: Point, ctrl: Point, end: Point) -> Self {
        Self { start, ctrl, end }
    }

    /// A straight curve with the control point on the baseline midpoint.
    pub fn straight(start: Point, end: Point) -> Self {
        Self::new(start, start.midpoint(end), end)
    }

    /// Point on the curve at parameter `t` in `[0, 1]`.
    pub fn point_at(&self, t: f64) -> Point {
        let u = 1.0 - t;
        let a = u * u;
        let b = 2.0 * u * t;
        let c = t * t;
        Point::new(
            a * self.start.x + b * self.ctrl.x + c * self.end.x,
            a * self.start.y + b * self.ctrl.y + c * self.end.y,
        )
    }

    /// First derivative (tangent vector) at `t`.
    pub fn tangent_at(&self, t: f64) -> Point {
        let u = 1.0 - t;
        Point::new(
            2.0 * u * (self.ctrl.x - self.start.x) + 2.0 * t * (self.end.x - self.ctrl.x),
            2.0 * u * (self.ctrl.y - self.start.y) + 2.0 * t * (self.end.y - self.ctrl.y),
        )
    }

    /// Straight-line distance between the endpoints.
    pub fn baseline_length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// Length of the control polygon, an upper bound of the arc length.
    pub fn control_polygon_length(&self) -> f64 {
        self.start.distance(self.ctrl) + self.ctrl.distance(self.end)
    }

    /// Exact bounding box, including the curve's extreme points.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::from_point(self.start);
        bbox.include(self.end);
        let extremum = |s: f64, c: f64, e: f64| {
            let denominator = s - 2.0 * c + e;
            if denominator.abs() < f64::EPSILON {
                None
            } else {
                let t = (s - c) / denominator;
                (t > 0.0 && t < 1.0).then_some(t)
            }
        };
        if let Some(t) = extremum(self.start.x, self.ctrl.x, self.end.x) {
            bbox.include(self.point_at(t));
        }
        if let Some(t) = extremum(self.start.y, self.ctrl.y, self.end.y) {
            bbox.include(self.point_at(t));
        }
        bbox
    }

    /// Parameter where the curve leaves a circle of `radius` around an
    /// endpoint.
    ///
    /// Searches from the start when `from_start` is true, otherwise from the
    /// end backwards. Returns `None` when the whole curve stays inside.
    pub fn clip_parameter(&self, radius: f64, from_start: bool) -> Option<f64> {
        let (anchor, edge) = if from_start { (self.start, 0.0) } else { (self.end, 1.0) };
        if radius <= 0.0 {
            return Some(edge);
        }
        let param = |i: usize| {
            let t = i as f64 / SEARCH_STEPS as f64;
            if from_start {
                t
            } else {
                1.0 - t
            }
        };
        let outside = |t: f64| self.point_at(t).distance(anchor) >= radius;

        let hit = (1..=SEARCH_STEPS).find(|&i| outside(param(i)))?;
        let (mut inside_t, mut outside_t) = (param(hit - 1), param(hit));
        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (inside_t + outside_t);
            if outside(mid) {
                outside_t = mid;
            } else {
                inside_t = mid;
            }
        }
        Some(outside_t)
    }

    /// Parameter reached by walking `distance` along the curve backwards
    /// from `t_from`. Clamped at the start of the curve.
    pub fn parameter_before(&self, t_from: f64, distance: f64) -> f64 {
        if distance <= 0.0 || t_from <= 0.0 {
            return t_from.max(0.0);
        }
        let steps = SEARCH_STEPS * 4;
        let dt = t_from / steps as f64;
        let mut walked = 0.0;
        let mut previous = self.point_at(t_from);
        for i in 1..=steps {
            let t = t_from - dt * i as f64;
            let current = self.point_at(t);
            let segment = previous.distance(current);
            if walked + segment >= distance && segment > 0.0 {
                let fraction = (distance - walked) / segment;
                return t + dt * (1.0 - fraction);
            }
            walked += segment;
            previous = current;
        }
        0.0
    }

    /// Straight line segments approximating the curve between the two clip
    /// circles, with roughly `gap` spacing between consecutive points.
    ///
    /// Returns an empty list when the clip circles swallow the whole curve.
    pub fn clipped_polyline(&self, start_radius: f64, end_radius: f64, gap: f64) -> Vec<Point> {
        let t0 = match self.clip_parameter(start_radius, true) {
            Some(t) => t,
            None => return Vec::new(),
        };
        let t1 = match self.clip_parameter(end_radius, false) {
            Some(t) => t,
            None => return Vec::new(),
        };
        if t0 >= t1 {
            return Vec::new();
        }

        let span = self.control_polygon_length() * (t1 - t0);
        let segments = if gap > 0.0 && gap.is_finite() && span.is_finite() {
            ((span / gap).ceil() as usize).clamp(1, MAX_SEGMENTS)
        } else {
            1
        };

        (0..=segments)
            .map(|i| self.point_at(t0 + (t1 - t0) * i as f64 / segments as f64))
            .collect()
    }
}
