//! Arrowhead geometry.
//!
//! The model computes the inputs for every flow's arrow (clip radius, width
//! bounds, flow width, shape settings) and hands them to an [`ArrowBuilder`].
//! Renderers with their own arrow style can plug in a different builder.

use crate::core::settings::ArrowSettings;
use crate::core::types::Point;
use crate::geometry::curve::QuadraticBezier;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Everything an arrow builder receives for one flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrowParams {
    /// Clip radius around the flow's end node.
    pub end_clip_radius: f64,
    /// Stroke width of the smallest flow in the map.
    pub min_flow_width: f64,
    /// Stroke width of the largest flow in the map.
    pub max_flow_width: f64,
    /// Stroke width of this flow.
    pub flow_width: f64,
    pub shape: ArrowSettings,
}

/// Outline of an arrowhead.
///
/// The two sides run from a corner to the tip as quadratic curves through
/// the corresponding control point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrow {
    pub tip: Point,
    /// Center of the arrow base on the flow curve.
    pub base: Point,
    pub corner1: Point,
    pub corner2: Point,
    pub corner1_ctrl: Point,
    pub corner2_ctrl: Point,
    pub length: f64,
    pub width: f64,
    /// Curve parameter of `base`; the flow line is drawn up to here.
    pub base_parameter: f64,
}

/// Produces arrow outlines from per-flow parameters.
pub trait ArrowBuilder: Send + Sync + Debug {
    /// Build the arrow for a flow, or `None` when the flow is entirely
    /// hidden by its clip circles.
    fn build(&self, curve: &QuadraticBezier, params: &ArrowParams) -> Option<Arrow>;
}

/// Tapered arrowheads sized from the flow width.
///
/// Every arrow gets `size_ratio * max_flow_width` on top of its flow width so
/// thin flows keep a visible head. Length and width scale from that base;
/// the length is capped at `length_ratio` of the flow's baseline and the
/// width shrinks with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaperedArrowBuilder;

impl ArrowBuilder for TaperedArrowBuilder {
    fn build(&self, curve: &QuadraticBezier, params: &ArrowParams) -> Option<Arrow> {
        let shape = &params.shape;
        let base_size = params.flow_width + shape.size_ratio * params.max_flow_width;
        let mut length = base_size * shape.length_scale_factor;
        let mut width = base_size * (1.0 + shape.width_scale_factor);

        let max_length = shape.length_ratio * curve.baseline_length();
        if length > max_length && length > 0.0 {
            width *= max_length / length;
            length = max_length;
        }

        let tip_parameter = curve.clip_parameter(params.end_clip_radius, false)?;
        let tip_on_curve = curve.point_at(tip_parameter);
        let base_parameter = curve.parameter_before(tip_parameter, length);
        let base = curve.point_at(base_parameter);

        let toward = if shape.point_towards_endpoint { curve.end } else { tip_on_curve };
        let axis = unit(base, toward).or_else(|| {
            let tangent = curve.tangent_at(tip_parameter);
            unit(Point::default(), tangent)
        })?;
        let perp = Point::new(-axis.y, axis.x);

        let tip = translate(base, axis, length);
        let corner_center = translate(base, axis, shape.corner_position * length);
        let half = width / 2.0;
        let corner1 = translate(corner_center, perp, half);
        let corner2 = translate(corner_center, perp, -half);

        let along = corner_center.distance(tip) * shape.edge_ctrl_length;
        let ctrl_center = translate(corner_center, axis, along);
        let corner1_ctrl = translate(ctrl_center, perp, half * shape.edge_ctrl_width);
        let corner2_ctrl = translate(ctrl_center, perp, -half * shape.edge_ctrl_width);

        Some(Arrow {
            tip,
            base,
            corner1,
            corner2,
            corner1_ctrl,
            corner2_ctrl,
            length,
            width,
            base_parameter,
        })
    }
}

fn unit(from: Point, to: Point) -> Option<Point> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let len = dx.hypot(dy);
    (len > f64::EPSILON).then(|| Point::new(dx / len, dy / len))
}

fn translate(p: Point, direction: Point, distance: f64) -> Point {
    Point::new(p.x + direction.x * distance, p.y + direction.y * distance)
}
