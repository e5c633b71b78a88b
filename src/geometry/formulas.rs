//! Proportional symbol, stroke, clipping and sampling formulas.
//!
//! All formulas read the current aggregate snapshot and the settings and
//! nothing else. None of them mutate the graph.

use crate::core::settings::{ArrowSettings, Settings};
use crate::core::types::NodeGeometry;
use crate::geometry::arrow::ArrowParams;
use crate::graph::aggregate::Aggregates;
use crate::graph::node::Node;
use std::f64::consts::PI;

/// Resolved size of a node symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSymbol {
    pub radius: f64,
    pub stroke_width: f64,
}

/// Read-only view of settings and statistics for geometry queries.
#[derive(Debug, Clone, Copy)]
pub struct GeometryContext<'a> {
    settings: &'a Settings,
    stats: Aggregates,
}

impl<'a> GeometryContext<'a> {
    pub fn new(settings: &'a Settings, stats: Aggregates) -> Self {
        Self { settings, stats }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn stats(&self) -> &Aggregates {
        &self.stats
    }

    /// Radius of a proportional node symbol.
    ///
    /// Symbol area is linear in value: the largest node gets
    /// `max_node_radius`. Before any node value is known the scale collapses
    /// to the absolute maximum area.
    pub fn node_radius(&self, value: f64) -> f64 {
        let max_radius = self.settings.max_node_radius;
        let max_area = PI * max_radius * max_radius;
        let max_value = self.stats.max_node_value;
        let area_per_unit = if max_value == 0.0 || !max_value.is_finite() {
            max_area
        } else {
            max_area / max_value
        };
        ((value * area_per_unit).abs() / PI).sqrt()
    }

    /// Radius and stroke of a node, honoring necklace-map overrides.
    pub fn node_symbol(&self, node: &Node) -> NodeSymbol {
        match node.geometry {
            NodeGeometry::Proportional => NodeSymbol {
                radius: self.node_radius(node.value),
                stroke_width: self.settings.node_stroke_width,
            },
            NodeGeometry::External { radius, stroke_width } => NodeSymbol { radius, stroke_width },
        }
    }

    /// Stroke width of a flow, linear over `[0, max_flow_value]`.
    pub fn flow_stroke_width(&self, value: f64) -> f64 {
        let max_value = self.stats.max_flow_value;
        if max_value == 0.0 {
            return 0.0;
        }
        self.settings.max_flow_width * value / max_value
    }

    /// Stroke width of the smallest flow.
    pub fn min_flow_width(&self) -> f64 {
        self.flow_stroke_width(self.stats.min_flow_value)
    }

    /// Distance from a node's center where incident flows are cut.
    pub fn clip_radius(&self, node: &Node, pixel_offset: f64) -> f64 {
        match node.geometry {
            NodeGeometry::Proportional => {
                pixel_offset + self.node_radius(node.value) + self.settings.node_stroke_width / 2.0
            }
            NodeGeometry::External { radius, stroke_width } => radius + stroke_width,
        }
    }

    pub fn start_clip_radius(&self, node: &Node) -> f64 {
        self.clip_radius(node, self.settings.flow_distance_from_start_point_pixel)
    }

    pub fn end_clip_radius(&self, node: &Node) -> f64 {
        self.clip_radius(node, self.settings.flow_distance_from_end_point_pixel)
    }

    /// Clip radii used when caching line segments.
    ///
    /// A side whose pixel offset setting is zero is not clipped at all.
    pub fn segment_clip_radii(&self, start: &Node, end: &Node) -> (f64, f64) {
        let rs = if self.settings.flow_distance_from_start_point_pixel > 0.0 {
            self.start_clip_radius(start)
        } else {
            0.0
        };
        let re = if self.settings.flow_distance_from_end_point_pixel > 0.0 {
            self.end_clip_radius(end)
        } else {
            0.0
        };
        (rs, re)
    }

    /// Sampling gap for the current flow length range.
    pub fn flow_point_gap(&self) -> f64 {
        flow_point_gap(
            self.stats.min_flow_length,
            self.stats.max_flow_length,
            self.settings.max_flow_points,
        )
    }

    /// Arrow builder inputs for one flow.
    pub fn arrow_params(&self, flow_value: f64, end: &Node, shape: ArrowSettings) -> ArrowParams {
        ArrowParams {
            end_clip_radius: self.end_clip_radius(end),
            min_flow_width: self.min_flow_width(),
            max_flow_width: self.settings.max_flow_width,
            flow_width: self.flow_stroke_width(flow_value),
            shape,
        }
    }
}

/// Distance between sampled points along a flow.
///
/// Shorter flows get finer sampling, but the longest flow never needs more
/// than `max_flow_points` interior points.
pub fn flow_point_gap(shortest: f64, longest: f64, max_flow_points: u32) -> f64 {
    let slots = f64::from(max_flow_points) + 1.0;
    let tol = shortest / slots;
    if longest / tol <= slots {
        tol
    } else {
        longest / slots
    }
}
