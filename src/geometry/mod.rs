//! Geometry of flows, node symbols and arrowheads.

pub mod arrow;
pub mod curve;
pub mod formulas;

pub use arrow::{Arrow, ArrowBuilder, ArrowParams, TaperedArrowBuilder};
pub use curve::QuadraticBezier;
pub use formulas::{flow_point_gap, GeometryContext, NodeSymbol};
