//! Geographic to projected coordinate conversion.
//!
//! The map view owns the real projection; the model only needs something that
//! turns a (lat, lng) pair into layer pixels. Two stock projections are
//! provided for headless use and tests.

use crate::core::types::Point;
use std::f64::consts::PI;
use std::fmt::Debug;

/// Converts latitude/longitude (degrees) to projected x/y.
pub trait Projection: Send + Sync + Debug {
    /// Project a single coordinate pair.
    fn project(&self, lat: f64, lng: f64) -> Point;
}

/// Spherical Web Mercator, as used by slippy-map tile layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercator {
    /// Width of the whole world in pixels at the current zoom.
    pub world_size: f64,
    /// Pixel offset of the layer origin.
    pub origin: Point,
}

impl WebMercator {
    /// Latitude limit where the projection is square.
    pub const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

    pub fn new(world_size: f64) -> Self {
        Self {
            world_size,
            origin: Point::default(),
        }
    }

    /// World size for a tile zoom level with 256 px tiles.
    pub fn at_zoom(zoom: u32) -> Self {
        Self::new(256.0 * f64::from(1u32 << zoom.min(24)))
    }

    pub fn with_origin(mut self, origin: Point) -> Self {
        self.origin = origin;
        self
    }
}

impl Default for WebMercator {
    fn default() -> Self {
        Self::new(256.0)
    }
}

impl Projection for WebMercator {
    fn project(&self, lat: f64, lng: f64) -> Point {
        let lat = lat.clamp(-Self::MAX_LATITUDE, Self::MAX_LATITUDE);
        let phi = lat.to_radians();
        let x = (lng + 180.0) / 360.0;
        let y = 0.5 - (PI / 4.0 + phi / 2.0).tan().ln() / (2.0 * PI);
        Point::new(
            x * self.world_size - self.origin.x,
            y * self.world_size - self.origin.y,
        )
    }
}

/// Plate carree: x grows with longitude, y grows southwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Equirectangular {
    /// Pixels per degree.
    pub scale: f64,
}

impl Equirectangular {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }
}

impl Default for Equirectangular {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Projection for Equirectangular {
    fn project(&self, lat: f64, lng: f64) -> Point {
        Point::new(lng * self.scale, -lat * self.scale)
    }
}
