//! Geographic primitives: points, great-circle distance and viewport boxes.
//!
//! Everything here is plain arithmetic; no projection library is involved.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Distance under which a decoded route endpoint is snapped onto its marker
/// instead of getting a connector point.
pub const DEFAULT_NEARBY_THRESHOLD_M: f64 = 50.0;

/// Fraction of the route span added on each side of a viewport.
pub const DEFAULT_BOX_PADDING: f64 = 0.2;

/// Padding floor in degrees (~110 m) so a single-point box is still a box.
pub const MIN_BOX_PADDING_DEG: f64 = 0.001;

/// Average driving speed assumed for straight-line duration estimates.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// A WGS84 position in degrees, with an optional third dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng, alt: None }
    }

    pub fn with_alt(lat: f64, lng: f64, alt: f64) -> Self {
        Self {
            lat,
            lng,
            alt: Some(alt),
        }
    }

    /// True when latitude is within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<(f64, f64)> for GeoPoint {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self::new(lat, lng)
    }
}

/// Great-circle distance between two points in meters.
pub fn haversine_distance(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let lat1_rad = p1.lat.to_radians();
    let lat2_rad = p2.lat.to_radians();
    let delta_lat = (p2.lat - p1.lat).to_radians();
    let delta_lng = (p2.lng - p1.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Whether two points are within `threshold_m` meters of each other.
pub fn is_nearby(p1: GeoPoint, p2: GeoPoint, threshold_m: f64) -> bool {
    haversine_distance(p1, p2) <= threshold_m
}

/// Axis-aligned box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.lat) && (self.west..=self.east).contains(&point.lng)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }
}

/// Box enclosing `points`, grown by `padding_fraction` of its span on every
/// side. Each axis gets at least [`MIN_BOX_PADDING_DEG`] of padding.
///
/// Returns `None` for an empty slice.
pub fn bounding_box_with_padding(points: &[GeoPoint], padding_fraction: f64) -> Option<BoundingBox> {
    let first = points.first()?;
    let mut bbox = BoundingBox {
        south: first.lat,
        west: first.lng,
        north: first.lat,
        east: first.lng,
    };
    for p in &points[1..] {
        bbox.south = bbox.south.min(p.lat);
        bbox.north = bbox.north.max(p.lat);
        bbox.west = bbox.west.min(p.lng);
        bbox.east = bbox.east.max(p.lng);
    }

    let pad_lat = ((bbox.north - bbox.south) * padding_fraction).max(MIN_BOX_PADDING_DEG);
    let pad_lng = ((bbox.east - bbox.west) * padding_fraction).max(MIN_BOX_PADDING_DEG);

    Some(BoundingBox {
        south: (bbox.south - pad_lat).max(-90.0),
        west: (bbox.west - pad_lng).max(-180.0),
        north: (bbox.north + pad_lat).min(90.0),
        east: (bbox.east + pad_lng).min(180.0),
    })
}

/// Straight-line travel estimate used when no road route is available.
///
/// Ignores the road network entirely, so it underestimates real distance,
/// but it never fails.
#[derive(Debug, Clone)]
pub struct StraightLineEstimator {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for StraightLineEstimator {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl StraightLineEstimator {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Distance in meters and estimated duration in seconds.
    pub fn estimate(&self, from: GeoPoint, to: GeoPoint) -> (f64, u32) {
        let meters = haversine_distance(from, to);
        (meters, self.meters_to_seconds(meters))
    }

    fn meters_to_seconds(&self, meters: f64) -> u32 {
        if self.speed_kmh <= 0.0 {
            return 0;
        }
        let hours = meters / 1000.0 / self.speed_kmh;
        (hours * 3600.0).round() as u32
    }
}
