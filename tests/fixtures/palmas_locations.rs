//! Palmas (TO) locations for realistic test fixtures.
//!
//! Coordinates are approximate street-level positions around the city
//! centre; the store sits in the Plano Diretor Sul.

use checkout_geo::geo::GeoPoint;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

pub const STORE: Location = Location::new("Loja Plano Diretor Sul", -10.1854332, -48.3038653);

pub const CUSTOMER: Location = Location::new("Cliente Quadra 104 Sul", -10.1900, -48.3100);

// ============================================================================
// Inside the delivery area
// ============================================================================

pub const IN_ZONE: &[Location] = &[
    Location::new("Praça dos Girassóis", -10.1843, -48.3336),
    Location::new("Quadra 204 Sul", -10.1935, -48.3262),
    Location::new("Quadra 106 Norte", -10.1762, -48.3310),
];

// ============================================================================
// Outside the delivery area
// ============================================================================

pub const OUT_OF_ZONE: &[Location] = &[
    Location::new("Porto Nacional", -10.7081, -48.4172),
    Location::new("Paraíso do Tocantins", -10.1753, -48.8823),
];
