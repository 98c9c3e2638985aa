//! Interfaces to the collaborators the core depends on.
//!
//! Device location, geocoding, routing and delivery pricing all live outside
//! this crate. The resolvers and the workflow are generic over these traits
//! so hosts plug in HTTP adapters (see [`crate::http`]) and tests plug in
//! in-memory fakes.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GeolocationError, NetworkError};
use crate::geo::GeoPoint;
use crate::pricing::{DeliveryQuote, QuoteRequest};

/// Options for a single device position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// Maximum age of a cached fix; zero forces a fresh one.
    pub maximum_age: Duration,
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::ZERO,
            timeout: Duration::from_secs(15),
        }
    }
}

/// A device fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DevicePosition {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters.
    pub accuracy: f64,
}

impl DevicePosition {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Structured address from reverse geocoding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub label: String,
}

/// A forward geocoding candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCandidate {
    pub label: String,
    pub lat: f64,
    pub lng: f64,
}

impl GeocodeCandidate {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Routing backend answer for a car route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub encoded_polyline: String,
}

/// Transport mode for route requests. Only car routes are requested today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    #[default]
    Car,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Car => "car",
        }
    }
}

/// Provides the device's current position.
pub trait LocationProvider {
    fn current_position(
        &self,
        options: PositionOptions,
    ) -> impl Future<Output = Result<DevicePosition, GeolocationError>> + Send;
}

/// Address lookup in both directions.
pub trait Geocoder {
    /// `Ok(None)` when nothing is known at that coordinate.
    fn reverse_geocode(
        &self,
        point: GeoPoint,
    ) -> impl Future<Output = Result<Option<Address>, NetworkError>> + Send;

    fn geocode(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<GeocodeCandidate>, NetworkError>> + Send;
}

/// Road routing between two points.
pub trait RoutingBackend {
    fn route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TransportMode,
    ) -> impl Future<Output = Result<RouteResponse, NetworkError>> + Send;
}

/// Delivery fee and serviceability quotes.
pub trait PricingBackend {
    fn quote_delivery(
        &self,
        request: &QuoteRequest,
    ) -> impl Future<Output = Result<DeliveryQuote, NetworkError>> + Send;
}
