//! In-memory collaborators with call counters.
//!
//! Every fake is `Clone` and shares its counters, so a test can keep one copy
//! for assertions after moving the other into a resolver or workflow.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use checkout_geo::cache::RouteCache;
use checkout_geo::error::{GeolocationError, NetworkError};
use checkout_geo::geo::GeoPoint;
use checkout_geo::polyline;
use checkout_geo::pricing::{DeliveryPricingResolver, DeliveryQuote, QuoteRequest};
use checkout_geo::route::RouteResolver;
use checkout_geo::traits::{
    Address, DevicePosition, GeocodeCandidate, Geocoder, LocationProvider, PositionOptions, PricingBackend,
    RouteResponse, RoutingBackend, TransportMode,
};
use checkout_geo::workflow::GeolocationWorkflow;

use super::palmas_locations::STORE;

#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct FakeLocation {
    pub result: Result<DevicePosition, GeolocationError>,
    pub delay: Duration,
    pub calls: Calls,
    pub last_options: Arc<Mutex<Option<PositionOptions>>>,
}

impl FakeLocation {
    pub fn at(point: GeoPoint) -> Self {
        Self {
            result: Ok(DevicePosition {
                latitude: point.lat,
                longitude: point.lng,
                accuracy: 12.0,
            }),
            delay: Duration::ZERO,
            calls: Calls::default(),
            last_options: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing(err: GeolocationError) -> Self {
        Self {
            result: Err(err),
            ..Self::at(GeoPoint::new(0.0, 0.0))
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl LocationProvider for FakeLocation {
    async fn current_position(&self, options: PositionOptions) -> Result<DevicePosition, GeolocationError> {
        self.calls.hit();
        *self.last_options.lock().unwrap() = Some(options);
        pause(self.delay).await;
        self.result
    }
}

#[derive(Clone)]
pub struct FakeGeocoder {
    pub address: Option<Address>,
    pub fail: bool,
    pub candidates: Vec<GeocodeCandidate>,
    pub delay: Duration,
    pub reverse_calls: Calls,
    pub search_calls: Calls,
}

impl FakeGeocoder {
    pub fn with_address(label: &str) -> Self {
        Self {
            address: Some(Address {
                street: "Quadra 104 Sul, Rua SE 5".to_string(),
                number: "12".to_string(),
                neighborhood: "Plano Diretor Sul".to_string(),
                city: "Palmas".to_string(),
                state: "TO".to_string(),
                postal_code: "77020020".to_string(),
                label: label.to_string(),
            }),
            fail: false,
            candidates: Vec::new(),
            delay: Duration::ZERO,
            reverse_calls: Calls::default(),
            search_calls: Calls::default(),
        }
    }

    pub fn empty() -> Self {
        Self {
            address: None,
            ..Self::with_address("")
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::empty()
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<GeocodeCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Geocoder for FakeGeocoder {
    async fn reverse_geocode(&self, _point: GeoPoint) -> Result<Option<Address>, NetworkError> {
        self.reverse_calls.hit();
        pause(self.delay).await;
        if self.fail {
            return Err(NetworkError::Status(503));
        }
        Ok(self.address.clone())
    }

    async fn geocode(&self, _query: &str) -> Result<Vec<GeocodeCandidate>, NetworkError> {
        self.search_calls.hit();
        pause(self.delay).await;
        if self.fail {
            return Err(NetworkError::Status(503));
        }
        Ok(self.candidates.clone())
    }
}

#[derive(Clone)]
pub struct FakeRouting {
    pub response: Option<RouteResponse>,
    pub delay: Duration,
    pub calls: Calls,
}

impl FakeRouting {
    pub fn returning(points: &[GeoPoint], distance_meters: f64, duration_seconds: f64) -> Self {
        Self {
            response: Some(RouteResponse {
                distance_meters,
                duration_seconds,
                encoded_polyline: polyline::encode(points, 5).unwrap(),
            }),
            delay: Duration::ZERO,
            calls: Calls::default(),
        }
    }

    pub fn raw(encoded_polyline: &str) -> Self {
        Self {
            response: Some(RouteResponse {
                distance_meters: 1000.0,
                duration_seconds: 300.0,
                encoded_polyline: encoded_polyline.to_string(),
            }),
            delay: Duration::ZERO,
            calls: Calls::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            delay: Duration::ZERO,
            calls: Calls::default(),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl RoutingBackend for FakeRouting {
    async fn route(
        &self,
        _origin: GeoPoint,
        _destination: GeoPoint,
        _mode: TransportMode,
    ) -> Result<RouteResponse, NetworkError> {
        self.calls.hit();
        pause(self.delay).await;
        self.response.clone().ok_or(NetworkError::Status(502))
    }
}

#[derive(Clone)]
pub struct FakePricing {
    pub quote: Option<DeliveryQuote>,
    pub delay: Duration,
    pub requests: Arc<Mutex<Vec<QuoteRequest>>>,
}

impl FakePricing {
    pub fn quoting(fee: f64, distance_km: f64, estimated_minutes: f64) -> Self {
        Self {
            quote: Some(DeliveryQuote {
                fee,
                zone_name: "Plano Diretor Sul".to_string(),
                estimated_minutes,
                distance_km,
                is_valid: true,
            }),
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn out_of_zone() -> Self {
        let mut pricing = Self::quoting(0.0, 60.0, 90.0);
        if let Some(quote) = pricing.quote.as_mut() {
            quote.is_valid = false;
            quote.zone_name = "Fora da área".to_string();
        }
        pricing
    }

    pub fn failing() -> Self {
        Self {
            quote: None,
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl PricingBackend for FakePricing {
    async fn quote_delivery(&self, request: &QuoteRequest) -> Result<DeliveryQuote, NetworkError> {
        self.requests.lock().unwrap().push(request.clone());
        pause(self.delay).await;
        self.quote.clone().ok_or(NetworkError::Status(500))
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Route geometry that starts ~0.4 m from the store and ends ~1.5 m from
/// the customer.
pub fn street_route() -> Vec<GeoPoint> {
    vec![
        GeoPoint::new(-10.18543, -48.30387),
        GeoPoint::new(-10.18620, -48.30460),
        GeoPoint::new(-10.18800, -48.30700),
        GeoPoint::new(-10.18999, -48.31001),
    ]
}

pub type FakeWorkflow = GeolocationWorkflow<FakeLocation, FakeGeocoder, FakeRouting, FakePricing>;

pub fn workflow(
    location: FakeLocation,
    geocoder: FakeGeocoder,
    routing: FakeRouting,
    pricing: FakePricing,
) -> FakeWorkflow {
    let routes = RouteResolver::new(routing, Arc::new(RouteCache::default()));
    GeolocationWorkflow::new(location, geocoder, routes, DeliveryPricingResolver::new(pricing), STORE.point())
}
