//! Location confirmation flow for checkout.
//!
//! One [`GeolocationWorkflow`] per open confirmation dialog. It starts in
//! [`Step::Detecting`], asks the device for a fix, and on success resolves
//! address, route and delivery quote before moving to [`Step::Confirm`].
//! The customer can instead pick a point on the map ([`Step::Map`]), edit a
//! pending location, or confirm it.
//!
//! All step changes go through [`transition`]; events that are not legal in
//! the current step leave the state untouched. Device detection is never
//! retried automatically, and network failures only degrade the estimate,
//! with the exception of an unserved delivery zone.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::error::{GeolocationError, NetworkError};
use crate::geo::GeoPoint;
use crate::pricing::{DeliveryEstimate, DeliveryInfo, DeliveryPricingResolver, QuoteRequest};
use crate::route::{RouteEstimate, RouteResolver};
use crate::traits::{
    Address, GeocodeCandidate, Geocoder, LocationProvider, PositionOptions, PricingBackend, RoutingBackend,
};

const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    #[default]
    Detecting,
    Map,
    Confirm,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    DetectSucceeded,
    DetectFailed,
    SkipToManual,
    LocationSelected,
    Edit,
    Confirm,
    Close,
}

/// Transition table. `None` means the event is not allowed in `step`.
pub fn transition(step: Step, event: Event) -> Option<Step> {
    use Event as E;
    use Step as S;

    match (step, event) {
        (S::Detecting, E::DetectSucceeded) => Some(S::Confirm),
        (S::Detecting, E::DetectFailed) => Some(S::Detecting),
        (S::Detecting | S::Map | S::Confirm, E::SkipToManual) => Some(S::Map),
        (S::Map, E::LocationSelected) => Some(S::Confirm),
        (S::Confirm, E::Edit) => Some(S::Map),
        (S::Confirm, E::Confirm) => Some(S::Confirmed),
        (_, E::Close) => Some(S::Detecting),
        _ => None,
    }
}

/// Problems surfaced to the customer while the flow stays usable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum FlowError {
    #[error("geolocation failed: {0}")]
    Geolocation(GeolocationError),

    #[error("no address found for the selected location")]
    AddressNotFound,

    #[error("delivery not available in zone {zone_name:?}")]
    DeliveryUnavailable { zone_name: String },

    #[error("invalid postal code {0:?}")]
    InvalidPostalCode(String),
}

impl FlowError {
    /// Whether the "try again" action should be offered.
    pub fn can_retry_detection(&self) -> bool {
        matches!(self, FlowError::Geolocation(err) if err.is_retryable())
    }

    pub fn user_message(&self) -> String {
        match self {
            FlowError::Geolocation(err) => err.user_message().to_string(),
            FlowError::AddressNotFound => {
                "Não encontramos um endereço para este ponto. Ajuste o marcador no mapa.".to_string()
            }
            FlowError::DeliveryUnavailable { .. } => {
                "Ainda não entregamos neste endereço. Escolha outro endereço ou retire na loja.".to_string()
            }
            FlowError::InvalidPostalCode(_) => "CEP inválido.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationState {
    pub step: Step,
    pub position: Option<GeoPoint>,
    /// Device-reported accuracy radius, when the position came from the device.
    pub accuracy_m: Option<f64>,
    pub detected_address: Option<Address>,
    pub route_info: Option<RouteEstimate>,
    pub delivery_info: Option<DeliveryInfo>,
    pub error: Option<FlowError>,
}

impl GeolocationState {
    /// Combined distance/time/fee figures for the confirmation card.
    pub fn estimate(&self) -> Option<DeliveryEstimate> {
        DeliveryEstimate::merge(
            self.route_info.as_ref(),
            self.delivery_info.as_ref().and_then(DeliveryInfo::quote),
        )
    }
}

/// Emitted once by [`GeolocationWorkflow::confirm_location`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedLocation {
    pub address: Address,
    pub position: GeoPoint,
    pub delivery_info: Option<DeliveryInfo>,
    pub route_info: Option<RouteEstimate>,
}

impl ConfirmedLocation {
    pub fn estimate(&self) -> Option<DeliveryEstimate> {
        DeliveryEstimate::merge(
            self.route_info.as_ref(),
            self.delivery_info.as_ref().and_then(DeliveryInfo::quote),
        )
    }
}

/// Tears a workflow down from outside. In-flight awaits stop without
/// touching state and every later event is ignored.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Address, route and quote for one selected point.
struct Resolution {
    address: Option<Address>,
    route: RouteEstimate,
    delivery: Option<DeliveryInfo>,
}

pub struct GeolocationWorkflow<L, G, R, P> {
    location: L,
    geocoder: G,
    routes: RouteResolver<R>,
    pricing: DeliveryPricingResolver<P>,
    store: GeoPoint,
    location_timeout: Duration,
    network_timeout: Duration,
    state: GeolocationState,
    cancel: CancelHandle,
}

impl<L, G, R, P> GeolocationWorkflow<L, G, R, P>
where
    L: LocationProvider,
    G: Geocoder,
    R: RoutingBackend,
    P: PricingBackend,
{
    pub fn new(
        location: L,
        geocoder: G,
        routes: RouteResolver<R>,
        pricing: DeliveryPricingResolver<P>,
        store: GeoPoint,
    ) -> Self {
        Self {
            location,
            geocoder,
            routes,
            pricing,
            store,
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            state: GeolocationState::default(),
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn state(&self) -> &GeolocationState {
        &self.state
    }

    pub fn store_location(&self) -> GeoPoint {
        self.store
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Single high-accuracy device fix, then address, route and quote.
    ///
    /// Only valid in [`Step::Detecting`]. On failure the step stays
    /// `Detecting` with [`GeolocationState::error`] set.
    pub async fn detect_location(&mut self) -> &GeolocationState {
        if !self.allows(Event::DetectSucceeded) {
            return &self.state;
        }
        self.state.error = None;

        let options = PositionOptions {
            high_accuracy: true,
            maximum_age: Duration::ZERO,
            timeout: self.location_timeout,
        };
        let request = async {
            tokio::time::timeout(self.location_timeout, self.location.current_position(options))
                .await
                .unwrap_or(Err(GeolocationError::Timeout))
        };
        let Some(fix) = self.guarded(request).await else {
            return &self.state;
        };
        let fix = fix.and_then(|position| {
            if position.point().is_valid() {
                Ok(position)
            } else {
                tracing::warn!(
                    lat = position.latitude,
                    lng = position.longitude,
                    "device reported an out-of-range fix"
                );
                Err(GeolocationError::Unavailable)
            }
        });

        match fix {
            Ok(position) => {
                let point = position.point();
                let Some(resolution) = self.resolve_point(point, QuoteRequest::coordinates(point)).await else {
                    return &self.state;
                };
                self.state.accuracy_m = Some(position.accuracy);
                self.apply_resolution(point, resolution);
                self.apply(Event::DetectSucceeded);
            }
            Err(err) => {
                tracing::warn!(error = %err, "device location failed");
                self.state.error = Some(FlowError::Geolocation(err));
                self.apply(Event::DetectFailed);
            }
        }
        &self.state
    }

    /// Explicit user retry after a failed detection.
    pub async fn retry_detection(&mut self) -> &GeolocationState {
        self.detect_location().await
    }

    /// Abandons detection (or a pending location) for manual map selection.
    pub fn skip_to_manual(&mut self) -> &GeolocationState {
        if self.apply(Event::SkipToManual) {
            self.state.error = None;
        }
        &self.state
    }

    /// Resolves a point picked on the map and moves to [`Step::Confirm`].
    pub async fn select_on_map(&mut self, lat: f64, lng: f64) -> &GeolocationState {
        if !self.allows(Event::LocationSelected) {
            return &self.state;
        }
        let point = GeoPoint::new(lat, lng);
        if !point.is_valid() {
            tracing::debug!(lat, lng, "ignoring out-of-range map selection");
            return &self.state;
        }
        self.state.error = None;

        let Some(resolution) = self.resolve_point(point, QuoteRequest::coordinates(point)).await else {
            return &self.state;
        };
        self.state.accuracy_m = None;
        self.apply_resolution(point, resolution);
        self.apply(Event::LocationSelected);
        &self.state
    }

    /// Locates a CEP, then prices by postal code rather than coordinates.
    pub async fn select_postal_code(&mut self, raw: &str) -> &GeolocationState {
        if !self.allows(Event::LocationSelected) {
            return &self.state;
        }
        let request = match QuoteRequest::postal_code(raw) {
            Ok(request) => request,
            Err(_) => {
                self.state.error = Some(FlowError::InvalidPostalCode(raw.to_string()));
                return &self.state;
            }
        };
        let QuoteRequest::PostalCode { postal_code } = &request else {
            return &self.state;
        };
        let postal_code = postal_code.clone();

        let Some(candidates) = self.guarded(self.network(self.geocoder.geocode(&postal_code))).await else {
            return &self.state;
        };
        let candidate = match candidates {
            Ok(list) => list.into_iter().find(|c| c.point().is_valid()),
            Err(err) => {
                tracing::warn!(error = %err, "postal code lookup failed");
                None
            }
        };
        let Some(candidate) = candidate else {
            self.state.error = Some(FlowError::AddressNotFound);
            return &self.state;
        };

        let point = candidate.point();
        let Some(mut resolution) = self.resolve_point(point, request).await else {
            return &self.state;
        };
        if resolution.address.is_none() {
            resolution.address = Some(Address {
                postal_code,
                label: candidate.label,
                ..Address::default()
            });
        }
        self.state.accuracy_m = None;
        self.apply_resolution(point, resolution);
        self.apply(Event::LocationSelected);
        &self.state
    }

    /// Forward geocoding for the map search box. Failures read as no results.
    pub async fn search_address(&self, query: &str) -> Vec<GeocodeCandidate> {
        let query = query.trim();
        if query.is_empty() || self.state.step != Step::Map || self.cancel.is_cancelled() {
            return Vec::new();
        }
        match self.guarded(self.network(self.geocoder.geocode(query))).await {
            Some(Ok(candidates)) => candidates,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "address search failed");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Back from [`Step::Confirm`] to the map, keeping the current point.
    pub fn edit_location(&mut self) -> &GeolocationState {
        if self.apply(Event::Edit) {
            self.state.error = None;
        }
        &self.state
    }

    /// Terminal confirmation. A no-op returning `None` unless a location
    /// with a resolved address is pending.
    pub fn confirm_location(&mut self) -> Option<ConfirmedLocation> {
        if !self.allows(Event::Confirm) {
            return None;
        }
        let (Some(address), Some(position)) = (self.state.detected_address.clone(), self.state.position) else {
            tracing::debug!("confirm ignored: no resolved address");
            return None;
        };
        self.apply(Event::Confirm);
        tracing::info!(lat = position.lat, lng = position.lng, "delivery location confirmed");
        Some(ConfirmedLocation {
            address,
            position,
            delivery_info: self.state.delivery_info.clone(),
            route_info: self.state.route_info.clone(),
        })
    }

    /// Resets to a fresh `Detecting` state, as when the dialog closes.
    pub fn close(&mut self) {
        if self.apply(Event::Close) {
            self.state = GeolocationState::default();
        }
    }

    fn allows(&self, event: Event) -> bool {
        if self.cancel.is_cancelled() {
            tracing::debug!(?event, "workflow torn down, event ignored");
            return false;
        }
        if transition(self.state.step, event).is_none() {
            tracing::debug!(?event, step = ?self.state.step, "event not allowed");
            return false;
        }
        true
    }

    fn apply(&mut self, event: Event) -> bool {
        if !self.allows(event) {
            return false;
        }
        if let Some(next) = transition(self.state.step, event) {
            if next != self.state.step {
                tracing::info!(from = ?self.state.step, to = ?next, ?event, "location step changed");
            }
            self.state.step = next;
        }
        true
    }

    fn apply_resolution(&mut self, point: GeoPoint, resolution: Resolution) {
        self.state.error = match (&resolution.address, &resolution.delivery) {
            (_, Some(DeliveryInfo::Unavailable { zone_name })) => Some(FlowError::DeliveryUnavailable {
                zone_name: zone_name.clone(),
            }),
            (None, _) => Some(FlowError::AddressNotFound),
            _ => None,
        };
        self.state.position = Some(point);
        self.state.detected_address = resolution.address;
        self.state.route_info = Some(resolution.route);
        self.state.delivery_info = resolution.delivery;
    }

    /// Reverse geocode, route and price `point`. `None` only when cancelled;
    /// every other failure degrades the result.
    async fn resolve_point(&self, point: GeoPoint, quote: QuoteRequest) -> Option<Resolution> {
        let address = match self.guarded(self.network(self.geocoder.reverse_geocode(point))).await? {
            Ok(address) => address,
            Err(err) => {
                tracing::warn!(error = %err, "reverse geocoding failed");
                None
            }
        };
        let route = self.guarded(self.routes.resolve_or_fallback(self.store, point)).await?;
        let delivery = self.guarded(self.pricing.delivery_info(&quote)).await?;
        Some(Resolution {
            address,
            route,
            delivery,
        })
    }

    /// Applies the network timeout to a collaborator call.
    async fn network<T>(
        &self,
        call: impl Future<Output = Result<T, NetworkError>>,
    ) -> Result<T, NetworkError> {
        tokio::time::timeout(self.network_timeout, call)
            .await
            .unwrap_or(Err(NetworkError::Timeout))
    }

    /// Runs `fut` unless the workflow is torn down first.
    async fn guarded<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        let mut rx = self.cancel.tx.subscribe();
        if *rx.borrow_and_update() {
            return None;
        }
        tokio::select! {
            _ = rx.wait_for(|cancelled| *cancelled) => {
                tracing::debug!("in-flight location work cancelled");
                None
            }
            out = fut => Some(out),
        }
    }
}
