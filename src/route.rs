//! Drawable route between the store and the customer.
//!
//! Looks up the shared [`RouteCache`], falls back to the routing backend,
//! decodes the geometry and snaps its endpoints onto the two markers. When
//! anything goes wrong the caller still gets a straight-line estimate, so
//! routing problems never block checkout.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::{CachedRoute, RouteCache, route_key};
use crate::error::{NetworkError, RouteError};
use crate::geo::{
    BoundingBox, DEFAULT_BOX_PADDING, DEFAULT_NEARBY_THRESHOLD_M, GeoPoint, StraightLineEstimator,
    bounding_box_with_padding, is_nearby,
};
use crate::polyline;
use crate::traits::{RoutingBackend, TransportMode};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A decoded, marker-aligned route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRoute {
    /// Always at least two points; first is the store, last the customer.
    pub points: Vec<GeoPoint>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub from_cache: bool,
}

impl ResolvedRoute {
    /// Viewport fitting the whole line.
    pub fn bounds(&self) -> Option<BoundingBox> {
        bounding_box_with_padding(&self.points, DEFAULT_BOX_PADDING)
    }

    /// Re-encodes the aligned geometry, connector points included.
    ///
    /// # Errors
    ///
    /// Returns a codec error if `precision` exceeds 15.
    pub fn encoded(&self, precision: u8) -> Result<String, crate::error::CodecError> {
        polyline::encode(&self.points, precision)
    }
}

/// Either a real road route or a straight-line estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RouteEstimate {
    Drawn(ResolvedRoute),
    #[serde(rename_all = "camelCase")]
    StraightLine {
        distance_meters: f64,
        duration_seconds: f64,
    },
}

impl RouteEstimate {
    pub fn distance_meters(&self) -> f64 {
        match self {
            RouteEstimate::Drawn(route) => route.distance_meters,
            RouteEstimate::StraightLine { distance_meters, .. } => *distance_meters,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        match self {
            RouteEstimate::Drawn(route) => route.duration_seconds,
            RouteEstimate::StraightLine { duration_seconds, .. } => *duration_seconds,
        }
    }

    /// Line to draw, if any. Straight-line estimates draw nothing.
    pub fn points(&self) -> Option<&[GeoPoint]> {
        match self {
            RouteEstimate::Drawn(route) => Some(&route.points),
            RouteEstimate::StraightLine { .. } => None,
        }
    }

    pub fn is_drawn(&self) -> bool {
        matches!(self, RouteEstimate::Drawn(_))
    }
}

/// Makes the route line touch both markers.
///
/// An endpoint within `threshold_m` of its marker is moved onto the marker;
/// a farther one keeps its place and the marker is added as a connector
/// point.
pub fn align_endpoints(
    mut points: Vec<GeoPoint>,
    start: GeoPoint,
    end: GeoPoint,
    threshold_m: f64,
) -> Vec<GeoPoint> {
    match points.first().copied() {
        Some(first) if is_nearby(first, start, threshold_m) => points[0] = start,
        _ => points.insert(0, start),
    }

    // A single remaining point is the start marker itself; never overwrite it.
    match points.last().copied() {
        Some(last) if points.len() > 1 && is_nearby(last, end, threshold_m) => {
            let idx = points.len() - 1;
            points[idx] = end;
        }
        _ => points.push(end),
    }

    points
}

/// Resolves store-to-customer routes through the cache and routing backend.
pub struct RouteResolver<R> {
    backend: R,
    cache: Arc<RouteCache>,
    threshold_m: f64,
    timeout: Duration,
    estimator: StraightLineEstimator,
}

impl<R: RoutingBackend> RouteResolver<R> {
    /// Resolver with a 50 m alignment threshold, a 10 s backend timeout and
    /// the default straight-line estimator.
    pub fn new(backend: R, cache: Arc<RouteCache>) -> Self {
        Self {
            backend,
            cache,
            threshold_m: DEFAULT_NEARBY_THRESHOLD_M,
            timeout: DEFAULT_TIMEOUT,
            estimator: StraightLineEstimator::default(),
        }
    }

    pub fn with_threshold(mut self, threshold_m: f64) -> Self {
        self.threshold_m = threshold_m;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Estimator used when no route can be drawn.
    pub fn with_estimator(mut self, estimator: StraightLineEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Cached or freshly fetched route, decoded and aligned to the markers.
    ///
    /// Only routes whose geometry decodes are written to the cache. A cached
    /// entry that no longer decodes is invalidated.
    ///
    /// # Errors
    ///
    /// - [`RouteError::Network`] if the backend fails or times out.
    /// - [`RouteError::Codec`] if the geometry does not decode.
    pub async fn resolve(&self, store: GeoPoint, customer: GeoPoint) -> Result<ResolvedRoute, RouteError> {
        let key = route_key(store, customer);

        if let Some(cached) = self.cache.get(&key) {
            match self.build(&cached, store, customer, true) {
                Ok(route) => return Ok(route),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "cached route no longer decodes");
                    self.cache.invalidate(&key);
                    return Err(err);
                }
            }
        }

        let response = tokio::time::timeout(
            self.timeout,
            self.backend.route(store, customer, TransportMode::Car),
        )
        .await
        .map_err(|_| NetworkError::Timeout)??;

        let payload = CachedRoute {
            distance_meters: response.distance_meters,
            duration_seconds: response.duration_seconds,
            encoded_polyline: response.encoded_polyline,
        };
        let route = self.build(&payload, store, customer, false)?;
        self.cache.put(&key, payload);
        Ok(route)
    }

    /// Like [`RouteResolver::resolve`], but degrades to a straight-line
    /// estimate instead of failing.
    pub async fn resolve_or_fallback(&self, store: GeoPoint, customer: GeoPoint) -> RouteEstimate {
        match self.resolve(store, customer).await {
            Ok(route) => RouteEstimate::Drawn(route),
            Err(err) => {
                tracing::warn!(error = %err, "route unavailable, using straight-line estimate");
                self.straight_line(store, customer)
            }
        }
    }

    pub fn straight_line(&self, store: GeoPoint, customer: GeoPoint) -> RouteEstimate {
        let (distance_meters, duration_seconds) = self.estimator.estimate(store, customer);
        RouteEstimate::StraightLine {
            distance_meters,
            duration_seconds: f64::from(duration_seconds),
        }
    }

    fn build(
        &self,
        payload: &CachedRoute,
        store: GeoPoint,
        customer: GeoPoint,
        from_cache: bool,
    ) -> Result<ResolvedRoute, RouteError> {
        let decoded = polyline::decode(&payload.encoded_polyline)?;
        let points = align_endpoints(decoded.into_points(), store, customer, self.threshold_m);
        Ok(ResolvedRoute {
            points,
            distance_meters: payload.distance_meters,
            duration_seconds: payload.duration_seconds,
            from_cache,
        })
    }
}
