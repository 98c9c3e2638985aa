//! Runtime configuration.
//!
//! [`CheckoutGeoConfig::default`] is usable as-is against local backends.
//! [`CheckoutGeoConfig::from_env`] overrides any field through
//! `CHECKOUT_GEO_*` environment variables.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL, KeyValueStore, RouteCache};
use crate::geo::{DEFAULT_NEARBY_THRESHOLD_M, GeoPoint, StraightLineEstimator};
use crate::http::HttpConfig;
use crate::pricing::DeliveryPricingResolver;
use crate::route::RouteResolver;
use crate::traits::{Geocoder, LocationProvider, PricingBackend, RoutingBackend};
use crate::workflow::GeolocationWorkflow;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct CheckoutGeoConfig {
    pub routing_url: String,
    pub geocoding_url: String,
    pub pricing_url: String,
    pub http_timeout_secs: u64,
    pub location_timeout: Duration,
    pub alignment_threshold_m: f64,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub fallback_speed_kmh: f64,
    pub store_location: GeoPoint,
}

impl Default for CheckoutGeoConfig {
    fn default() -> Self {
        Self {
            routing_url: "http://localhost:8080/api/geo".to_string(),
            geocoding_url: "http://localhost:8080/api/geo".to_string(),
            pricing_url: "http://localhost:8080/api".to_string(),
            http_timeout_secs: 10,
            location_timeout: Duration::from_secs(15),
            alignment_threshold_m: DEFAULT_NEARBY_THRESHOLD_M,
            cache_ttl: DEFAULT_TTL,
            cache_capacity: DEFAULT_CAPACITY,
            fallback_speed_kmh: 40.0,
            store_location: GeoPoint::new(-10.1854332, -48.3038653),
        }
    }
}

impl CheckoutGeoConfig {
    /// Defaults overridden by `CHECKOUT_GEO_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] if a variable is set but does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CheckoutGeoConfig::from_env`] with an explicit lookup, so
    /// tests need not touch the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] if a value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let parse = |var: &str| -> Result<Option<f64>, ConfigError> {
            lookup(var)
                .map(|raw| {
                    raw.trim().parse::<f64>().map_err(|e| ConfigError::InvalidEnvVar {
                        var: var.to_string(),
                        reason: e.to_string(),
                    })
                })
                .transpose()
        };
        let parse_u64 = |var: &str| -> Result<Option<u64>, ConfigError> {
            lookup(var)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
                        var: var.to_string(),
                        reason: e.to_string(),
                    })
                })
                .transpose()
        };

        let store_location = match (parse("CHECKOUT_GEO_STORE_LAT")?, parse("CHECKOUT_GEO_STORE_LNG")?) {
            (Some(lat), Some(lng)) => {
                let point = GeoPoint::new(lat, lng);
                if !point.is_valid() {
                    return Err(ConfigError::InvalidEnvVar {
                        var: "CHECKOUT_GEO_STORE_LAT".to_string(),
                        reason: format!("({lat}, {lng}) is not a valid coordinate"),
                    });
                }
                point
            }
            (None, None) => defaults.store_location,
            _ => {
                return Err(ConfigError::InvalidEnvVar {
                    var: "CHECKOUT_GEO_STORE_LAT".to_string(),
                    reason: "store latitude and longitude must be set together".to_string(),
                });
            }
        };

        Ok(Self {
            routing_url: lookup("CHECKOUT_GEO_ROUTING_URL").unwrap_or(defaults.routing_url),
            geocoding_url: lookup("CHECKOUT_GEO_GEOCODING_URL").unwrap_or(defaults.geocoding_url),
            pricing_url: lookup("CHECKOUT_GEO_PRICING_URL").unwrap_or(defaults.pricing_url),
            http_timeout_secs: parse_u64("CHECKOUT_GEO_HTTP_TIMEOUT_SECS")?
                .unwrap_or(defaults.http_timeout_secs),
            location_timeout: parse_u64("CHECKOUT_GEO_LOCATION_TIMEOUT_SECS")?
                .map_or(defaults.location_timeout, Duration::from_secs),
            alignment_threshold_m: parse("CHECKOUT_GEO_ALIGNMENT_THRESHOLD_M")?
                .unwrap_or(defaults.alignment_threshold_m),
            cache_ttl: parse_u64("CHECKOUT_GEO_CACHE_TTL_SECS")?.map_or(defaults.cache_ttl, Duration::from_secs),
            cache_capacity: parse_u64("CHECKOUT_GEO_CACHE_CAPACITY")?
                .map_or(defaults.cache_capacity, |c| c as usize),
            fallback_speed_kmh: parse("CHECKOUT_GEO_FALLBACK_SPEED_KMH")?.unwrap_or(defaults.fallback_speed_kmh),
            store_location,
        })
    }

    pub fn routing_http(&self) -> HttpConfig {
        self.http_config(&self.routing_url)
    }

    pub fn geocoding_http(&self) -> HttpConfig {
        self.http_config(&self.geocoding_url)
    }

    pub fn pricing_http(&self) -> HttpConfig {
        self.http_config(&self.pricing_url)
    }

    /// Timeout applied to every backend call.
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Route cache over `store` with the configured TTL and capacity.
    pub fn route_cache(&self, store: Box<dyn KeyValueStore>) -> RouteCache {
        RouteCache::new(store)
            .with_ttl(self.cache_ttl)
            .with_capacity(self.cache_capacity)
    }

    pub fn route_resolver<R: RoutingBackend>(&self, backend: R, cache: Arc<RouteCache>) -> RouteResolver<R> {
        RouteResolver::new(backend, cache)
            .with_threshold(self.alignment_threshold_m)
            .with_timeout(self.network_timeout())
            .with_estimator(StraightLineEstimator::new(self.fallback_speed_kmh))
    }

    pub fn pricing_resolver<P: PricingBackend>(&self, backend: P) -> DeliveryPricingResolver<P> {
        DeliveryPricingResolver::new(backend).with_timeout(self.network_timeout())
    }

    /// Workflow anchored at the configured store, with the configured
    /// location and network timeouts.
    pub fn workflow<L, G, R, P>(
        &self,
        location: L,
        geocoder: G,
        routes: RouteResolver<R>,
        pricing: DeliveryPricingResolver<P>,
    ) -> GeolocationWorkflow<L, G, R, P>
    where
        L: LocationProvider,
        G: Geocoder,
        R: RoutingBackend,
        P: PricingBackend,
    {
        GeolocationWorkflow::new(location, geocoder, routes, pricing, self.store_location)
            .with_location_timeout(self.location_timeout)
            .with_network_timeout(self.network_timeout())
    }

    fn http_config(&self, base_url: &str) -> HttpConfig {
        HttpConfig {
            base_url: base_url.to_string(),
            timeout_secs: self.http_timeout_secs,
            ..HttpConfig::default()
        }
    }
}
