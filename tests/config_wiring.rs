//! Components built from `CheckoutGeoConfig` pick up its overrides.

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use checkout_geo::cache::MemoryStore;
use checkout_geo::config::CheckoutGeoConfig;
use checkout_geo::error::{GeolocationError, NetworkError, PricingError};
use checkout_geo::geo::{GeoPoint, StraightLineEstimator};
use checkout_geo::route::{RouteEstimate, RouteResolver};
use checkout_geo::workflow::{FlowError, Step};

use fixtures::{CUSTOMER, FakeGeocoder, FakeLocation, FakePricing, FakeRouting, STORE, street_route};

fn config(pairs: &[(&str, &str)]) -> CheckoutGeoConfig {
    CheckoutGeoConfig::from_lookup(|key| {
        pairs
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| (*value).to_string())
    })
    .unwrap()
}

fn resolver(config: &CheckoutGeoConfig, routing: FakeRouting) -> RouteResolver<FakeRouting> {
    let cache = Arc::new(config.route_cache(Box::new(MemoryStore::new())));
    config.route_resolver(routing, cache)
}

#[tokio::test]
async fn alignment_threshold_controls_connector_points() {
    let routing = FakeRouting::returning(&street_route(), 1_250.0, 370.0);

    let snapped = resolver(&config(&[]), routing.clone())
        .resolve(STORE.point(), CUSTOMER.point())
        .await
        .unwrap();
    assert_eq!(snapped.points.len(), street_route().len());

    // Both route ends sit a meter or so off the markers.
    let strict = config(&[("CHECKOUT_GEO_ALIGNMENT_THRESHOLD_M", "0.1")]);
    let connected = resolver(&strict, routing)
        .resolve(STORE.point(), CUSTOMER.point())
        .await
        .unwrap();
    assert_eq!(connected.points.len(), street_route().len() + 2);
    assert_eq!(connected.points[0], STORE.point());
}

#[tokio::test]
async fn fallback_speed_drives_straight_line_duration() {
    let slow = config(&[("CHECKOUT_GEO_FALLBACK_SPEED_KMH", "20")]);

    let estimate = resolver(&slow, FakeRouting::failing())
        .resolve_or_fallback(STORE.point(), CUSTOMER.point())
        .await;

    let (_, at_20) = StraightLineEstimator::new(20.0).estimate(STORE.point(), CUSTOMER.point());
    let (_, at_40) = StraightLineEstimator::default().estimate(STORE.point(), CUSTOMER.point());
    match estimate {
        RouteEstimate::StraightLine { duration_seconds, .. } => {
            assert_eq!(duration_seconds, f64::from(at_20));
            assert_ne!(duration_seconds, f64::from(at_40));
        }
        other => panic!("expected straight-line estimate, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn http_timeout_bounds_pricing_calls() {
    let pricing = FakePricing::quoting(5.0, 1.2, 6.0).slow(Duration::from_secs(5));

    let patient = config(&[]).pricing_resolver(pricing.clone());
    assert!(patient.quote_point(CUSTOMER.point()).await.is_ok());

    let impatient = config(&[("CHECKOUT_GEO_HTTP_TIMEOUT_SECS", "2")]).pricing_resolver(pricing);
    let err = impatient.quote_point(CUSTOMER.point()).await.unwrap_err();
    assert!(matches!(err, PricingError::Network(NetworkError::Timeout)), "{err:?}");
}

#[tokio::test(start_paused = true)]
async fn workflow_uses_configured_store_and_location_timeout() {
    let config = config(&[
        ("CHECKOUT_GEO_STORE_LAT", "-10.2"),
        ("CHECKOUT_GEO_STORE_LNG", "-48.33"),
        ("CHECKOUT_GEO_LOCATION_TIMEOUT_SECS", "2"),
    ]);
    let routes = resolver(&config, FakeRouting::failing());
    let pricing = config.pricing_resolver(FakePricing::failing());
    let location = FakeLocation::at(CUSTOMER.point()).slow(Duration::from_secs(5));
    let mut flow = config.workflow(location, FakeGeocoder::empty(), routes, pricing);

    assert_eq!(flow.store_location(), GeoPoint::new(-10.2, -48.33));

    let state = flow.detect_location().await;
    assert_eq!(state.step, Step::Detecting);
    assert_eq!(state.error, Some(FlowError::Geolocation(GeolocationError::Timeout)));
}
