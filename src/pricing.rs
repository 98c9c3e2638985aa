//! Delivery fee and zone quotes.
//!
//! The pricing backend decides whether an address is served at all. An
//! unserved address (`isValid: false`) is the one failure that blocks a
//! delivery checkout; pickup stays available.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, PricingError};
use crate::geo::GeoPoint;
use crate::route::RouteEstimate;
use crate::traits::PricingBackend;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Brazilian CEP length.
const POSTAL_CODE_DIGITS: usize = 8;

/// Label shown instead of a zero amount.
pub const FREE_DELIVERY_LABEL: &str = "Grátis";

/// What the pricing backend is asked about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuoteRequest {
    Coordinates(GeoPoint),
    PostalCode {
        #[serde(rename = "postalCode")]
        postal_code: String,
    },
}

impl QuoteRequest {
    pub fn coordinates(point: GeoPoint) -> Self {
        QuoteRequest::Coordinates(GeoPoint::new(point.lat, point.lng))
    }

    /// Normalizes a CEP such as `"77.001-002"` to `"77001002"`.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidPostalCode`] unless exactly eight
    /// digits remain after stripping separators.
    pub fn postal_code(raw: &str) -> Result<Self, PricingError> {
        let digits: String = raw
            .chars()
            .filter(|c| !matches!(c, '.' | '-' | ' '))
            .collect();
        if digits.len() != POSTAL_CODE_DIGITS || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PricingError::InvalidPostalCode(raw.to_string()));
        }
        Ok(QuoteRequest::PostalCode { postal_code: digits })
    }
}

/// Pricing backend answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryQuote {
    /// Fee in BRL; zero means free delivery.
    pub fee: f64,
    pub zone_name: String,
    pub estimated_minutes: f64,
    pub distance_km: f64,
    pub is_valid: bool,
}

impl DeliveryQuote {
    /// True when the fee rounds to zero cents, matching [`format_fee`].
    pub fn is_free(&self) -> bool {
        to_cents(self.fee) == 0
    }

    pub fn fee_label(&self) -> String {
        format_fee(self.fee)
    }
}

/// Outcome of pricing a location.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DeliveryInfo {
    Available(DeliveryQuote),
    #[serde(rename_all = "camelCase")]
    Unavailable { zone_name: String },
}

impl DeliveryInfo {
    pub fn quote(&self) -> Option<&DeliveryQuote> {
        match self {
            DeliveryInfo::Available(quote) => Some(quote),
            DeliveryInfo::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, DeliveryInfo::Available(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FulfillmentMethod {
    #[default]
    Delivery,
    Pickup,
}

/// Gate for completing checkout with `method`.
///
/// Pickup always passes. Delivery fails only when the address is known to be
/// outside every zone; a missing quote does not block.
///
/// # Errors
///
/// Returns [`PricingError::InvalidDeliveryZone`] for delivery to an unserved
/// address.
pub fn ensure_deliverable(method: FulfillmentMethod, info: Option<&DeliveryInfo>) -> Result<(), PricingError> {
    match (method, info) {
        (FulfillmentMethod::Delivery, Some(DeliveryInfo::Unavailable { zone_name })) => {
            Err(PricingError::InvalidDeliveryZone {
                zone_name: zone_name.clone(),
            })
        }
        _ => Ok(()),
    }
}

fn to_cents(fee: f64) -> u64 {
    (fee.max(0.0) * 100.0).round() as u64
}

/// `"Grátis"` for a fee under half a cent, otherwise `"R$ 1.234,50"`.
pub fn format_fee(fee: f64) -> String {
    let cents = to_cents(fee);
    if cents == 0 {
        return FREE_DELIVERY_LABEL.to_string();
    }
    let reais = (cents / 100).to_string();
    let mut grouped = String::with_capacity(reais.len() + reais.len() / 3);
    for (i, digit) in reais.chars().enumerate() {
        if i > 0 && (reais.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    format!("R$ {grouped},{:02}", cents % 100)
}

/// Distance and time line, e.g. `"1.2 km · 6 min"`.
pub fn format_summary(distance_km: f64, minutes: f64) -> String {
    let distance = if distance_km < 1.0 {
        format!("{} m", (distance_km * 1000.0).round() as u64)
    } else {
        format!("{distance_km:.1} km")
    };
    format!("{distance} · {} min", minutes.round().max(1.0) as u64)
}

/// Where the distance/duration shown to the customer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EstimateSource {
    Pricing,
    Route,
    StraightLine,
}

/// Combined figures for the confirmation card.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEstimate {
    pub fee: Option<f64>,
    pub zone_name: Option<String>,
    pub distance_km: f64,
    pub minutes: f64,
    pub source: EstimateSource,
}

impl DeliveryEstimate {
    /// Merges route and pricing figures. Pricing values win for billing
    /// whenever a valid quote exists.
    pub fn merge(route: Option<&RouteEstimate>, quote: Option<&DeliveryQuote>) -> Option<Self> {
        if let Some(quote) = quote.filter(|q| q.is_valid) {
            return Some(Self {
                fee: Some(quote.fee),
                zone_name: Some(quote.zone_name.clone()),
                distance_km: quote.distance_km,
                minutes: quote.estimated_minutes,
                source: EstimateSource::Pricing,
            });
        }
        let route = route?;
        Some(Self {
            fee: None,
            zone_name: None,
            distance_km: route.distance_meters() / 1000.0,
            minutes: route.duration_seconds() / 60.0,
            source: if route.is_drawn() {
                EstimateSource::Route
            } else {
                EstimateSource::StraightLine
            },
        })
    }

    pub fn summary(&self) -> String {
        format_summary(self.distance_km, self.minutes)
    }

    /// Fee text, or `None` while the fee is unknown.
    pub fn fee_label(&self) -> Option<String> {
        self.fee.map(format_fee)
    }
}

/// Turns a location into a delivery quote.
pub struct DeliveryPricingResolver<P> {
    backend: P,
    timeout: Duration,
}

impl<P: PricingBackend> DeliveryPricingResolver<P> {
    pub fn new(backend: P) -> Self {
        Self {
            backend,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Quotes `request`.
    ///
    /// # Errors
    ///
    /// - [`PricingError::InvalidDeliveryZone`] if delivery is not offered.
    /// - [`PricingError::Network`] on backend failure, timeout, or a quote
    ///   with a negative or non-finite fee.
    pub async fn quote(&self, request: &QuoteRequest) -> Result<DeliveryQuote, PricingError> {
        let quote = tokio::time::timeout(self.timeout, self.backend.quote_delivery(request))
            .await
            .map_err(|_| NetworkError::Timeout)??;

        // Unserved zones may carry a sentinel fee; the zone verdict wins.
        if !quote.is_valid {
            return Err(PricingError::InvalidDeliveryZone {
                zone_name: quote.zone_name,
            });
        }
        if !quote.fee.is_finite() || quote.fee < 0.0 {
            return Err(NetworkError::Malformed(format!("invalid fee {}", quote.fee)).into());
        }
        Ok(quote)
    }

    pub async fn quote_point(&self, point: GeoPoint) -> Result<DeliveryQuote, PricingError> {
        self.quote(&QuoteRequest::coordinates(point)).await
    }

    pub async fn quote_postal_code(&self, raw: &str) -> Result<DeliveryQuote, PricingError> {
        let request = QuoteRequest::postal_code(raw)?;
        self.quote(&request).await
    }

    /// Prices `request` for the workflow: an unserved zone becomes
    /// [`DeliveryInfo::Unavailable`], any other failure is logged and yields
    /// `None` so the flow keeps going.
    pub async fn delivery_info(&self, request: &QuoteRequest) -> Option<DeliveryInfo> {
        match self.quote(request).await {
            Ok(quote) => Some(DeliveryInfo::Available(quote)),
            Err(PricingError::InvalidDeliveryZone { zone_name }) => {
                tracing::info!(zone = %zone_name, "delivery not offered at selected address");
                Some(DeliveryInfo::Unavailable { zone_name })
            }
            Err(err) => {
                tracing::warn!(error = %err, "delivery quote unavailable");
                None
            }
        }
    }
}
