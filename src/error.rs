//! Error types for the checkout geo core.

use serde::Serialize;
use thiserror::Error;

/// Failures while decoding a flexible polyline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A character outside the 64-symbol alphabet.
    #[error("invalid polyline character {character:?} at position {position}")]
    Format { position: usize, character: char },

    /// Input ended in the middle of a varint.
    #[error("polyline ended inside a varint")]
    Truncated,

    /// Input ended partway through a lat/lng[/alt] tuple.
    #[error("polyline ended partway through a coordinate tuple")]
    IncompleteTuple,

    /// A varint or running total that does not fit in 64 bits.
    #[error("polyline value overflows at position {position}")]
    Overflow { position: usize },

    /// Input too short to carry the version and header fields.
    #[error("polyline is missing its header")]
    MissingHeader,

    /// Header fields that are out of range or reserved.
    #[error("invalid polyline header: {0}")]
    InvalidHeader(String),

    #[error("unsupported polyline version {0}")]
    UnsupportedVersion(u64),

    /// Fewer than two points survived range filtering.
    #[error("route has {surviving} valid point(s), need at least 2")]
    EmptyRoute { surviving: usize },
}

impl CodecError {
    /// True for the malformed-input family (everything except version and
    /// empty-route failures).
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            CodecError::Format { .. }
                | CodecError::Truncated
                | CodecError::IncompleteTuple
                | CodecError::Overflow { .. }
                | CodecError::MissingHeader
                | CodecError::InvalidHeader(_)
        )
    }
}

/// Device location failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable")]
    Unavailable,

    #[error("location request timed out")]
    Timeout,
}

impl GeolocationError {
    /// Message shown next to the retry / enter-manually actions.
    pub fn user_message(&self) -> &'static str {
        match self {
            GeolocationError::PermissionDenied => {
                "Permissão de localização negada. Ative a localização ou informe o endereço manualmente."
            }
            GeolocationError::Unavailable => {
                "Não foi possível obter sua localização. Tente novamente ou selecione no mapa."
            }
            GeolocationError::Timeout => {
                "A localização demorou demais para responder. Tente novamente ou selecione no mapa."
            }
        }
    }

    /// Whether offering a retry makes sense. A denied permission will just
    /// prompt again (or not at all), so only manual entry is offered.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GeolocationError::PermissionDenied)
    }
}

/// Failures talking to the routing, geocoding or pricing backends.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    /// The owning workflow was torn down while the call was in flight.
    #[error("request cancelled")]
    Cancelled,

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Failures resolving a drawable route.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("routing backend: {0}")]
    Network(#[from] NetworkError),

    #[error("route geometry: {0}")]
    Codec(#[from] CodecError),
}

/// Failures obtaining a delivery quote.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("pricing backend: {0}")]
    Network(#[from] NetworkError),

    /// Delivery is not offered at this address. Pickup remains available.
    #[error("delivery not available for this address (zone {zone_name:?})")]
    InvalidDeliveryZone { zone_name: String },

    #[error("invalid postal code {0:?}")]
    InvalidPostalCode(String),
}

impl PricingError {
    pub fn is_invalid_zone(&self) -> bool {
        matches!(self, PricingError::InvalidDeliveryZone { .. })
    }
}
