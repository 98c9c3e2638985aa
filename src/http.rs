//! HTTP adapters for the routing, geocoding and pricing backends.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::error::NetworkError;
use crate::geo::GeoPoint;
use crate::pricing::{DeliveryQuote, QuoteRequest};
use crate::traits::{
    Address, GeocodeCandidate, Geocoder, PricingBackend, RouteResponse, RoutingBackend, TransportMode,
};

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 10,
            user_agent: concat!("checkout-geo/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// Shared request plumbing for the three adapters.
#[derive(Debug, Clone)]
struct JsonApi {
    base_url: String,
    client: Client,
}

impl JsonApi {
    fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Sends the request and parses the body. `Ok(None)` for 404 or a JSON
    /// `null` body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>, NetworkError> {
        let response = request.send().await.map_err(map_reqwest)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(NetworkError::Status(status.as_u16()));
        }
        let body = response.text().await.map_err(map_reqwest)?;
        serde_json::from_str::<Option<T>>(&body).map_err(|e| NetworkError::Malformed(e.to_string()))
    }

    async fn require<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, NetworkError> {
        self.send(request)
            .await?
            .ok_or_else(|| NetworkError::Malformed("empty response".to_string()))
    }
}

fn map_reqwest(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else {
        NetworkError::Http(err)
    }
}

fn coord_param(point: GeoPoint) -> String {
    format!("{:.6},{:.6}", point.lat, point.lng)
}

/// `GET {base}/route?origin=lat,lng&destination=lat,lng&transportMode=car`
#[derive(Debug, Clone)]
pub struct HttpRoutingClient {
    api: JsonApi,
}

impl HttpRoutingClient {
    pub fn new(config: HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api: JsonApi::new(&config)?,
        })
    }
}

impl RoutingBackend for HttpRoutingClient {
    async fn route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TransportMode,
    ) -> Result<RouteResponse, NetworkError> {
        let request = self.api.client.get(self.api.url("route")).query(&[
            ("origin", coord_param(origin)),
            ("destination", coord_param(destination)),
            ("transportMode", mode.as_str().to_string()),
        ]);
        self.api.require(request).await
    }
}

/// `GET {base}/reverse-geocode?lat=..&lng=..` and `GET {base}/geocode?q=..`
#[derive(Debug, Clone)]
pub struct HttpGeocodingClient {
    api: JsonApi,
}

impl HttpGeocodingClient {
    pub fn new(config: HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api: JsonApi::new(&config)?,
        })
    }
}

impl Geocoder for HttpGeocodingClient {
    async fn reverse_geocode(&self, point: GeoPoint) -> Result<Option<Address>, NetworkError> {
        let request = self
            .api
            .client
            .get(self.api.url("reverse-geocode"))
            .query(&[
                ("lat", format!("{:.6}", point.lat)),
                ("lng", format!("{:.6}", point.lng)),
            ]);
        self.api.send(request).await
    }

    async fn geocode(&self, query: &str) -> Result<Vec<GeocodeCandidate>, NetworkError> {
        let request = self.api.client.get(self.api.url("geocode")).query(&[("q", query)]);
        Ok(self.api.send(request).await?.unwrap_or_default())
    }
}

/// `POST {base}/delivery/quote` with `{lat,lng}` or `{postalCode}`.
#[derive(Debug, Clone)]
pub struct HttpPricingClient {
    api: JsonApi,
}

impl HttpPricingClient {
    pub fn new(config: HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api: JsonApi::new(&config)?,
        })
    }
}

impl PricingBackend for HttpPricingClient {
    async fn quote_delivery(&self, request: &QuoteRequest) -> Result<DeliveryQuote, NetworkError> {
        let request = self.api.client.post(self.api.url("delivery/quote")).json(request);
        self.api.require(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_strips_trailing_slash() {
        let api = JsonApi::new(&HttpConfig::new("http://example.test/api/")).unwrap();
        assert_eq!(api.url("route"), "http://example.test/api/route");
    }

    #[test]
    fn test_coord_param_precision() {
        assert_eq!(coord_param(GeoPoint::new(-10.1854332, -48.3038653)), "-10.185433,-48.303865");
    }
}
