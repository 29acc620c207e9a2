use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::models::Coordinates;

use super::{http_client, with_deadline, SourceError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub const IP_API_URL: &str = "http://ip-api.com/json/?fields=status,message,lat,lon";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location services are disabled")]
    ServicesDisabled,

    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

/// Position lookup switched off in settings.
pub struct DisabledLocation;

#[async_trait]
impl LocationProvider for DisabledLocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::ServicesDisabled)
    }
}

/// A position pinned by the user.
pub struct FixedLocation(pub Coordinates);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Coarse position from the public IP address. Desktop builds have no GPS,
/// so this stands in for device geolocation.
pub struct IpLocationProvider {
    http_client: reqwest::Client,
    url: String,
    request_timeout: Duration,
}

impl IpLocationProvider {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            http_client: http_client(request_timeout)?,
            url: url.into(),
            request_timeout,
        })
    }

    async fn lookup(&self) -> Result<Coordinates, SourceError> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SourceError::Api(status.as_u16(), error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        parse_ip_api(&body)
    }
}

#[async_trait]
impl LocationProvider for IpLocationProvider {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        with_deadline(self.request_timeout, self.lookup())
            .await
            .map_err(|err| LocationError::Unavailable(err.to_string()))
    }
}

fn parse_ip_api(body: &str) -> Result<Coordinates, SourceError> {
    let parsed: IpApiResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;

    if parsed.status != "success" {
        return Err(SourceError::Parse(
            parsed
                .message
                .unwrap_or_else(|| format!("lookup status {}", parsed.status)),
        ));
    }

    match (parsed.lat, parsed.lon) {
        (Some(lat), Some(lon)) => {
            let coordinates = Coordinates::new(lat, lon);
            if coordinates.is_valid() {
                Ok(coordinates)
            } else {
                Err(SourceError::Parse(format!("out of range position {lat},{lon}")))
            }
        }
        _ => Err(SourceError::Parse("response missing lat/lon".into())),
    }
}

/// Asks `provider` for a position, waiting at most `wait`. Any failure or a
/// slow answer yields `fallback`.
pub async fn resolve_coordinates(
    provider: &dyn LocationProvider,
    wait: Duration,
    fallback: Coordinates,
) -> Coordinates {
    match tokio::time::timeout(wait, provider.current_position()).await {
        Ok(Ok(coordinates)) if coordinates.is_valid() => coordinates,
        Ok(Ok(coordinates)) => {
            log_info!(
                "Ignoring invalid position {},{}; using fallback",
                coordinates.latitude,
                coordinates.longitude
            );
            fallback
        }
        Ok(Err(err)) => {
            log_debug!("Location unavailable ({err}); using fallback");
            fallback
        }
        Err(_) => {
            log_info!("Location lookup exceeded {wait:?}; using fallback");
            fallback
        }
    }
}
