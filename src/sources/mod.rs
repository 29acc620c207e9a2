//! Environmental data sources.
//!
//! Each adapter works internally with `Result<_, SourceError>` and collapses
//! failures to `None` at the trait boundary: a missing snapshot is the only
//! signal the session ever sees. Every network call is bounded twice, by the
//! HTTP client timeout and by an outer `tokio::time::timeout`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Coordinates, MoonSnapshot, WeatherSnapshot};

pub mod location;
pub mod moon;
pub mod weather;

pub use location::{
    resolve_coordinates, DisabledLocation, FixedLocation, IpLocationProvider, LocationError,
    LocationProvider,
};
pub use moon::SolunarClient;
pub use weather::OpenMeteoClient;

pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("catchlog/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("parse error: {0}")]
    Parse(String),
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Conditions at the device position, or at the fallback coordinate when
    /// the position cannot be had in time.
    async fn fetch_current(&self) -> Option<WeatherSnapshot>;

    async fn fetch_at(&self, coordinates: Coordinates) -> Option<WeatherSnapshot>;
}

#[async_trait]
pub trait MoonSource: Send + Sync {
    async fn fetch_at(&self, coordinates: Coordinates) -> Option<MoonSnapshot>;

    /// Moon data at the configured fixed coordinate.
    async fn fetch_default(&self) -> Option<MoonSnapshot>;
}

pub(crate) fn http_client(request_timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| SourceError::Network(e.to_string()))
}

/// Runs `fut` but gives up after `limit`.
pub(crate) async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(limit)),
    }
}
