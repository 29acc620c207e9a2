//! Open-Meteo current conditions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{Coordinates, WeatherSnapshot};

use super::{http_client, resolve_coordinates, with_deadline, LocationProvider, SourceError, WeatherSource};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m";

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    weather_code: i32,
    /// km/h, the API default unit.
    wind_speed_10m: f64,
}

pub struct OpenMeteoClient {
    http_client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    location: Arc<dyn LocationProvider>,
    location_timeout: Duration,
    fallback: Coordinates,
}

impl OpenMeteoClient {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        location: Arc<dyn LocationProvider>,
        location_timeout: Duration,
        fallback: Coordinates,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            http_client: http_client(request_timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
            location,
            location_timeout,
            fallback,
        })
    }

    async fn request(&self, coordinates: Coordinates) -> Result<WeatherSnapshot, SourceError> {
        let url = format!("{}/v1/forecast", self.base_url);
        log_debug!(
            "Querying weather at {},{}",
            coordinates.latitude,
            coordinates.longitude
        );

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("latitude", coordinates.latitude.to_string()),
                ("longitude", coordinates.longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
                ("wind_speed_unit", "kmh".to_string()),
            ])
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

        parse_forecast(&body, coordinates, Utc::now())
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    /// The location wait and the request share one `request_timeout` budget.
    async fn fetch_current(&self) -> Option<WeatherSnapshot> {
        let lookup = async {
            let coordinates =
                resolve_coordinates(self.location.as_ref(), self.location_timeout, self.fallback)
                    .await;
            self.request(coordinates).await
        };

        match with_deadline(self.request_timeout, lookup).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log_warn!("Weather unavailable: {err}");
                None
            }
        }
    }

    async fn fetch_at(&self, coordinates: Coordinates) -> Option<WeatherSnapshot> {
        match with_deadline(self.request_timeout, self.request(coordinates)).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log_warn!("Weather unavailable: {err}");
                None
            }
        }
    }
}

fn parse_forecast(
    body: &str,
    coordinates: Coordinates,
    fetched_at: DateTime<Utc>,
) -> Result<WeatherSnapshot, SourceError> {
    let parsed: ForecastResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;
    let current = parsed.current;

    Ok(WeatherSnapshot {
        temperature_c: current.temperature_2m,
        weather_code: current.weather_code,
        humidity_pct: current.relative_humidity_2m.round().clamp(0.0, 100.0) as i32,
        wind_speed_kmh: current.wind_speed_10m.max(0.0),
        coordinates,
        fetched_at,
    })
}
