//! Solunar moon data.
//!
//! The endpoint takes the location, a local calendar date and a whole-hour UTC
//! offset in the path: `/solunar/{lat},{lon},{yyyymmdd},{tz}`. Rise and set
//! times come back as local `H:MM` strings and are absent on days the moon
//! does not rise or set.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime, Utc};
use serde::Deserialize;

use crate::models::{Coordinates, MoonPhase, MoonSnapshot};

use super::{http_client, with_deadline, MoonSource, SourceError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const SOLUNAR_BASE_URL: &str = "https://api.solunar.org";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolunarResponse {
    moon_phase: String,
    moon_illumination: f64,
    moon_rise: Option<String>,
    moon_set: Option<String>,
}

pub struct SolunarClient {
    http_client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    default_coordinates: Coordinates,
}

impl SolunarClient {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        default_coordinates: Coordinates,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            http_client: http_client(request_timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
            default_coordinates,
        })
    }

    async fn request(&self, coordinates: Coordinates) -> Result<MoonSnapshot, SourceError> {
        let now = Local::now();
        let tz_hours = now.offset().local_minus_utc() / 3600;
        let url = format!(
            "{}/solunar/{},{},{},{}",
            self.base_url,
            coordinates.latitude,
            coordinates.longitude,
            now.format("%Y%m%d"),
            tz_hours
        );
        log_debug!("Querying solunar data: {url}");

        let response = self
            .http_client
            .get(&url)
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

        parse_solunar(&body, Utc::now())
    }
}

#[async_trait]
impl MoonSource for SolunarClient {
    async fn fetch_at(&self, coordinates: Coordinates) -> Option<MoonSnapshot> {
        match with_deadline(self.request_timeout, self.request(coordinates)).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log_warn!("Moon data unavailable: {err}");
                None
            }
        }
    }

    async fn fetch_default(&self) -> Option<MoonSnapshot> {
        self.fetch_at(self.default_coordinates).await
    }
}

fn parse_solunar(body: &str, fetched_at: DateTime<Utc>) -> Result<MoonSnapshot, SourceError> {
    let parsed: SolunarResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;

    let phase = MoonPhase::from_name(&parsed.moon_phase)
        .ok_or_else(|| SourceError::Parse(format!("unknown moon phase '{}'", parsed.moon_phase)))?;

    if !parsed.moon_illumination.is_finite() {
        return Err(SourceError::Parse("illumination is not a number".into()));
    }

    Ok(MoonSnapshot {
        phase,
        illumination: parsed.moon_illumination.clamp(0.0, 1.0),
        moonrise: parse_clock(parsed.moon_rise.as_deref()),
        moonset: parse_clock(parsed.moon_set.as_deref()),
        fetched_at,
    })
}

fn parse_clock(value: Option<&str>) -> Option<NaiveTime> {
    let value = value?.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}
