//! Daily bite score.
//!
//! Three bounded components summed and clamped to 0..=100:
//! moon phase (0-40), weather code (0-40) and wind speed (0-20).
//! Pure functions only; callers re-evaluate on every read.

use serde::{Deserialize, Serialize};

use crate::models::WeatherSnapshot;

/// Weather component used when no snapshot has ever been fetched.
pub const DEFAULT_WEATHER_SCORE: u8 = 30;

/// Wind assumed when no snapshot has ever been fetched.
pub const DEFAULT_WIND_KMH: f64 = 10.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScoreLabel {
    Excellent,
    Good,
    Fair,
    Poor,
    Bad,
}

impl ScoreLabel {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => ScoreLabel::Excellent,
            60..=79 => ScoreLabel::Good,
            40..=59 => ScoreLabel::Fair,
            20..=39 => ScoreLabel::Poor,
            _ => ScoreLabel::Bad,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreLabel::Excellent => "Excellent",
            ScoreLabel::Good => "Good",
            ScoreLabel::Fair => "Fair",
            ScoreLabel::Poor => "Poor",
            ScoreLabel::Bad => "Bad",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub phase: u8,
    pub weather: u8,
    pub wind: u8,
    pub total: u8,
    pub label: ScoreLabel,
}

/// Computes the composite score from the effective phase index and the
/// latest weather snapshot, if any.
pub fn compute_score(phase_index: u8, weather: Option<&WeatherSnapshot>) -> ScoreBreakdown {
    let phase = score_phase(phase_index);
    let weather_score = weather
        .map(|snapshot| score_weather_code(snapshot.weather_code))
        .unwrap_or(DEFAULT_WEATHER_SCORE);
    let wind = score_wind(
        weather
            .map(|snapshot| snapshot.wind_speed_kmh)
            .unwrap_or(DEFAULT_WIND_KMH),
    );

    let total = (u16::from(phase) + u16::from(weather_score) + u16::from(wind)).min(100) as u8;

    ScoreBreakdown {
        phase,
        weather: weather_score,
        wind,
        total,
        label: ScoreLabel::from_score(total),
    }
}

/// New and full moon score highest, quarters next, crescents and gibbous lowest.
pub fn score_phase(phase_index: u8) -> u8 {
    match phase_index % 8 {
        0 | 4 => 40,
        2 | 6 => 25,
        _ => 15,
    }
}

/// Bands over the WMO code scale; higher codes mean heavier precipitation.
pub fn score_weather_code(code: i32) -> u8 {
    match code {
        i32::MIN..=2 => 32,
        3 => 38,
        4..=48 => 28,
        49..=67 => 25,
        68..=77 => 15,
        78..=82 => 22,
        _ => 10,
    }
}

pub fn score_wind(wind_kmh: f64) -> u8 {
    if wind_kmh < 5.0 {
        15
    } else if wind_kmh <= 15.0 {
        20
    } else if wind_kmh <= 25.0 {
        10
    } else {
        // Also catches NaN.
        5
    }
}
