use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;

use crate::{
    lunar,
    models::{MoonPhase, MoonSnapshot, Record, WeatherSnapshot},
    scoring::{compute_score, ScoreBreakdown, ScoreLabel},
};

/// Authoritative in-memory session data.
///
/// `records` keeps insertion order; the read projection sorts newest first
/// on every call. Snapshots are `None` until a fetch has succeeded.
#[derive(Debug, Clone)]
pub struct SessionState {
    records: Vec<Record>,
    weather: Option<WeatherSnapshot>,
    moon: Option<MoonSnapshot>,
    fallback_phase: u8,
    fallback_illumination: f64,
    loading: bool,
    refreshes_in_flight: u32,
    error: Option<String>,
    /// Sequence number handed to the most recently started refresh.
    refresh_seq: u64,
    weather_seq: u64,
    moon_seq: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        let today = Utc::now().date_naive();
        Self {
            records: Vec::new(),
            weather: None,
            moon: None,
            fallback_phase: lunar::phase_index_on(today),
            fallback_illumination: lunar::illumination_on(today),
            loading: false,
            refreshes_in_flight: 0,
            error: None,
            refresh_seq: 0,
            weather_seq: 0,
            moon_seq: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PhaseSource {
    Network,
    Local,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeatherView {
    pub condition: &'static str,
    pub icon: &'static str,
    pub temperature_c: f64,
    pub humidity_pct: i32,
    pub wind_speed_kmh: f64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoonView {
    pub phase_index: u8,
    pub name: &'static str,
    pub icon: &'static str,
    pub illumination: f64,
    pub moonrise: Option<NaiveTime>,
    pub moonset: Option<NaiveTime>,
    pub source: PhaseSource,
}

/// Everything the presentation layer reads, computed in one pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub records: Vec<Record>,
    pub count: usize,
    pub total_weight: f64,
    pub loading: bool,
    pub refreshing: bool,
    pub error: Option<String>,
    pub weather: Option<WeatherView>,
    pub moon: MoonView,
    pub score: ScoreBreakdown,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    // Read projections

    /// Records newest first. Same-day records keep insertion order.
    pub fn sorted_records(&self) -> Vec<Record> {
        let mut records = self.records.clone();
        records.sort_by(|a, b| b.date().cmp(&a.date()));
        records
    }

    /// Records in insertion order, as persisted.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.records.iter().map(Record::weight).sum()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshes_in_flight > 0
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn weather(&self) -> Option<&WeatherSnapshot> {
        self.weather.as_ref()
    }

    pub fn moon(&self) -> Option<&MoonSnapshot> {
        self.moon.as_ref()
    }

    pub fn fallback_phase(&self) -> u8 {
        self.fallback_phase
    }

    /// Moon snapshot phase when one has been fetched, else the local estimate.
    pub fn effective_phase(&self) -> u8 {
        self.moon
            .as_ref()
            .map(|moon| moon.phase.index())
            .unwrap_or(self.fallback_phase)
    }

    pub fn score(&self) -> ScoreBreakdown {
        compute_score(self.effective_phase(), self.weather.as_ref())
    }

    pub fn score_label(&self) -> ScoreLabel {
        self.score().label
    }

    pub fn weather_view(&self) -> Option<WeatherView> {
        self.weather.as_ref().map(|weather| {
            let condition = weather.condition();
            WeatherView {
                condition: condition.label(),
                icon: condition.icon(),
                temperature_c: weather.temperature_c,
                humidity_pct: weather.humidity_pct,
                wind_speed_kmh: weather.wind_speed_kmh,
                fetched_at: weather.fetched_at,
            }
        })
    }

    pub fn moon_view(&self) -> MoonView {
        match &self.moon {
            Some(moon) => MoonView {
                phase_index: moon.phase.index(),
                name: moon.phase.name(),
                icon: moon.phase.icon(),
                illumination: moon.illumination,
                moonrise: moon.moonrise,
                moonset: moon.moonset,
                source: PhaseSource::Network,
            },
            None => {
                let phase = MoonPhase::from_index(self.fallback_phase);
                MoonView {
                    phase_index: phase.index(),
                    name: phase.name(),
                    icon: phase.icon(),
                    illumination: self.fallback_illumination,
                    moonrise: None,
                    moonset: None,
                    source: PhaseSource::Local,
                }
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            records: self.sorted_records(),
            count: self.count(),
            total_weight: self.total_weight(),
            loading: self.loading,
            refreshing: self.is_refreshing(),
            error: self.error.clone(),
            weather: self.weather_view(),
            moon: self.moon_view(),
            score: self.score(),
        }
    }

    // Transitions, driven by the controller

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub(crate) fn replace_records(&mut self, records: Vec<Record>) {
        self.records = records;
    }

    pub(crate) fn take_records(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }

    pub(crate) fn push_record(&mut self, record: Record) {
        self.records.push(record);
    }

    pub(crate) fn position_of(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|record| record.id() == id)
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Record {
        self.records.remove(index)
    }

    pub(crate) fn remove_by_id(&mut self, id: &str) -> Option<Record> {
        self.position_of(id).map(|index| self.records.remove(index))
    }

    /// Puts a record back where it was removed from. The index is clamped in
    /// case the list shrank meanwhile.
    pub(crate) fn restore_at(&mut self, index: usize, record: Record) {
        let index = index.min(self.records.len());
        self.records.insert(index, record);
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Returns whether there was an error to clear.
    pub(crate) fn clear_error(&mut self) -> bool {
        self.error.take().is_some()
    }

    pub(crate) fn set_fallback(&mut self, phase: u8, illumination: f64) {
        self.fallback_phase = phase % 8;
        self.fallback_illumination = illumination;
    }

    /// Marks a refresh as started and returns its sequence number.
    pub(crate) fn begin_refresh(&mut self) -> u64 {
        self.refreshes_in_flight += 1;
        self.refresh_seq += 1;
        self.refresh_seq
    }

    pub(crate) fn finish_refresh(&mut self) {
        self.refreshes_in_flight = self.refreshes_in_flight.saturating_sub(1);
    }

    /// Stores `snapshot` unless a refresh started later has already stored
    /// one. Returns whether it was applied.
    pub(crate) fn apply_weather(&mut self, seq: u64, snapshot: WeatherSnapshot) -> bool {
        if seq < self.weather_seq {
            return false;
        }
        self.weather_seq = seq;
        self.weather = Some(snapshot);
        true
    }

    pub(crate) fn apply_moon(&mut self, seq: u64, snapshot: MoonSnapshot) -> bool {
        if seq < self.moon_seq {
            return false;
        }
        self.moon_seq = seq;
        self.moon = Some(snapshot);
        true
    }
}
