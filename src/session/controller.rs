use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    lunar,
    models::{MoonSnapshot, NewRecord, Record, RecordError, WeatherSnapshot},
    scoring::{ScoreBreakdown, ScoreLabel},
    sources::{MoonSource, WeatherSource},
    store::RecordStore,
};

use super::{
    events::{Listener, Listeners, SessionEvent, SessionEventKind, SubscriptionId},
    state::{MoonView, SessionSnapshot, SessionState, WeatherView},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("no record with id {0}")]
    NotFound(String),

    #[error("failed to {operation}: {message}")]
    Persist {
        operation: &'static str,
        message: String,
    },
}

/// Which snapshots a refresh actually replaced.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub weather_updated: bool,
    pub moon_updated: bool,
}

/// Owns the session state and coordinates the store and data sources.
///
/// Record commands are optimistic: the in-memory list changes and listeners
/// hear about it before the store is written; a failed write undoes the
/// change and reports it through the error field. Commands that write are
/// serialized so one command's rollback never sees another's provisional
/// change.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn RecordStore>,
    weather: Arc<dyn WeatherSource>,
    moon: Arc<dyn MoonSource>,
    listeners: Arc<Listeners>,
    write_lock: Arc<Mutex<()>>,
    enrichment: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn RecordStore>,
        weather: Arc<dyn WeatherSource>,
        moon: Arc<dyn MoonSource>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            store,
            weather,
            moon,
            listeners: Arc::new(Listeners::default()),
            write_lock: Arc::new(Mutex::new(())),
            enrichment: Arc::new(Mutex::new(None)),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // Commands

    /// Loads the stored records and kicks off background enrichment.
    ///
    /// `loading` covers the local load only; enrichment finishes on its own
    /// and can be awaited with [`wait_for_enrichment`](Self::wait_for_enrichment).
    pub async fn initialize(&self) {
        {
            let mut state = self.state.lock().await;
            state.set_loading(true);
            state.clear_error();
        }
        self.emit(SessionEventKind::LoadStarted).await;

        let loaded = match self.store.initialize().await {
            Ok(()) => self.store.load().await,
            Err(err) => Err(err),
        };

        {
            let mut state = self.state.lock().await;
            match loaded {
                Ok(records) => {
                    info!("Loaded {} record(s)", records.len());
                    state.replace_records(records);
                }
                Err(err) => {
                    error!("Failed to load records: {err:#}");
                    state.replace_records(Vec::new());
                    state.set_error(format!("Failed to load records: {err}"));
                }
            }
            let today = Utc::now().date_naive();
            state.set_fallback(lunar::phase_index_on(today), lunar::illumination_on(today));
        }

        self.spawn_enrichment().await;

        {
            let mut state = self.state.lock().await;
            state.set_loading(false);
        }
        self.emit(SessionEventKind::LoadFinished).await;
    }

    /// Recomputes the local phase and fetches weather and moon data
    /// concurrently. Source failures leave the previous snapshot in place and
    /// never surface as session errors.
    ///
    /// The work runs on its own task: a caller that stops waiting detaches it
    /// and `refreshing` still drops once the fetches land.
    pub async fn refresh(&self) -> RefreshOutcome {
        let controller = self.clone();
        match tokio::spawn(async move { controller.run_refresh().await }).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Refresh task failed: {err}");
                RefreshOutcome::default()
            }
        }
    }

    async fn run_refresh(&self) -> RefreshOutcome {
        let seq = {
            let mut state = self.state.lock().await;
            let today = Utc::now().date_naive();
            state.set_fallback(lunar::phase_index_on(today), lunar::illumination_on(today));
            state.begin_refresh()
        };
        self.emit(SessionEventKind::RefreshStarted).await;

        let (weather, moon) = tokio::join!(self.weather.fetch_current(), self.moon.fetch_default());

        let outcome = {
            let mut state = self.state.lock().await;
            let outcome = RefreshOutcome {
                weather_updated: weather.map_or(false, |w| state.apply_weather(seq, w)),
                moon_updated: moon.map_or(false, |m| state.apply_moon(seq, m)),
            };
            state.finish_refresh();
            outcome
        };

        debug!(
            "Refresh #{seq} finished (weather updated: {}, moon updated: {})",
            outcome.weather_updated, outcome.moon_updated
        );
        self.emit(SessionEventKind::RefreshFinished).await;
        outcome
    }

    /// Waits for the enrichment started by the last `initialize`, if any.
    pub async fn wait_for_enrichment(&self) {
        let handle = self.enrichment.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!("Background enrichment task failed: {err}");
            }
        }
    }

    pub async fn add_record(&self, input: NewRecord) -> Result<Record, SessionError> {
        let record = Record::new(input)?;
        let _write = self.write_lock.lock().await;

        let records = {
            let mut state = self.state.lock().await;
            state.push_record(record.clone());
            state.records().to_vec()
        };
        self.emit(SessionEventKind::RecordAdded).await;

        if let Err(err) = self.store.save(&records).await {
            error!("Failed to persist record {}: {err:#}", record.id());
            {
                let mut state = self.state.lock().await;
                state.remove_by_id(record.id());
                state.set_error(format!("Failed to save record: {err}"));
            }
            self.emit(SessionEventKind::RolledBack).await;
            return Err(SessionError::Persist {
                operation: "save record",
                message: err.to_string(),
            });
        }

        info!("Added record {} ({})", record.id(), record.species());
        Ok(record)
    }

    pub async fn delete_record(&self, id: &str) -> Result<Record, SessionError> {
        let _write = self.write_lock.lock().await;

        let (index, removed, records) = {
            let mut state = self.state.lock().await;
            let Some(index) = state.position_of(id) else {
                return Err(SessionError::NotFound(id.to_string()));
            };
            let removed = state.remove_at(index);
            (index, removed, state.records().to_vec())
        };
        self.emit(SessionEventKind::RecordDeleted).await;

        if let Err(err) = self.store.save(&records).await {
            error!("Failed to persist deletion of {id}: {err:#}");
            {
                let mut state = self.state.lock().await;
                state.restore_at(index, removed);
                state.set_error(format!("Failed to delete record: {err}"));
            }
            self.emit(SessionEventKind::RolledBack).await;
            return Err(SessionError::Persist {
                operation: "delete record",
                message: err.to_string(),
            });
        }

        info!("Deleted record {id}");
        Ok(removed)
    }

    /// Removes every record. Returns how many were removed.
    pub async fn clear_records(&self) -> Result<usize, SessionError> {
        let _write = self.write_lock.lock().await;

        let removed = {
            let mut state = self.state.lock().await;
            state.take_records()
        };
        self.emit(SessionEventKind::RecordsCleared).await;

        if let Err(err) = self.store.clear().await {
            error!("Failed to clear stored records: {err:#}");
            {
                let mut state = self.state.lock().await;
                state.replace_records(removed);
                state.set_error(format!("Failed to clear records: {err}"));
            }
            self.emit(SessionEventKind::RolledBack).await;
            return Err(SessionError::Persist {
                operation: "clear records",
                message: err.to_string(),
            });
        }

        info!("Cleared {} record(s)", removed.len());
        Ok(removed.len())
    }

    pub async fn clear_error(&self) {
        let cleared = self.state.lock().await.clear_error();
        if cleared {
            self.emit(SessionEventKind::ErrorCleared).await;
        }
    }

    // Read projections

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Records newest first.
    pub async fn records(&self) -> Vec<Record> {
        self.state.lock().await.sorted_records()
    }

    pub async fn record_count(&self) -> usize {
        self.state.lock().await.count()
    }

    pub async fn total_weight(&self) -> f64 {
        self.state.lock().await.total_weight()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.is_loading()
    }

    pub async fn is_refreshing(&self) -> bool {
        self.state.lock().await.is_refreshing()
    }

    pub async fn error(&self) -> Option<String> {
        self.state.lock().await.error().map(str::to_string)
    }

    pub async fn weather(&self) -> Option<WeatherSnapshot> {
        self.state.lock().await.weather().cloned()
    }

    pub async fn moon(&self) -> Option<MoonSnapshot> {
        self.state.lock().await.moon().cloned()
    }

    pub async fn weather_view(&self) -> Option<WeatherView> {
        self.state.lock().await.weather_view()
    }

    pub async fn moon_view(&self) -> MoonView {
        self.state.lock().await.moon_view()
    }

    pub async fn score(&self) -> ScoreBreakdown {
        self.state.lock().await.score()
    }

    pub async fn score_label(&self) -> ScoreLabel {
        self.state.lock().await.score_label()
    }

    async fn spawn_enrichment(&self) {
        let controller = self.clone();
        let handle = tokio::spawn(async move {
            controller.refresh().await;
        });

        // A previous enrichment still in flight is detached, not aborted; its
        // results are sequence-guarded like any overlapping refresh.
        *self.enrichment.lock().await = Some(handle);
    }

    async fn emit(&self, kind: SessionEventKind) {
        if self.listeners.is_empty() {
            return;
        }
        let snapshot = self.state.lock().await.snapshot();
        self.listeners.emit(&SessionEvent { kind, snapshot });
    }
}
