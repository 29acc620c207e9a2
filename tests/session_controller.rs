use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use catchlog_lib::{
    models::{Coordinates, MoonPhase, MoonSnapshot, NewRecord, Record, WeatherSnapshot},
    scoring::ScoreLabel,
    session::{PhaseSource, SessionController, SessionError, SessionEvent, SessionEventKind},
    sources::{MoonSource, WeatherSource},
    store::{RecordStore, SqliteRecordStore},
};
use chrono::{TimeZone, Utc};

#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<Record>>,
    fail_writes: AtomicBool,
    fail_load: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    fn with(records: Vec<Record>) -> Arc<Self> {
        let store = Self::default();
        *store.records.lock().unwrap() = records;
        Arc::new(store)
    }

    fn stored(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Record>> {
        if self.fail_load.load(Ordering::SeqCst) {
            bail!("disk unreadable");
        }
        Ok(self.stored())
    }

    async fn save(&self, records: &[Record]) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        *self.records.lock().unwrap() = records.to_vec();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.records.lock().unwrap().clear();
        Ok(())
    }
}

/// Plays back queued responses, each after an optional delay; once the queue
/// is empty every call yields `fallback`.
struct Scripted<T> {
    queue: Mutex<VecDeque<(Duration, Option<T>)>>,
    fallback: Option<T>,
    calls: AtomicUsize,
}

impl<T: Clone> Scripted<T> {
    fn always(value: Option<T>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: value,
            calls: AtomicUsize::new(0),
        })
    }

    fn script(steps: Vec<(Duration, Option<T>)>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(steps.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
        })
    }

    async fn next(&self) -> Option<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.queue.lock().unwrap().pop_front();
        match step {
            Some((delay, value)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                value
            }
            None => self.fallback.clone(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for Scripted<WeatherSnapshot> {
    async fn fetch_current(&self) -> Option<WeatherSnapshot> {
        self.next().await
    }

    async fn fetch_at(&self, _coordinates: Coordinates) -> Option<WeatherSnapshot> {
        self.next().await
    }
}

#[async_trait]
impl MoonSource for Scripted<MoonSnapshot> {
    async fn fetch_at(&self, _coordinates: Coordinates) -> Option<MoonSnapshot> {
        self.next().await
    }

    async fn fetch_default(&self) -> Option<MoonSnapshot> {
        self.next().await
    }
}

fn weather(code: i32, wind: f64) -> WeatherSnapshot {
    WeatherSnapshot {
        temperature_c: 12.5,
        weather_code: code,
        humidity_pct: 80,
        wind_speed_kmh: wind,
        coordinates: Coordinates::DEFAULT,
        fetched_at: Utc::now(),
    }
}

fn moon(phase: MoonPhase) -> MoonSnapshot {
    MoonSnapshot {
        phase,
        illumination: 0.0,
        moonrise: None,
        moonset: None,
        fetched_at: Utc::now(),
    }
}

fn input(day: u32, location: &str, species: &str, weight: f64) -> NewRecord {
    NewRecord {
        date: Utc.with_ymd_and_hms(2024, 8, day, 0, 0, 0).unwrap(),
        location: location.into(),
        species: species.into(),
        weight,
    }
}

fn seeded() -> Vec<Record> {
    vec![
        Record::new(input(2, "Ouse", "Barbel", 4.1)).unwrap(),
        Record::new(input(5, "Ouse", "Chub", 2.0)).unwrap(),
        Record::new(input(3, "Trent", "Pike", 7.3)).unwrap(),
    ]
}

fn offline() -> (Arc<Scripted<WeatherSnapshot>>, Arc<Scripted<MoonSnapshot>>) {
    (Scripted::always(None), Scripted::always(None))
}

fn controller(
    store: Arc<MemoryStore>,
    weather: Arc<Scripted<WeatherSnapshot>>,
    moon: Arc<Scripted<MoonSnapshot>>,
) -> SessionController {
    SessionController::new(store, weather, moon)
}

fn record_events(controller: &SessionController) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    controller.subscribe(move |event: &SessionEvent| sink.lock().unwrap().push(event.clone()));
    events
}

fn kinds(events: &Mutex<Vec<SessionEvent>>) -> Vec<SessionEventKind> {
    events.lock().unwrap().iter().map(|e| e.kind).collect()
}

#[tokio::test]
async fn test_initialize_loads_records_and_clears_loading() {
    let store = MemoryStore::with(seeded());
    let (w, m) = offline();
    let controller = controller(store.clone(), w, m);
    let events = record_events(&controller);

    controller.initialize().await;

    controller.wait_for_enrichment().await;

    assert!(!controller.is_loading().await);
    assert_eq!(controller.record_count().await, 3);
    assert_eq!(controller.error().await, None);

    let seen = events.lock().unwrap().clone();
    assert_eq!(seen.first().map(|e| e.kind), Some(SessionEventKind::LoadStarted));
    assert!(seen[0].snapshot.loading);
    let finished = seen
        .iter()
        .find(|e| e.kind == SessionEventKind::LoadFinished)
        .expect("load finished event");
    assert!(!finished.snapshot.loading);
    assert_eq!(finished.snapshot.count, 3);
}

#[tokio::test]
async fn test_initialize_with_unreadable_store_starts_empty_with_error() {
    let store = MemoryStore::with(seeded());
    store.fail_load.store(true, Ordering::SeqCst);
    let (w, m) = offline();
    let controller = controller(store, w, m);

    controller.initialize().await;

    controller.wait_for_enrichment().await;

    assert!(!controller.is_loading().await);
    assert_eq!(controller.record_count().await, 0);
    let error = controller.error().await.expect("load error surfaced");
    assert!(error.contains("Failed to load records"));
}

#[tokio::test]
async fn test_initialize_triggers_background_enrichment() {
    let store = MemoryStore::with(Vec::new());
    let controller = controller(
        store,
        Scripted::always(Some(weather(3, 10.0))),
        Scripted::always(Some(moon(MoonPhase::New))),
    );

    controller.initialize().await;
    controller.wait_for_enrichment().await;

    assert!(controller.weather().await.is_some());
    assert_eq!(controller.moon_view().await.source, PhaseSource::Network);
    assert_eq!(controller.score().await.total, 98);
    assert_eq!(controller.score_label().await, ScoreLabel::Excellent);
}

#[tokio::test]
async fn test_add_record_persists_trimmed_record_with_fresh_id() {
    let store = MemoryStore::with(seeded());
    let (w, m) = offline();
    let controller = controller(store.clone(), w, m);
    controller.initialize().await;
    controller.wait_for_enrichment().await;
    let before = controller.records().await;
    let events = record_events(&controller);

    let added = controller
        .add_record(input(9, "  Severn ", " Barbel  ", 5.25))
        .await
        .unwrap();

    assert_eq!(added.location(), "Severn");
    assert_eq!(added.species(), "Barbel");
    assert!(before.iter().all(|r| r.id() != added.id()));

    let after = controller.records().await;
    assert_eq!(after.len(), before.len() + 1);
    for record in &before {
        assert!(after.contains(record));
    }
    assert_eq!(store.stored().len(), 4);
    assert!(store.stored().contains(&added));
    assert_eq!(kinds(&events), vec![SessionEventKind::RecordAdded]);
}

#[tokio::test]
async fn test_add_record_rolls_back_when_save_fails() {
    let records = seeded();
    let store = MemoryStore::with(records.clone());
    let (w, m) = offline();
    let controller = controller(store.clone(), w, m);
    controller.initialize().await;
    controller.wait_for_enrichment().await;
    let events = record_events(&controller);

    store.fail_writes.store(true, Ordering::SeqCst);
    let result = controller.add_record(input(9, "Severn", "Barbel", 5.0)).await;

    assert!(matches!(result, Err(SessionError::Persist { operation: "save record", .. })));
    assert_eq!(controller.record_count().await, records.len());
    assert!(controller.error().await.unwrap().contains("Failed to save record"));

    let seen = events.lock().unwrap().clone();
    assert_eq!(
        seen.iter().map(|e| e.kind).collect::<Vec<_>>(),
        vec![SessionEventKind::RecordAdded, SessionEventKind::RolledBack]
    );
    // The optimistic notification showed the new record before the write failed.
    assert_eq!(seen[0].snapshot.count, 4);
    assert_eq!(seen[1].snapshot.count, 3);
    assert!(seen[1].snapshot.error.is_some());

    // The next successful write exposes the in-memory list in storage order:
    // the seeded records untouched and in place, then the new one.
    store.fail_writes.store(false, Ordering::SeqCst);
    let extra = controller.add_record(input(1, "Wye", "Grayling", 0.6)).await.unwrap();
    let stored = store.stored();
    assert_eq!(stored.len(), 4);
    assert_eq!(&stored[..3], records.as_slice());
    assert_eq!(stored[3], extra);
}

#[tokio::test]
async fn test_add_record_rejects_invalid_input_without_side_effects() {
    let store = MemoryStore::with(seeded());
    let (w, m) = offline();
    let controller = controller(store.clone(), w, m);
    controller.initialize().await;
    controller.wait_for_enrichment().await;
    let events = record_events(&controller);

    let result = controller.add_record(input(9, "Severn", "   ", 1.0)).await;
    assert!(matches!(result, Err(SessionError::InvalidRecord(_))));
    let result = controller.add_record(input(9, "Severn", "Barbel", 0.0)).await;
    assert!(matches!(result, Err(SessionError::InvalidRecord(_))));

    assert_eq!(controller.record_count().await, 3);
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    assert!(kinds(&events).is_empty());
    assert_eq!(controller.error().await, None);
}

#[tokio::test]
async fn test_delete_unknown_id_is_a_noop() {
    let store = MemoryStore::with(seeded());
    let (w, m) = offline();
    let controller = controller(store.clone(), w, m);
    controller.initialize().await;
    controller.wait_for_enrichment().await;
    let before = controller.records().await;
    let events = record_events(&controller);

    let result = controller.delete_record("no-such-id").await;

    assert!(matches!(result, Err(SessionError::NotFound(id)) if id == "no-such-id"));
    assert_eq!(controller.records().await, before);
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    assert!(kinds(&events).is_empty());
}

#[tokio::test]
async fn test_delete_record_persists_removal() {
    let records = seeded();
    let target = records[1].clone();
    let store = MemoryStore::with(records);
    let (w, m) = offline();
    let controller = controller(store.clone(), w, m);
    controller.initialize().await;
    controller.wait_for_enrichment().await;

    let removed = controller.delete_record(target.id()).await.unwrap();

    assert_eq!(removed, target);
    assert_eq!(controller.record_count().await, 2);
    assert!(!store.stored().contains(&target));
}

#[tokio::test]
async fn test_failed_delete_restores_record_at_original_index() {
    let records = seeded();
    let middle = records[1].clone();
    let store = MemoryStore::with(records.clone());
    let (w, m) = offline();
    let controller = controller(store.clone(), w, m);
    controller.initialize().await;
    controller.wait_for_enrichment().await;
    let events = record_events(&controller);

    store.fail_writes.store(true, Ordering::SeqCst);
    let result = controller.delete_record(middle.id()).await;
    assert!(matches!(result, Err(SessionError::Persist { operation: "delete record", .. })));

    // Persisting again exposes the in-memory storage order.
    store.fail_writes.store(false, Ordering::SeqCst);
    let extra = controller.add_record(input(1, "Wye", "Grayling", 0.6)).await.unwrap();
    let stored = store.stored();
    assert_eq!(&stored[..3], records.as_slice());
    assert_eq!(stored[3], extra);

    assert!(controller.error().await.unwrap().contains("Failed to delete record"));
    let seen = kinds(&events);
    assert_eq!(&seen[..2], &[SessionEventKind::RecordDeleted, SessionEventKind::RolledBack]);
}

#[tokio::test]
async fn test_clear_records_rolls_back_on_failure() {
    let store = MemoryStore::with(seeded());
    let (w, m) = offline();
    let controller = controller(store.clone(), w, m);
    controller.initialize().await;
    controller.wait_for_enrichment().await;
    let before = controller.records().await;

    store.fail_writes.store(true, Ordering::SeqCst);
    assert!(controller.clear_records().await.is_err());
    assert_eq!(controller.records().await, before);

    store.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(controller.clear_records().await.unwrap(), 3);
    assert_eq!(controller.record_count().await, 0);
    assert!(store.stored().is_empty());
}

#[tokio::test]
async fn test_clear_error() {
    let store = MemoryStore::with(seeded());
    store.fail_load.store(true, Ordering::SeqCst);
    let (w, m) = offline();
    let controller = controller(store, w, m);
    controller.initialize().await;
    controller.wait_for_enrichment().await;
    let events = record_events(&controller);

    controller.clear_error().await;
    controller.clear_error().await;

    assert_eq!(controller.error().await, None);
    assert_eq!(kinds(&events), vec![SessionEventKind::ErrorCleared]);
}

#[tokio::test]
async fn test_refresh_with_both_sources_down_is_silent() {
    let store = MemoryStore::with(Vec::new());
    let (w, m) = offline();
    let controller = controller(store, w, m);
    let events = record_events(&controller);

    let outcome = controller.refresh().await;

    assert!(!outcome.weather_updated && !outcome.moon_updated);
    assert!(!controller.is_refreshing().await);
    assert_eq!(controller.error().await, None);
    assert!(controller.weather().await.is_none());
    assert_eq!(controller.moon_view().await.source, PhaseSource::Local);

    let seen = events.lock().unwrap().clone();
    assert_eq!(
        seen.iter().map(|e| e.kind).collect::<Vec<_>>(),
        vec![SessionEventKind::RefreshStarted, SessionEventKind::RefreshFinished]
    );
    assert!(seen[0].snapshot.refreshing);
    assert!(!seen[1].snapshot.refreshing);

    // Neutral defaults: 30 for weather, 20 for the assumed 10 km/h wind.
    let score = controller.score().await;
    assert_eq!((score.weather, score.wind), (30, 20));
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshots() {
    let weather_source = Scripted::script(vec![
        (Duration::ZERO, Some(weather(96, 30.0))),
        (Duration::ZERO, None),
    ]);
    let moon_source = Scripted::script(vec![
        (Duration::ZERO, Some(moon(MoonPhase::WaxingGibbous))),
        (Duration::ZERO, None),
    ]);
    let controller = controller(MemoryStore::with(Vec::new()), weather_source, moon_source);

    let first = controller.refresh().await;
    assert!(first.weather_updated && first.moon_updated);
    let score = controller.score().await;
    assert_eq!(score.total, 30);
    assert_eq!(score.label, ScoreLabel::Poor);

    let second = controller.refresh().await;
    assert!(!second.weather_updated && !second.moon_updated);
    assert_eq!(controller.weather().await.unwrap().weather_code, 96);
    assert_eq!(controller.moon().await.unwrap().phase, MoonPhase::WaxingGibbous);
    assert_eq!(controller.score().await.total, 30);
}

// Overlapping refreshes are allowed; the result of the most recently started
// refresh wins and a slower, older fetch that lands afterwards is dropped.
#[tokio::test(start_paused = true)]
async fn test_overlapping_refresh_keeps_newest_started_result() {
    let weather_source = Scripted::script(vec![
        (Duration::from_millis(500), Some(weather(95, 40.0))),
        (Duration::ZERO, Some(weather(1, 8.0))),
    ]);
    let controller = controller(
        MemoryStore::with(Vec::new()),
        weather_source.clone(),
        Scripted::always(None),
    );

    let slow = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.refresh().await })
    };
    while weather_source.calls() == 0 {
        tokio::task::yield_now().await;
    }

    let fast = controller.refresh().await;
    assert!(fast.weather_updated);
    assert_eq!(controller.weather().await.unwrap().weather_code, 1);
    assert!(controller.is_refreshing().await, "slow refresh still in flight");

    let slow = slow.await.unwrap();
    assert!(!slow.weather_updated);
    assert_eq!(controller.weather().await.unwrap().weather_code, 1);
    assert!(!controller.is_refreshing().await);
}

// A caller that gives up on a refresh must not leave the session stuck in
// the refreshing state; the detached fetch still lands and clears it.
#[tokio::test(start_paused = true)]
async fn test_abandoned_refresh_still_clears_refreshing() {
    let weather_source = Scripted::script(vec![(Duration::from_secs(60), Some(weather(2, 12.0)))]);
    let controller = controller(
        MemoryStore::with(Vec::new()),
        weather_source,
        Scripted::always(None),
    );

    let waited = tokio::time::timeout(Duration::from_secs(1), controller.refresh()).await;
    assert!(waited.is_err());
    assert!(controller.is_refreshing().await, "abandoned fetch still in flight");

    let start = tokio::time::Instant::now();
    while controller.is_refreshing().await {
        assert!(start.elapsed() < Duration::from_secs(120), "refreshing never cleared");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(controller.weather().await.unwrap().weather_code, 2);

    controller.refresh().await;
    assert!(!controller.is_refreshing().await);
    assert_eq!(controller.weather().await.unwrap().weather_code, 2);
}

#[tokio::test]
async fn test_records_are_sorted_newest_first() {
    let store = MemoryStore::with(seeded());
    let (w, m) = offline();
    let controller = controller(store, w, m);
    controller.initialize().await;
    controller.wait_for_enrichment().await;

    let species: Vec<String> = controller
        .records()
        .await
        .iter()
        .map(|r| r.species().to_string())
        .collect();
    assert_eq!(species, ["Chub", "Pike", "Barbel"]);
    assert!((controller.total_weight().await - 13.4).abs() < 1e-9);
}

#[tokio::test]
async fn test_unsubscribed_listener_hears_nothing() {
    let (w, m) = offline();
    let controller = controller(MemoryStore::with(Vec::new()), w, m);
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let id = controller.subscribe(move |_: &SessionEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    controller.refresh().await;
    assert_eq!(count.load(Ordering::SeqCst), 2);

    assert!(controller.unsubscribe(id));
    controller.refresh().await;
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_records_survive_restart_through_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catchlog.sqlite3");

    let added = {
        let store = Arc::new(SqliteRecordStore::open(path.clone()).unwrap());
        let (w, m) = offline();
        let controller = SessionController::new(store, w, m);
        controller.initialize().await;
        controller.wait_for_enrichment().await;
        let a = controller.add_record(input(4, "Tay", "Salmon", 9.8)).await.unwrap();
        let b = controller.add_record(input(6, "Tweed", "Sea trout", 2.2)).await.unwrap();
        controller.wait_for_enrichment().await;
        vec![a, b]
    };

    let store = Arc::new(SqliteRecordStore::open(path).unwrap());
    let (w, m) = offline();
    let controller = SessionController::new(store, w, m);
    controller.initialize().await;
    controller.wait_for_enrichment().await;

    let mut reloaded = controller.records().await;
    reloaded.reverse();
    assert_eq!(reloaded, added);
}
