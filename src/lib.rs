pub mod db;
pub mod lunar;
pub mod models;
pub mod scoring;
pub mod session;
pub mod settings;
pub mod sources;
pub mod store;
mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use log::{error, info};

use session::SessionController;
use settings::SettingsStore;
use sources::{DisabledLocation, IpLocationProvider, LocationProvider, OpenMeteoClient, SolunarClient};
use store::SqliteRecordStore;

pub struct AppState {
    pub session: SessionController,
    pub settings: SettingsStore,
}

/// `CATCHLOG_DATA_DIR` if set, otherwise the platform data directory.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("CATCHLOG_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("catchlog")
}

/// Wires settings, the record store and both data sources into a session.
pub fn build_state(data_dir: &Path) -> Result<AppState> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let sources = settings.sources();

    let store = SqliteRecordStore::open(data_dir.join("catchlog.sqlite3"))?;

    let location: Arc<dyn LocationProvider> = if sources.use_device_location {
        Arc::new(IpLocationProvider::new(
            sources.geolocation_url.clone(),
            sources.location_timeout(),
        )?)
    } else {
        Arc::new(DisabledLocation)
    };

    let weather = OpenMeteoClient::new(
        sources.weather_base_url.clone(),
        sources.network_timeout(),
        location,
        sources.location_timeout(),
        sources.default_coordinates,
    )?;
    let moon = SolunarClient::new(
        sources.moon_base_url.clone(),
        sources.network_timeout(),
        sources.default_coordinates,
    )?;

    Ok(AppState {
        session: SessionController::new(Arc::new(store), Arc::new(weather), Arc::new(moon)),
        settings,
    })
}

async fn daily_report(state: &AppState) -> Result<()> {
    let session = &state.session;
    session.initialize().await;
    session.wait_for_enrichment().await;

    let snapshot = session.snapshot().await;
    if let Some(message) = &snapshot.error {
        error!("{message}");
    }

    println!(
        "{} catch(es), {:.2} kg total",
        snapshot.count, snapshot.total_weight
    );
    for record in snapshot.records.iter().take(5) {
        println!(
            "  {}  {:<16} {:<20} {:.2} kg",
            record.date().format("%Y-%m-%d"),
            record.species(),
            record.location(),
            record.weight()
        );
    }

    let sources = state.settings.sources();
    let moon = &snapshot.moon;
    println!(
        "Moon: {} {} ({:.0}% lit) at {:.4},{:.4}",
        moon.icon,
        moon.name,
        moon.illumination * 100.0,
        sources.default_coordinates.latitude,
        sources.default_coordinates.longitude
    );
    match &snapshot.weather {
        Some(weather) => println!(
            "Weather: {} {} {:.1}°C, humidity {}%, wind {:.1} km/h",
            weather.icon,
            weather.condition,
            weather.temperature_c,
            weather.humidity_pct,
            weather.wind_speed_kmh
        ),
        None => println!("Weather: unavailable"),
    }
    println!(
        "Bite forecast: {} ({})",
        snapshot.score.total,
        snapshot.score.label.as_str()
    );

    Ok(())
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Catchlog starting up...");

    let result = (|| -> Result<()> {
        let data_dir = data_dir();
        let state = build_state(&data_dir)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        runtime.block_on(daily_report(&state))
    })();

    if let Err(err) = result {
        error!("{err:#}");
        std::process::exit(1);
    }
}
