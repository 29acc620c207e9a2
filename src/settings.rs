use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::models::Coordinates;
use crate::sources::{
    location::IP_API_URL, moon::SOLUNAR_BASE_URL, weather::OPEN_METEO_BASE_URL,
    DEFAULT_LOCATION_TIMEOUT, DEFAULT_NETWORK_TIMEOUT,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceSettings {
    /// Weather fallback and the fixed point the moon source is queried at.
    pub default_coordinates: Coordinates,
    pub use_device_location: bool,
    pub geolocation_url: String,
    pub weather_base_url: String,
    pub moon_base_url: String,
    pub network_timeout_secs: u64,
    pub location_timeout_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            default_coordinates: Coordinates::DEFAULT,
            use_device_location: true,
            geolocation_url: IP_API_URL.into(),
            weather_base_url: OPEN_METEO_BASE_URL.into(),
            moon_base_url: SOLUNAR_BASE_URL.into(),
            network_timeout_secs: DEFAULT_NETWORK_TIMEOUT.as_secs(),
            location_timeout_secs: DEFAULT_LOCATION_TIMEOUT.as_secs(),
        }
    }
}

impl SourceSettings {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs.max(1))
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_secs(self.location_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    sources: SourceSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn sources(&self) -> SourceSettings {
        match self.data.read() {
            Ok(guard) => guard.sources.clone(),
            Err(poisoned) => poisoned.into_inner().sources.clone(),
        }
    }

    pub fn update_sources(&self, settings: SourceSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.sources = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
