//! Catch records.
//!
//! A `Record` is immutable once built: only `Record::new` (fresh id, trimmed
//! text, validated weight) and deserialization produce one. There is no edit
//! path, the session only ever inserts or removes whole records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("location must not be empty")]
    EmptyLocation,
    #[error("species must not be empty")]
    EmptySpecies,
    #[error("weight must be a positive number of kilograms, got {0}")]
    InvalidWeight(String),
}

/// Fields supplied by the caller when logging a catch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub date: DateTime<Utc>,
    pub location: String,
    pub species: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    id: String,
    date: DateTime<Utc>,
    location: String,
    species: String,
    /// Kilograms.
    weight: f64,
}

impl Record {
    pub fn new(input: NewRecord) -> Result<Self, RecordError> {
        let location = input.location.trim();
        if location.is_empty() {
            return Err(RecordError::EmptyLocation);
        }

        let species = input.species.trim();
        if species.is_empty() {
            return Err(RecordError::EmptySpecies);
        }

        if !is_valid_weight(input.weight) {
            return Err(RecordError::InvalidWeight(input.weight.to_string()));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            date: input.date,
            location: location.to_string(),
            species: species.to_string(),
            weight: input.weight,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Stored records bypass `new`, so the loader re-checks the invariants
    /// before letting one into the session.
    pub fn is_well_formed(&self) -> bool {
        !self.id.is_empty()
            && !self.location.trim().is_empty()
            && !self.species.trim().is_empty()
            && is_valid_weight(self.weight)
    }
}

fn is_valid_weight(weight: f64) -> bool {
    weight.is_finite() && weight > 0.0
}
