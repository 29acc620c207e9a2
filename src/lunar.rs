//! Offline lunar phase approximation.
//!
//! Counts whole days since a known new moon and folds them onto a mean
//! synodic month. Good to within a day or so, which is all the score needs
//! when the moon source is unreachable.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate, Utc};

/// Mean synodic month in days.
pub const LUNAR_CYCLE_DAYS: f64 = 29.530_588_67;

/// Days-from-CE of 2000-01-06, a new moon (18:14 UTC).
const REFERENCE_NEW_MOON_DAY: i32 = 730_125;

const PHASE_COUNT: f64 = 8.0;

/// Age of the moon in days, always in `[0, LUNAR_CYCLE_DAYS)`.
pub fn moon_age_on(date: NaiveDate) -> f64 {
    let elapsed_days = i64::from(date.num_days_from_ce()) - i64::from(REFERENCE_NEW_MOON_DAY);
    let age = (elapsed_days as f64).rem_euclid(LUNAR_CYCLE_DAYS);
    // rem_euclid can round up to the modulus itself for tiny negative inputs.
    if age >= LUNAR_CYCLE_DAYS {
        0.0
    } else {
        age
    }
}

/// Phase index 0..=7 for the given calendar day.
pub fn phase_index_on(date: NaiveDate) -> u8 {
    let arc = (moon_age_on(date) / LUNAR_CYCLE_DAYS * PHASE_COUNT).floor() as u8;
    arc % 8
}

/// Approximate lit fraction of the disc, 0.0 at new moon and 1.0 at full.
pub fn illumination_on(date: NaiveDate) -> f64 {
    let angle = 2.0 * PI * moon_age_on(date) / LUNAR_CYCLE_DAYS;
    ((1.0 - angle.cos()) / 2.0).clamp(0.0, 1.0)
}

pub fn current_phase_index() -> u8 {
    phase_index_on(Utc::now().date_naive())
}
