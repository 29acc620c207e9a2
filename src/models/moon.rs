use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the eight steps of the lunar cycle, indexed 0 (new) through 7.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MoonPhase {
    New,
    WaxingCrescent,
    FirstQuarter,
    WaxingGibbous,
    Full,
    WaningGibbous,
    LastQuarter,
    WaningCrescent,
}

impl MoonPhase {
    pub const ALL: [MoonPhase; 8] = [
        MoonPhase::New,
        MoonPhase::WaxingCrescent,
        MoonPhase::FirstQuarter,
        MoonPhase::WaxingGibbous,
        MoonPhase::Full,
        MoonPhase::WaningGibbous,
        MoonPhase::LastQuarter,
        MoonPhase::WaningCrescent,
    ];

    /// Indices outside 0..8 wrap around the cycle.
    pub fn from_index(index: u8) -> Self {
        Self::ALL[usize::from(index % 8)]
    }

    pub fn index(&self) -> u8 {
        match self {
            MoonPhase::New => 0,
            MoonPhase::WaxingCrescent => 1,
            MoonPhase::FirstQuarter => 2,
            MoonPhase::WaxingGibbous => 3,
            MoonPhase::Full => 4,
            MoonPhase::WaningGibbous => 5,
            MoonPhase::LastQuarter => 6,
            MoonPhase::WaningCrescent => 7,
        }
    }

    /// Parses names as the solunar API spells them ("Waxing Crescent",
    /// "Third Quarter", ...). Case, spaces and underscores are ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "new" | "newmoon" => Some(MoonPhase::New),
            "waxingcrescent" => Some(MoonPhase::WaxingCrescent),
            "firstquarter" => Some(MoonPhase::FirstQuarter),
            "waxinggibbous" => Some(MoonPhase::WaxingGibbous),
            "full" | "fullmoon" => Some(MoonPhase::Full),
            "waninggibbous" => Some(MoonPhase::WaningGibbous),
            "lastquarter" | "thirdquarter" => Some(MoonPhase::LastQuarter),
            "waningcrescent" => Some(MoonPhase::WaningCrescent),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MoonPhase::New => "New Moon",
            MoonPhase::WaxingCrescent => "Waxing Crescent",
            MoonPhase::FirstQuarter => "First Quarter",
            MoonPhase::WaxingGibbous => "Waxing Gibbous",
            MoonPhase::Full => "Full Moon",
            MoonPhase::WaningGibbous => "Waning Gibbous",
            MoonPhase::LastQuarter => "Last Quarter",
            MoonPhase::WaningCrescent => "Waning Crescent",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            MoonPhase::New => "🌑",
            MoonPhase::WaxingCrescent => "🌒",
            MoonPhase::FirstQuarter => "🌓",
            MoonPhase::WaxingGibbous => "🌔",
            MoonPhase::Full => "🌕",
            MoonPhase::WaningGibbous => "🌖",
            MoonPhase::LastQuarter => "🌗",
            MoonPhase::WaningCrescent => "🌘",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoonSnapshot {
    pub phase: MoonPhase,
    /// Fraction of the disc lit, 0.0..=1.0.
    pub illumination: f64,
    pub moonrise: Option<NaiveTime>,
    pub moonset: Option<NaiveTime>,
    pub fetched_at: DateTime<Utc>,
}
