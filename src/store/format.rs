//! On-disk layout of the record list.
//!
//! Current payloads are `{"version": 1, "records": [...]}`. Installs that
//! predate the version tag stored a bare array, which still decodes and is
//! rewritten in the current layout on the next save.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::Record;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct PayloadRef<'a> {
    version: u32,
    records: &'a [Record],
}

#[derive(Deserialize)]
struct Payload {
    version: u32,
    records: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnyPayload {
    Versioned(Payload),
    Legacy(Vec<serde_json::Value>),
}

#[derive(Debug, Default)]
pub struct Decoded {
    pub records: Vec<Record>,
    /// Entries that failed to parse or broke a record invariant.
    pub skipped: usize,
    pub legacy: bool,
}

pub fn encode(records: &[Record]) -> Result<String> {
    serde_json::to_string(&PayloadRef {
        version: FORMAT_VERSION,
        records,
    })
    .context("failed to serialize records")
}

/// Errors only when the payload as a whole is unusable. Individual bad
/// entries are dropped and counted in `skipped`.
pub fn decode(raw: &str) -> Result<Decoded> {
    let payload: AnyPayload =
        serde_json::from_str(raw).context("stored records are not valid JSON")?;

    let (entries, legacy) = match payload {
        AnyPayload::Versioned(payload) => {
            if payload.version > FORMAT_VERSION {
                bail!(
                    "stored records use format version {} (newest supported is {})",
                    payload.version,
                    FORMAT_VERSION
                );
            }
            (payload.records, false)
        }
        AnyPayload::Legacy(entries) => (entries, true),
    };

    let mut decoded = Decoded {
        legacy,
        ..Decoded::default()
    };

    for entry in entries {
        match serde_json::from_value::<Record>(entry) {
            Ok(record) if record.is_well_formed() => decoded.records.push(record),
            _ => decoded.skipped += 1,
        }
    }

    Ok(decoded)
}
