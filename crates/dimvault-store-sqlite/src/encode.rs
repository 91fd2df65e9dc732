//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Dates are stored as ISO 8601 (`YYYY-MM-DD`), which compares correctly as
//! TEXT. Timestamps are RFC 3339 strings. Attribute sets are compact JSON
//! objects.

use chrono::{DateTime, NaiveDate, Utc};
use dimvault_core::version::{DimensionVersion, NaturalKey, SurrogateKey};

use crate::{Error, Result};

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  s.parse().map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Row type ────────────────────────────────────────────────────────────────

/// Raw values read directly from a dimension-table row.
pub struct RawVersion {
  pub surrogate_key:       i64,
  pub natural_key:         String,
  pub attributes:          String,
  pub effective_from_date: String,
  pub effective_to_date:   Option<String>,
  pub is_current_record:   bool,
  pub loaded_at:           String,
}

impl RawVersion {
  pub fn into_version(self) -> Result<DimensionVersion> {
    Ok(DimensionVersion {
      surrogate_key:  SurrogateKey(self.surrogate_key as u64),
      natural_key:    NaturalKey::new(self.natural_key).map_err(Error::Core)?,
      attributes:     serde_json::from_str(&self.attributes)?,
      effective_from: decode_date(&self.effective_from_date)?,
      effective_to:   self
        .effective_to_date
        .as_deref()
        .map(decode_date)
        .transpose()?,
      is_current:     self.is_current_record,
      loaded_at:      decode_dt(&self.loaded_at)?,
    })
  }
}
