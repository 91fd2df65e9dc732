//! Error types for `dimvault-core`.

use chrono::NaiveDate;
use thiserror::Error;

use crate::version::{DimensionId, NaturalKey};

#[derive(Debug, Error)]
pub enum Error {
  #[error("natural key not found: {dimension}/{natural_key}")]
  NotFound {
    dimension:   DimensionId,
    natural_key: NaturalKey,
  },

  /// More than one current row for a single natural key. This is a
  /// data-integrity violation; processing of the natural key must stop and
  /// the store repaired by hand.
  #[error(
    "ambiguous current version: {count} current rows for \
     {dimension}/{natural_key}"
  )]
  AmbiguousCurrentVersion {
    dimension:   DimensionId,
    natural_key: NaturalKey,
    count:       usize,
  },

  /// Incoming as-of date predates the current version. Backdated corrections
  /// go through an out-of-band repair path, never implicit reordering.
  #[error(
    "as-of date {as_of} predates current version \
     (effective from {effective_from}) for {natural_key}"
  )]
  InvalidAsOfDate {
    natural_key:    NaturalKey,
    as_of:          NaiveDate,
    effective_from: NaiveDate,
  },

  #[error("invalid dimension id: {0:?}")]
  InvalidDimensionId(String),

  #[error("natural key must not be empty")]
  EmptyNaturalKey,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
