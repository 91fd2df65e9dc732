//! Dimension versions — the fundamental unit of the dimvault store.
//!
//! A version is one materialised state of one real-world entity over a date
//! range. Versions are never deleted; a version is closed exactly when it is
//! superseded by a newer one for the same natural key.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, attr::AttributeSet};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Identifies one dimension (customer, account, branch, ...).
///
/// The id doubles as the stem of the backing table name, so construction is
/// restricted to `[a-z][a-z0-9_]*`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct DimensionId(String);

impl DimensionId {
  pub fn new(id: impl Into<String>) -> Result<Self> {
    let id = id.into();
    let mut chars = id.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let tail_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if head_ok && tail_ok {
      Ok(Self(id))
    } else {
      Err(Error::InvalidDimensionId(id))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DimensionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for DimensionId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::new(s) }
}

impl From<DimensionId> for String {
  fn from(id: DimensionId) -> Self { id.0 }
}

/// The stable source-system identifier of an entity. Many versions share one
/// natural key; it never changes across the entity's lifetime.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct NaturalKey(String);

impl NaturalKey {
  pub fn new(key: impl Into<String>) -> Result<Self> {
    let key = key.into();
    if key.is_empty() {
      Err(Error::EmptyNaturalKey)
    } else {
      Ok(Self(key))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for NaturalKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for NaturalKey {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::new(s) }
}

impl From<NaturalKey> for String {
  fn from(key: NaturalKey) -> Self { key.0 }
}

/// Store-allocated identifier for one specific version. Monotonically
/// increasing per dimension, never reassigned or reused (gaps permitted).
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
pub struct SurrogateKey(pub u64);

impl fmt::Display for SurrogateKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ─── DimensionVersion ────────────────────────────────────────────────────────

/// One materialised version of one entity, valid over the half-open date
/// range `[effective_from, effective_to)`. `effective_to = None` means the
/// version is open-ended (current).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionVersion {
  pub surrogate_key:  SurrogateKey,
  pub natural_key:    NaturalKey,
  pub attributes:     AttributeSet,
  pub effective_from: NaiveDate,
  pub effective_to:   Option<NaiveDate>,
  /// Redundant cache of `effective_to.is_none()`; the two must always agree.
  pub is_current:     bool,
  /// Audit timestamp assigned when the version was built.
  pub loaded_at:      DateTime<Utc>,
}

impl DimensionVersion {
  /// Build the first (or a superseding) open version for a natural key.
  pub fn open(
    surrogate_key: SurrogateKey,
    natural_key: NaturalKey,
    attributes: AttributeSet,
    effective_from: NaiveDate,
  ) -> Self {
    Self {
      surrogate_key,
      natural_key,
      attributes,
      effective_from,
      effective_to: None,
      is_current: true,
      loaded_at: Utc::now(),
    }
  }

  pub fn is_open(&self) -> bool { self.effective_to.is_none() }

  /// Whether `date` falls inside `[effective_from, effective_to)`.
  pub fn covers(&self, date: NaiveDate) -> bool {
    date >= self.effective_from
      && self.effective_to.is_none_or(|to| date < to)
  }
}

// ─── AsOfRecord ──────────────────────────────────────────────────────────────

/// One incoming "current truth" record from the extraction process.
///
/// The attribute set is a full snapshot of the entity as of `as_of_date`,
/// not a partial patch; an attribute the record omits is treated as null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsOfRecord {
  pub dimension:   DimensionId,
  pub natural_key: NaturalKey,
  pub as_of_date:  NaiveDate,
  pub attributes:  AttributeSet,
}
