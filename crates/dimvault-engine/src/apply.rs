//! The version writer — applying a classified change against the store.
//!
//! Concurrency follows the optimistic discipline: every write is conditioned
//! on the version it read still being current, and a lost race re-runs the
//! whole read-detect-write sequence. Retries are bounded; cross-natural-key
//! loads never contend.

use dimvault_core::{
  profile::ProfileSet,
  store::{DimensionStore, WriteOutcome},
  version::{AsOfRecord, DimensionId, DimensionVersion, NaturalKey, SurrogateKey},
};
use thiserror::Error;

use crate::detect;

/// Attempts per record before a lost race is surfaced to the caller.
pub const DEFAULT_RETRY_LIMIT: usize = 3;

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// What one applied record did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
  /// Nothing differed; no writes were issued.
  Unchanged { surrogate_key: SurrogateKey },
  /// Type-1 attributes overwritten in place; key and date range untouched.
  Overwritten {
    surrogate_key: SurrogateKey,
    attributes:    Vec<String>,
  },
  /// The current version was closed and a new one opened.
  Versioned {
    closed: SurrogateKey,
    opened: SurrogateKey,
  },
  /// First version for a previously unseen natural key.
  Created { surrogate_key: SurrogateKey },
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApplyError<E> {
  #[error("no profile configured for dimension {0}")]
  UnknownDimension(DimensionId),

  #[error(
    "as-of date {as_of} predates current version \
     (effective from {effective_from}) for {natural_key}"
  )]
  InvalidAsOfDate {
    natural_key:    NaturalKey,
    as_of:          chrono::NaiveDate,
    effective_from: chrono::NaiveDate,
  },

  #[error(
    "gave up on {dimension}/{natural_key} after {attempts} concurrent \
     modification(s)"
  )]
  ConcurrentModification {
    dimension:   DimensionId,
    natural_key: NaturalKey,
    attempts:    usize,
  },

  #[error("store error: {0}")]
  Store(#[from] E),
}

// ─── VersionManager ──────────────────────────────────────────────────────────

/// Applies as-of records against a [`DimensionStore`], keeping every natural
/// key's version chain contiguous with exactly one current version.
#[derive(Clone)]
pub struct VersionManager<S> {
  store:       S,
  profiles:    ProfileSet,
  retry_limit: usize,
}

impl<S: DimensionStore> VersionManager<S> {
  pub fn new(store: S, profiles: ProfileSet) -> Self {
    Self {
      store,
      profiles,
      retry_limit: DEFAULT_RETRY_LIMIT,
    }
  }

  pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
    self.retry_limit = retry_limit.max(1);
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn profiles(&self) -> &ProfileSet { &self.profiles }

  /// Apply one incoming record. Idempotent: re-applying the identical record
  /// for the identical as-of date yields [`ApplyOutcome::Unchanged`], because
  /// the just-written version is the new comparison basis.
  pub async fn apply(
    &self,
    record: &AsOfRecord,
  ) -> Result<ApplyOutcome, ApplyError<S::Error>> {
    let profile = self
      .profiles
      .get(&record.dimension)
      .ok_or_else(|| ApplyError::UnknownDimension(record.dimension.clone()))?;
    let incoming = profile.normalize(&record.attributes);

    for attempt in 1..=self.retry_limit {
      let current = self
        .store
        .current_version(&record.dimension, &record.natural_key)
        .await?;

      let outcome = match current {
        None => {
          let key = self.store.next_key(&record.dimension).await?;
          let version = DimensionVersion::open(
            key,
            record.natural_key.clone(),
            incoming.clone(),
            record.as_of_date,
          );
          match self.store.insert_first(&record.dimension, version).await? {
            WriteOutcome::Applied => {
              Some(ApplyOutcome::Created { surrogate_key: key })
            }
            WriteOutcome::Conflict => None,
          }
        }

        Some(cur) => {
          // Out-of-order loads are rejected, never silently reordered.
          // An as-of equal to effective_from is a same-day correction and
          // closes the current version into a zero-width interval.
          if record.as_of_date < cur.effective_from {
            return Err(ApplyError::InvalidAsOfDate {
              natural_key:    record.natural_key.clone(),
              as_of:          record.as_of_date,
              effective_from: cur.effective_from,
            });
          }

          let diff = detect::diff(profile, &cur.attributes, &incoming);
          if !diff.type2.is_empty() {
            tracing::debug!(
              dimension = %record.dimension,
              natural_key = %record.natural_key,
              changed = ?diff.type2,
              "type-2 change; opening new version"
            );
            let key = self.store.next_key(&record.dimension).await?;
            let version = DimensionVersion::open(
              key,
              record.natural_key.clone(),
              incoming.clone(),
              record.as_of_date,
            );
            match self
              .store
              .close_and_insert(&record.dimension, cur.surrogate_key, version)
              .await?
            {
              WriteOutcome::Applied => Some(ApplyOutcome::Versioned {
                closed: cur.surrogate_key,
                opened: key,
              }),
              WriteOutcome::Conflict => None,
            }
          } else if !diff.type1.is_empty() {
            tracing::debug!(
              dimension = %record.dimension,
              natural_key = %record.natural_key,
              changed = ?diff.type1,
              "type-1 change; overwriting in place"
            );
            match self
              .store
              .overwrite_attributes(
                &record.dimension,
                cur.surrogate_key,
                incoming.clone(),
              )
              .await?
            {
              WriteOutcome::Applied => Some(ApplyOutcome::Overwritten {
                surrogate_key: cur.surrogate_key,
                attributes:    diff.type1,
              }),
              WriteOutcome::Conflict => None,
            }
          } else {
            Some(ApplyOutcome::Unchanged {
              surrogate_key: cur.surrogate_key,
            })
          }
        }
      };

      match outcome {
        Some(outcome) => return Ok(outcome),
        None => {
          tracing::warn!(
            dimension = %record.dimension,
            natural_key = %record.natural_key,
            attempt,
            "conditional write lost a race; re-reading"
          );
        }
      }
    }

    Err(ApplyError::ConcurrentModification {
      dimension:   record.dimension.clone(),
      natural_key: record.natural_key.clone(),
      attempts:    self.retry_limit,
    })
  }
}
