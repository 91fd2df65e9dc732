//! Version-chain validation.
//!
//! The source warehouse schema declared the SCD-2 columns but nothing
//! enforced their discipline; two "current" rows for one natural key were
//! representable. These checks are the in-code enforcement, used by tests
//! and the loader's `check` command.

use chrono::NaiveDate;
use thiserror::Error;

use crate::version::{DimensionVersion, SurrogateKey};

/// A violated chain invariant. The chain is inspected in the given order
/// (which must be chain order: ascending surrogate key) and the first
/// violation found is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainViolation {
  #[error("version {surrogate_key}: is_current flag disagrees with effective_to")]
  CurrentFlagMismatch { surrogate_key: SurrogateKey },

  #[error("{count} current versions in one chain")]
  MultipleCurrent { count: usize },

  #[error("version {surrogate_key} is open but not last in the chain")]
  OpenVersionNotLast { surrogate_key: SurrogateKey },

  #[error(
    "gap after version {after}: closed at {closed_at}, successor starts {next_from}"
  )]
  Gap {
    after:     SurrogateKey,
    closed_at: NaiveDate,
    next_from: NaiveDate,
  },

  #[error(
    "overlap after version {after}: closed at {closed_at}, successor starts {next_from}"
  )]
  Overlap {
    after:     SurrogateKey,
    closed_at: NaiveDate,
    next_from: NaiveDate,
  },

  #[error("versions {first} and {second} have different natural keys")]
  NaturalKeyMismatch {
    first:  SurrogateKey,
    second: SurrogateKey,
  },
}

/// Validate one natural key's full history, in chain order.
///
/// An empty chain is valid. A valid non-empty chain is a run of closed,
/// contiguous versions optionally ending in one open (current) version;
/// zero-width intervals from same-day corrections are permitted.
pub fn validate(versions: &[DimensionVersion]) -> Result<(), ChainViolation> {
  for v in versions {
    if v.is_current != v.effective_to.is_none() {
      return Err(ChainViolation::CurrentFlagMismatch {
        surrogate_key: v.surrogate_key,
      });
    }
  }

  let current = versions.iter().filter(|v| v.is_current).count();
  if current > 1 {
    return Err(ChainViolation::MultipleCurrent { count: current });
  }

  for pair in versions.windows(2) {
    let (prev, next) = (&pair[0], &pair[1]);

    if prev.natural_key != next.natural_key {
      return Err(ChainViolation::NaturalKeyMismatch {
        first:  prev.surrogate_key,
        second: next.surrogate_key,
      });
    }

    let Some(closed_at) = prev.effective_to else {
      return Err(ChainViolation::OpenVersionNotLast {
        surrogate_key: prev.surrogate_key,
      });
    };

    if next.effective_from > closed_at {
      return Err(ChainViolation::Gap {
        after: prev.surrogate_key,
        closed_at,
        next_from: next.effective_from,
      });
    }
    if next.effective_from < closed_at {
      return Err(ChainViolation::Overlap {
        after: prev.surrogate_key,
        closed_at,
        next_from: next.effective_from,
      });
    }
  }

  Ok(())
}
