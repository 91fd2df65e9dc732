//! The `DimensionStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `dimvault-store-sqlite`).
//! Higher layers (`dimvault-engine`, `dimvault-cli`) depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::NaiveDate;

use crate::{
  attr::AttributeSet,
  version::{DimensionId, DimensionVersion, NaturalKey, SurrogateKey},
};

// ─── Write outcome ───────────────────────────────────────────────────────────

/// Result of a conditional write. Losing an optimistic race is an expected
/// value, not an error: callers re-run their read-detect-write sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
  Applied,
  /// The row the write was conditioned on is no longer the current one.
  /// The store is unchanged.
  Conflict,
}

impl WriteOutcome {
  pub fn is_applied(self) -> bool { matches!(self, Self::Applied) }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a versioned dimension store backend.
///
/// Versions are never deleted; writes either open the first version of a
/// natural key, atomically close-and-supersede the current one, or overwrite
/// Type-1 attributes in place. All conditional writes are atomic: a
/// closed-but-not-superseded state is never observable.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait DimensionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Provisioning ──────────────────────────────────────────────────────

  /// Create the backing storage for `dimension` if it does not exist yet.
  /// Idempotent.
  fn ensure_dimension<'a>(
    &'a self,
    dimension: &'a DimensionId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Queries ───────────────────────────────────────────────────────────

  /// The single current (open) version for a natural key, or `None` if the
  /// key has never been loaded. Never returns a closed version.
  ///
  /// Implementations must fail (with an `AmbiguousCurrentVersion`-carrying
  /// error) if more than one current row exists; that state means the store
  /// needs manual repair.
  fn current_version<'a>(
    &'a self,
    dimension: &'a DimensionId,
    natural_key: &'a NaturalKey,
  ) -> impl Future<Output = Result<Option<DimensionVersion>, Self::Error>> + Send + 'a;

  /// The version whose `[effective_from, effective_to)` interval covers
  /// `date`, if any.
  fn version_as_of<'a>(
    &'a self,
    dimension: &'a DimensionId,
    natural_key: &'a NaturalKey,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Option<DimensionVersion>, Self::Error>> + Send + 'a;

  /// The full history for a natural key in chain order (ascending surrogate
  /// key, equivalently ascending `effective_from`).
  fn all_versions<'a>(
    &'a self,
    dimension: &'a DimensionId,
    natural_key: &'a NaturalKey,
  ) -> impl Future<Output = Result<Vec<DimensionVersion>, Self::Error>> + Send + 'a;

  /// One page of the history: up to `limit` versions with surrogate keys
  /// strictly greater than `after`, in chain order. [`VersionCursor`] builds
  /// a lazy, restartable traversal on top of this.
  fn versions_after<'a>(
    &'a self,
    dimension: &'a DimensionId,
    natural_key: &'a NaturalKey,
    after: Option<SurrogateKey>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<DimensionVersion>, Self::Error>> + Send + 'a;

  // ── Conditional writes ────────────────────────────────────────────────

  /// Insert the first (open) version for a natural key. `Conflict` if a
  /// current version already exists for it.
  fn insert_first<'a>(
    &'a self,
    dimension: &'a DimensionId,
    version: DimensionVersion,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + 'a;

  /// Atomically close `expected_current` at `version.effective_from` and
  /// insert `version` as the new current row. `Conflict` if
  /// `expected_current` is no longer the current version.
  fn close_and_insert<'a>(
    &'a self,
    dimension: &'a DimensionId,
    expected_current: SurrogateKey,
    version: DimensionVersion,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + 'a;

  /// Overwrite the attributes of the current version in place (Type-1
  /// update); surrogate key and date range are untouched. `Conflict` if
  /// `surrogate_key` is no longer the current version.
  fn overwrite_attributes<'a>(
    &'a self,
    dimension: &'a DimensionId,
    surrogate_key: SurrogateKey,
    attributes: AttributeSet,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + 'a;

  // ── Surrogate keys ────────────────────────────────────────────────────

  /// Allocate the next surrogate key for `dimension`: atomic, monotonically
  /// increasing, never reused. Keys handed out but never persisted leave
  /// gaps, which is fine.
  fn next_key<'a>(
    &'a self,
    dimension: &'a DimensionId,
  ) -> impl Future<Output = Result<SurrogateKey, Self::Error>> + Send + 'a;

  /// Push the key counter to at least `floor`, so keys issued after a bulk
  /// load cannot collide with externally-loaded rows.
  fn advance_key_floor<'a>(
    &'a self,
    dimension: &'a DimensionId,
    floor: SurrogateKey,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// Page size used by [`VersionCursor`] when the caller does not choose one.
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// A lazy, finite, restartable traversal of one natural key's history in
/// chain order, fetching one page of versions at a time.
pub struct VersionCursor<'a, S: DimensionStore> {
  store:       &'a S,
  dimension:   DimensionId,
  natural_key: NaturalKey,
  page_size:   usize,
  after:       Option<SurrogateKey>,
  buffer:      std::collections::VecDeque<DimensionVersion>,
  exhausted:   bool,
}

impl<'a, S: DimensionStore> VersionCursor<'a, S> {
  pub fn new(
    store: &'a S,
    dimension: DimensionId,
    natural_key: NaturalKey,
  ) -> Self {
    Self::with_page_size(store, dimension, natural_key, DEFAULT_PAGE_SIZE)
  }

  pub fn with_page_size(
    store: &'a S,
    dimension: DimensionId,
    natural_key: NaturalKey,
    page_size: usize,
  ) -> Self {
    Self {
      store,
      dimension,
      natural_key,
      page_size: page_size.max(1),
      after: None,
      buffer: std::collections::VecDeque::new(),
      exhausted: false,
    }
  }

  /// The next version in chain order, or `None` once the history is
  /// exhausted.
  pub async fn next(&mut self) -> Result<Option<DimensionVersion>, S::Error> {
    if self.buffer.is_empty() && !self.exhausted {
      let page = self
        .store
        .versions_after(
          &self.dimension,
          &self.natural_key,
          self.after,
          self.page_size,
        )
        .await?;
      if page.len() < self.page_size {
        self.exhausted = true;
      }
      if let Some(last) = page.last() {
        self.after = Some(last.surrogate_key);
      }
      self.buffer.extend(page);
    }
    Ok(self.buffer.pop_front())
  }

  /// Restart the traversal from the beginning of the chain.
  pub fn rewind(&mut self) {
    self.after = None;
    self.buffer.clear();
    self.exhausted = false;
  }
}
