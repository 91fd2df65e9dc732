//! The dimension version manager.
//!
//! Applies incoming "current truth" records against a dimension's versioned
//! history: detects whether anything changed, overwrites Type-1 attributes in
//! place, and opens/closes Type-2 versions while keeping the chain contiguous.
//! Generic over any [`dimvault_core::store::DimensionStore`].

pub mod apply;
pub mod detect;

pub use apply::{ApplyError, ApplyOutcome, VersionManager};
pub use detect::{AttributeDiff, ChangeKind};
