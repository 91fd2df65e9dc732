//! Tracking policy — which attributes version history and which overwrite it.
//!
//! A dimension profile names, per attribute, whether a change overwrites the
//! current version in place (Type 1) or opens a new version (Type 2), and how
//! the value is normalised before comparison. Profiles deserialise from the
//! loader's TOML configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
  attr::{AttributeSet, Normalization},
  version::DimensionId,
};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Slowly-changing-dimension tracking discipline for one attribute.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TrackingKind {
  /// Overwrite in place; no new version, no trace of the prior value.
  Type1,
  /// A change opens a new, time-bounded version, preserving prior values.
  #[default]
  Type2,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(default)]
pub struct AttributePolicy {
  pub tracked_as: TrackingKind,
  pub normalize:  Normalization,
}

// ─── DimensionProfile ────────────────────────────────────────────────────────

/// Attribute policies for one dimension. Attributes the profile does not name
/// follow `default_tracking` with no normalization — when in doubt, version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionProfile {
  pub default_tracking: TrackingKind,
  pub attributes:       BTreeMap<String, AttributePolicy>,
}

impl DimensionProfile {
  pub fn policy(&self, attribute: &str) -> AttributePolicy {
    self.attributes.get(attribute).copied().unwrap_or(AttributePolicy {
      tracked_as: self.default_tracking,
      normalize:  Normalization::None,
    })
  }

  /// Canonicalise an incoming attribute set per the per-attribute policies.
  /// The normalized form is both what the Change Detector compares and what
  /// the Version Writer persists.
  pub fn normalize(&self, attributes: &AttributeSet) -> AttributeSet {
    attributes
      .iter()
      .map(|(name, value)| {
        (name.clone(), self.policy(name).normalize.apply(value))
      })
      .collect()
  }
}

// ─── ProfileSet ──────────────────────────────────────────────────────────────

/// The profiles for every dimension the loader knows about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileSet(BTreeMap<DimensionId, DimensionProfile>);

impl ProfileSet {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, dimension: DimensionId, profile: DimensionProfile) {
    self.0.insert(dimension, profile);
  }

  pub fn get(&self, dimension: &DimensionId) -> Option<&DimensionProfile> {
    self.0.get(dimension)
  }

  pub fn dimensions(&self) -> impl Iterator<Item = &DimensionId> {
    self.0.keys()
  }
}

impl FromIterator<(DimensionId, DimensionProfile)> for ProfileSet {
  fn from_iter<I: IntoIterator<Item = (DimensionId, DimensionProfile)>>(
    iter: I,
  ) -> Self {
    Self(iter.into_iter().collect())
  }
}
