//! Change detection — classifying an incoming record against the current
//! version.
//!
//! Comparison is attribute-by-attribute over the union of names, after
//! normalization on both sides (stored rows may predate a profile's
//! normalization rules, e.g. bulk-seeded data). Null versus populated is a
//! difference; numeric comparison is exact, since tracked values are
//! fixed-precision monetary or categorical.

use dimvault_core::{
  attr::AttributeSet,
  profile::{DimensionProfile, TrackingKind},
  version::DimensionVersion,
};

// ─── Verdict ─────────────────────────────────────────────────────────────────

/// The four-way verdict for one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  /// Every attribute, Type-1 included, is identical after normalization.
  NoChange,
  /// At least one Type-1 attribute differs and no Type-2 attribute does.
  Type1Update,
  /// At least one Type-2 attribute differs. Any Type-1 differences are
  /// folded into the new version, not applied to the one being closed.
  Type2Version,
  /// The natural key has never been loaded.
  NewEntity,
}

/// Attribute names that differ, split by tracking policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeDiff {
  pub type1: Vec<String>,
  pub type2: Vec<String>,
}

impl AttributeDiff {
  pub fn is_empty(&self) -> bool {
    self.type1.is_empty() && self.type2.is_empty()
  }
}

// ─── Detection ───────────────────────────────────────────────────────────────

/// Compare two attribute sets under `profile`, returning the differing names
/// split by tracking policy. Name order follows the sorted union.
pub fn diff(
  profile: &DimensionProfile,
  current: &AttributeSet,
  incoming: &AttributeSet,
) -> AttributeDiff {
  let mut out = AttributeDiff::default();

  for name in current.name_union(incoming) {
    let policy = profile.policy(name);
    let stored = policy.normalize.apply(&current.value_or_null(name));
    let offered = policy.normalize.apply(&incoming.value_or_null(name));
    if stored != offered {
      match policy.tracked_as {
        TrackingKind::Type1 => out.type1.push(name.to_owned()),
        TrackingKind::Type2 => out.type2.push(name.to_owned()),
      }
    }
  }

  out
}

/// Full verdict including the no-current-version case. Tie-break: any Type-2
/// difference wins.
pub fn classify(
  profile: &DimensionProfile,
  current: Option<&DimensionVersion>,
  incoming: &AttributeSet,
) -> ChangeKind {
  let Some(current) = current else {
    return ChangeKind::NewEntity;
  };
  let diff = diff(profile, &current.attributes, incoming);
  if !diff.type2.is_empty() {
    ChangeKind::Type2Version
  } else if !diff.type1.is_empty() {
    ChangeKind::Type1Update
  } else {
    ChangeKind::NoChange
  }
}

#[cfg(test)]
mod tests {
  use dimvault_core::{
    attr::Normalization,
    profile::AttributePolicy,
    version::{NaturalKey, SurrogateKey},
  };
  use serde_json::json;

  use super::*;

  fn profile() -> DimensionProfile {
    let mut p = DimensionProfile::default();
    p.attributes.insert("email".into(), AttributePolicy {
      tracked_as: TrackingKind::Type1,
      normalize:  Normalization::Trim,
    });
    p.attributes.insert("risk_rating".into(), AttributePolicy {
      tracked_as: TrackingKind::Type2,
      normalize:  Normalization::Code,
    });
    p
  }

  fn attrs(value: serde_json::Value) -> AttributeSet {
    serde_json::from_value(value).unwrap()
  }

  fn current(attributes: AttributeSet) -> DimensionVersion {
    DimensionVersion::open(
      SurrogateKey(1),
      NaturalKey::new("C001").unwrap(),
      attributes,
      "2024-01-01".parse().unwrap(),
    )
  }

  #[test]
  fn identical_sets_produce_no_change() {
    let p = profile();
    let cur = current(attrs(json!({"email": "a@b.example", "risk_rating": "LOW"})));
    let incoming = attrs(json!({"email": "a@b.example", "risk_rating": "LOW"}));
    assert_eq!(classify(&p, Some(&cur), &incoming), ChangeKind::NoChange);
  }

  #[test]
  fn normalization_equivalent_sets_produce_no_change() {
    let p = profile();
    let cur = current(attrs(json!({"email": "a@b.example", "risk_rating": "LOW"})));
    let incoming = attrs(json!({"email": "  a@b.example ", "risk_rating": "low"}));
    assert_eq!(classify(&p, Some(&cur), &incoming), ChangeKind::NoChange);
  }

  #[test]
  fn type1_only_difference() {
    let p = profile();
    let cur = current(attrs(json!({"email": "a@b.example", "risk_rating": "LOW"})));
    let incoming = attrs(json!({"email": "new@b.example", "risk_rating": "LOW"}));
    assert_eq!(classify(&p, Some(&cur), &incoming), ChangeKind::Type1Update);

    let d = diff(&p, &cur.attributes, &incoming);
    assert_eq!(d.type1, vec!["email"]);
    assert!(d.type2.is_empty());
  }

  #[test]
  fn type2_difference_wins_over_type1() {
    let p = profile();
    let cur = current(attrs(json!({"email": "a@b.example", "risk_rating": "LOW"})));
    let incoming = attrs(json!({"email": "new@b.example", "risk_rating": "HIGH"}));
    assert_eq!(classify(&p, Some(&cur), &incoming), ChangeKind::Type2Version);

    let d = diff(&p, &cur.attributes, &incoming);
    assert_eq!(d.type1, vec!["email"]);
    assert_eq!(d.type2, vec!["risk_rating"]);
  }

  #[test]
  fn null_versus_populated_is_a_difference() {
    let p = profile();
    let cur = current(attrs(json!({"risk_rating": "LOW", "segment": "retail"})));
    // `segment` omitted entirely: full-snapshot semantics read it as null.
    let incoming = attrs(json!({"risk_rating": "LOW"}));
    assert_eq!(classify(&p, Some(&cur), &incoming), ChangeKind::Type2Version);
  }

  #[test]
  fn unknown_attribute_uses_default_tracking() {
    let p = profile();
    let cur = current(attrs(json!({"risk_rating": "LOW", "segment": "retail"})));
    let incoming = attrs(json!({"risk_rating": "LOW", "segment": "private"}));
    // `segment` is not in the profile; default tracking is Type 2.
    assert_eq!(classify(&p, Some(&cur), &incoming), ChangeKind::Type2Version);
  }

  #[test]
  fn numeric_comparison_is_exact() {
    let p = profile();
    let cur = current(attrs(json!({"credit_limit": 5000})));
    assert_eq!(
      classify(&p, Some(&cur), &attrs(json!({"credit_limit": 5000}))),
      ChangeKind::NoChange
    );
    assert_eq!(
      classify(&p, Some(&cur), &attrs(json!({"credit_limit": 5001}))),
      ChangeKind::Type2Version
    );
  }

  #[test]
  fn missing_current_version_is_a_new_entity() {
    let p = profile();
    assert_eq!(
      classify(&p, None, &attrs(json!({"risk_rating": "LOW"}))),
      ChangeKind::NewEntity
    );
  }
}
