//! Attribute sets — the tracked business data of a dimension version.
//!
//! Values are carried as JSON values: categorical strings, integers,
//! fixed-precision decimals, booleans, or null. Comparison is exact; there is
//! no epsilon, because tracked values are monetary or categorical, never
//! floating measurements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Normalization ───────────────────────────────────────────────────────────

/// How an attribute value is canonicalised before comparison and storage.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
  /// Compare as-is.
  #[default]
  None,
  /// Trim surrounding whitespace on strings.
  Trim,
  /// Trim and ASCII-uppercase; for case-insensitive categorical codes.
  Code,
}

impl Normalization {
  pub fn apply(self, value: &Value) -> Value {
    match (self, value) {
      (Self::Trim, Value::String(s)) => Value::String(s.trim().to_owned()),
      (Self::Code, Value::String(s)) => {
        Value::String(s.trim().to_ascii_uppercase())
      }
      _ => value.clone(),
    }
  }
}

// ─── AttributeSet ────────────────────────────────────────────────────────────

/// A named set of attribute values. Ordered so serialised forms are stable.
#[derive(
  Debug, Clone, PartialEq, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AttributeSet(BTreeMap<String, Value>);

impl AttributeSet {
  pub fn new() -> Self { Self::default() }

  pub fn get(&self, name: &str) -> Option<&Value> { self.0.get(name) }

  pub fn insert(&mut self, name: impl Into<String>, value: Value) {
    self.0.insert(name.into(), value);
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
    self.0.iter()
  }

  /// The value to compare for `name`: a missing attribute is an explicit
  /// null, because incoming records are full snapshots.
  pub fn value_or_null(&self, name: &str) -> Value {
    self.0.get(name).cloned().unwrap_or(Value::Null)
  }

  /// Names present in either set, deduplicated, in order.
  pub fn name_union<'a>(&'a self, other: &'a Self) -> Vec<&'a str> {
    let mut names: Vec<&str> =
      self.0.keys().chain(other.0.keys()).map(String::as_str).collect();
    names.sort_unstable();
    names.dedup();
    names
  }
}

impl FromIterator<(String, Value)> for AttributeSet {
  fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn trim_normalization_only_touches_strings() {
    assert_eq!(Normalization::Trim.apply(&json!("  LOW ")), json!("LOW"));
    assert_eq!(Normalization::Trim.apply(&json!(42)), json!(42));
    assert_eq!(Normalization::Trim.apply(&Value::Null), Value::Null);
  }

  #[test]
  fn code_normalization_folds_case() {
    assert_eq!(Normalization::Code.apply(&json!(" low")), json!("LOW"));
    assert_eq!(Normalization::Code.apply(&json!("HIGH")), json!("HIGH"));
  }

  #[test]
  fn missing_attribute_reads_as_null() {
    let mut set = AttributeSet::new();
    set.insert("risk_rating", json!("LOW"));
    assert_eq!(set.value_or_null("risk_rating"), json!("LOW"));
    assert_eq!(set.value_or_null("segment"), Value::Null);
  }

  #[test]
  fn name_union_deduplicates() {
    let a: AttributeSet =
      [("x".to_owned(), json!(1)), ("y".to_owned(), json!(2))]
        .into_iter()
        .collect();
    let b: AttributeSet =
      [("y".to_owned(), json!(3)), ("z".to_owned(), json!(4))]
        .into_iter()
        .collect();
    assert_eq!(a.name_union(&b), vec!["x", "y", "z"]);
  }
}
