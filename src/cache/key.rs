//! Structured cache keys.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One segment of a [`CacheKey`].
///
/// Any JSON value is accepted. Objects and arrays land in `Structured`, which
/// keys such as `["risk-alerts", {"severity": "high"}]` need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
  Null,
  Bool(bool),
  Number(Number),
  Str(String),
  Structured(Value),
}

impl KeySegment {
  fn rank(&self) -> u8 {
    match self {
      Self::Null => 0,
      Self::Bool(_) => 1,
      Self::Number(_) => 2,
      Self::Str(_) => 3,
      Self::Structured(_) => 4,
    }
  }
}

/// Literal text of a number, with `-0.0` folded into `0.0` since the two
/// compare equal.
fn number_text(n: &Number) -> String {
  if n.is_f64() && n.as_f64() == Some(0.0) {
    return "0.0".to_string();
  }
  n.to_string()
}

/// Numeric value first, then the literal text so that `1` and `1.0` stay
/// distinct and ordering agrees with equality.
fn cmp_numbers(a: &Number, b: &Number) -> Ordering {
  if a == b {
    return Ordering::Equal;
  }
  let x = a.as_f64().unwrap_or(f64::NAN);
  let y = b.as_f64().unwrap_or(f64::NAN);
  x.total_cmp(&y).then_with(|| number_text(a).cmp(&number_text(b)))
}

impl Ord for KeySegment {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
      (Self::Number(a), Self::Number(b)) => cmp_numbers(a, b),
      (Self::Str(a), Self::Str(b)) => a.cmp(b),
      (Self::Structured(a), Self::Structured(b)) => a.to_string().cmp(&b.to_string()),
      _ => self.rank().cmp(&other.rank()),
    }
  }
}

impl PartialOrd for KeySegment {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Hash for KeySegment {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.rank().hash(state);
    match self {
      Self::Null => {}
      Self::Bool(b) => b.hash(state),
      Self::Number(n) => number_text(n).hash(state),
      Self::Str(s) => s.hash(state),
      Self::Structured(v) => v.to_string().hash(state),
    }
  }
}

impl fmt::Display for KeySegment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => f.write_str("null"),
      Self::Bool(b) => write!(f, "{}", b),
      Self::Number(n) => write!(f, "{}", n),
      Self::Str(s) => f.write_str(s),
      Self::Structured(v) => write!(f, "{}", v),
    }
  }
}

impl From<&str> for KeySegment {
  fn from(s: &str) -> Self {
    Self::Str(s.to_string())
  }
}

impl From<String> for KeySegment {
  fn from(s: String) -> Self {
    Self::Str(s)
  }
}

impl From<i64> for KeySegment {
  fn from(i: i64) -> Self {
    Self::Number(i.into())
  }
}

impl From<u32> for KeySegment {
  fn from(i: u32) -> Self {
    Self::Number(i.into())
  }
}

impl From<u64> for KeySegment {
  fn from(i: u64) -> Self {
    Self::Number(i.into())
  }
}

/// Non-finite floats become `Null`, as they do in JSON.
impl From<f64> for KeySegment {
  fn from(f: f64) -> Self {
    Number::from_f64(f).map_or(Self::Null, Self::Number)
  }
}

impl From<bool> for KeySegment {
  fn from(b: bool) -> Self {
    Self::Bool(b)
  }
}

impl From<Value> for KeySegment {
  fn from(value: Value) -> Self {
    match value {
      Value::Null => Self::Null,
      Value::Bool(b) => Self::Bool(b),
      Value::Number(n) => Self::Number(n),
      Value::String(s) => Self::Str(s),
      other => Self::Structured(other),
    }
  }
}

/// Ordered sequence of segments identifying one cached query result,
/// e.g. `["customers", "list", 2]`.
///
/// Equality is structural. The `:`-joined form (`customers:list:2`) names the
/// key's metadata record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<KeySegment>);

impl CacheKey {
  pub fn new<I, S>(segments: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<KeySegment>,
  {
    Self(segments.into_iter().map(Into::into).collect())
  }

  pub fn segments(&self) -> &[KeySegment] {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Append a segment, builder style.
  pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
    self.0.push(segment.into());
    self
  }

  /// Whether `prefix` is a leading run of this key's segments.
  pub fn starts_with(&self, prefix: &CacheKey) -> bool {
    self.0.starts_with(&prefix.0)
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, segment) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(":")?;
      }
      write!(f, "{}", segment)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_display_joins_segments() {
    let key = CacheKey::new(["customers", "list"]).with(2i64).with(true);
    assert_eq!(key.to_string(), "customers:list:2:true");
  }

  #[test]
  fn test_structural_equality() {
    let a = CacheKey::new(["dashboard"]).with(1i64);
    let b = CacheKey::new(["dashboard"]).with(1i64);
    let c = CacheKey::new(["dashboard", "1"]);
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn test_serializes_as_plain_array() {
    let key = CacheKey::new(["customer"]).with(42i64);
    assert_eq!(serde_json::to_value(&key).unwrap(), json!(["customer", 42]));

    let parsed: CacheKey = serde_json::from_value(json!(["a", 1, false])).unwrap();
    assert_eq!(parsed, CacheKey::new(["a"]).with(1i64).with(false));
  }

  #[test]
  fn test_any_json_segment_is_accepted() {
    let parsed: CacheKey = serde_json::from_value(json!([
      "life-events",
      null,
      30.5,
      18446744073709551615u64,
      {"severity": "high"}
    ]))
    .unwrap();

    assert_eq!(parsed.segments().len(), 5);
    assert_eq!(parsed.segments()[1], KeySegment::Null);
    assert_eq!(parsed.segments()[2], KeySegment::from(30.5));
    assert_eq!(parsed.segments()[3], KeySegment::from(u64::MAX));
    assert_eq!(
      parsed.segments()[4],
      KeySegment::Structured(json!({"severity": "high"}))
    );
    assert_eq!(
      parsed.to_string(),
      "life-events:null:30.5:18446744073709551615:{\"severity\":\"high\"}"
    );

    // Written back unchanged
    assert_eq!(
      serde_json::to_value(&parsed).unwrap(),
      json!(["life-events", null, 30.5, 18446744073709551615u64, {"severity": "high"}])
    );
  }

  #[test]
  fn test_integer_and_float_segments_differ() {
    let int = CacheKey::new(["days"]).with(30i64);
    let float = CacheKey::new(["days"]).with(30.0);
    assert_ne!(int, float);
    assert_ne!(int.cmp(&float), Ordering::Equal);
  }

  #[test]
  fn test_ordering_is_total_across_kinds() {
    let mut segments = vec![
      KeySegment::Structured(json!([1])),
      KeySegment::from("a"),
      KeySegment::from(2.5),
      KeySegment::from(-3i64),
      KeySegment::from(true),
      KeySegment::Null,
    ];
    segments.sort();
    assert_eq!(
      segments,
      vec![
        KeySegment::Null,
        KeySegment::from(true),
        KeySegment::from(-3i64),
        KeySegment::from(2.5),
        KeySegment::from("a"),
        KeySegment::Structured(json!([1])),
      ]
    );
    assert_eq!(KeySegment::from(f64::NAN), KeySegment::Null);
  }

  #[test]
  fn test_equal_keys_hash_equally() {
    use std::collections::HashSet;

    let mut set = HashSet::new();
    set.insert(CacheKey::new(["dashboard"]).with(json!({"from": "2024-01-01"})));
    set.insert(CacheKey::new(["dashboard"]).with(json!({"from": "2024-01-01"})));
    set.insert(CacheKey::new(["dashboard"]).with(1.5));
    assert_eq!(set.len(), 2);
  }

  #[test]
  fn test_starts_with() {
    let key = CacheKey::new(["customers", "detail", "c-1"]);
    assert!(key.starts_with(&CacheKey::new(["customers"])));
    assert!(!key.starts_with(&CacheKey::new(["loans"])));
  }
}
