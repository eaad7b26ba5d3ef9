#![forbid(unsafe_code)]

//! The plain (non-reactive) value model.
//!
//! Component state is dynamically shaped: records, lists, and scalars mix
//! freely. [`Value`] is the owned plain-data form; observation converts it
//! into reactive storage (see [`crate::observe`]) and snapshots convert
//! back.

use ahash::AHashMap;

/// An owned, dynamically-typed plain value.
///
/// `Number` is an `f64` like the host language the state model serves;
/// integer conversions go through it.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Value>),
    Object(AHashMap<String, Value>),
}

impl Value {
    /// Build an object value from key/value pairs.
    pub fn object<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build an array value.
    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Self::Array(items.into_iter().collect())
    }

    /// Whether this value is a composite (array or object).
    #[inline]
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

/// The write-path change test.
///
/// A write is a no-op iff old and new are scalars that compare equal, **or**
/// both are NaN numbers. Composite values never compare identical here: a
/// freshly supplied composite always counts as changed, matching reference
/// (not structural) identity.
#[must_use]
pub fn no_change(old: &Value, new: &Value) -> bool {
    if old.is_composite() || new.is_composite() {
        return false;
    }
    if let (Value::Number(a), Value::Number(b)) = (old, new)
        && a.is_nan()
        && b.is_nan()
    {
        return true;
    }
    old == new
}

// ─── Tests ───────────────────────────────────────────────────────────────────
