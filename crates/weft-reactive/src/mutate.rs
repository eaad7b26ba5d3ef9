#![forbid(unsafe_code)]

//! Reactive `set`/`delete`: shape mutation after initial observation.
//!
//! Adding a key to an observed record has no existing slot to fire, so the
//! helpers here define the slot and then explicitly notify the record's
//! whole-object dep. The fallible `try_set`/`try_delete` surface returns
//! typed errors; the infallible [`set`]/[`delete`] wrappers reproduce the
//! engine's warn-and-degrade semantics (a development diagnostic, never a
//! panic, optimized builds stay silent).

use thiserror::Error;

use crate::diag::dev_warn;
use crate::observe::ObservedValue;
use crate::value::Value;

/// Why a reactive mutation was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MutateError {
    /// The target is null or a primitive: there is nothing to observe.
    #[error("cannot reactively mutate an unobservable target (null or primitive)")]
    UnobservableTarget,

    /// String keys have no meaning on a list.
    #[error("cannot use string key {key:?} on a reactive list")]
    ListKey { key: String },

    /// The target is root component state already in use; consumers that
    /// read it before the key existed would never learn about it.
    #[error("cannot add or remove key {key:?} on root state at runtime; declare it up front")]
    RootGuard { key: String },
}

/// A record key or list index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl Key {
    /// Record-side spelling: indexes address stringified keys.
    fn into_name(self) -> String {
        match self {
            Self::Name(name) => name,
            Self::Index(index) => index.to_string(),
        }
    }
}

/// Set `key` on `target`, preserving reactivity.
///
/// - Observed list + index: in-place replace through the notifying mutation
///   path, growing the list if the index is past the end.
/// - Observed record + existing key: plain reactive write (the slot fires).
/// - Observed record + new key: defines a reactive slot, then notifies the
///   whole-object dep.
/// - Unobserved composite: plain assignment, no reactivity.
pub fn try_set(
    target: &mut ObservedValue,
    key: impl Into<Key>,
    value: Value,
) -> Result<Value, MutateError> {
    let key = key.into();
    match target {
        ObservedValue::Plain(plain) => match plain {
            Value::Array(items) => match key {
                Key::Index(index) => {
                    if index >= items.len() {
                        items.resize(index + 1, Value::Null);
                    }
                    items[index] = value.clone();
                    Ok(value)
                }
                Key::Name(name) => Err(MutateError::ListKey { key: name }),
            },
            Value::Object(map) => {
                map.insert(key.into_name(), value.clone());
                Ok(value)
            }
            _ => Err(MutateError::UnobservableTarget),
        },
        ObservedValue::Array(list) => match key {
            Key::Index(index) => {
                list.set_item(index, value.clone());
                Ok(value)
            }
            Key::Name(name) => Err(MutateError::ListKey { key: name }),
        },
        ObservedValue::Object(obj) => {
            let name = key.into_name();
            if obj.set(&name, value.clone()) {
                return Ok(value);
            }
            if obj.root_count() > 0 {
                return Err(MutateError::RootGuard { key: name });
            }
            obj.define_reactive_slot(name, value.clone(), None, false);
            obj.dep().notify();
            Ok(value)
        }
    }
}

/// Infallible [`try_set`]: rejections degrade to a development warning and
/// return the value unapplied. Callers must not rely on an error signal.
pub fn set(target: &mut ObservedValue, key: impl Into<Key>, value: Value) -> Value {
    match try_set(target, key, value.clone()) {
        Ok(applied) => applied,
        Err(error) => {
            dev_warn!(%error, "reactive set rejected");
            value
        }
    }
}

/// Delete `key` from `target`, preserving reactivity.
///
/// - Observed list + index: removal through the notifying mutation path.
/// - Observed record: removes the slot and notifies the whole-object dep;
///   absent keys are a silent no-op.
/// - Unobserved composite: plain removal.
pub fn try_delete(target: &mut ObservedValue, key: impl Into<Key>) -> Result<(), MutateError> {
    let key = key.into();
    match target {
        ObservedValue::Plain(plain) => match plain {
            Value::Array(items) => match key {
                Key::Index(index) => {
                    if index < items.len() {
                        items.remove(index);
                    }
                    Ok(())
                }
                Key::Name(name) => Err(MutateError::ListKey { key: name }),
            },
            Value::Object(map) => {
                map.remove(&key.into_name());
                Ok(())
            }
            _ => Err(MutateError::UnobservableTarget),
        },
        ObservedValue::Array(list) => match key {
            Key::Index(index) => {
                list.remove(index);
                Ok(())
            }
            Key::Name(name) => Err(MutateError::ListKey { key: name }),
        },
        ObservedValue::Object(obj) => {
            let name = key.into_name();
            if obj.root_count() > 0 {
                return Err(MutateError::RootGuard { key: name });
            }
            if obj.remove_slot(&name) {
                obj.dep().notify();
            }
            Ok(())
        }
    }
}

/// Infallible [`try_delete`]: rejections degrade to a development warning.
pub fn delete(target: &mut ObservedValue, key: impl Into<Key>) {
    if let Err(error) = try_delete(target, key) {
        dev_warn!(%error, "reactive delete rejected");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
