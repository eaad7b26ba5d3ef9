#![forbid(unsafe_code)]

//! Observation entry points: converting plain values into reactive storage.
//!
//! # Design
//!
//! Plain [`Value`]s are converted into [`ObservedValue`] slot contents:
//! scalars stay `Plain`, composites become shared handles
//! ([`ObservedObject`] / [`ObservedList`]) whose reads and writes go through
//! the dependency machinery. Conversion is the explicit-cell replacement for
//! transparent accessor rewriting: the wrapper, not the call site, performs
//! the depend/notify side effects.
//!
//! # Invariants
//!
//! 1. Observation is idempotent: [`observe`] on an already-observed value
//!    returns the existing handle; a composite is never wrapped twice.
//! 2. Scalars are never observed ([`observe`] returns `None`).
//! 3. While observation is suppressed ([`without_observation`]), no new
//!    wrappers are created; values stay `Plain`.
//! 4. Nested composites upgrade to observed on first access of their slot
//!    (deep mode) and eagerly on assignment; shallow slots never upgrade.

use std::cell::Cell;
use std::rc::Rc;

use crate::dep::Dep;
use crate::list::ObservedList;
use crate::object::ObservedObject;
use crate::value::{Value, no_change};

thread_local! {
    static OBSERVING: Cell<bool> = const { Cell::new(true) };
}

pub(crate) fn is_observing() -> bool {
    OBSERVING.with(Cell::get)
}

/// Run `f` with observation suppressed: no new wrappers are created for
/// composites encountered during the call.
///
/// Used by consumers installing state that must stay inert (e.g. incoming
/// props held only for comparison).
pub fn without_observation<R>(f: impl FnOnce() -> R) -> R {
    let prev = OBSERVING.with(|flag| flag.replace(false));
    let result = f();
    OBSERVING.with(|flag| flag.set(prev));
    result
}

/// The content of a reactive slot.
#[derive(Debug, Clone)]
pub enum ObservedValue {
    /// A scalar, or a composite left unobserved (shallow slot, suppressed
    /// observation, or not yet upgraded).
    Plain(Value),
    /// An observed record.
    Object(ObservedObject),
    /// An observed list.
    Array(ObservedList),
}

impl ObservedValue {
    /// Convert a plain value for storage in a slot.
    ///
    /// Composites become observed handles unless `shallow` is set or
    /// observation is suppressed.
    pub(crate) fn wrap(value: Value, shallow: bool) -> Self {
        if shallow || !is_observing() || !value.is_composite() {
            return Self::Plain(value);
        }
        match value {
            Value::Array(items) => Self::Array(ObservedList::from_vec(items)),
            Value::Object(map) => Self::Object(ObservedObject::from_map(map)),
            other => Self::Plain(other),
        }
    }

    /// Upgrade a plain composite to an observed handle in place.
    ///
    /// No-op for scalars, already-observed handles, and while observation is
    /// suppressed.
    pub(crate) fn ensure_observed(&mut self) {
        if let Self::Plain(v) = self
            && v.is_composite()
            && is_observing()
        {
            *self = Self::wrap(std::mem::take(v), false);
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObservedObject> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&ObservedList> {
        match self {
            Self::Array(list) => Some(list),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this is an observed handle (object or list).
    #[must_use]
    pub fn is_observed(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    /// Deep plain copy. Does not register dependencies.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        match self {
            Self::Plain(v) => v.clone(),
            Self::Object(obj) => obj.snapshot(),
            Self::Array(list) => list.snapshot(),
        }
    }
}

/// Whether a write replacing `old` with `new` counts as a change.
///
/// Plain scalars use the engine change test (strict equality, NaN→NaN is a
/// no-op); observed handles compare by identity; everything else is a
/// change.
#[must_use]
pub fn changed(old: &ObservedValue, new: &ObservedValue) -> bool {
    match (old, new) {
        (ObservedValue::Plain(a), ObservedValue::Plain(b)) => !no_change(a, b),
        (ObservedValue::Object(a), ObservedValue::Object(b)) => !ObservedObject::ptr_eq(a, b),
        (ObservedValue::Array(a), ObservedValue::Array(b)) => !ObservedList::ptr_eq(a, b),
        _ => true,
    }
}

/// A handle to an observed composite, as returned by [`observe`].
#[derive(Debug, Clone)]
pub enum ObservedHandle {
    Object(ObservedObject),
    Array(ObservedList),
}

impl ObservedHandle {
    /// The composite's whole-value dep.
    #[must_use]
    pub fn dep(&self) -> Rc<Dep> {
        match self {
            Self::Object(obj) => obj.dep(),
            Self::Array(list) => list.dep(),
        }
    }

    /// Root-level consumer count.
    #[must_use]
    pub fn root_count(&self) -> u32 {
        match self {
            Self::Object(obj) => obj.root_count(),
            Self::Array(list) => list.root_count(),
        }
    }
}

/// Observe a value in place.
///
/// Returns the existing handle for already-observed composites, creates a
/// wrapper for plain composites (unless observation is suppressed), and
/// returns `None` for scalars. `root` marks the value as root component
/// state: adding new top-level keys through [`crate::set`] is then rejected.
pub fn observe(value: &mut ObservedValue, root: bool) -> Option<ObservedHandle> {
    value.ensure_observed();
    match value {
        ObservedValue::Object(obj) => {
            if root {
                obj.retain_root();
            }
            Some(ObservedHandle::Object(obj.clone()))
        }
        ObservedValue::Array(list) => {
            if root {
                list.retain_root();
            }
            Some(ObservedHandle::Array(list.clone()))
        }
        ObservedValue::Plain(_) => None,
    }
}

/// Convert a plain value into reactive state (deep).
#[must_use]
pub fn make_reactive(value: Value) -> ObservedValue {
    ObservedValue::wrap(value, false)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_stay_plain() {
        let mut v = make_reactive(Value::from(3));
        assert!(matches!(v, ObservedValue::Plain(_)));
        assert!(observe(&mut v, false).is_none());
    }

    #[test]
    fn composites_become_handles() {
        let v = make_reactive(Value::object([("a", Value::from(1))]));
        assert!(v.as_object().is_some());

        let v = make_reactive(Value::array([Value::from(1)]));
        assert!(v.as_list().is_some());
    }

    #[test]
    fn observe_is_idempotent() {
        let mut v = make_reactive(Value::object([("a", Value::from(1))]));
        let first = observe(&mut v, false).expect("object handle");
        let second = observe(&mut v, false).expect("object handle");
        assert_eq!(first.dep().id(), second.dep().id());
    }

    #[test]
    fn root_flag_increments_consumer_count() {
        let mut v = make_reactive(Value::object([("a", Value::from(1))]));
        assert_eq!(observe(&mut v, false).unwrap().root_count(), 0);
        observe(&mut v, true);
        observe(&mut v, true);
        assert_eq!(observe(&mut v, false).unwrap().root_count(), 2);
    }

    #[test]
    fn suppressed_observation_creates_no_wrappers() {
        let mut v = without_observation(|| make_reactive(Value::array([Value::from(1)])));
        assert!(matches!(v, ObservedValue::Plain(_)));
        // Still suppressible through observe().
        without_observation(|| {
            assert!(observe(&mut v, false).is_none());
        });
        // Once allowed again, the upgrade happens.
        assert!(observe(&mut v, false).is_some());
    }

    #[test]
    fn nested_suppression_restores_outer_state() {
        without_observation(|| {
            assert!(!is_observing());
            without_observation(|| assert!(!is_observing()));
            assert!(!is_observing());
        });
        assert!(is_observing());
    }

    #[test]
    fn changed_follows_engine_change_test() {
        let one = ObservedValue::Plain(Value::from(1));
        let nan = ObservedValue::Plain(Value::Number(f64::NAN));
        assert!(!changed(&one, &ObservedValue::Plain(Value::from(1))));
        assert!(!changed(&nan, &ObservedValue::Plain(Value::Number(f64::NAN))));
        assert!(changed(&one, &ObservedValue::Plain(Value::from(2))));

        let obj = make_reactive(Value::object([("a", Value::from(1))]));
        assert!(!changed(&obj, &obj.clone())); // same handle
        let other = make_reactive(Value::object([("a", Value::from(1))]));
        assert!(changed(&obj, &other)); // distinct identity
    }

    #[test]
    fn snapshot_round_trips_structure() {
        let source = Value::object([
            ("n", Value::from(1)),
            ("list", Value::array([Value::from(2), Value::from(3)])),
        ]);
        let v = make_reactive(source.clone());
        assert_eq!(v.snapshot(), source);
    }
}
