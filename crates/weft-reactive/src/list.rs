#![forbid(unsafe_code)]

//! Observed lists: index storage with notifying mutators.
//!
//! # Design
//!
//! Element access cannot be intercepted per index the way record slots can,
//! so an [`ObservedList`] exposes only mutation methods that perform the
//! notify step internally, and reads propagate through the whole-list dep:
//! any code that reads the list under an active subscriber transitively
//! registers that subscriber on every observed element
//! ([`depend_items`](ObservedList::depend_items)).
//!
//! # Invariants
//!
//! 1. Every mutator observes newly inserted elements and notifies the
//!    whole-list dep — unconditionally, even when the call turns out to be
//!    a no-op (an empty `pop`, an out-of-range `remove`). The mutator call
//!    is the interception point, not the effect.
//! 2. Reads never notify.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::dep::Dep;
use crate::observe::ObservedValue;
use crate::tracking;
use crate::value::Value;

struct ListInner {
    dep: Rc<Dep>,
    items: Vec<ObservedValue>,
    root_count: u32,
}

/// Shared handle to an observed list. Cloning shares the same state.
#[derive(Clone)]
pub struct ObservedList {
    inner: Rc<RefCell<ListInner>>,
}

impl ObservedList {
    /// Create an empty observed list.
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Wrap a plain vector, observing every element.
    pub(crate) fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ListInner {
                dep: Dep::new(),
                items: items
                    .into_iter()
                    .map(|v| ObservedValue::wrap(v, false))
                    .collect(),
                root_count: 0,
            })),
        }
    }

    /// Identity comparison: do both handles refer to the same list?
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// The whole-list dep (notified by every mutator).
    #[must_use]
    pub fn dep(&self) -> Rc<Dep> {
        Rc::clone(&self.inner.borrow().dep)
    }

    /// Root-level consumer count.
    #[must_use]
    pub fn root_count(&self) -> u32 {
        self.inner.borrow().root_count
    }

    pub(crate) fn retain_root(&self) {
        self.inner.borrow_mut().root_count += 1;
    }

    /// Length. Registers the active subscriber on the whole-list dep.
    #[must_use]
    pub fn len(&self) -> usize {
        let (dep, len) = {
            let inner = self.inner.borrow();
            (Rc::clone(&inner.dep), inner.items.len())
        };
        if tracking::is_tracking() {
            dep.depend();
        }
        len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read an element. Registers the active subscriber on the whole-list
    /// dep and on the element's whole-value dep if it is observed. Plain
    /// composite elements upgrade to observed on first access.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<ObservedValue> {
        let (dep, item) = {
            let mut inner = self.inner.borrow_mut();
            let dep = Rc::clone(&inner.dep);
            let item = inner.items.get_mut(index).map(|item| {
                item.ensure_observed();
                item.clone()
            });
            (dep, item)
        };
        let item = item?;
        if tracking::is_tracking() {
            dep.depend();
            match &item {
                ObservedValue::Object(obj) => obj.dep().depend(),
                ObservedValue::Array(list) => {
                    list.dep().depend();
                    list.depend_items();
                }
                ObservedValue::Plain(_) => {}
            }
        }
        Some(item)
    }

    /// Register the active subscriber on every observed element's
    /// whole-value dep, recursing into nested lists. Called when the list
    /// itself is read through a record slot.
    pub fn depend_items(&self) {
        if !tracking::is_tracking() {
            return;
        }
        let items: Vec<ObservedValue> = self.inner.borrow().items.clone();
        for item in &items {
            match item {
                ObservedValue::Object(obj) => obj.dep().depend(),
                ObservedValue::Array(list) => {
                    list.dep().depend();
                    list.depend_items();
                }
                ObservedValue::Plain(_) => {}
            }
        }
    }

    // ── Mutators ─────────────────────────────────────────────────────

    /// Append an element.
    pub fn push(&self, value: Value) {
        let item = ObservedValue::wrap(value, false);
        let dep = {
            let mut inner = self.inner.borrow_mut();
            inner.items.push(item);
            Rc::clone(&inner.dep)
        };
        dep.notify();
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<ObservedValue> {
        let (dep, removed) = {
            let mut inner = self.inner.borrow_mut();
            let removed = inner.items.pop();
            (Rc::clone(&inner.dep), removed)
        };
        dep.notify();
        removed
    }

    /// Prepend an element.
    pub fn unshift(&self, value: Value) {
        let item = ObservedValue::wrap(value, false);
        let dep = {
            let mut inner = self.inner.borrow_mut();
            inner.items.insert(0, item);
            Rc::clone(&inner.dep)
        };
        dep.notify();
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<ObservedValue> {
        let (dep, removed) = {
            let mut inner = self.inner.borrow_mut();
            let removed = if inner.items.is_empty() {
                None
            } else {
                Some(inner.items.remove(0))
            };
            (Rc::clone(&inner.dep), removed)
        };
        dep.notify();
        removed
    }

    /// Insert at `index` (clamped to the current length).
    pub fn insert(&self, index: usize, value: Value) {
        let item = ObservedValue::wrap(value, false);
        let dep = {
            let mut inner = self.inner.borrow_mut();
            let at = index.min(inner.items.len());
            inner.items.insert(at, item);
            Rc::clone(&inner.dep)
        };
        dep.notify();
    }

    /// Remove the element at `index`; `None` if out of range.
    pub fn remove(&self, index: usize) -> Option<ObservedValue> {
        let (dep, removed) = {
            let mut inner = self.inner.borrow_mut();
            let removed = if index < inner.items.len() {
                Some(inner.items.remove(index))
            } else {
                None
            };
            (Rc::clone(&inner.dep), removed)
        };
        dep.notify();
        removed
    }

    /// Remove `delete_count` elements starting at `start` (both clamped) and
    /// insert `items` in their place. Returns the removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Vec<ObservedValue> {
        let inserted: Vec<ObservedValue> = items
            .into_iter()
            .map(|v| ObservedValue::wrap(v, false))
            .collect();
        let (dep, removed) = {
            let mut inner = self.inner.borrow_mut();
            let len = inner.items.len();
            let start = start.min(len);
            let end = start.saturating_add(delete_count).min(len);
            let removed: Vec<ObservedValue> = inner.items.splice(start..end, inserted).collect();
            (Rc::clone(&inner.dep), removed)
        };
        dep.notify();
        removed
    }

    /// Replace the element at `index`, growing the list with nulls if the
    /// index is past the end.
    pub fn set_item(&self, index: usize, value: Value) {
        let item = ObservedValue::wrap(value, false);
        let dep = {
            let mut inner = self.inner.borrow_mut();
            if index >= inner.items.len() {
                inner
                    .items
                    .resize_with(index + 1, || ObservedValue::Plain(Value::Null));
            }
            inner.items[index] = item;
            Rc::clone(&inner.dep)
        };
        dep.notify();
    }

    /// Sort in place with a caller-supplied comparator.
    ///
    /// The comparator runs with the interior borrow released, so it may
    /// freely read the elements it is handed.
    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&ObservedValue, &ObservedValue) -> Ordering,
    {
        let (dep, mut items) = {
            let mut inner = self.inner.borrow_mut();
            (Rc::clone(&inner.dep), std::mem::take(&mut inner.items))
        };
        items.sort_by(&mut compare);
        self.inner.borrow_mut().items = items;
        dep.notify();
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        let dep = {
            let mut inner = self.inner.borrow_mut();
            inner.items.reverse();
            Rc::clone(&inner.dep)
        };
        dep.notify();
    }

    /// Remove all elements.
    pub fn clear(&self) {
        let dep = {
            let mut inner = self.inner.borrow_mut();
            inner.items.clear();
            Rc::clone(&inner.dep)
        };
        dep.notify();
    }

    /// Deep plain copy. Does not register dependencies.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let items: Vec<ObservedValue> = self.inner.borrow().items.clone();
        Value::Array(items.iter().map(ObservedValue::snapshot).collect())
    }
}

impl Default for ObservedList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObservedList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ObservedList")
            .field("len", &inner.items.len())
            .field("root_count", &inner.root_count)
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
