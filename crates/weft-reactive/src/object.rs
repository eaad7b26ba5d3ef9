#![forbid(unsafe_code)]

//! Observed records: named reactive slots behind a shared handle.
//!
//! # Design
//!
//! An [`ObservedObject`] is the explicit-cell replacement for rewriting a
//! record's properties into intercepted accessors. Each slot owns its own
//! [`Dep`] and current value; the object carries one whole-object dep (used
//! for shape changes — key addition/removal — and nested-structure
//! invalidation) and a root-consumer count.
//!
//! Slots come in two kinds:
//!
//! - **Data**: a stored [`ObservedValue`], optionally with a development
//!   setter hook.
//! - **Accessor**: a getter closure and optional setter closure. Reads call
//!   the getter; writes forward to the setter if present, and are silently
//!   ignored for getter-only slots.
//!
//! # Invariants
//!
//! 1. Reads register the active subscriber on the slot dep, then on the
//!    nested composite's whole-value dep, then transitively on list
//!    elements.
//! 2. Writes apply the engine change test first: strict-equal scalars and
//!    NaN→NaN writes return without notification.
//! 3. User closures (accessor getters/setters, setter hooks) never run while
//!    the object's interior is borrowed; notification happens after the
//!    borrow is released.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::dep::Dep;
use crate::observe::ObservedValue;
use crate::tracking;
use crate::value::{Value, no_change};

type GetterFn = dyn Fn() -> Value;
type SetterFn = dyn Fn(Value);
type SetterHook = dyn Fn(&Value);

enum SlotKind {
    Data {
        value: ObservedValue,
        on_set: Option<Rc<SetterHook>>,
    },
    Accessor {
        get: Rc<GetterFn>,
        set: Option<Rc<SetterFn>>,
        on_set: Option<Rc<SetterHook>>,
    },
}

struct Slot {
    dep: Rc<Dep>,
    shallow: bool,
    kind: SlotKind,
}

struct ObjectInner {
    dep: Rc<Dep>,
    slots: AHashMap<String, Slot>,
    /// Key enumeration order: sorted on initial wrap, then append-on-define.
    order: Vec<String>,
    root_count: u32,
}

/// Shared handle to an observed record. Cloning shares the same state.
#[derive(Clone)]
pub struct ObservedObject {
    inner: Rc<RefCell<ObjectInner>>,
}

impl ObservedObject {
    /// Create an empty observed record.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObjectInner {
                dep: Dep::new(),
                slots: AHashMap::new(),
                order: Vec::new(),
                root_count: 0,
            })),
        }
    }

    /// Wrap a plain map, converting every field into a reactive slot.
    pub(crate) fn from_map(map: AHashMap<String, Value>) -> Self {
        let obj = Self::new();
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort_unstable();
        let mut map = map;
        for key in keys {
            if let Some(value) = map.remove(&key) {
                obj.define_reactive_slot(key, value, None, false);
            }
        }
        obj
    }

    /// Identity comparison: do both handles refer to the same record?
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// The whole-object dep (notified on key addition/removal).
    #[must_use]
    pub fn dep(&self) -> Rc<Dep> {
        Rc::clone(&self.inner.borrow().dep)
    }

    /// Number of root-level consumers using this record as component state.
    #[must_use]
    pub fn root_count(&self) -> u32 {
        self.inner.borrow().root_count
    }

    pub(crate) fn retain_root(&self) {
        self.inner.borrow_mut().root_count += 1;
    }

    /// Keys in enumeration order. Registers the active subscriber on the
    /// whole-object dep (enumeration must re-run when the shape changes).
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let (dep, keys) = {
            let inner = self.inner.borrow();
            (Rc::clone(&inner.dep), inner.order.clone())
        };
        if tracking::is_tracking() {
            dep.depend();
        }
        keys
    }

    /// Number of slots. Tracked like [`keys`](Self::keys).
    #[must_use]
    pub fn len(&self) -> usize {
        let (dep, len) = {
            let inner = self.inner.borrow();
            (Rc::clone(&inner.dep), inner.order.len())
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

    /// Untracked existence check.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().slots.contains_key(key)
    }

    /// Read a slot.
    ///
    /// Returns `None` for absent keys. Under an active subscriber, registers
    /// it on the slot dep, the nested composite's whole-value dep, and
    /// transitively on observed list elements. Deep slots upgrade a plain
    /// composite to observed on first access.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ObservedValue> {
        enum Fetched {
            Data(ObservedValue),
            Accessor(Rc<GetterFn>),
        }

        let (slot_dep, shallow, fetched) = {
            let mut inner = self.inner.borrow_mut();
            let slot = inner.slots.get_mut(key)?;
            let dep = Rc::clone(&slot.dep);
            let shallow = slot.shallow;
            let fetched = match &mut slot.kind {
                SlotKind::Data { value, .. } => {
                    if !shallow {
                        value.ensure_observed();
                    }
                    Fetched::Data(value.clone())
                }
                SlotKind::Accessor { get, .. } => Fetched::Accessor(Rc::clone(get)),
            };
            (dep, shallow, fetched)
        };

        // Accessor getters run with the interior borrow released: a getter
        // may read sibling slots of this same record.
        let value = match fetched {
            Fetched::Data(v) => v,
            Fetched::Accessor(get) => ObservedValue::wrap(get(), shallow),
        };

        if tracking::is_tracking() {
            slot_dep.depend();
            match &value {
                ObservedValue::Object(obj) => obj.dep().depend(),
                ObservedValue::Array(list) => {
                    list.dep().depend();
                    list.depend_items();
                }
                ObservedValue::Plain(_) => {}
            }
        }
        Some(value)
    }

    /// Write an existing slot. Returns `false` (and does nothing) if the key
    /// is absent — new keys go through [`crate::set`].
    ///
    /// No-change writes (engine change test) return without notification.
    /// Getter-only accessor slots silently ignore the write.
    pub fn set(&self, key: &str, value: Value) -> bool {
        enum Plan {
            Data {
                hook: Option<Rc<SetterHook>>,
            },
            Accessor {
                get: Rc<GetterFn>,
                set: Option<Rc<SetterFn>>,
                hook: Option<Rc<SetterHook>>,
            },
        }

        let (slot_dep, shallow, plan, current) = {
            let inner = self.inner.borrow();
            let Some(slot) = inner.slots.get(key) else {
                return false;
            };
            let dep = Rc::clone(&slot.dep);
            let shallow = slot.shallow;
            match &slot.kind {
                SlotKind::Data { value, on_set } => (
                    dep,
                    shallow,
                    Plan::Data {
                        hook: on_set.clone(),
                    },
                    Some(value.clone()),
                ),
                SlotKind::Accessor { get, set, on_set } => (
                    dep,
                    shallow,
                    Plan::Accessor {
                        get: Rc::clone(get),
                        set: set.clone(),
                        hook: on_set.clone(),
                    },
                    None,
                ),
            }
        };

        // Change test against the current value; accessor getters run
        // outside the borrow.
        let unchanged = match &plan {
            Plan::Data { .. } => match &current {
                Some(ObservedValue::Plain(old)) => no_change(old, &value),
                _ => false,
            },
            Plan::Accessor { get, .. } => no_change(&get(), &value),
        };
        if unchanged {
            return true;
        }

        match plan {
            Plan::Data { hook } => {
                if cfg!(debug_assertions)
                    && let Some(hook) = hook
                {
                    hook(&value);
                }
                let new_value = ObservedValue::wrap(value, shallow);
                {
                    let mut inner = self.inner.borrow_mut();
                    if let Some(slot) = inner.slots.get_mut(key)
                        && let SlotKind::Data { value, .. } = &mut slot.kind
                    {
                        *value = new_value;
                    }
                }
                slot_dep.notify();
            }
            Plan::Accessor { set, hook, .. } => {
                if cfg!(debug_assertions)
                    && let Some(hook) = hook
                {
                    hook(&value);
                }
                let Some(set) = set else {
                    // Getter without setter: writes are silently ignored.
                    return true;
                };
                set(value);
                slot_dep.notify();
            }
        }
        true
    }

    /// Define (or redefine) a reactive data slot.
    ///
    /// If the key currently holds an accessor pair, the pair is preserved:
    /// the slot gets a fresh dep and shallow flag but keeps routing reads
    /// through the original getter and writes through the original setter
    /// (`initial` is ignored in that case). `on_set` is a development-build
    /// hook invoked with the attempted value before each applied write.
    pub fn define_reactive_slot(
        &self,
        key: impl Into<String>,
        initial: Value,
        on_set: Option<Rc<SetterHook>>,
        shallow: bool,
    ) {
        let key = key.into();
        let preserved = {
            let inner = self.inner.borrow();
            match inner.slots.get(&key) {
                Some(Slot {
                    kind: SlotKind::Accessor { get, set, .. },
                    ..
                }) => Some((Rc::clone(get), set.clone())),
                _ => None,
            }
        };

        let kind = match preserved {
            Some((get, set)) => SlotKind::Accessor { get, set, on_set },
            None => SlotKind::Data {
                value: ObservedValue::wrap(initial, shallow),
                on_set,
            },
        };

        let mut inner = self.inner.borrow_mut();
        if !inner.slots.contains_key(&key) {
            inner.order.push(key.clone());
        }
        inner.slots.insert(
            key,
            Slot {
                dep: Dep::new(),
                shallow,
                kind,
            },
        );
    }

    /// Install an accessor slot (the mechanism computed properties build
    /// on). Replaces any existing slot under `key`.
    pub fn define_accessor(
        &self,
        key: impl Into<String>,
        get: impl Fn() -> Value + 'static,
        set: Option<Rc<SetterFn>>,
    ) {
        let key = key.into();
        let mut inner = self.inner.borrow_mut();
        if !inner.slots.contains_key(&key) {
            inner.order.push(key.clone());
        }
        inner.slots.insert(
            key,
            Slot {
                dep: Dep::new(),
                shallow: false,
                kind: SlotKind::Accessor {
                    get: Rc::new(get),
                    set,
                    on_set: None,
                },
            },
        );
    }

    /// Remove a slot. Returns whether it existed. The caller is responsible
    /// for notifying the whole-object dep.
    pub(crate) fn remove_slot(&self, key: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.slots.remove(key).is_some() {
            inner.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// Deep plain copy of the record. Does not register dependencies;
    /// accessor getters are invoked.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        enum Entry {
            Data(ObservedValue),
            Accessor(Rc<GetterFn>),
        }

        let entries: Vec<(String, Entry)> = {
            let inner = self.inner.borrow();
            inner
                .order
                .iter()
                .filter_map(|key| {
                    inner.slots.get(key).map(|slot| {
                        let entry = match &slot.kind {
                            SlotKind::Data { value, .. } => Entry::Data(value.clone()),
                            SlotKind::Accessor { get, .. } => Entry::Accessor(Rc::clone(get)),
                        };
                        (key.clone(), entry)
                    })
                })
                .collect()
        };

        let mut map = AHashMap::with_capacity(entries.len());
        for (key, entry) in entries {
            let value = match entry {
                Entry::Data(v) => v.snapshot(),
                Entry::Accessor(get) => get(),
            };
            map.insert(key, value);
        }
        Value::Object(map)
    }
}

impl Default for ObservedObject {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObservedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ObservedObject")
            .field("keys", &inner.order)
            .field("root_count", &inner.root_count)
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
