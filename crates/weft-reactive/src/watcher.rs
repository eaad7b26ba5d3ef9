#![forbid(unsafe_code)]

//! Watchers: units of reactive computation.
//!
//! # Design
//!
//! A [`Watcher`] wraps a getter closure. Evaluation pushes the watcher onto
//! the active-tracking stack, runs the getter (every tracked read calls back
//! into [`Subscriber::add_dep`]), then swaps the freshly collected
//! dependency set in and releases stale deps from the previous evaluation.
//! The dep holds the watcher weakly; the watcher holds its deps strongly.
//!
//! # Invariants
//!
//! 1. Ids increase monotonically (global creation order — the notification
//!    tie-break).
//! 2. A watcher registers on each dep at most once per evaluation, however
//!    many times the underlying slot is read.
//! 3. After an evaluation, deps read in the previous evaluation but not in
//!    this one no longer notify the watcher.
//! 4. A torn-down watcher is inert: absent from every dep, `update()` is a
//!    no-op.
//!
//! # Failure Modes
//!
//! - **Getter panics**: the panic propagates (or is caught by
//!   [`Dep::notify`]'s isolation when triggered from a write). The
//!   active-tracking stack is restored by its guard; the dependency set of
//!   the failed evaluation is left half-rebuilt, to be repaired by the next
//!   successful run.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;

use crate::dep::Dep;
use crate::observe::{self, ObservedValue};
use crate::tracking::TargetGuard;
use crate::traverse::traverse;
use crate::value::Value;

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

fn next_watcher_id() -> u64 {
    NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed)
}

/// The subscriber contract: anything a [`Dep`] can notify.
///
/// The concrete implementation in this crate is [`Watcher`]; the (external)
/// render subsystem supplies its own, including batched variants whose
/// `update` defers to a scheduler.
pub trait Subscriber {
    /// Creation-ordered id, used as the deterministic notification key.
    fn id(&self) -> u64;

    /// Schedule or immediately perform re-evaluation.
    fn update(&self);

    /// Record `dep` in the subscriber's dependency set (de-duplicated on
    /// the subscriber side) and register the subscriber with the dep if it
    /// was not subscribed in the previous generation either.
    fn add_dep(&self, dep: &Rc<Dep>);
}

/// Construction options for [`Watcher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatcherOptions {
    /// Traverse the evaluated value so nested mutations anywhere beneath it
    /// re-run this watcher.
    pub deep: bool,
    /// Do not evaluate at construction; `update()` only marks dirty and
    /// [`Watcher::evaluate`] recomputes on demand (computed-style).
    pub lazy: bool,
}

type Getter = dyn Fn() -> ObservedValue;
type RunCallback = dyn Fn(&ObservedValue, &ObservedValue);

struct WatcherInner {
    id: u64,
    deep: bool,
    lazy: bool,
    getter: Box<Getter>,
    on_run: Option<Box<RunCallback>>,
    value: RefCell<ObservedValue>,
    deps: RefCell<Vec<Rc<Dep>>>,
    dep_ids: RefCell<AHashSet<u64>>,
    new_deps: RefCell<Vec<Rc<Dep>>>,
    new_dep_ids: RefCell<AHashSet<u64>>,
    active: Cell<bool>,
    dirty: Cell<bool>,
    weak_self: Weak<WatcherInner>,
}

impl WatcherInner {
    fn as_subscriber(&self) -> Option<Rc<dyn Subscriber>> {
        self.weak_self.upgrade().map(|rc| rc as Rc<dyn Subscriber>)
    }

    /// Evaluate the getter under the active-tracking stack and rebuild the
    /// dependency set.
    fn evaluate(&self) -> ObservedValue {
        let value = {
            let _guard = TargetGuard::new(self.as_subscriber());
            let value = (self.getter)();
            if self.deep {
                traverse(&value);
            }
            value
        };
        self.cleanup_deps();
        value
    }

    /// Release deps read in the previous evaluation but not this one, then
    /// promote the fresh set.
    fn cleanup_deps(&self) {
        {
            let new_ids = self.new_dep_ids.borrow();
            for dep in self.deps.borrow().iter() {
                if !new_ids.contains(&dep.id()) {
                    dep.remove_sub(self.id);
                }
            }
        }
        self.deps.swap(&self.new_deps);
        self.dep_ids.swap(&self.new_dep_ids);
        self.new_deps.borrow_mut().clear();
        self.new_dep_ids.borrow_mut().clear();
    }

    fn run(&self) {
        let new = self.evaluate();
        let old = self.value.replace(new.clone());
        // Composite values may have mutated in place behind the same
        // identity, so they always count as a change for the callback.
        let fire = self.deep || new.is_observed() || observe::changed(&old, &new);
        if fire && let Some(cb) = &self.on_run {
            cb(&new, &old);
        }
    }
}

impl Subscriber for WatcherInner {
    fn id(&self) -> u64 {
        self.id
    }

    fn update(&self) {
        if !self.active.get() {
            return;
        }
        if self.lazy {
            self.dirty.set(true);
        } else {
            self.run();
        }
    }

    fn add_dep(&self, dep: &Rc<Dep>) {
        let dep_id = dep.id();
        if self.new_dep_ids.borrow().contains(&dep_id) {
            return;
        }
        self.new_dep_ids.borrow_mut().insert(dep_id);
        self.new_deps.borrow_mut().push(Rc::clone(dep));
        if !self.dep_ids.borrow().contains(&dep_id)
            && let Some(sub) = self.as_subscriber()
        {
            dep.add_sub(&sub);
        }
    }
}

/// A reactive computation that re-runs when any dependency it read changes.
///
/// Cloning is not provided: the `Watcher` value is the ownership handle, and
/// dropping it makes the watcher inert (deps hold it weakly).
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher from a getter. Non-lazy watchers evaluate
    /// immediately, collecting their initial dependency set.
    pub fn new(getter: impl Fn() -> ObservedValue + 'static, options: WatcherOptions) -> Self {
        Self::build(Box::new(getter), None, options)
    }

    /// Create a watcher with a callback invoked on each re-run that changed
    /// the value (composites always count as changed).
    pub fn with_callback(
        getter: impl Fn() -> ObservedValue + 'static,
        on_run: impl Fn(&ObservedValue, &ObservedValue) + 'static,
        options: WatcherOptions,
    ) -> Self {
        Self::build(Box::new(getter), Some(Box::new(on_run)), options)
    }

    fn build(getter: Box<Getter>, on_run: Option<Box<RunCallback>>, options: WatcherOptions) -> Self {
        let inner = Rc::new_cyclic(|weak| WatcherInner {
            id: next_watcher_id(),
            deep: options.deep,
            lazy: options.lazy,
            getter,
            on_run,
            value: RefCell::new(ObservedValue::Plain(Value::Null)),
            deps: RefCell::new(Vec::new()),
            dep_ids: RefCell::new(AHashSet::new()),
            new_deps: RefCell::new(Vec::new()),
            new_dep_ids: RefCell::new(AHashSet::new()),
            active: Cell::new(true),
            dirty: Cell::new(options.lazy),
            weak_self: weak.clone(),
        });
        if !options.lazy {
            let value = inner.evaluate();
            *inner.value.borrow_mut() = value;
        }
        Self { inner }
    }

    /// Creation-ordered id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The value from the most recent evaluation.
    #[must_use]
    pub fn value(&self) -> ObservedValue {
        self.inner.value.borrow().clone()
    }

    /// Whether a lazy watcher has been invalidated since its last
    /// evaluation.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Whether the watcher is live (not torn down).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of deps in the current dependency set.
    #[must_use]
    pub fn dep_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// Re-evaluate now and clear the dirty flag. For lazy watchers this is
    /// the on-demand recompute; for eager watchers it is a forced refresh
    /// (the run callback is not invoked).
    pub fn evaluate(&self) {
        let value = self.inner.evaluate();
        *self.inner.value.borrow_mut() = value;
        self.inner.dirty.set(false);
    }

    /// Register this watcher's current deps with the *outer* active
    /// subscriber. Used when a lazy watcher's cached value is read during
    /// another subscriber's evaluation: the outer subscriber must depend on
    /// everything the inner one does.
    pub fn depend(&self) {
        for dep in self.inner.deps.borrow().iter() {
            dep.depend();
        }
    }

    /// Remove this watcher from every dep's subscriber list and mark it
    /// inert. Idempotent.
    pub fn teardown(&self) {
        if !self.inner.active.get() {
            return;
        }
        self.inner.active.set(false);
        for dep in self.inner.deps.borrow().iter() {
            dep.remove_sub(self.inner.id);
        }
        self.inner.deps.borrow_mut().clear();
        self.inner.dep_ids.borrow_mut().clear();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("deps", &self.inner.deps.borrow().len())
            .field("active", &self.inner.active.get())
            .field("dirty", &self.inner.dirty.get())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::make_reactive;
    use crate::value::Value;

    fn state(pairs: Vec<(&str, Value)>) -> crate::object::ObservedObject {
        make_reactive(Value::object(pairs))
            .as_object()
            .expect("observed object")
            .clone()
    }

    fn plain(v: ObservedValue) -> Value {
        v.snapshot()
    }

    #[test]
    fn watcher_reruns_on_write() {
        let obj = state(vec![("count", Value::from(0))]);
        let log: Rc<RefCell<Vec<(Value, Value)>>> = Rc::new(RefCell::new(Vec::new()));
        let log_cb = Rc::clone(&log);
        let source = obj.clone();
        let _w = Watcher::with_callback(
            move || source.get("count").expect("slot"),
            move |new, old| log_cb.borrow_mut().push((plain(new.clone()), plain(old.clone()))),
            WatcherOptions::default(),
        );

        obj.set("count", Value::from(1));
        assert_eq!(*log.borrow(), vec![(Value::from(1), Value::from(0))]);
    }

    #[test]
    fn repeated_reads_register_once() {
        let obj = state(vec![("x", Value::from(1))]);
        let source = obj.clone();
        let w = Watcher::new(
            move || {
                // Read the same slot three times in one evaluation.
                let _ = source.get("x");
                let _ = source.get("x");
                source.get("x").expect("slot")
            },
            WatcherOptions::default(),
        );
        assert_eq!(w.dep_count(), 1);
    }

    #[test]
    fn stale_deps_are_released_on_rebuild() {
        let obj = state(vec![
            ("use_a", Value::from(true)),
            ("a", Value::from(1)),
            ("b", Value::from(2)),
        ]);
        let hits = Rc::new(Cell::new(0u32));
        let hits_cb = Rc::clone(&hits);
        let source = obj.clone();
        let _w = Watcher::with_callback(
            move || {
                let branch = source
                    .get("use_a")
                    .and_then(|v| v.as_plain().and_then(Value::as_bool))
                    .unwrap_or(false);
                if branch {
                    source.get("a").expect("slot")
                } else {
                    source.get("b").expect("slot")
                }
            },
            move |_, _| hits_cb.set(hits_cb.get() + 1),
            WatcherOptions::default(),
        );

        // Switch the branch: the watcher now reads `b`, not `a`.
        obj.set("use_a", Value::from(false));
        assert_eq!(hits.get(), 1);

        // `a` is stale — writing it must not re-run the watcher.
        obj.set("a", Value::from(100));
        assert_eq!(hits.get(), 1);

        obj.set("b", Value::from(200));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn notification_order_is_creation_order() {
        let obj = state(vec![("x", Value::from(0))]);
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let o1 = Rc::clone(&order);
        let s1 = obj.clone();
        let _first = Watcher::with_callback(
            move || s1.get("x").expect("slot"),
            move |_, _| o1.borrow_mut().push("first"),
            WatcherOptions::default(),
        );

        let o2 = Rc::clone(&order);
        let s2 = obj.clone();
        let _second = Watcher::with_callback(
            move || s2.get("x").expect("slot"),
            move |_, _| o2.borrow_mut().push("second"),
            WatcherOptions::default(),
        );

        obj.set("x", Value::from(1));
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn nested_evaluation_restores_outer_watcher() {
        let obj = state(vec![("inner", Value::from(1)), ("outer", Value::from(2))]);

        let inner_src = obj.clone();
        let inner = Rc::new(Watcher::new(
            move || inner_src.get("inner").expect("slot"),
            WatcherOptions { lazy: true, deep: false },
        ));

        let outer_src = obj.clone();
        let inner_for_outer = Rc::clone(&inner);
        let outer = Watcher::new(
            move || {
                // Evaluate the lazy inner watcher mid-evaluation (a computed
                // read during a render), then keep reading state: the reads
                // after it must attribute to the outer watcher.
                inner_for_outer.evaluate();
                inner_for_outer.depend();
                outer_src.get("outer").expect("slot")
            },
            WatcherOptions::default(),
        );

        // Outer depends on: `inner`'s dep (via depend()) and `outer`'s dep.
        assert_eq!(outer.dep_count(), 2);
        assert_eq!(inner.dep_count(), 1);
    }

    #[test]
    fn lazy_watcher_marks_dirty_instead_of_running() {
        let obj = state(vec![("x", Value::from(1))]);
        let source = obj.clone();
        let w = Watcher::new(
            move || source.get("x").expect("slot"),
            WatcherOptions { lazy: true, deep: false },
        );

        assert!(w.is_dirty());
        w.evaluate();
        assert!(!w.is_dirty());
        assert_eq!(plain(w.value()), Value::from(1));

        obj.set("x", Value::from(2));
        assert!(w.is_dirty());
        // Cached value untouched until the on-demand recompute.
        assert_eq!(plain(w.value()), Value::from(1));
        w.evaluate();
        assert_eq!(plain(w.value()), Value::from(2));
    }

    #[test]
    fn deep_watcher_fires_on_nested_mutation() {
        let obj = state(vec![(
            "user",
            Value::object([("name", Value::from("ada"))]),
        )]);
        let hits = Rc::new(Cell::new(0u32));
        let hits_cb = Rc::clone(&hits);
        let source = obj.clone();
        let _w = Watcher::with_callback(
            move || source.get("user").expect("slot"),
            move |_, _| hits_cb.set(hits_cb.get() + 1),
            WatcherOptions { deep: true, lazy: false },
        );

        let user = obj.get("user").unwrap();
        let user_obj = user.as_object().unwrap();
        user_obj.set("name", Value::from("grace"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn shallow_watcher_ignores_nested_mutation() {
        let obj = state(vec![(
            "user",
            Value::object([("name", Value::from("ada"))]),
        )]);
        let hits = Rc::new(Cell::new(0u32));
        let hits_cb = Rc::clone(&hits);
        let source = obj.clone();
        let _w = Watcher::with_callback(
            move || source.get("user").expect("slot"),
            move |_, _| hits_cb.set(hits_cb.get() + 1),
            WatcherOptions::default(),
        );

        let user = obj.get("user").unwrap();
        user.as_object().unwrap().set("name", Value::from("grace"));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn teardown_makes_watcher_inert() {
        let obj = state(vec![("x", Value::from(1))]);
        let hits = Rc::new(Cell::new(0u32));
        let hits_cb = Rc::clone(&hits);
        let source = obj.clone();
        let w = Watcher::with_callback(
            move || source.get("x").expect("slot"),
            move |_, _| hits_cb.set(hits_cb.get() + 1),
            WatcherOptions::default(),
        );

        assert!(obj.get("x").is_some());
        w.teardown();
        assert!(!w.is_active());
        assert_eq!(w.dep_count(), 0);

        obj.set("x", Value::from(2));
        assert_eq!(hits.get(), 0);

        w.teardown(); // idempotent
    }

    #[test]
    fn dropped_watcher_stops_receiving_updates() {
        let obj = state(vec![("x", Value::from(1))]);
        let hits = Rc::new(Cell::new(0u32));
        let hits_cb = Rc::clone(&hits);
        let source = obj.clone();
        let w = Watcher::with_callback(
            move || source.get("x").expect("slot"),
            move |_, _| hits_cb.set(hits_cb.get() + 1),
            WatcherOptions::default(),
        );
        drop(w);

        obj.set("x", Value::from(2));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn untracked_reads_register_nothing() {
        let obj = state(vec![("x", Value::from(1))]);
        // Plain read outside any watcher evaluation.
        let _ = obj.get("x");

        let source = obj.clone();
        let w = Watcher::new(
            move || source.get("x").expect("slot"),
            WatcherOptions::default(),
        );
        assert_eq!(w.dep_count(), 1);
    }
}
