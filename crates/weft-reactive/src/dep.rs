#![forbid(unsafe_code)]

//! `Dep`: the publish/subscribe channel at the heart of dependency tracking.
//!
//! Every reactive slot owns one `Dep`, and every observed composite owns a
//! whole-value `Dep`. Subscribers (watchers) register on the deps they read;
//! writes call [`Dep::notify`] which asks each registered subscriber to
//! re-run.
//!
//! # Design
//!
//! A `Dep` holds its subscribers **weakly**: the watcher holds its deps
//! strongly (its dependency set), so there is no ownership cycle and a
//! dropped watcher becomes an inert entry that is pruned during the next
//! notification.
//!
//! # Invariants
//!
//! 1. Ids increase monotonically across the process (creation order is the
//!    tie-break key for deterministic notification).
//! 2. The subscriber list is insertion-ordered; de-duplication is the
//!    subscriber's responsibility, not the dep's.
//! 3. `notify()` operates on a snapshot: subscribers added or removed by
//!    in-flight updates do not affect the current round.
//! 4. A panic in one subscriber's `update()` does not prevent the remaining
//!    subscribers from being notified.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::tracking;
use crate::watcher::Subscriber;

static NEXT_DEP_ID: AtomicU64 = AtomicU64::new(1);

fn next_dep_id() -> u64 {
    NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed)
}

/// A dependency channel: one per reactive slot, plus one per observed
/// composite (the "whole-value" dep used for container-shape changes).
pub struct Dep {
    id: u64,
    subs: RefCell<SmallVec<[Weak<dyn Subscriber>; 4]>>,
}

impl Dep {
    /// Create a new dep with a fresh id.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            id: next_dep_id(),
            subs: RefCell::new(SmallVec::new()),
        })
    }

    /// Unique identifier (monotonic creation order).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Append a subscriber. No de-duplication at this layer; the subscriber
    /// keeps an id set and only calls this once per dep per generation.
    pub fn add_sub(&self, sub: &Rc<dyn Subscriber>) {
        self.subs.borrow_mut().push(Rc::downgrade(sub));
    }

    /// Remove the first entry with the given subscriber id. No-op if absent.
    pub fn remove_sub(&self, id: u64) {
        let mut subs = self.subs.borrow_mut();
        if let Some(pos) = subs
            .iter()
            .position(|w| w.upgrade().is_some_and(|s| s.id() == id))
        {
            subs.remove(pos);
        }
    }

    /// Number of live subscribers (dead weak entries excluded).
    #[must_use]
    pub fn sub_count(&self) -> usize {
        self.subs
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Register this dep with the currently active subscriber, if any.
    ///
    /// Delegates to [`Subscriber::add_dep`] so the subscriber — not the dep —
    /// controls de-duplication.
    pub fn depend(self: &Rc<Self>) {
        if let Some(target) = tracking::current_target() {
            target.add_dep(self);
        }
    }

    /// Notify all current subscribers.
    ///
    /// Takes a stable snapshot of the subscriber list, prunes dead weak
    /// entries, sorts ascending by subscriber id (deterministic,
    /// parent-before-child firing), then calls `update()` on each. A panic
    /// in one subscriber is caught and reported; later subscribers still run.
    pub fn notify(&self) {
        let mut live: Vec<Rc<dyn Subscriber>> = {
            let mut subs = self.subs.borrow_mut();
            subs.retain(|w| w.strong_count() > 0);
            subs.iter().filter_map(Weak::upgrade).collect()
        };
        live.sort_by_key(|s| s.id());
        for sub in live {
            let sub_id = sub.id();
            if catch_unwind(AssertUnwindSafe(|| sub.update())).is_err() {
                tracing::error!(dep_id = self.id, sub_id, "subscriber update panicked");
            }
        }
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subs", &self.subs.borrow().len())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Minimal recording subscriber for dep-level tests.
    struct Recorder {
        id: u64,
        log: Rc<RefCell<Vec<u64>>>,
        panic_on_update: bool,
    }

    impl Recorder {
        fn new(id: u64, log: &Rc<RefCell<Vec<u64>>>) -> Rc<dyn Subscriber> {
            Rc::new(Self {
                id,
                log: Rc::clone(log),
                panic_on_update: false,
            })
        }

        fn panicking(id: u64, log: &Rc<RefCell<Vec<u64>>>) -> Rc<dyn Subscriber> {
            Rc::new(Self {
                id,
                log: Rc::clone(log),
                panic_on_update: true,
            })
        }
    }

    impl Subscriber for Recorder {
        fn id(&self) -> u64 {
            self.id
        }

        fn update(&self) {
            self.log.borrow_mut().push(self.id);
            if self.panic_on_update {
                panic!("recorder {} exploded", self.id);
            }
        }

        fn add_dep(&self, _dep: &Rc<Dep>) {}
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let a = Dep::new();
        let b = Dep::new();
        assert!(b.id() > a.id());
    }

    #[test]
    fn notify_visits_in_ascending_id_order() {
        let dep = Dep::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        // Register out of creation order on purpose.
        let s3 = Recorder::new(3, &log);
        let s1 = Recorder::new(1, &log);
        let s2 = Recorder::new(2, &log);
        dep.add_sub(&s3);
        dep.add_sub(&s1);
        dep.add_sub(&s2);

        dep.notify();
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn remove_sub_is_noop_when_absent() {
        let dep = Dep::new();
        dep.remove_sub(42);
        assert_eq!(dep.sub_count(), 0);
    }

    #[test]
    fn dropped_subscriber_is_not_notified() {
        let dep = Dep::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let s1 = Recorder::new(1, &log);
        let s2 = Recorder::new(2, &log);
        dep.add_sub(&s1);
        dep.add_sub(&s2);
        drop(s1);

        dep.notify();
        assert_eq!(*log.borrow(), vec![2]);
        // The dead weak entry was pruned.
        assert_eq!(dep.sub_count(), 1);
    }

    #[test]
    fn snapshot_isolates_midnotify_registration() {
        // A subscriber that registers another subscriber on the same dep
        // while being notified; the new entry must not run this round.
        struct Registrar {
            id: u64,
            dep: Rc<Dep>,
            extra: RefCell<Option<Rc<dyn Subscriber>>>,
            log: Rc<RefCell<Vec<u64>>>,
        }
        impl Subscriber for Registrar {
            fn id(&self) -> u64 {
                self.id
            }
            fn update(&self) {
                self.log.borrow_mut().push(self.id);
                if let Some(extra) = self.extra.borrow_mut().take() {
                    self.dep.add_sub(&extra);
                }
            }
            fn add_dep(&self, _dep: &Rc<Dep>) {}
        }

        let dep = Dep::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let late = Recorder::new(9, &log);
        let registrar: Rc<dyn Subscriber> = Rc::new(Registrar {
            id: 1,
            dep: Rc::clone(&dep),
            extra: RefCell::new(Some(Rc::clone(&late))),
            log: Rc::clone(&log),
        });
        dep.add_sub(&registrar);

        dep.notify();
        assert_eq!(*log.borrow(), vec![1]);

        dep.notify();
        assert_eq!(*log.borrow(), vec![1, 1, 9]);
    }

    #[test]
    fn panicking_subscriber_does_not_block_later_ones() {
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let dep = Dep::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let bad = Recorder::panicking(1, &log);
        let good = Recorder::new(2, &log);
        dep.add_sub(&bad);
        dep.add_sub(&good);

        dep.notify();
        std::panic::set_hook(prev);

        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn depend_without_active_target_is_noop() {
        struct Counter {
            hits: Cell<u32>,
        }
        impl Subscriber for Counter {
            fn id(&self) -> u64 {
                1
            }
            fn update(&self) {}
            fn add_dep(&self, _dep: &Rc<Dep>) {
                self.hits.set(self.hits.get() + 1);
            }
        }

        let dep = Dep::new();
        dep.depend(); // no active subscriber: nothing to attribute
        assert_eq!(dep.sub_count(), 0);

        let counter = Rc::new(Counter { hits: Cell::new(0) });
        let as_sub: Rc<dyn Subscriber> = Rc::clone(&counter) as Rc<dyn Subscriber>;
        let _guard = crate::tracking::TargetGuard::new(Some(as_sub));
        dep.depend();
        assert_eq!(counter.hits.get(), 1);
    }
}
