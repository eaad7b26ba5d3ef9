#![forbid(unsafe_code)]

//! Recursive dependency registration for deep watchers.
//!
//! [`traverse`] reads every slot and element reachable from a value while a
//! subscriber is active, so that the subscriber re-runs on a mutation
//! anywhere beneath it. Visited composites are keyed by their whole-value
//! dep id so shared or repeated subtrees are walked once.

use ahash::AHashSet;

use crate::observe::ObservedValue;

/// Register the active subscriber on everything reachable from `value`.
///
/// A no-op outside watcher evaluation (the reads attribute to nobody).
pub fn traverse(value: &ObservedValue) {
    let mut seen = AHashSet::new();
    walk(value, &mut seen);
}

fn walk(value: &ObservedValue, seen: &mut AHashSet<u64>) {
    match value {
        ObservedValue::Plain(_) => {}
        ObservedValue::Object(obj) => {
            if !seen.insert(obj.dep().id()) {
                return;
            }
            for key in obj.keys() {
                if let Some(child) = obj.get(&key) {
                    walk(&child, seen);
                }
            }
        }
        ObservedValue::Array(list) => {
            if !seen.insert(list.dep().id()) {
                return;
            }
            for index in 0..list.len() {
                if let Some(item) = list.get(index) {
                    walk(&item, seen);
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::make_reactive;
    use crate::value::Value;
    use crate::watcher::{Watcher, WatcherOptions};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn deep_traversal_reaches_list_elements() {
        let state = make_reactive(Value::object([(
            "todos",
            Value::array([
                Value::object([("done", Value::from(false))]),
                Value::object([("done", Value::from(true))]),
            ]),
        )]));
        let obj = state.as_object().expect("object").clone();

        let hits = Rc::new(Cell::new(0u32));
        let hits_cb = Rc::clone(&hits);
        let source = obj.clone();
        let _w = Watcher::with_callback(
            move || source.get("todos").expect("slot"),
            move |_, _| hits_cb.set(hits_cb.get() + 1),
            WatcherOptions { deep: true, lazy: false },
        );

        let todos = obj.get("todos").unwrap();
        let second = todos.as_list().unwrap().get(1).unwrap();
        second.as_object().unwrap().set("done", Value::from(false));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn traverse_outside_evaluation_registers_nothing() {
        let state = make_reactive(Value::object([("a", Value::from(1))]));
        let obj = state.as_object().expect("object");
        traverse(&state);
        assert_eq!(obj.dep().sub_count(), 0);
    }
}
