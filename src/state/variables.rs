//! Variable Store - Live values of project variables during a preview.
//!
//! Each variable is backed by a `Signal<Value>`, so renderer effects that read
//! a bound property re-run when the variable changes. On top of the signal
//! graph the store keeps an explicit subscriber list that is told about
//! *every* `set`, including writes of an equal value, in call order.
//!
//! # API
//!
//! - `load_definitions(defs)` - Reset every value from its default
//! - `reload_definitions(defs)` - Sync definitions, keeping live values
//! - `get(id)` / `get_or_empty(id)` - Read a value
//! - `set(id, value)` - Write a value and notify subscribers
//! - `signal(id)` - The backing signal, for reactive reads
//! - `subscribe(fn)` - Observe every write; returns cleanup
//!
//! # Example
//!
//! ```ignore
//! let store = VariableStore::new();
//! store.load_definitions(&[count_def]);
//!
//! let cleanup = store.subscribe(|id, value| println!("{id} = {value}"));
//! store.set(&count_def.id, Value::from(1));
//! cleanup();
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use spark_signals::{Signal, signal};

use crate::types::{Cleanup, Value, Variable, VariableId};

type Subscriber = Rc<dyn Fn(&VariableId, &Value)>;

struct VariableEntry {
    definition: Variable,
    value: Signal<Value>,
}

struct StoreInner {
    entries: HashMap<VariableId, VariableEntry>,
    subscribers: Vec<(usize, Subscriber)>,
    next_id: usize,
}

impl StoreInner {
    fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Shared handle to the live variable values of one preview session.
///
/// Cloning the handle shares the store.
#[derive(Clone)]
pub struct VariableStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("VariableStore")
            .field("variables", &inner.entries.len())
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl VariableStore {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                entries: HashMap::new(),
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Replace every definition and reset each value to its default.
    ///
    /// A variable that was already loaded keeps its signal, so effects that
    /// tracked it in an earlier session see the reset. Archived definitions
    /// are skipped. Subscribers are not notified.
    pub fn load_definitions(&self, definitions: &[Variable]) {
        let mut writes: Vec<(Signal<Value>, Value)> = Vec::new();
        let mut inner = self.inner.borrow_mut();
        let mut previous = std::mem::take(&mut inner.entries);

        for def in definitions.iter().filter(|d| !d.archived) {
            let entry = match previous.remove(&def.id) {
                Some(mut entry) => {
                    writes.push((entry.value.clone(), def.initial_value()));
                    entry.definition = def.clone();
                    entry
                }
                None => VariableEntry {
                    value: signal(def.initial_value()),
                    definition: def.clone(),
                },
            };
            inner.entries.insert(def.id.clone(), entry);
        }

        tracing::debug!(
            count = inner.entries.len(),
            reused = writes.len(),
            "variables.load"
        );
        drop(inner);

        for (sig, value) in writes {
            sig.set(value);
        }
    }

    /// Sync definitions while keeping live values.
    ///
    /// - surviving variables keep their value, re-coerced if the type changed
    ///   (falling back to the new default when that fails)
    /// - new variables start at their default
    /// - removed or archived variables are dropped
    ///
    /// Returns the ids whose value was reset.
    pub fn reload_definitions(&self, definitions: &[Variable]) -> Vec<VariableId> {
        let mut reset = Vec::new();
        let mut writes: Vec<(Signal<Value>, Value)> = Vec::new();
        let mut inner = self.inner.borrow_mut();
        let mut previous = std::mem::take(&mut inner.entries);

        for def in definitions.iter().filter(|d| !d.archived) {
            let entry = match previous.remove(&def.id) {
                Some(mut entry) => {
                    if entry.definition.var_type != def.var_type {
                        let current = entry.value.get();
                        let next = def
                            .var_type
                            .coerce(&current)
                            .unwrap_or_else(|| def.initial_value());
                        if next != current {
                            reset.push(def.id.clone());
                        }
                        writes.push((entry.value.clone(), next));
                    }
                    entry.definition = def.clone();
                    entry
                }
                None => VariableEntry {
                    value: signal(def.initial_value()),
                    definition: def.clone(),
                },
            };
            inner.entries.insert(def.id.clone(), entry);
        }

        tracing::debug!(
            count = inner.entries.len(),
            dropped = previous.len(),
            reset = reset.len(),
            "variables.reload"
        );
        drop(inner);

        for (sig, value) in writes {
            sig.set(value);
        }
        reset
    }

    /// Current value, or `None` for an unknown id.
    pub fn get(&self, id: &VariableId) -> Option<Value> {
        self.inner.borrow().entries.get(id).map(|e| e.value.get())
    }

    /// Current value, degrading an unknown id to `Empty`.
    pub fn get_or_empty(&self, id: &VariableId) -> Value {
        self.get(id).unwrap_or_default()
    }

    /// Write a value and notify every subscriber, in registration order.
    ///
    /// Writing to an unknown id is a no-op and returns false. The value is
    /// stored as given; type checks belong to the caller.
    pub fn set(&self, id: &VariableId, value: Value) -> bool {
        let (sig, subscribers) = {
            let inner = self.inner.borrow();
            let Some(entry) = inner.entries.get(id) else {
                tracing::trace!(variable = %id, "variables.set on unknown id ignored");
                return false;
            };
            let subscribers: Vec<Subscriber> =
                inner.subscribers.iter().map(|(_, s)| s.clone()).collect();
            (entry.value.clone(), subscribers)
        };

        // Effects and subscribers may read the store; no borrow is held here.
        sig.set(value.clone());
        tracing::debug!(variable = %id, %value, "variables.set");
        for subscriber in subscribers {
            subscriber(id, &value);
        }
        true
    }

    /// The backing signal, for effects that should track this variable.
    pub fn signal(&self, id: &VariableId) -> Option<Signal<Value>> {
        self.inner.borrow().entries.get(id).map(|e| e.value.clone())
    }

    pub fn definition(&self, id: &VariableId) -> Option<Variable> {
        self.inner
            .borrow()
            .entries
            .get(id)
            .map(|e| e.definition.clone())
    }

    pub fn contains(&self, id: &VariableId) -> bool {
        self.inner.borrow().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Every live value keyed by id.
    pub fn values(&self) -> HashMap<VariableId, Value> {
        self.inner
            .borrow()
            .entries
            .iter()
            .map(|(id, e)| (id.clone(), e.value.get()))
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Observe every write. Returns cleanup function.
    pub fn subscribe<F>(&self, subscriber: F) -> Cleanup
    where
        F: Fn(&VariableId, &Value) + 'static,
    {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id();
            inner.subscribers.push((id, Rc::new(subscriber)));
            id
        };

        let weak: Weak<RefCell<StoreInner>> = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .borrow_mut()
                    .subscribers
                    .retain(|(subscriber_id, _)| *subscriber_id != id);
            }
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
