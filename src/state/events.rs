//! Event Surface - Where UI events come from during a preview.
//!
//! The flow runtime never talks to a renderer directly. It attaches one
//! listener per (block, event) pair through an [`EventSurface`] and detaches
//! it with the returned cleanup. [`LocalEventSurface`] is the in-process
//! implementation: a handler registry that a renderer (or a test) fires into.
//!
//! # Example
//!
//! ```ignore
//! let surface = LocalEventSurface::new();
//! let cleanup = surface.listen(&button_id, "onClick", Rc::new(|event| {
//!     println!("{} fired {}", event.block_id, event.name);
//! }));
//!
//! surface.fire(&button_id, "onClick");
//! cleanup();
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use crate::types::{BlockId, Cleanup, Value};

// =============================================================================
// TYPES
// =============================================================================

/// A UI event fired by a block.
#[derive(Debug, Clone, PartialEq)]
pub struct UiEvent {
    pub block_id: BlockId,
    /// Event name, e.g. `"onClick"` or `"onSubmit"`.
    pub name: String,
    /// Values from the firing element (input text, list item, ...).
    pub context: BTreeMap<String, Value>,
}

impl UiEvent {
    pub fn new(block_id: BlockId, name: impl Into<String>) -> Self {
        Self {
            block_id,
            name: name.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

pub type EventListener = Rc<dyn Fn(&UiEvent)>;

/// Source of UI events for the flow runtime.
pub trait EventSurface {
    /// Attach `listener` to `event` on `block_id`. Returns cleanup function.
    fn listen(&self, block_id: &BlockId, event: &str, listener: EventListener) -> Cleanup;
}

// =============================================================================
// LOCAL SURFACE
// =============================================================================

type EventKey = (BlockId, String);

#[derive(Default)]
struct ListenerRegistry {
    listeners: HashMap<EventKey, Vec<(usize, EventListener)>>,
    next_id: usize,
}

impl ListenerRegistry {
    fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// In-process event surface. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct LocalEventSurface {
    registry: Rc<RefCell<ListenerRegistry>>,
}

impl LocalEventSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire a context-free event. Returns the number of listeners reached.
    pub fn fire(&self, block_id: &BlockId, event: &str) -> usize {
        self.fire_with(UiEvent::new(block_id.clone(), event))
    }

    /// Fire an event to every listener on its (block, name) pair.
    pub fn fire_with(&self, event: UiEvent) -> usize {
        // Listeners may attach or detach while running.
        let listeners: Vec<EventListener> = {
            let registry = self.registry.borrow();
            registry
                .listeners
                .get(&(event.block_id.clone(), event.name.clone()))
                .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default()
        };

        tracing::trace!(block = %event.block_id, event = %event.name, listeners = listeners.len(), "surface.fire");
        for listener in &listeners {
            listener(&event);
        }
        listeners.len()
    }

    /// Total attached listeners across all pairs.
    pub fn listener_count(&self) -> usize {
        self.registry.borrow().listeners.values().map(Vec::len).sum()
    }

    pub fn has_listener(&self, block_id: &BlockId, event: &str) -> bool {
        self.registry
            .borrow()
            .listeners
            .contains_key(&(block_id.clone(), event.to_string()))
    }
}

impl EventSurface for LocalEventSurface {
    fn listen(&self, block_id: &BlockId, event: &str, listener: EventListener) -> Cleanup {
        let key: EventKey = (block_id.clone(), event.to_string());
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id();
            registry
                .listeners
                .entry(key.clone())
                .or_default()
                .push((id, listener));
            id
        };

        let weak: Weak<RefCell<ListenerRegistry>> = Rc::downgrade(&self.registry);
        Box::new(move || {
            let Some(registry) = weak.upgrade() else {
                return;
            };
            let mut registry = registry.borrow_mut();
            if let Some(list) = registry.listeners.get_mut(&key) {
                list.retain(|(listener_id, _)| *listener_id != id);
                if list.is_empty() {
                    registry.listeners.remove(&key);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_fire_reaches_matching_listener_only() {
        let surface = LocalEventSurface::new();
        let button = BlockId::from("button");
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();

        let _cleanup = surface.listen(
            &button,
            "onClick",
            Rc::new(move |_| count_clone.set(count_clone.get() + 1)),
        );

        assert_eq!(surface.fire(&button, "onClick"), 1);
        assert_eq!(surface.fire(&button, "onHover"), 0);
        assert_eq!(surface.fire(&BlockId::from("other"), "onClick"), 0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_cleanup_detaches() {
        let surface = LocalEventSurface::new();
        let input = BlockId::from("input");
        let cleanup = surface.listen(&input, "onChange", Rc::new(|_| {}));
        assert!(surface.has_listener(&input, "onChange"));

        cleanup();
        assert!(!surface.has_listener(&input, "onChange"));
        assert_eq!(surface.listener_count(), 0);
    }

    #[test]
    fn test_context_is_delivered() {
        let surface = LocalEventSurface::new();
        let input = BlockId::from("input");
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        let _cleanup = surface.listen(
            &input,
            "onChange",
            Rc::new(move |event| *sink.borrow_mut() = event.context.get("text").cloned()),
        );

        surface.fire_with(UiEvent::new(input, "onChange").with_context("text", "typed"));
        assert_eq!(*seen.borrow(), Some(Value::from("typed")));
    }

    #[test]
    fn test_listener_may_detach_during_fire() {
        let surface = LocalEventSurface::new();
        let block = BlockId::from("b");
        let slot: Rc<RefCell<Option<Cleanup>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();

        let cleanup = surface.listen(
            &block,
            "onClick",
            Rc::new(move |_| {
                if let Some(cleanup) = slot_clone.borrow_mut().take() {
                    cleanup();
                }
            }),
        );
        *slot.borrow_mut() = Some(cleanup);

        assert_eq!(surface.fire(&block, "onClick"), 1);
        assert_eq!(surface.fire(&block, "onClick"), 0);
    }
}
