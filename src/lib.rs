//! # spark-canvas
//!
//! Component tree store and logic flow runtime for visual app builders.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained reactivity.
//!
//! ## Architecture
//!
//! Authoring and preview are two halves over the same data:
//!
//! ```text
//! Project ─┬─ Page → ComponentTree (blocks, bindings, events)
//!          ├─ Flows (ordered actions)
//!          └─ Variables (definitions)
//!                     │
//!                start / hot_reload
//!                     ▼
//! FlowRuntime ── listens on ──▶ EventSurface
//!      │ executes
//!      ▼
//! VariableStore (Signal<Value> per variable) ──▶ BindingResolver ──▶ renderer
//! ```
//!
//! All of it lives on one thread. Structural edits validate before they commit,
//! so a rejected edit leaves no trace. Flow executions are independent tasks
//! that only suspend on async host capabilities.
//!
//! ## Modules
//!
//! - [`types`] - Core types (Block, Binding, Flow, Action, Value, ids)
//! - [`engine`] - Component tree store and project registry
//! - [`state`] - Variable store, binding resolver, event surface
//! - [`runtime`] - Flow runtime, action interpreter, host capabilities
//! - [`persistence`] - Snapshot storage contract
//! - [`config`] - TOML configuration

pub mod config;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod runtime;
pub mod state;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use config::{Config, ConfigError, PreviewConfig, TreeConfig};

pub use error::{
    ActionFailure, CapabilityError, InvariantViolation, ParentRejection, PersistenceError,
    ProjectError, RuntimeError, TreeError,
};

pub use engine::{ComponentTree, ListenerId, PageSnapshot, Project, Snapshot, TreeChange};

pub use state::{
    BindingResolver, Dangling, EventListener, EventSurface, LocalEventSurface, LocalState,
    NoLocalState, Resolved, UiEvent, VariableStore,
};

pub use runtime::{
    ApiRequest, EventKey, FlowDiagnostic, FlowRuntime, HeadlessHost, Host, RuntimeState,
    Severity, TaskSpawner,
};

pub use persistence::{JsonFilePersistence, MemoryPersistence, Persistence};
