//! Flow Runtime - Binds block events to flows during a preview.
//!
//! ```text
//!            start()                 stop()
//! Stopped ──────────────▶ Running ──────────────▶ Stopped
//!                          │   ▲
//!                          └───┘ start() / hot_reload() / tree edits
//! ```
//!
//! While Running the runtime keeps:
//!
//! - **bindings** - every `(block, event) → flow` pair authored on an active
//!   block of the previewed tree
//! - **index** - the bindings whose flow currently exists
//! - one surface listener per indexed pair
//!
//! Flows are looked up when an event fires, not when the listener is
//! attached, so a hot-reloaded flow takes effect on the next firing without
//! touching listeners.
//!
//! Tree edits reach the runtime through [`FlowRuntime::watch`]: every change
//! that can affect event bindings rebinds the subtree it touched.
//!
//! # Execution
//!
//! Each firing becomes an independent execution. It is polled once on the
//! spot, so a flow without async actions has fully run by the time the event
//! source regains control. An execution that suspends on an `api-call` is
//! handed to the [`TaskSpawner`] and finishes there. Executions already in
//! flight are never cancelled, not even by `stop`.
//!
//! # Example
//!
//! ```ignore
//! let runtime = FlowRuntime::new(variables, Rc::new(surface.clone()), Rc::new(host), Rc::new(pool.spawner()));
//! runtime.start(&tree, &flows, &variables, |id, value| redraw(id, value));
//! runtime.watch(&mut tree);
//!
//! surface.fire(&button_id, "onClick");
//! runtime.hot_reload(&edited_flows, &variables)?;
//! runtime.stop();
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures::future::FutureExt;
use futures::task::noop_waker;

use crate::config::PreviewConfig;
use crate::engine::{ComponentTree, ListenerId, TreeChange};
use crate::error::RuntimeError;
use crate::state::{EventSurface, UiEvent, VariableStore};
use crate::types::{BlockId, Cleanup, Flow, FlowId, Value, Variable, VariableId};

use super::host::{FlowDiagnostic, Host, Severity, TaskSpawner};
use super::interpreter::{ExecutionContext, ExecutionOutcome, execute};

/// Lifecycle state of a [`FlowRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeState {
    #[default]
    Stopped,
    Running,
}

/// A bound `(block, event)` pair.
pub type EventKey = (BlockId, String);

struct RuntimeInner {
    state: RuntimeState,
    variables: VariableStore,
    surface: Rc<dyn EventSurface>,
    host: Rc<dyn Host>,
    spawner: Rc<dyn TaskSpawner>,
    config: PreviewConfig,
    flows: HashMap<FlowId, Rc<Flow>>,
    bindings: BTreeMap<EventKey, FlowId>,
    index: BTreeMap<EventKey, FlowId>,
    listeners: HashMap<EventKey, Cleanup>,
    on_variable_change: Option<Cleanup>,
}

/// The preview-mode flow runtime. Cloning shares the runtime.
#[derive(Clone)]
pub struct FlowRuntime {
    inner: Rc<RefCell<RuntimeInner>>,
}

impl std::fmt::Debug for FlowRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("FlowRuntime")
            .field("state", &inner.state)
            .field("flows", &inner.flows.len())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl FlowRuntime {
    pub fn new(
        variables: VariableStore,
        surface: Rc<dyn EventSurface>,
        host: Rc<dyn Host>,
        spawner: Rc<dyn TaskSpawner>,
    ) -> Self {
        Self::with_config(variables, surface, host, spawner, PreviewConfig::default())
    }

    pub fn with_config(
        variables: VariableStore,
        surface: Rc<dyn EventSurface>,
        host: Rc<dyn Host>,
        spawner: Rc<dyn TaskSpawner>,
        config: PreviewConfig,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RuntimeInner {
                state: RuntimeState::Stopped,
                variables,
                surface,
                host,
                spawner,
                config,
                flows: HashMap::new(),
                bindings: BTreeMap::new(),
                index: BTreeMap::new(),
                listeners: HashMap::new(),
                on_variable_change: None,
            })),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Enter preview mode.
    ///
    /// From Stopped, variable values are reset to their defaults. While
    /// already Running this refreshes flows, definitions and listeners
    /// instead, keeping live values and never double-attaching.
    pub fn start<F>(
        &self,
        tree: &ComponentTree,
        flows: &[Flow],
        variables: &[Variable],
        on_variable_change: F,
    ) where
        F: Fn(&VariableId, &Value) + 'static,
    {
        let (store, previous_callback, was_running) = {
            let mut inner = self.inner.borrow_mut();
            let was_running = inner.state == RuntimeState::Running;
            inner.flows = flow_map(flows);
            inner.bindings = collect_bindings(tree);
            inner.state = RuntimeState::Running;
            (inner.variables.clone(), inner.on_variable_change.take(), was_running)
        };

        if was_running {
            store.reload_definitions(variables);
        } else {
            store.load_definitions(variables);
        }

        if let Some(cleanup) = previous_callback {
            cleanup();
        }
        let subscription = store.subscribe(on_variable_change);
        self.inner.borrow_mut().on_variable_change = Some(subscription);

        self.rediff();
        tracing::debug!(
            refreshed = was_running,
            flows = flows.len(),
            bound = self.inner.borrow().index.len(),
            "runtime.start"
        );
    }

    /// Swap in edited flows and variable definitions while Running.
    ///
    /// Live values of surviving variables are kept. Listeners are re-diffed:
    /// pairs whose flow disappeared are detached, pairs whose flow appeared
    /// are attached, the rest are left alone.
    pub fn hot_reload(&self, flows: &[Flow], variables: &[Variable]) -> Result<(), RuntimeError> {
        let store = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != RuntimeState::Running {
                return Err(RuntimeError::NotRunning);
            }
            inner.flows = flow_map(flows);
            inner.variables.clone()
        };

        let reset = store.reload_definitions(variables);
        self.rediff();
        tracing::debug!(flows = flows.len(), reset = reset.len(), "runtime.hot_reload");
        Ok(())
    }

    /// Follow edits to the previewed tree.
    ///
    /// While Running, each change that can affect bindings (event edits,
    /// moves, archive and restore) rebinds the touched block and its subtree.
    /// While Stopped the subscription does nothing. Returns the tree listener
    /// id for [`ComponentTree::unsubscribe`].
    pub fn watch(&self, tree: &mut ComponentTree) -> ListenerId {
        let runtime = Rc::downgrade(&self.inner);
        tree.subscribe(move |change, tree| {
            if !change.affects_bindings() {
                return;
            }
            if let Some(inner) = runtime.upgrade() {
                FlowRuntime { inner }.apply_tree_change(change, tree);
            }
        })
    }

    fn apply_tree_change(&self, change: &TreeChange, tree: &ComponentTree) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != RuntimeState::Running {
                return;
            }
            let root = change.block_id();
            let mut subtree = tree.descendants(root);
            subtree.push(root.clone());

            inner.bindings.retain(|(block_id, _), _| !subtree.contains(block_id));
            for block_id in subtree.iter().filter(|id| tree.is_active(id)) {
                if let Some(block) = tree.get(block_id) {
                    for (event, flow_id) in &block.events {
                        inner
                            .bindings
                            .insert((block_id.clone(), event.clone()), flow_id.clone());
                    }
                }
            }
            tracing::debug!(block = %root, blocks = subtree.len(), "runtime.tree_change");
        }
        self.rediff();
    }

    /// Re-read every event binding from the tree while Running.
    pub fn sync_bindings(&self, tree: &ComponentTree) -> Result<(), RuntimeError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != RuntimeState::Running {
                return Err(RuntimeError::NotRunning);
            }
            inner.bindings = collect_bindings(tree);
        }
        self.rediff();
        Ok(())
    }

    /// Leave preview mode. Safe to call repeatedly.
    ///
    /// Detaches every listener and drops the index. In-flight executions run on.
    pub fn stop(&self) {
        let (listeners, callback) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == RuntimeState::Stopped {
                return;
            }
            inner.state = RuntimeState::Stopped;
            inner.flows.clear();
            inner.bindings.clear();
            inner.index.clear();
            (
                std::mem::take(&mut inner.listeners),
                inner.on_variable_change.take(),
            )
        };

        let detached = listeners.len();
        for (_, cleanup) in listeners {
            cleanup();
        }
        if let Some(cleanup) = callback {
            cleanup();
        }
        tracing::debug!(detached, "runtime.stop");
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn state(&self) -> RuntimeState {
        self.inner.borrow().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == RuntimeState::Running
    }

    /// The `(block, event)` pairs that currently have a listener.
    pub fn bound_events(&self) -> Vec<EventKey> {
        self.inner.borrow().listeners.keys().cloned().collect()
    }

    pub fn variables(&self) -> VariableStore {
        self.inner.borrow().variables.clone()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run the flow bound to `(block_id, event)`, if any.
    ///
    /// Returns true when an execution was started. An unbound or dangling
    /// pair, or a stopped runtime, does nothing.
    pub fn dispatch(
        &self,
        block_id: &BlockId,
        event: &str,
        context: BTreeMap<String, Value>,
    ) -> bool {
        self.dispatch_event(&UiEvent {
            block_id: block_id.clone(),
            name: event.to_string(),
            context,
        })
    }

    fn dispatch_event(&self, event: &UiEvent) -> bool {
        let key: EventKey = (event.block_id.clone(), event.name.clone());

        let (ctx, spawner) = {
            let inner = self.inner.borrow();
            if inner.state != RuntimeState::Running {
                return false;
            }
            let Some(flow_id) = inner.bindings.get(&key) else {
                return false;
            };
            let Some(flow) = inner.flows.get(flow_id).cloned() else {
                tracing::trace!(block = %event.block_id, event = %event.name, flow = %flow_id, "dangling flow reference");
                if inner.config.report_dangling_references {
                    let diagnostic = FlowDiagnostic {
                        severity: Severity::Info,
                        flow_id: flow_id.clone(),
                        block_id: event.block_id.clone(),
                        event: event.name.clone(),
                        action_id: None,
                        action_index: None,
                        failure: None,
                        message: "event points at a missing flow".into(),
                    };
                    let host = inner.host.clone();
                    drop(inner);
                    host.report(diagnostic);
                }
                return false;
            };

            let ctx = ExecutionContext {
                flow,
                event: event.clone(),
                variables: inner.variables.clone(),
                host: inner.host.clone(),
                strict_variable_types: inner.config.strict_variable_types,
                report_dangling_references: inner.config.report_dangling_references,
                max_actions: inner.config.max_actions_per_flow,
            };
            (ctx, inner.spawner.clone())
        };

        tracing::debug!(block = %event.block_id, event = %event.name, flow = %ctx.flow.id, "runtime.dispatch");
        let host = ctx.host.clone();
        let mut task = async move {
            match execute(ctx).await {
                ExecutionOutcome::Completed { executed } => {
                    tracing::debug!(executed, "flow completed");
                }
                ExecutionOutcome::Aborted { executed, diagnostic } => {
                    tracing::warn!(flow = %diagnostic.flow_id, executed, error = %diagnostic.message, "flow aborted");
                    host.report(diagnostic);
                }
            }
        }
        .boxed_local();

        // Run up to the first suspension now; hand the rest to the spawner.
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        if let Poll::Pending = task.poll_unpin(&mut cx) {
            spawner.spawn(task);
        }
        true
    }

    // =========================================================================
    // Listener Diffing
    // =========================================================================

    /// Rebuild the index from bindings and flows, then attach and detach
    /// listeners so exactly the indexed pairs are listened to.
    ///
    /// The surface is called with no borrow held: a listener may fire as soon
    /// as it is attached.
    fn rediff(&self) {
        let (surface, added, removed) = {
            let mut inner = self.inner.borrow_mut();
            let index: BTreeMap<EventKey, FlowId> = inner
                .bindings
                .iter()
                .filter(|(_, flow_id)| inner.flows.contains_key(*flow_id))
                .map(|(key, flow_id)| (key.clone(), flow_id.clone()))
                .collect();

            let stale: Vec<EventKey> = inner
                .listeners
                .keys()
                .filter(|key| !index.contains_key(*key))
                .cloned()
                .collect();
            let removed: Vec<Cleanup> = stale
                .iter()
                .filter_map(|key| inner.listeners.remove(key))
                .collect();

            let added: Vec<EventKey> = index
                .keys()
                .filter(|key| !inner.listeners.contains_key(*key))
                .cloned()
                .collect();

            inner.index = index;
            (inner.surface.clone(), added, removed)
        };

        for cleanup in removed {
            cleanup();
        }

        let weak = Rc::downgrade(&self.inner);
        for key in added {
            let cleanup = surface.listen(&key.0, &key.1, listener(weak.clone()));
            let mut inner = self.inner.borrow_mut();
            // A nested rediff may have settled this key while we were out.
            if inner.index.contains_key(&key) && !inner.listeners.contains_key(&key) {
                inner.listeners.insert(key, cleanup);
            } else {
                drop(inner);
                cleanup();
            }
        }
    }
}

/// Surface listener that forwards into the runtime without keeping it alive.
fn listener(runtime: Weak<RefCell<RuntimeInner>>) -> Rc<dyn Fn(&UiEvent)> {
    Rc::new(move |event| {
        if let Some(inner) = runtime.upgrade() {
            FlowRuntime { inner }.dispatch_event(event);
        }
    })
}

fn flow_map(flows: &[Flow]) -> HashMap<FlowId, Rc<Flow>> {
    flows
        .iter()
        .map(|flow| (flow.id.clone(), Rc::new(flow.clone())))
        .collect()
}

fn collect_bindings(tree: &ComponentTree) -> BTreeMap<EventKey, FlowId> {
    tree.active_blocks()
        .into_iter()
        .flat_map(|block| {
            block
                .events
                .iter()
                .map(|(event, flow_id)| ((block.id.clone(), event.clone()), flow_id.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::HeadlessHost;
    use crate::state::{EventListener, LocalEventSurface};
    use crate::types::{ActionKind, BlockType, Operand, VariableType};
    use futures::executor::LocalPool;
    use std::cell::Cell;

    /// Counts attach and detach calls, and delivers queued events the moment
    /// a matching listener is attached.
    #[derive(Clone, Default)]
    struct RecordingSurface {
        local: LocalEventSurface,
        listens: Rc<Cell<usize>>,
        cleanups: Rc<Cell<usize>>,
        queued: Rc<RefCell<Vec<UiEvent>>>,
    }

    impl EventSurface for RecordingSurface {
        fn listen(&self, block_id: &BlockId, event: &str, listener: EventListener) -> Cleanup {
            self.listens.set(self.listens.get() + 1);
            let detach = self.local.listen(block_id, event, listener.clone());

            let ready: Vec<UiEvent> = {
                let mut queued = self.queued.borrow_mut();
                let (ready, rest): (Vec<UiEvent>, Vec<UiEvent>) = queued
                    .drain(..)
                    .partition(|e| &e.block_id == block_id && e.name == event);
                *queued = rest;
                ready
            };
            for pending in &ready {
                listener(pending);
            }

            let cleanups = self.cleanups.clone();
            Box::new(move || {
                cleanups.set(cleanups.get() + 1);
                detach();
            })
        }
    }

    struct Harness {
        tree: ComponentTree,
        button: BlockId,
        counter: Variable,
        flow: Flow,
        surface: LocalEventSurface,
        host: HeadlessHost,
        pool: LocalPool,
        runtime: FlowRuntime,
    }

    fn setup() -> Harness {
        let counter = Variable::new("counter", VariableType::Number, Value::from(0));
        let flow = Flow::new("increment", "onClick")
            .with_action(ActionKind::set_variable(
                counter.id.clone(),
                Operand::add(Operand::variable(&counter.id), Operand::literal(1)),
            ))
            .with_action(ActionKind::alert("Clicked"));

        let mut tree = ComponentTree::new();
        let button = tree.create(None, BlockType::Button, BTreeMap::new()).unwrap().id;
        tree.update_event(&button, "onClick", Some(flow.id.clone())).unwrap();

        let surface = LocalEventSurface::new();
        let host = HeadlessHost::new();
        let pool = LocalPool::new();
        let runtime = FlowRuntime::new(
            VariableStore::new(),
            Rc::new(surface.clone()),
            Rc::new(host.clone()),
            Rc::new(pool.spawner()),
        );

        Harness {
            tree,
            button,
            counter,
            flow,
            surface,
            host,
            pool,
            runtime,
        }
    }

    fn runtime_on(h: &Harness, surface: &RecordingSurface) -> FlowRuntime {
        FlowRuntime::new(
            VariableStore::new(),
            Rc::new(surface.clone()),
            Rc::new(h.host.clone()),
            Rc::new(h.pool.spawner()),
        )
    }

    fn start(h: &Harness) {
        h.runtime
            .start(&h.tree, &[h.flow.clone()], &[h.counter.clone()], |_, _| {});
    }

    #[test]
    fn test_initial_state() {
        let h = setup();
        assert_eq!(h.runtime.state(), RuntimeState::Stopped);
        assert!(h.runtime.bound_events().is_empty());
        assert_eq!(h.runtime.hot_reload(&[], &[]), Err(RuntimeError::NotRunning));
    }

    #[test]
    fn test_click_runs_flow() {
        let h = setup();
        start(&h);
        assert!(h.runtime.is_running());
        assert_eq!(h.surface.listener_count(), 1);

        h.surface.fire(&h.button, "onClick");
        assert_eq!(h.runtime.variables().get(&h.counter.id), Some(Value::from(1)));
        assert_eq!(h.host.alerts(), vec!["Clicked".to_string()]);
    }

    #[test]
    fn test_start_twice_does_not_double_attach() {
        let h = setup();
        start(&h);
        h.surface.fire(&h.button, "onClick");
        start(&h);

        assert_eq!(h.surface.listener_count(), 1);
        h.surface.fire(&h.button, "onClick");
        assert_eq!(h.runtime.variables().get(&h.counter.id), Some(Value::from(2)));
    }

    #[test]
    fn test_stop_is_idempotent_and_detaches() {
        let h = setup();
        start(&h);
        h.runtime.stop();
        h.runtime.stop();

        assert_eq!(h.runtime.state(), RuntimeState::Stopped);
        assert_eq!(h.surface.listener_count(), 0);
        assert_eq!(h.surface.fire(&h.button, "onClick"), 0);
        assert!(!h.runtime.dispatch(&h.button, "onClick", BTreeMap::new()));
        assert!(h.host.alerts().is_empty());
    }

    #[test]
    fn test_variable_change_callback() {
        let h = setup();
        let changes = Rc::new(Cell::new(0));
        let count = changes.clone();
        h.runtime.start(&h.tree, &[h.flow.clone()], &[h.counter.clone()], move |_, _| {
            count.set(count.get() + 1);
        });

        h.surface.fire(&h.button, "onClick");
        assert_eq!(changes.get(), 1);

        h.runtime.stop();
        h.runtime.variables().set(&h.counter.id, Value::from(9));
        assert_eq!(changes.get(), 1);
    }

    #[test]
    fn test_hot_reload_rediffs_listeners() {
        let h = setup();
        start(&h);

        // Removing the flow makes the binding dangling: listener detached.
        h.runtime.hot_reload(&[], &[h.counter.clone()]).unwrap();
        assert!(h.runtime.bound_events().is_empty());
        assert_eq!(h.surface.listener_count(), 0);

        h.runtime
            .hot_reload(&[h.flow.clone()], &[h.counter.clone()])
            .unwrap();
        assert_eq!(
            h.runtime.bound_events(),
            vec![(h.button.clone(), "onClick".to_string())]
        );
    }

    #[test]
    fn test_dangling_reference_reported_when_configured() {
        let mut h = setup();
        h.runtime = FlowRuntime::with_config(
            VariableStore::new(),
            Rc::new(h.surface.clone()),
            Rc::new(h.host.clone()),
            Rc::new(h.pool.spawner()),
            PreviewConfig {
                report_dangling_references: true,
                ..PreviewConfig::default()
            },
        );
        h.runtime.start(&h.tree, &[], &[h.counter.clone()], |_, _| {});

        assert!(!h.runtime.dispatch(&h.button, "onClick", BTreeMap::new()));
        let diagnostics = h.host.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Info);
        assert_eq!(diagnostics[0].flow_id, h.flow.id);
    }

    #[test]
    fn test_sync_bindings_follows_tree() {
        let mut h = setup();
        start(&h);

        h.tree.archive(&h.button).unwrap();
        h.runtime.sync_bindings(&h.tree).unwrap();
        assert_eq!(h.surface.listener_count(), 0);

        h.tree.restore(&h.button).unwrap();
        h.runtime.sync_bindings(&h.tree).unwrap();
        assert_eq!(h.surface.listener_count(), 1);
    }

    #[test]
    fn test_suspended_flow_finishes_on_pool() {
        let mut h = setup();
        h.host.defer("/save");
        let flow = Flow::new("save", "onClick")
            .with_action(ActionKind::ApiCall {
                method: Default::default(),
                url: "/save".into(),
                body: None,
                result_variable: None,
            })
            .with_action(ActionKind::alert("Saved"));
        h.tree
            .update_event(&h.button, "onClick", Some(flow.id.clone()))
            .unwrap();
        h.runtime.start(&h.tree, &[flow], &[], |_, _| {});

        h.surface.fire(&h.button, "onClick");
        h.pool.run_until_stalled();
        assert!(h.host.alerts().is_empty());

        h.host.complete("/save", Ok(Value::Empty));
        h.pool.run_until_stalled();
        assert_eq!(h.host.alerts(), vec!["Saved".to_string()]);
    }

    #[test]
    fn test_listener_may_fire_while_attaching() {
        let h = setup();
        let surface = RecordingSurface::default();
        surface
            .queued
            .borrow_mut()
            .push(UiEvent::new(h.button.clone(), "onClick"));
        let runtime = runtime_on(&h, &surface);

        runtime.start(&h.tree, &[h.flow.clone()], &[h.counter.clone()], |_, _| {});

        assert_eq!(runtime.variables().get(&h.counter.id), Some(Value::from(1)));
        assert_eq!(h.host.alerts(), vec!["Clicked".to_string()]);
        assert_eq!(runtime.bound_events().len(), 1);
    }

    #[test]
    fn test_reload_leaves_unchanged_listeners_alone() {
        let h = setup();
        let surface = RecordingSurface::default();
        let runtime = runtime_on(&h, &surface);
        runtime.start(&h.tree, &[h.flow.clone()], &[h.counter.clone()], |_, _| {});
        assert_eq!(surface.listens.get(), 1);

        let other = Flow::new("unrelated", "onHover").with_action(ActionKind::alert("hover"));
        let title = Variable::new("title", VariableType::String, Value::from("Hi"));
        let flows = [h.flow.clone(), other];
        let variables = [h.counter.clone(), title];
        runtime.hot_reload(&flows, &variables).unwrap();
        runtime.start(&h.tree, &flows, &variables, |_, _| {});
        runtime.hot_reload(&flows, &variables).unwrap();

        assert_eq!(surface.listens.get(), 1);
        assert_eq!(surface.cleanups.get(), 0);

        runtime.hot_reload(&[], &variables).unwrap();
        assert_eq!(surface.cleanups.get(), 1);
        assert_eq!(surface.local.listener_count(), 0);
    }

    #[test]
    fn test_watch_follows_tree_edits() {
        let mut h = setup();
        start(&h);
        h.runtime.watch(&mut h.tree);

        h.tree.update_event(&h.button, "onClick", None).unwrap();
        assert_eq!(h.surface.listener_count(), 0);

        h.tree
            .update_event(&h.button, "onClick", Some(h.flow.id.clone()))
            .unwrap();
        assert_eq!(h.surface.fire(&h.button, "onClick"), 1);

        let panel = h.tree.create(None, BlockType::Container, BTreeMap::new()).unwrap().id;
        h.tree.move_block(&h.button, Some(&panel), 0).unwrap();
        h.tree.archive(&panel).unwrap();
        assert!(h.runtime.bound_events().is_empty());

        h.tree.restore(&panel).unwrap();
        assert_eq!(
            h.runtime.bound_events(),
            vec![(h.button.clone(), "onClick".to_string())]
        );

        // Stopped: edits are ignored, the next start reads the tree afresh.
        h.runtime.stop();
        h.tree.archive(&panel).unwrap();
        h.tree.restore(&panel).unwrap();
        assert_eq!(h.surface.listener_count(), 0);
        assert_eq!(h.runtime.variables().get(&h.counter.id), Some(Value::from(1)));
    }
}
