//! Host capabilities - What a flow can ask of the world outside the core.
//!
//! - [`Host`] - alert, navigation, network and the diagnostic sink
//! - [`TaskSpawner`] - where suspended flow executions keep running
//! - [`HeadlessHost`] - a recording host for tests and headless previews

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::executor::LocalSpawner;
use futures::future::{self, FutureExt, LocalBoxFuture};
use futures::task::LocalSpawnExt;

use crate::error::{ActionFailure, CapabilityError};
use crate::types::{ActionId, BlockId, FlowId, HttpMethod, Value};

// =============================================================================
// DIAGNOSTICS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Something degraded silently (dangling reference).
    Info,
    /// A flow execution was aborted.
    Error,
}

/// A report sent to the host's diagnostic sink.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowDiagnostic {
    pub severity: Severity,
    pub flow_id: FlowId,
    pub block_id: BlockId,
    pub event: String,
    /// The failing action, when one action is to blame.
    pub action_id: Option<ActionId>,
    pub action_index: Option<usize>,
    pub failure: Option<ActionFailure>,
    pub message: String,
}

impl fmt::Display for FlowDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow {} ({}.{})", self.flow_id, self.block_id, self.event)?;
        if let Some(index) = self.action_index {
            write!(f, " action #{}", index)?;
        }
        write!(f, ": {}", self.message)
    }
}

// =============================================================================
// HOST
// =============================================================================

/// Request handed to [`Host::api_call`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
}

/// Capabilities provided by the embedding application.
pub trait Host {
    fn alert(&self, message: &str) -> Result<(), CapabilityError>;

    fn navigate(&self, url: &str) -> Result<(), CapabilityError>;

    /// Perform a network request. The flow waits for the future; nothing else does.
    fn api_call(
        &self,
        request: ApiRequest,
    ) -> LocalBoxFuture<'static, Result<Value, CapabilityError>>;

    /// Diagnostic sink.
    fn report(&self, diagnostic: FlowDiagnostic) {
        match diagnostic.severity {
            Severity::Info => tracing::info!(flow = %diagnostic.flow_id, "{}", diagnostic),
            Severity::Error => tracing::warn!(flow = %diagnostic.flow_id, "{}", diagnostic),
        }
    }
}

// =============================================================================
// TASK SPAWNING
// =============================================================================

/// Runs flow executions that are waiting on an async capability.
pub trait TaskSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

impl TaskSpawner for LocalSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(err) = LocalSpawnExt::spawn_local(self, task) {
            tracing::warn!(error = %err, "flow execution dropped: executor is shut down");
        }
    }
}

// =============================================================================
// HEADLESS HOST
// =============================================================================

#[derive(Default)]
struct HeadlessState {
    alerts: Vec<String>,
    navigations: Vec<String>,
    requests: Vec<ApiRequest>,
    diagnostics: Vec<FlowDiagnostic>,
    responses: HashMap<String, Result<Value, CapabilityError>>,
    deferred: Vec<String>,
    pending: Vec<(String, oneshot::Sender<Result<Value, CapabilityError>>)>,
    reject_alerts: Option<String>,
    reject_navigation: Option<String>,
}

/// A host that records every capability call instead of performing it.
///
/// Network responses are canned per URL. A URL marked with [`defer`](Self::defer)
/// stays pending until [`complete`](Self::complete) is called. Cloning shares
/// the recording.
#[derive(Clone, Default)]
pub struct HeadlessHost {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests to `url` with `response`.
    pub fn respond(&self, url: impl Into<String>, response: Result<Value, CapabilityError>) {
        self.state.borrow_mut().responses.insert(url.into(), response);
    }

    /// Keep requests to `url` pending until completed by hand.
    pub fn defer(&self, url: impl Into<String>) {
        self.state.borrow_mut().deferred.push(url.into());
    }

    /// Settle the oldest pending request to `url`. Returns false if none is waiting.
    pub fn complete(&self, url: &str, response: Result<Value, CapabilityError>) -> bool {
        let sender = {
            let mut state = self.state.borrow_mut();
            let Some(position) = state.pending.iter().position(|(u, _)| u == url) else {
                return false;
            };
            state.pending.remove(position).1
        };
        sender.send(response).is_ok()
    }

    pub fn reject_alerts(&self, reason: impl Into<String>) {
        self.state.borrow_mut().reject_alerts = Some(reason.into());
    }

    pub fn reject_navigation(&self, reason: impl Into<String>) {
        self.state.borrow_mut().reject_navigation = Some(reason.into());
    }

    pub fn alerts(&self) -> Vec<String> {
        self.state.borrow().alerts.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.borrow().navigations.clone()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.borrow().requests.clone()
    }

    pub fn diagnostics(&self) -> Vec<FlowDiagnostic> {
        self.state.borrow().diagnostics.clone()
    }

    pub fn pending_requests(&self) -> usize {
        self.state.borrow().pending.len()
    }
}

impl Host for HeadlessHost {
    fn alert(&self, message: &str) -> Result<(), CapabilityError> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = &state.reject_alerts {
            return Err(CapabilityError::new(reason.clone()));
        }
        state.alerts.push(message.to_string());
        Ok(())
    }

    fn navigate(&self, url: &str) -> Result<(), CapabilityError> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = &state.reject_navigation {
            return Err(CapabilityError::new(reason.clone()));
        }
        state.navigations.push(url.to_string());
        Ok(())
    }

    fn api_call(
        &self,
        request: ApiRequest,
    ) -> LocalBoxFuture<'static, Result<Value, CapabilityError>> {
        let mut state = self.state.borrow_mut();
        let url = request.url.clone();
        state.requests.push(request);

        if state.deferred.contains(&url) {
            let (tx, rx) = oneshot::channel();
            state.pending.push((url, tx));
            return async move {
                rx.await
                    .unwrap_or_else(|_| Err(CapabilityError::new("request dropped")))
            }
            .boxed_local();
        }

        let response = state
            .responses
            .get(&url)
            .cloned()
            .unwrap_or_else(|| Err(CapabilityError::new(format!("no route for {}", url))));
        future::ready(response).boxed_local()
    }

    fn report(&self, diagnostic: FlowDiagnostic) {
        tracing::debug!(flow = %diagnostic.flow_id, severity = ?diagnostic.severity, "host.report");
        self.state.borrow_mut().diagnostics.push(diagnostic);
    }
}
