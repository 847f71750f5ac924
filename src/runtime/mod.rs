//! Runtime Module - Logic flow execution during a preview
//!
//! - **FlowRuntime** - Stopped/Running lifecycle, listener diffing, dispatch
//! - **Interpreter** - Executes one flow invocation, action by action
//! - **Host** - Alert, navigation, network and diagnostic capabilities

mod flow_runtime;
mod host;
mod interpreter;

pub use flow_runtime::*;
pub use host::*;
pub use interpreter::{ExecutionContext, ExecutionOutcome, execute};
