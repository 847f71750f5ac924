//! Action interpreter - Executes one flow invocation.
//!
//! Actions run strictly in list order. The only suspension point is an
//! `api-call`, which awaits the host's future before the next action starts.
//! The first failure aborts the rest of the list; whatever earlier actions
//! wrote to the variable store stays written.
//!
//! Operands read variables and event context through the [`BindingResolver`],
//! so a reference to something that is gone evaluates to `Empty`. With
//! `report_dangling_references` set, each one is also sent to the host as an
//! informational diagnostic.

use std::rc::Rc;

use crate::error::ActionFailure;
use crate::state::{BindingResolver, Dangling, UiEvent, VariableStore};
use crate::types::{Action, ActionKind, Binding, Flow, Operand, Value, VariableId};

use super::host::{ApiRequest, FlowDiagnostic, Host, Severity};

/// Everything one execution needs, owned so the future is `'static`.
pub struct ExecutionContext {
    pub flow: Rc<Flow>,
    pub event: UiEvent,
    pub variables: VariableStore,
    pub host: Rc<dyn Host>,
    pub strict_variable_types: bool,
    pub report_dangling_references: bool,
    pub max_actions: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed { executed: usize },
    Aborted { executed: usize, diagnostic: FlowDiagnostic },
}

impl ExecutionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { .. })
    }
}

/// Per-execution evaluation scope.
struct Scope<'a> {
    variables: &'a VariableStore,
    event: &'a UiEvent,
    last_result: Value,
    /// References that resolved to nothing during the current action.
    dangling: Vec<Dangling>,
}

impl Scope<'_> {
    fn resolve(&mut self, binding: &Binding) -> Value {
        let resolved =
            BindingResolver::new(self.variables).resolve(Some(binding), None, &self.event.context);
        if let Some(reference) = resolved.dangling {
            self.dangling.push(reference);
        }
        resolved.value
    }
}

/// Run a flow to completion or to its first failure.
///
/// The aborting failure is returned in the outcome, not reported; the caller
/// decides where it goes. Only informational dangling-reference diagnostics
/// are sent to the host from here.
pub async fn execute(ctx: ExecutionContext) -> ExecutionOutcome {
    let flow = ctx.flow.clone();

    if flow.actions.len() > ctx.max_actions {
        let failure = ActionFailure::MalformedParams(format!(
            "flow has {} actions, limit is {}",
            flow.actions.len(),
            ctx.max_actions
        ));
        return ExecutionOutcome::Aborted {
            executed: 0,
            diagnostic: diagnostic(&ctx, None, failure),
        };
    }

    let mut scope = Scope {
        variables: &ctx.variables,
        event: &ctx.event,
        last_result: Value::Empty,
        dangling: Vec::new(),
    };

    for (index, action) in flow.actions.iter().enumerate() {
        tracing::trace!(flow = %flow.id, index, action = action.kind.type_name(), "flow.action");
        let result = run_action(&ctx, &mut scope, action).await;
        for reference in scope.dangling.drain(..) {
            report_dangling(&ctx, index, action, reference);
        }
        if let Err(failure) = result {
            return ExecutionOutcome::Aborted {
                executed: index,
                diagnostic: diagnostic(&ctx, Some((index, action)), failure),
            };
        }
    }

    ExecutionOutcome::Completed {
        executed: flow.actions.len(),
    }
}

async fn run_action(
    ctx: &ExecutionContext,
    scope: &mut Scope<'_>,
    action: &Action,
) -> Result<(), ActionFailure> {
    match &action.kind {
        ActionKind::Alert { message } => ctx
            .host
            .alert(message)
            .map_err(|source| ActionFailure::Capability {
                action: "alert",
                source,
            }),

        ActionKind::SetVariable { variable_id, value } => {
            let value = evaluate(scope, value)?;
            assign(ctx, variable_id, value)
        }

        ActionKind::Navigate { url } => {
            if url.trim().is_empty() {
                return Err(ActionFailure::MalformedParams("navigate requires a url".into()));
            }
            ctx.host
                .navigate(url)
                .map_err(|source| ActionFailure::Capability {
                    action: "navigate",
                    source,
                })
        }

        ActionKind::ApiCall {
            method,
            url,
            body,
            result_variable,
        } => {
            if url.trim().is_empty() {
                return Err(ActionFailure::MalformedParams("api-call requires a url".into()));
            }
            let body = match body {
                Some(body) => Some(evaluate(scope, body)?),
                None => None,
            };
            let request = ApiRequest {
                method: *method,
                url: url.clone(),
                body,
            };

            let response = ctx
                .host
                .api_call(request)
                .await
                .map_err(|source| ActionFailure::Capability {
                    action: "api-call",
                    source,
                })?;

            scope.last_result = response.clone();
            match result_variable {
                Some(id) => assign(ctx, id, response),
                None => Ok(()),
            }
        }
    }
}

/// Write a variable, coercing to its declared type when strict.
///
/// An unknown variable is a silent no-op.
fn assign(ctx: &ExecutionContext, id: &VariableId, value: Value) -> Result<(), ActionFailure> {
    let Some(definition) = ctx.variables.definition(id) else {
        tracing::trace!(variable = %id, "set-variable on unknown variable ignored");
        return Ok(());
    };

    let value = if ctx.strict_variable_types {
        definition
            .var_type
            .coerce(&value)
            .ok_or(ActionFailure::TypeMismatch {
                expected: definition.var_type.name(),
                got: value.type_name(),
            })?
    } else {
        value
    };

    ctx.variables.set(id, value);
    Ok(())
}

fn evaluate(scope: &mut Scope<'_>, operand: &Operand) -> Result<Value, ActionFailure> {
    Ok(match operand {
        Operand::Literal(value) => value.clone(),
        Operand::Variable(id) => scope.resolve(&Binding::Variable(id.clone())),
        Operand::Local(key) => scope.resolve(&Binding::LocalState(key.clone())),
        Operand::Result => scope.last_result.clone(),
        Operand::Not(inner) => Value::Boolean(!evaluate(scope, inner)?.is_truthy()),
        Operand::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&evaluate(scope, part)?.to_string());
            }
            Value::String(out)
        }
        Operand::Add(lhs, rhs) => add(evaluate(scope, lhs)?, evaluate(scope, rhs)?)?,
    })
}

fn add(lhs: Value, rhs: Value) -> Result<Value, ActionFailure> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            let sum = a + b;
            if sum.is_finite() {
                Ok(Value::Number(sum))
            } else {
                Err(ActionFailure::NonFiniteNumber)
            }
        }
        (Value::Empty, other) | (other, Value::Empty) => Ok(other),
        (a @ Value::String(_), b) | (a, b @ Value::String(_)) => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        _ => Err(ActionFailure::TypeMismatch {
            expected: "number",
            got: "boolean",
        }),
    }
}

fn report_dangling(ctx: &ExecutionContext, index: usize, action: &Action, reference: Dangling) {
    tracing::trace!(flow = %ctx.flow.id, index, ?reference, "operand resolved to empty");
    if !ctx.report_dangling_references {
        return;
    }
    let message = match &reference {
        Dangling::Variable(id) => format!("variable {} does not exist", id),
        Dangling::LocalState(key) => format!("event has no local value {:?}", key),
    };
    ctx.host.report(FlowDiagnostic {
        severity: Severity::Info,
        flow_id: ctx.flow.id.clone(),
        block_id: ctx.event.block_id.clone(),
        event: ctx.event.name.clone(),
        action_id: Some(action.id.clone()),
        action_index: Some(index),
        failure: None,
        message,
    });
}

fn diagnostic(
    ctx: &ExecutionContext,
    action: Option<(usize, &Action)>,
    failure: ActionFailure,
) -> FlowDiagnostic {
    FlowDiagnostic {
        severity: Severity::Error,
        flow_id: ctx.flow.id.clone(),
        block_id: ctx.event.block_id.clone(),
        event: ctx.event.name.clone(),
        action_id: action.map(|(_, a)| a.id.clone()),
        action_index: action.map(|(index, _)| index),
        message: failure.to_string(),
        failure: Some(failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityError;
    use crate::runtime::HeadlessHost;
    use crate::types::{BlockId, Variable, VariableType};
    use futures::executor::block_on;

    fn setup() -> (VariableStore, Variable, HeadlessHost) {
        let store = VariableStore::new();
        let counter = Variable::new("counter", VariableType::Number, Value::from(0));
        store.load_definitions(&[counter.clone()]);
        (store, counter, HeadlessHost::new())
    }

    fn run(flow: Flow, store: &VariableStore, host: &HeadlessHost) -> ExecutionOutcome {
        run_with(flow, store, host, UiEvent::new(BlockId::from("button"), "onClick"))
    }

    fn run_with(
        flow: Flow,
        store: &VariableStore,
        host: &HeadlessHost,
        event: UiEvent,
    ) -> ExecutionOutcome {
        block_on(execute(ExecutionContext {
            flow: Rc::new(flow),
            event,
            variables: store.clone(),
            host: Rc::new(host.clone()),
            strict_variable_types: true,
            report_dangling_references: true,
            max_actions: 16,
        }))
    }

    #[test]
    fn test_counter_then_alert() {
        let (store, counter, host) = setup();
        let flow = Flow::new("increment", "onClick")
            .with_action(ActionKind::set_variable(
                counter.id.clone(),
                Operand::add(Operand::variable(&counter.id), Operand::literal(1)),
            ))
            .with_action(ActionKind::alert("Clicked"));

        let outcome = run(flow, &store, &host);
        assert_eq!(outcome, ExecutionOutcome::Completed { executed: 2 });
        assert_eq!(store.get(&counter.id), Some(Value::from(1)));
        assert_eq!(host.alerts(), vec!["Clicked".to_string()]);
    }

    #[test]
    fn test_later_set_wins() {
        let (store, counter, host) = setup();
        let flow = Flow::new("twice", "onClick")
            .with_action(ActionKind::set_variable(counter.id.clone(), Operand::literal(1)))
            .with_action(ActionKind::set_variable(counter.id.clone(), Operand::literal(2)));

        assert!(run(flow, &store, &host).is_completed());
        assert_eq!(store.get(&counter.id), Some(Value::from(2)));
    }

    #[test]
    fn test_failure_aborts_without_rollback() {
        let (store, counter, host) = setup();
        host.reject_navigation("blocked");
        let flow = Flow::new("go", "onClick")
            .with_action(ActionKind::set_variable(counter.id.clone(), Operand::literal(5)))
            .with_action(ActionKind::navigate("/next"))
            .with_action(ActionKind::alert("unreachable"));
        let failing_action = flow.actions[1].id.clone();

        match run(flow, &store, &host) {
            ExecutionOutcome::Aborted { executed, diagnostic } => {
                assert_eq!(executed, 1);
                assert_eq!(diagnostic.action_index, Some(1));
                assert_eq!(diagnostic.action_id, Some(failing_action));
                assert_eq!(
                    diagnostic.failure,
                    Some(ActionFailure::Capability {
                        action: "navigate",
                        source: CapabilityError::new("blocked"),
                    })
                );
            }
            other => panic!("expected abort, got {:?}", other),
        }
        assert_eq!(store.get(&counter.id), Some(Value::from(5)));
        assert!(host.alerts().is_empty());
    }

    #[test]
    fn test_strict_types_reject_mismatch() {
        let (store, counter, host) = setup();
        let flow = Flow::new("bad", "onClick")
            .with_action(ActionKind::set_variable(counter.id.clone(), Operand::literal("abc")));

        match run(flow, &store, &host) {
            ExecutionOutcome::Aborted { diagnostic, .. } => assert_eq!(
                diagnostic.failure,
                Some(ActionFailure::TypeMismatch {
                    expected: "number",
                    got: "string"
                })
            ),
            other => panic!("expected abort, got {:?}", other),
        }
        assert_eq!(store.get(&counter.id), Some(Value::from(0)));
    }

    #[test]
    fn test_unknown_variable_is_noop() {
        let (store, _, host) = setup();
        let flow = Flow::new("stale", "onClick")
            .with_action(ActionKind::set_variable(VariableId::from("deleted"), Operand::literal(1)))
            .with_action(ActionKind::alert("still runs"));

        assert!(run(flow, &store, &host).is_completed());
        assert_eq!(host.alerts().len(), 1);
    }

    #[test]
    fn test_operands() {
        let (store, _, host) = setup();
        let label = Variable::new("label", VariableType::String, Value::Empty);
        store.reload_definitions(&[label.clone()]);

        let flow = Flow::new("greet", "onSubmit").with_action(ActionKind::set_variable(
            label.id.clone(),
            Operand::Concat(vec![
                Operand::literal("Hi "),
                Operand::Local("name".into()),
                Operand::literal("!"),
            ]),
        ));
        let event = UiEvent::new(BlockId::from("form"), "onSubmit").with_context("name", "Ada");
        assert!(run_with(flow, &store, &host, event).is_completed());
        assert_eq!(store.get(&label.id), Some(Value::from("Hi Ada!")));

        let event = UiEvent::new(BlockId::from("x"), "y");
        let mut scope = Scope {
            variables: &store,
            event: &event,
            last_result: Value::Empty,
            dangling: Vec::new(),
        };
        assert_eq!(
            evaluate(&mut scope, &Operand::add(Operand::literal(2), Operand::literal("px"))),
            Ok(Value::from("2px"))
        );
        assert_eq!(
            evaluate(&mut scope, &Operand::not(Operand::literal(false))),
            Ok(Value::from(true))
        );
        let mismatch = Operand::add(Operand::literal(true), Operand::literal(1));
        assert!(evaluate(&mut scope, &mismatch).is_err());
        let overflow = Operand::add(Operand::literal(f64::MAX), Operand::literal(f64::MAX));
        assert_eq!(evaluate(&mut scope, &overflow), Err(ActionFailure::NonFiniteNumber));
        assert!(scope.dangling.is_empty());
    }

    #[test]
    fn test_dangling_operands_degrade_and_report() {
        let (store, counter, host) = setup();
        let ghost = VariableId::from("deleted");
        let flow = Flow::new("stale", "onClick").with_action(ActionKind::set_variable(
            counter.id.clone(),
            Operand::add(Operand::variable(&ghost), Operand::Local("missing".into())),
        ));
        let action = flow.actions[0].id.clone();

        assert!(run(flow, &store, &host).is_completed());
        assert_eq!(store.get(&counter.id), Some(Value::from(0)));

        let diagnostics = host.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.severity == Severity::Info));
        assert!(diagnostics.iter().all(|d| d.action_id == Some(action.clone())));
        assert_eq!(diagnostics[0].message, "variable deleted does not exist");
    }

    #[test]
    fn test_api_call_result_feeds_variable() {
        let (store, counter, host) = setup();
        host.respond("/count", Ok(Value::from(41)));
        let flow = Flow::new("load", "onClick")
            .with_action(ActionKind::ApiCall {
                method: Default::default(),
                url: "/count".into(),
                body: None,
                result_variable: None,
            })
            .with_action(ActionKind::set_variable(
                counter.id.clone(),
                Operand::add(Operand::Result, Operand::literal(1)),
            ));

        assert!(run(flow, &store, &host).is_completed());
        assert_eq!(store.get(&counter.id), Some(Value::from(42)));
    }

    #[test]
    fn test_flow_over_limit_is_refused() {
        let (store, counter, host) = setup();
        let mut flow = Flow::new("long", "onClick");
        for _ in 0..17 {
            flow = flow
                .with_action(ActionKind::set_variable(counter.id.clone(), Operand::literal(1)));
        }

        match run(flow, &store, &host) {
            ExecutionOutcome::Aborted { executed, diagnostic } => {
                assert_eq!(executed, 0);
                assert_eq!(diagnostic.action_index, None);
            }
            other => panic!("expected abort, got {:?}", other),
        }
        assert_eq!(store.get(&counter.id), Some(Value::from(0)));
    }
}
