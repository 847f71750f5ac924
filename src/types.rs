//! Core types for spark-canvas.
//!
//! These types define the foundation that everything builds on.
//! They flow through the tree store, the variable store and the flow runtime,
//! and they are what a snapshot serializes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh random id.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the raw id string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identity of a block in a component tree.
    BlockId
);
string_id!(
    /// Identity of a page (route).
    PageId
);
string_id!(
    /// Identity of a logic flow.
    FlowId
);
string_id!(
    /// Identity of a project variable.
    VariableId
);
string_id!(
    /// Identity of one action inside a flow.
    ActionId
);

// =============================================================================
// Cleanup Function
// =============================================================================

/// Cleanup function returned by registrations.
///
/// Call it to detach the listener or subscription it was returned for.
pub type Cleanup = Box<dyn FnOnce()>;

// =============================================================================
// Value
// =============================================================================

/// A dynamic value held by a property, a variable or an action operand.
///
/// `Empty` is what every dangling reference degrades to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Empty,
    Boolean(bool),
    Number(#[serde(serialize_with = "finite_number")] f64),
    String(String),
}

/// JSON has no spelling for NaN or infinity; refuse rather than write `null`.
fn finite_number<S: serde::Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if n.is_finite() {
        serializer.serialize_f64(*n)
    } else {
        Err(serde::ser::Error::custom(format!("cannot store non-finite number {}", n)))
    }
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.is_finite() && *n == n.floor() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

// =============================================================================
// Variables
// =============================================================================

/// Declared type of a project variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    String,
    Number,
    Boolean,
}

impl VariableType {
    /// The value a variable of this type holds when nothing else applies.
    pub fn zero(self) -> Value {
        match self {
            VariableType::String => Value::String(String::new()),
            VariableType::Number => Value::Number(0.0),
            VariableType::Boolean => Value::Boolean(false),
        }
    }

    /// Convert `value` into this type, or `None` when no lossless reading exists.
    ///
    /// `Empty` always coerces to [`zero`](Self::zero).
    pub fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Empty) => Some(self.zero()),
            (VariableType::String, v) => Some(Value::String(v.to_string())),
            (VariableType::Number, Value::Number(n)) => Some(Value::Number(*n)),
            (VariableType::Number, Value::String(s)) => {
                s.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(Value::Number)
            }
            (VariableType::Boolean, Value::Boolean(b)) => Some(Value::Boolean(*b)),
            (VariableType::Boolean, Value::String(s)) => match s.trim() {
                "true" => Some(Value::Boolean(true)),
                "false" => Some(Value::Boolean(false)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VariableType::String => "string",
            VariableType::Number => "number",
            VariableType::Boolean => "boolean",
        }
    }
}

/// A project variable definition. The live value lives in the variable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    pub default_value: Value,
    #[serde(default)]
    pub archived: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, var_type: VariableType, default_value: Value) -> Self {
        Self {
            id: VariableId::new(),
            name: name.into(),
            var_type,
            default_value,
            archived: false,
        }
    }

    /// The default value read through the declared type.
    pub fn initial_value(&self) -> Value {
        self.var_type
            .coerce(&self.default_value)
            .unwrap_or_else(|| self.var_type.zero())
    }
}

// =============================================================================
// Blocks
// =============================================================================

/// The kind of UI element a block renders as.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BlockType {
    #[default]
    Container,
    Text,
    Heading,
    Button,
    Input,
    Image,
    Form,
    Link,
    List,
    /// An instance of a reusable master component.
    Instance { master_id: String },
}

impl BlockType {
    /// Human-readable label, used as the default block name.
    pub fn label(&self) -> &'static str {
        match self {
            BlockType::Container => "Container",
            BlockType::Text => "Text",
            BlockType::Heading => "Heading",
            BlockType::Button => "Button",
            BlockType::Input => "Input",
            BlockType::Image => "Image",
            BlockType::Form => "Form",
            BlockType::Link => "Link",
            BlockType::List => "List",
            BlockType::Instance { .. } => "Instance",
        }
    }
}

/// Where a property's effective value comes from.
///
/// A property with no binding uses its raw `properties` value, and so does
/// a `Static` binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Binding {
    /// Live value of a project variable.
    Variable(VariableId),
    /// Opaque source path, interpreted by the renderer.
    External(String),
    /// Key into rendering-scoped local state.
    LocalState(String),
    /// Raw property value.
    Static,
}

/// A node in a component tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub parent_id: Option<BlockId>,
    pub order_index: usize,
    pub block_type: BlockType,
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub styles: BTreeMap<String, String>,
    #[serde(default)]
    pub bindings: BTreeMap<String, Binding>,
    #[serde(default)]
    pub events: BTreeMap<String, FlowId>,
    #[serde(default)]
    pub archived: bool,
}

bitflags::bitflags! {
    /// Field groups touched by an in-place block update.
    ///
    /// Renderers use these to decide what to redraw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlockFields: u8 {
        const NAME = 1 << 0;
        const PROPERTIES = 1 << 1;
        const STYLES = 1 << 2;
        const BINDINGS = 1 << 3;
        const EVENTS = 1 << 4;
    }
}

// =============================================================================
// Pages
// =============================================================================

/// A routed screen. Owns one component tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub archived: bool,
}

// =============================================================================
// Flows and Actions
// =============================================================================

/// An ordered list of actions triggered by one (block, event) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    pub name: String,
    /// The block this flow was authored for. Advisory only; dispatch goes
    /// through the block's `events` map.
    #[serde(default)]
    pub component_id: Option<BlockId>,
    pub event: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Flow {
    pub fn new(name: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            id: FlowId::new(),
            name: name.into(),
            component_id: None,
            event: event.into(),
            actions: Vec::new(),
        }
    }

    /// Builder-style append.
    pub fn with_action(mut self, kind: ActionKind) -> Self {
        self.actions.push(Action::new(kind));
        self
    }
}

/// One executable step of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            id: ActionId::new(),
            kind,
        }
    }
}

/// HTTP verb for an api-call action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// What an action does, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "kebab-case")]
pub enum ActionKind {
    Alert {
        message: String,
    },
    SetVariable {
        variable_id: VariableId,
        value: Operand,
    },
    Navigate {
        url: String,
    },
    ApiCall {
        #[serde(default)]
        method: HttpMethod,
        url: String,
        #[serde(default)]
        body: Option<Operand>,
        /// Variable that receives the response on success.
        #[serde(default)]
        result_variable: Option<VariableId>,
    },
}

impl ActionKind {
    /// The authored type tag (`"set-variable"`, `"alert"`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::Alert { .. } => "alert",
            ActionKind::SetVariable { .. } => "set-variable",
            ActionKind::Navigate { .. } => "navigate",
            ActionKind::ApiCall { .. } => "api-call",
        }
    }

    pub fn alert(message: impl Into<String>) -> Self {
        ActionKind::Alert {
            message: message.into(),
        }
    }

    pub fn set_variable(variable_id: VariableId, value: Operand) -> Self {
        ActionKind::SetVariable { variable_id, value }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        ActionKind::Navigate { url: url.into() }
    }
}

/// A value computed at action time.
///
/// Deliberately tiny: literals, reads and a few combinators. Not a scripting
/// language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operand {
    Literal(Value),
    /// Current value of a variable (empty when unknown).
    Variable(VariableId),
    /// Value from the firing event's context (empty when absent).
    Local(String),
    /// Numeric sum; string concatenation when either side is a string.
    Add(Box<Operand>, Box<Operand>),
    Concat(Vec<Operand>),
    Not(Box<Operand>),
    /// Response of the most recent api-call in the same execution.
    Result,
}

impl Operand {
    pub fn literal(value: impl Into<Value>) -> Self {
        Operand::Literal(value.into())
    }

    pub fn variable(id: &VariableId) -> Self {
        Operand::Variable(id.clone())
    }

    pub fn add(lhs: Operand, rhs: Operand) -> Self {
        Operand::Add(Box::new(lhs), Box::new(rhs))
    }

    pub fn not(inner: Operand) -> Self {
        Operand::Not(Box::new(inner))
    }
}
