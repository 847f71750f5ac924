//! Binding Resolver - Effective value of a block property.
//!
//! A property's value comes from its binding when it has one, and from the
//! raw `properties` map otherwise:
//!
//! ```text
//! variable(id)      → live value in the VariableStore   (Empty if unknown)
//! local-state(key)  → renderer-supplied local context   (Empty if absent)
//! external(path)    → the path itself, for the renderer to interpret
//! static / none     → block.properties[prop]            (Empty if absent)
//! ```
//!
//! Resolution never fails. A reference that cannot be followed degrades to
//! `Empty` and is reported back as a [`Dangling`] diagnostic.
//!
//! Reads go through `Signal::get`, so a resolve inside an effect tracks the
//! variables it touched.

use std::collections::{BTreeMap, HashMap};

use crate::types::{Binding, Block, Value, VariableId};

use super::variables::VariableStore;

// =============================================================================
// Local State
// =============================================================================

/// Rendering-scoped state (list item, form field) supplied by the renderer.
pub trait LocalState {
    fn get(&self, key: &str) -> Option<Value>;
}

impl LocalState for BTreeMap<String, Value> {
    fn get(&self, key: &str) -> Option<Value> {
        BTreeMap::get(self, key).cloned()
    }
}

impl LocalState for HashMap<String, Value> {
    fn get(&self, key: &str) -> Option<Value> {
        HashMap::get(self, key).cloned()
    }
}

/// No local state in scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocalState;

impl LocalState for NoLocalState {
    fn get(&self, _key: &str) -> Option<Value> {
        None
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// A binding that pointed at nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dangling {
    Variable(VariableId),
    LocalState(String),
}

/// Outcome of resolving one property.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: Value,
    pub dangling: Option<Dangling>,
}

impl Resolved {
    fn value(value: Value) -> Self {
        Self {
            value,
            dangling: None,
        }
    }

    fn dangling(reference: Dangling) -> Self {
        tracing::trace!(?reference, "binding resolved to empty");
        Self {
            value: Value::Empty,
            dangling: Some(reference),
        }
    }
}

/// Resolves bindings against one variable store.
#[derive(Debug, Clone, Copy)]
pub struct BindingResolver<'a> {
    variables: &'a VariableStore,
}

impl<'a> BindingResolver<'a> {
    pub fn new(variables: &'a VariableStore) -> Self {
        Self { variables }
    }

    /// Resolve a binding (or its absence) against a raw property value.
    pub fn resolve(
        &self,
        binding: Option<&Binding>,
        raw: Option<&Value>,
        local: &dyn LocalState,
    ) -> Resolved {
        match binding {
            Some(Binding::Variable(id)) => match self.variables.get(id) {
                Some(value) => Resolved::value(value),
                None => Resolved::dangling(Dangling::Variable(id.clone())),
            },
            Some(Binding::LocalState(key)) => match local.get(key) {
                Some(value) => Resolved::value(value),
                None => Resolved::dangling(Dangling::LocalState(key.clone())),
            },
            Some(Binding::External(path)) => Resolved::value(Value::String(path.clone())),
            Some(Binding::Static) | None => Resolved::value(raw.cloned().unwrap_or_default()),
        }
    }

    /// Resolve one property of a block.
    pub fn resolve_property(
        &self,
        block: &Block,
        property: &str,
        local: &dyn LocalState,
    ) -> Resolved {
        self.resolve(
            block.bindings.get(property),
            block.properties.get(property),
            local,
        )
    }

    /// Resolve every property that has a raw value or a binding.
    pub fn resolve_all(&self, block: &Block, local: &dyn LocalState) -> BTreeMap<String, Value> {
        block
            .properties
            .keys()
            .chain(block.bindings.keys())
            .map(|prop| (prop.clone(), self.resolve_property(block, prop, local).value))
            .collect()
    }
}
