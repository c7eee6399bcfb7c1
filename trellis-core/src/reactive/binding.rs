//! Bindings
//!
//! A binding is a function from a [`Scope`] to a value, installed on a
//! property cell. Whatever properties the function reads while it runs
//! become the cell's dependencies; there is no static dependency list.

use std::fmt;
use std::rc::Rc;

use super::property::Property;
use super::runtime;
use crate::error::ScriptError;
use crate::object::Object;
use crate::value::Value;

/// Signature of a binding function.
pub type BindingFn = dyn Fn(&Scope) -> Result<Value, ScriptError>;

/// Whether the binding source was a single expression or a statement block.
///
/// Both kinds evaluate the same way; a block that does not produce a value
/// yields [`Value::None`], which is then coerced like any other result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingKind {
    #[default]
    Expression,
    Block,
}

/// The names a binding resolves against: its owning object first, then
/// the enclosing component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    pub object: Object,
    pub component: Option<Object>,
}

impl Scope {
    pub fn new(object: Object) -> Self {
        Self {
            object,
            component: None,
        }
    }

    pub fn with_component(object: Object, component: Object) -> Self {
        Self {
            object,
            component: Some(component),
        }
    }

    /// Resolve a property name.
    pub fn lookup(&self, name: &str) -> Option<Property> {
        self.object
            .property(name)
            .or_else(|| self.component.and_then(|c| c.property(name)))
    }

    /// Read a property by name, recording the dependency.
    pub fn read(&self, name: &str) -> Result<Value, ScriptError> {
        self.lookup(name)
            .map(|property| property.get())
            .ok_or_else(|| ScriptError::new(format!("ReferenceError: {name} is not defined")))
    }
}

/// A binding: the function, its kind, its source text and an optional
/// explicit scope.
#[derive(Clone)]
pub struct Binding {
    function: Rc<BindingFn>,
    kind: BindingKind,
    source: Rc<str>,
    scope: Option<Scope>,
}

impl Binding {
    /// A native binding with no source text.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Scope) -> Result<Value, ScriptError> + 'static,
    {
        Self::expression("<native>", f)
    }

    pub fn expression<F>(source: &str, f: F) -> Self
    where
        F: Fn(&Scope) -> Result<Value, ScriptError> + 'static,
    {
        Self {
            function: Rc::new(f),
            kind: BindingKind::Expression,
            source: Rc::from(source),
            scope: None,
        }
    }

    pub fn block<F>(source: &str, f: F) -> Self
    where
        F: Fn(&Scope) -> Result<Value, ScriptError> + 'static,
    {
        Self {
            kind: BindingKind::Block,
            ..Self::expression(source, f)
        }
    }

    /// Evaluate against `scope` instead of the owning object.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope
    }

    pub(crate) fn evaluate(&self, scope: &Scope) -> Result<Value, ScriptError> {
        runtime::guarded(|| (self.function)(scope))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
