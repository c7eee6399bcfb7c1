//! Error Types
//!
//! Three families of failure exist in the runtime:
//!
//! - [`Error`]: structural errors returned to the immediate caller
//!   (stale handles, unknown properties, invalid coercions, ...).
//! - [`CoercionError`]: a value could not be converted to a property's
//!   declared type.
//! - [`ScriptError`]: raised by user-supplied code (bindings and signal
//!   handlers). These never propagate out of the graph; the runtime logs
//!   them and carries on.

use std::fmt;

use thiserror::Error;

use crate::value::ValueKind;

/// Structural errors surfaced to the caller of a runtime operation.
#[derive(Debug, Error)]
pub enum Error {
    /// The handle refers to an object, property or signal that has been destroyed.
    #[error("{kind} handle refers to a destroyed entity")]
    Stale {
        /// Which kind of handle went stale.
        kind: &'static str,
    },

    /// A property with the same name was already declared on the object.
    #[error("property `{name}` is already declared on {class_name}")]
    DuplicateProperty { class_name: String, name: String },

    /// A signal with the same name was already declared on the object.
    #[error("signal `{name}` is already declared on {class_name}")]
    DuplicateSignal { class_name: String, name: String },

    /// The object has no property with the requested name.
    #[error("{class_name} has no property `{name}`")]
    UnknownProperty { class_name: String, name: String },

    /// Reparenting would make an object its own ancestor.
    #[error("cannot reparent {class_name}: the new parent is one of its descendants")]
    ParentCycle { class_name: String },

    /// A value could not be coerced to the property's declared type.
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// An anchor was attached to an edge on the other axis.
    #[error("cannot anchor `{edge}` to `{target}`: the edges lie on different axes")]
    AnchorAxis {
        edge: &'static str,
        target: &'static str,
    },

    /// No object factory is installed but a composite value had to be built.
    #[error("no object factory installed to construct `{class_name}`")]
    NoFactory { class_name: String },

    /// A snapshot could not be encoded.
    #[error("snapshot encoding failed: {0}")]
    Encode(String),

    /// A runtime configuration document could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// A value could not be converted to the declared type of a property.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    /// The input's kind cannot be converted to the target type.
    #[error("cannot convert {found} to `{type_name}`")]
    Incompatible { type_name: String, found: ValueKind },

    /// The constructor received the wrong number of components.
    #[error("`{type_name}` expects {expected} component(s), got {found}")]
    Arity {
        type_name: String,
        expected: usize,
        found: usize,
    },

    /// A colour string could not be parsed.
    #[error("invalid color `{0}`")]
    InvalidColor(String),

    /// Constructing a composite object failed.
    #[error("failed to construct `{type_name}`: {reason}")]
    Construction { type_name: String, reason: String },
}

/// An error raised by a binding or a signal handler.
///
/// Script errors are data-flow errors: they are caught where they occur,
/// logged, and never abort the surrounding propagation pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    /// Create a script error with the given message.
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Error> for ScriptError {
    fn from(err: Error) -> Self {
        Self::new(err)
    }
}

impl From<CoercionError> for ScriptError {
    fn from(err: CoercionError) -> Self {
        Self::new(err)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
