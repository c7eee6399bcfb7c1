//! Trellis Core
//!
//! This crate provides the runtime for the Trellis declarative binding
//! engine. It implements:
//!
//! - Typed property cells with lazy, dependency-tracked bindings
//! - Signals with direct, queued and unique connections
//! - Objects that own their cells and tear down everything they hold
//! - An anchoring resolver that lays out items relative to each other
//!
//! The crate is designed to be used both as a native Rust library and as a
//! Python extension module via PyO3 (behind the `python` feature).
//!
//! # Architecture
//!
//! - `reactive`: property cells, bindings, signals and the evaluation context
//! - `object`: object tree, declarations and teardown
//! - `value`: dynamic values, the type registry and coercion
//! - `anchors`: item geometry and the per-axis anchor resolver
//! - `snapshot`: serialisable captures of object subtrees
//!
//! All runtime state is thread-local. Handles (`Object`, `Property`,
//! `Signal`) are small `Copy` keys; using one after its owner is destroyed
//! is a no-op or an [`Error::Stale`].
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{Binding, Object, SetReason};
//!
//! let item = Object::new("Item", None);
//! let left = item.declare_property("left", "real", 10.0).unwrap();
//! let width = item.declare_property("width", "real", 100.0).unwrap();
//! let right = item.declare_property("right", "real", 0.0).unwrap();
//!
//! right
//!     .bind(Binding::expression("left + width", move |_| {
//!         Ok((left.get().to_number() + width.get().to_number()).into())
//!     }))
//!     .unwrap();
//! assert_eq!(right.get().to_number(), 110.0);
//!
//! width.set(50.0, SetReason::User).unwrap();
//! assert!(right.is_dirty());
//! assert_eq!(right.get().to_number(), 60.0);
//! ```

pub mod anchors;
pub mod config;
pub mod error;
pub mod object;
pub mod reactive;
pub mod snapshot;
pub mod value;

#[cfg(feature = "python")]
mod python;

pub use anchors::{Axis, Edge, Item, ItemFactory, Rect};
pub use config::RuntimeConfig;
pub use error::{CoercionError, Error, Result, ScriptError};
pub use object::{Object, ObjectFactory};
pub use reactive::{
    Assignment, Binding, Connection, ConnectionKind, EvaluationContext, Handler, Property,
    Runtime, Scope, SetReason, Signal,
};
pub use snapshot::ObjectSnapshot;
pub use value::{Color, ElementDescription, TypeInfo, TypeRegistry, Value, ValueKind};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types and functions.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyObjectHandle>()?;
    m.add_class::<python::PyProperty>()?;
    m.add_function(wrap_pyfunction!(python::drain_queued, m)?)?;
    m.add_function(wrap_pyfunction!(python::diagnostics, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
