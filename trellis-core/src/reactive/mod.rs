//! Reactive Primitives
//!
//! This module implements the reactive core: property cells, bindings,
//! signals and the evaluation context that ties them together.
//!
//! # Concepts
//!
//! ## Property Cells
//!
//! A [`Property`] holds a value of a declared type. It may be written
//! directly or computed by a [`Binding`]. Reading a cell from inside
//! another cell's binding records a dependency, so the graph is discovered
//! as bindings run rather than declared up front.
//!
//! ## Signals
//!
//! A [`Signal`] is a list of connections. Every property cell owns a
//! change signal, and objects may declare further signals of their own.
//!
//! ## Evaluation Context
//!
//! The [`EvaluationContext`] knows which bindings are running. It is what
//! turns a plain read into a dependency edge and what detects a binding
//! that (directly or through other cells) depends on itself.
//!
//! # Implementation Notes
//!
//! Invalidation is push, recomputation is pull: writing a cell only marks
//! its downstream cells dirty, and a dirty cell recomputes when it is next
//! read. Cells somebody is listening to are read right away, which keeps
//! observers up to date without recomputing the unobserved parts of the
//! graph.

mod animation;
mod binding;
mod context;
pub(crate) mod property;
mod queue;
pub(crate) mod runtime;
mod signal;

pub use animation::Animation;
pub use binding::{Binding, BindingFn, BindingKind, Scope};
pub use context::{EvaluatingGuard, EvaluationContext, FrameGuard};
pub use property::{Assignment, Property, SetReason};
pub use queue::{drain_queued, pending_deliveries, ManualTicker, Ticker, TokioTicker};
pub use runtime::{Diagnostics, Runtime, RuntimeStats};
pub use signal::{Connection, ConnectionKind, Handler, HandlerFn, Signal};
