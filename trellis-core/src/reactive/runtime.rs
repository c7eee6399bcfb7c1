//! Reactive Runtime
//!
//! The runtime owns every object, property cell and signal on the current
//! thread. Handles ([`Object`], [`Property`], [`Signal`]) are generational
//! keys into these arenas: destroying an entity frees its slot, and any
//! handle still pointing at it becomes stale instead of aliasing whatever
//! reuses the slot.
//!
//! # How It Works
//!
//! 1. Objects declare properties and signals; each lives in its own arena.
//!
//! 2. Property cells record dependency edges on both ends, so a value
//!    change walks the `dependents` list and a destruction walks the
//!    `dependencies` list, neither needing a scan.
//!
//! 3. Every arena access is a short borrow of a thread-local `RefCell`.
//!    User code (bindings, handlers, factories, tickers) is never called
//!    while the runtime is borrowed, which is what makes re-entrant reads
//!    and writes from inside bindings and handlers legal.
//!
//! # Thread Safety
//!
//! The graph is single-threaded. Each thread gets an independent runtime;
//! only the [`TypeRegistry`](crate::value::TypeRegistry) is shared.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde::Serialize;
use slotmap::{new_key_type, SlotMap};

use super::context::EvaluationContext;
use super::property::{Property, PropertySlot};
use super::queue::{self, ManualTicker, Ticker};
use super::signal::SignalSlot;
use crate::config::RuntimeConfig;
use crate::error::ScriptError;
use crate::object::{Object, ObjectFactory, ObjectSlot, TeardownEntry};

new_key_type! {
    pub(crate) struct ObjectKey;
    pub(crate) struct PropertyKey;
    pub(crate) struct SignalKey;
}

/// Counters for the recoverable failures the graph absorbs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Binding evaluations that failed and kept their previous value.
    pub binding_errors: u64,
    /// Binding loops detected on the evaluation stack.
    pub binding_loops: u64,
    /// Signal handlers that returned an error or panicked.
    pub handler_errors: u64,
    /// Queued deliveries executed by [`drain_queued`](super::drain_queued).
    pub queued_deliveries: u64,
}

/// Arena sizes, mostly useful in tests and leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub objects: usize,
    pub properties: usize,
    pub signals: usize,
    pub connections: usize,
    pub pending_bindings: usize,
}

pub(crate) struct State {
    pub(crate) objects: SlotMap<ObjectKey, ObjectSlot>,
    pub(crate) properties: SlotMap<PropertyKey, PropertySlot>,
    pub(crate) signals: SlotMap<SignalKey, SignalSlot>,
    pub(crate) init_depth: usize,
    pub(crate) pending_bindings: Vec<PropertyKey>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) config: RuntimeConfig,
    pub(crate) factory: Option<Rc<dyn ObjectFactory>>,
    pub(crate) ticker: Rc<dyn Ticker>,
    next_connection: u64,
}

impl State {
    fn new() -> Self {
        Self {
            objects: SlotMap::with_key(),
            properties: SlotMap::with_key(),
            signals: SlotMap::with_key(),
            init_depth: 0,
            pending_bindings: Vec::new(),
            diagnostics: Diagnostics::default(),
            config: RuntimeConfig::default(),
            factory: None,
            ticker: Rc::new(ManualTicker),
            next_connection: 0,
        }
    }

    pub(crate) fn next_connection_id(&mut self) -> u64 {
        self.next_connection += 1;
        self.next_connection
    }
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State::new());
}

/// Borrow the runtime immutably. `f` must not call back into the public API.
pub(crate) fn with<R>(f: impl FnOnce(&State) -> R) -> R {
    STATE.with(|state| f(&state.borrow()))
}

/// Borrow the runtime mutably. `f` must not call back into the public API.
pub(crate) fn with_mut<R>(f: impl FnOnce(&mut State) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

pub(crate) fn in_init() -> bool {
    with(|state| state.init_depth > 0)
}

pub(crate) fn config() -> RuntimeConfig {
    with(|state| state.config.clone())
}

pub(crate) fn record(f: impl FnOnce(&mut Diagnostics)) {
    with_mut(|state| f(&mut state.diagnostics));
}

pub(crate) fn ticker() -> Rc<dyn Ticker> {
    with(|state| Rc::clone(&state.ticker))
}

pub(crate) fn factory() -> Option<Rc<dyn ObjectFactory>> {
    with(|state| state.factory.clone())
}

/// Run user code, turning a panic into a [`ScriptError`] when the runtime
/// is configured to catch panics.
pub(crate) fn guarded<T>(f: impl FnOnce() -> Result<T, ScriptError>) -> Result<T, ScriptError> {
    if !config().catch_panics {
        return f();
    }
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ScriptError::new(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_owned()
    }
}

/// Facade over the thread-local runtime.
pub struct Runtime;

impl Runtime {
    /// Enter the bulk-initialisation phase.
    ///
    /// While initialising, binding assignments are queued instead of
    /// evaluated and reads never trigger recomputation, so objects that are
    /// still being constructed are not read out of order. Calls nest.
    pub fn begin_init() {
        let depth = with_mut(|state| {
            state.init_depth += 1;
            state.init_depth
        });
        tracing::debug!(depth, "bulk initialisation started");
    }

    /// Leave the bulk-initialisation phase.
    ///
    /// When the outermost phase ends, every queued binding is evaluated in
    /// the order it was assigned. Returns the number of bindings evaluated.
    pub fn complete_init() -> usize {
        let pending = with_mut(|state| {
            if state.init_depth == 0 {
                return None;
            }
            state.init_depth -= 1;
            if state.init_depth > 0 {
                return None;
            }
            Some(std::mem::take(&mut state.pending_bindings))
        });
        let Some(pending) = pending else {
            return 0;
        };

        tracing::debug!(count = pending.len(), "evaluating deferred bindings");
        let mut evaluated = 0;
        for key in pending {
            let property = Property::from_key(key);
            if property.has_binding() {
                property.update();
                evaluated += 1;
            }
        }
        evaluated
    }

    pub fn is_initializing() -> bool {
        in_init()
    }

    /// Replace the configuration for this thread's runtime.
    pub fn configure(config: RuntimeConfig) {
        with_mut(|state| state.config = config);
    }

    pub fn config() -> RuntimeConfig {
        config()
    }

    /// Install the factory used to build composite property values.
    pub fn set_object_factory(factory: Rc<dyn ObjectFactory>) {
        with_mut(|state| state.factory = Some(factory));
    }

    /// Install the host's "run on next tick" primitive.
    pub fn set_ticker(ticker: Rc<dyn Ticker>) {
        with_mut(|state| state.ticker = ticker);
    }

    pub fn diagnostics() -> Diagnostics {
        with(|state| state.diagnostics)
    }

    pub fn stats() -> RuntimeStats {
        with(|state| RuntimeStats {
            objects: state.objects.len(),
            properties: state.properties.len(),
            signals: state.signals.len(),
            connections: state
                .signals
                .values()
                .map(|signal| signal.connections.len())
                .sum(),
            pending_bindings: state.pending_bindings.len(),
        })
    }

    /// Number of live connections, on any signal, whose receiver is `object`.
    pub fn connections_to(object: Object) -> usize {
        let key = object.key();
        with(|state| {
            state
                .signals
                .values()
                .flat_map(|signal| &signal.connections)
                .filter(|connection| connection.receiver == Some(key))
                .count()
        })
    }

    /// Number of bookkeeping entries pointing at destroyed entities.
    ///
    /// Counts dependency edges to dead property cells, connections whose
    /// receiver is gone and teardown entries naming dead connections or
    /// children. Zero after any sequence of operations.
    pub fn dangling_references() -> usize {
        with(|state| {
            let edges: usize = state
                .properties
                .values()
                .map(|cell| {
                    cell.dependents
                        .iter()
                        .chain(&cell.dependencies)
                        .filter(|key| !state.properties.contains_key(**key))
                        .count()
                })
                .sum();
            let receivers = state
                .signals
                .values()
                .flat_map(|signal| &signal.connections)
                .filter(|c| c.receiver.is_some_and(|r| !state.objects.contains_key(r)))
                .count();
            let teardown = state
                .objects
                .values()
                .flat_map(|object| &object.teardown)
                .filter(|entry| match entry {
                    TeardownEntry::Child(child) => !state.objects.contains_key(*child),
                    TeardownEntry::Connection(connection) => !state
                        .signals
                        .get(connection.signal_key())
                        .is_some_and(|signal| {
                            signal.connections.iter().any(|c| c.id == connection.id())
                        }),
                    TeardownEntry::Cleanup(_) => false,
                })
                .count();
            edges + receivers + teardown
        })
    }

    /// Drop every object, cell, signal and queued delivery on this thread
    /// and restore the default configuration.
    pub fn reset() {
        let previous = with_mut(|state| std::mem::replace(state, State::new()));
        queue::clear();
        EvaluationContext::reset();
        drop(previous);
        tracing::debug!("runtime reset");
    }
}
