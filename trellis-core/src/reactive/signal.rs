//! Signal Implementation
//!
//! A Signal is a named notification point with an ordered list of
//! connections. Emitting a signal calls every connected handler with the
//! emitted arguments.
//!
//! # How Signals Work
//!
//! 1. `connect` appends a connection. When the connection names a receiver
//!    object other than the signal's owner, the connection is also recorded
//!    on the receiver's teardown list so destroying the receiver severs it.
//!
//! 2. `emit` snapshots the connection list, opens a fresh evaluation frame
//!    and delivers to each connection that is still connected when its turn
//!    comes. Connections added during an emission are not delivered to by
//!    that emission; connections removed during it are skipped.
//!
//! 3. A failing handler is logged and counted; the remaining handlers
//!    still run.
//!
//! # Delivery Modes
//!
//! - [`ConnectionKind::Direct`]: the handler runs synchronously in `emit`.
//! - [`ConnectionKind::Queued`]: the call is appended to the thread's
//!   delivery queue and runs on the next tick.
//! - [`ConnectionKind::Unique`]: direct, but connecting the same handler
//!   and receiver twice returns the existing connection.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::context::EvaluationContext;
use super::queue;
use super::runtime::{self, ObjectKey, SignalKey, State};
use crate::error::ScriptError;
use crate::object::{Object, TeardownEntry};
use crate::value::Value;

/// Signature of a signal handler.
pub type HandlerFn = dyn Fn(&[Value]) -> Result<(), ScriptError>;

/// A shareable signal handler.
///
/// Two handlers are the same handler when they share the same allocation,
/// which is what [`ConnectionKind::Unique`] and
/// [`Signal::disconnect_handler`] compare.
#[derive(Clone)]
pub struct Handler(Rc<HandlerFn>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<(), ScriptError> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Whether both handles refer to the same handler.
    pub fn same(&self, other: &Handler) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn call(&self, args: &[Value]) -> Result<(), ScriptError> {
        (self.0)(args)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.0))
    }
}

/// How a connection delivers emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionKind {
    #[default]
    Direct,
    Queued,
    Unique,
}

pub(crate) struct ConnectionSlot {
    pub(crate) id: u64,
    pub(crate) receiver: Option<ObjectKey>,
    pub(crate) handler: Handler,
    pub(crate) kind: ConnectionKind,
}

pub(crate) struct SignalSlot {
    pub(crate) owner: Option<ObjectKey>,
    pub(crate) name: String,
    /// Ordered by id. Ids only grow, so appending keeps the order.
    pub(crate) connections: Vec<ConnectionSlot>,
}

impl SignalSlot {
    fn position(&self, id: u64) -> Option<usize> {
        self.connections.binary_search_by_key(&id, |c| c.id).ok()
    }
}

/// Handle to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal {
    key: SignalKey,
}

/// Handle to one connection on a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    signal: SignalKey,
    id: u64,
}

impl Connection {
    /// Remove the connection. Returns `false` if it was already gone.
    pub fn disconnect(&self) -> bool {
        let removed = runtime::with_mut(|state| remove_connection(state, *self));
        removed.is_some()
    }

    pub fn is_connected(&self) -> bool {
        runtime::with(|state| {
            state
                .signals
                .get(self.signal)
                .is_some_and(|signal| signal.position(self.id).is_some())
        })
    }

    /// The signal this connection belongs to.
    pub fn signal(&self) -> Signal {
        Signal { key: self.signal }
    }

    pub(crate) fn signal_key(&self) -> SignalKey {
        self.signal
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

/// Detach a connection from its signal and from its receiver's teardown
/// list. The removed slot is returned so the caller can drop its handler
/// after releasing the runtime borrow.
pub(crate) fn remove_connection(state: &mut State, connection: Connection) -> Option<ConnectionSlot> {
    let signal = state.signals.get_mut(connection.signal)?;
    let position = signal.position(connection.id)?;
    let slot = signal.connections.remove(position);
    let owner = signal.owner;

    if let Some(receiver) = slot.receiver.filter(|r| Some(*r) != owner) {
        if let Some(object) = state.objects.get_mut(receiver) {
            object
                .teardown
                .retain(|entry| !entry.is_connection(connection));
        }
    }
    Some(slot)
}

impl Signal {
    /// Create a free-standing signal with no owner object.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        runtime::with_mut(|state| Self::insert(state, None, name))
    }

    pub(crate) fn insert(state: &mut State, owner: Option<ObjectKey>, name: String) -> Self {
        let key = state.signals.insert(SignalSlot {
            owner,
            name,
            connections: Vec::new(),
        });
        Self { key }
    }

    pub(crate) fn from_key(key: SignalKey) -> Self {
        Self { key }
    }

    pub(crate) fn key(&self) -> SignalKey {
        self.key
    }

    pub fn is_alive(&self) -> bool {
        runtime::with(|state| state.signals.contains_key(self.key))
    }

    pub fn name(&self) -> Option<String> {
        runtime::with(|state| state.signals.get(self.key).map(|s| s.name.clone()))
    }

    /// The object that declared this signal, if any.
    pub fn owner(&self) -> Option<Object> {
        runtime::with(|state| state.signals.get(self.key).and_then(|s| s.owner))
            .map(Object::from_key)
    }

    pub fn connection_count(&self) -> usize {
        runtime::with(|state| state.signals.get(self.key).map_or(0, |s| s.connections.len()))
    }

    /// Connect a direct handler with no receiver.
    pub fn connect<F>(&self, f: F) -> Connection
    where
        F: Fn(&[Value]) -> Result<(), ScriptError> + 'static,
    {
        self.connect_with(None, Handler::new(f), ConnectionKind::Direct)
    }

    /// Connect `handler` on behalf of `receiver`.
    ///
    /// Connecting to a destroyed signal or on behalf of a destroyed receiver
    /// yields a connection that is already disconnected.
    pub fn connect_with(
        &self,
        receiver: Option<Object>,
        handler: Handler,
        kind: ConnectionKind,
    ) -> Connection {
        let receiver = receiver.map(|object| object.key());
        runtime::with_mut(|state| {
            let id = state.next_connection_id();
            let connection = Connection {
                signal: self.key,
                id,
            };
            if receiver.is_some_and(|r| !state.objects.contains_key(r)) {
                return connection;
            }
            let Some(signal) = state.signals.get_mut(self.key) else {
                return connection;
            };

            if kind == ConnectionKind::Unique {
                let existing = signal
                    .connections
                    .iter()
                    .find(|c| c.receiver == receiver && c.handler.same(&handler));
                if let Some(existing) = existing {
                    return Connection {
                        signal: self.key,
                        id: existing.id,
                    };
                }
            }

            signal.connections.push(ConnectionSlot {
                id,
                receiver,
                handler,
                kind,
            });
            let owner = signal.owner;
            if let Some(receiver) = receiver.filter(|r| Some(*r) != owner) {
                if let Some(object) = state.objects.get_mut(receiver) {
                    object.teardown.push(TeardownEntry::Connection(connection));
                }
            }
            connection
        })
    }

    /// Remove every connection. Returns how many were removed.
    pub fn disconnect_all(&self) -> usize {
        self.disconnect_where(|_| true)
    }

    /// Remove every connection made on behalf of `receiver`.
    pub fn disconnect_receiver(&self, receiver: Object) -> usize {
        let key = receiver.key();
        self.disconnect_where(|c| c.receiver == Some(key))
    }

    /// Remove every connection that calls `handler`.
    pub fn disconnect_handler(&self, handler: &Handler) -> usize {
        self.disconnect_where(|c| c.handler.same(handler))
    }

    fn disconnect_where(&self, matches: impl Fn(&ConnectionSlot) -> bool) -> usize {
        let removed: Vec<ConnectionSlot> = runtime::with_mut(|state| {
            let targets: Vec<Connection> = state
                .signals
                .get(self.key)
                .map(|signal| {
                    signal
                        .connections
                        .iter()
                        .filter(|c| matches(c))
                        .map(|c| Connection {
                            signal: self.key,
                            id: c.id,
                        })
                        .collect()
                })
                .unwrap_or_default();
            targets
                .into_iter()
                .filter_map(|connection| remove_connection(state, connection))
                .collect()
        });
        removed.len()
    }

    /// Disconnect everything and free the signal.
    pub(crate) fn dispose(&self) {
        self.disconnect_all();
        let slot = runtime::with_mut(|state| state.signals.remove(self.key));
        drop(slot);
    }

    /// Deliver `args` to every connection.
    pub fn emit(&self, args: &[Value]) {
        let targets: SmallVec<[(u64, Handler, ConnectionKind); 4]> = runtime::with(|state| {
            state
                .signals
                .get(self.key)
                .map(|signal| {
                    signal
                        .connections
                        .iter()
                        .map(|c| (c.id, c.handler.clone(), c.kind))
                        .collect()
                })
                .unwrap_or_default()
        });
        if targets.is_empty() {
            return;
        }

        let _frame = EvaluationContext::push_frame();
        for (id, handler, kind) in targets {
            let connection = Connection {
                signal: self.key,
                id,
            };
            // An earlier handler may have disconnected this one.
            if !connection.is_connected() {
                continue;
            }
            match kind {
                ConnectionKind::Queued => queue::enqueue(connection, handler, args.to_vec()),
                ConnectionKind::Direct | ConnectionKind::Unique => {
                    invoke(connection, &handler, args)
                }
            }
        }
    }

    /// `Owner.name`, for log lines.
    pub(crate) fn describe(&self) -> String {
        let (owner, name) = runtime::with(|state| {
            state.signals.get(self.key).map_or((None, None), |signal| {
                let owner = signal
                    .owner
                    .and_then(|o| state.objects.get(o))
                    .map(|o| o.class_name.clone());
                (owner, Some(signal.name.clone()))
            })
        });
        match (owner, name) {
            (Some(owner), Some(name)) => format!("{owner}.{name}"),
            (None, Some(name)) => name,
            _ => "<destroyed signal>".to_owned(),
        }
    }
}

/// Run one handler, absorbing its failure.
pub(crate) fn invoke(connection: Connection, handler: &Handler, args: &[Value]) {
    if let Err(err) = runtime::guarded(|| handler.call(args)) {
        runtime::record(|d| d.handler_errors += 1);
        tracing::error!(
            signal = %connection.signal().describe(),
            error = %err,
            "signal handler failed"
        );
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;
    use std::cell::RefCell;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&'static str) -> Handler) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let log = Rc::clone(&log);
            move |tag: &'static str| {
                let log = Rc::clone(&log);
                Handler::new(move |args: &[Value]| {
                    let first = args.first().map(ToString::to_string).unwrap_or_default();
                    log.borrow_mut().push(format!("{tag}:{first}"));
                    Ok(())
                })
            }
        };
        (log, make)
    }

    #[test]
    fn delivers_in_connection_order() {
        let signal = Signal::new("clicked");
        let (log, handler) = recorder();
        signal.connect_with(None, handler("a"), ConnectionKind::Direct);
        signal.connect_with(None, handler("b"), ConnectionKind::Direct);

        signal.emit(&[Value::from(1)]);

        assert_eq!(*log.borrow(), vec!["a:1", "b:1"]);
    }

    #[test]
    fn disconnect_stops_delivery() {
        let signal = Signal::new("clicked");
        let (log, handler) = recorder();
        let connection = signal.connect_with(None, handler("a"), ConnectionKind::Direct);

        assert!(connection.disconnect());
        assert!(!connection.disconnect());
        signal.emit(&[]);

        assert!(log.borrow().is_empty());
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn unique_connections_are_not_duplicated() {
        let signal = Signal::new("changed");
        let (log, handler) = recorder();
        let shared = handler("u");

        let first = signal.connect_with(None, shared.clone(), ConnectionKind::Unique);
        let second = signal.connect_with(None, shared.clone(), ConnectionKind::Unique);
        assert_eq!(first, second);

        signal.emit(&[Value::from(3)]);
        assert_eq!(*log.borrow(), vec!["u:3"]);
    }

    #[test]
    fn handler_disconnected_mid_emit_is_skipped() {
        let signal = Signal::new("changed");
        let (log, handler) = recorder();
        let victim = Rc::new(RefCell::new(None::<Connection>));

        let killer = {
            let victim = Rc::clone(&victim);
            Handler::new(move |_: &[Value]| {
                if let Some(connection) = victim.borrow().as_ref() {
                    connection.disconnect();
                }
                Ok(())
            })
        };
        signal.connect_with(None, killer, ConnectionKind::Direct);
        *victim.borrow_mut() = Some(signal.connect_with(None, handler("v"), ConnectionKind::Direct));

        signal.emit(&[]);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn handlers_disconnecting_later_ones_mid_emit_across_a_wide_fan_out() {
        let signal = Signal::new("changed");
        let (log, handler) = recorder();
        let doomed = Rc::new(RefCell::new(Vec::<Connection>::new()));

        let sweeper = {
            let doomed = Rc::clone(&doomed);
            Handler::new(move |_: &[Value]| {
                for connection in doomed.borrow_mut().drain(..) {
                    connection.disconnect();
                }
                Ok(())
            })
        };
        signal.connect_with(None, sweeper, ConnectionKind::Direct);
        for i in 0..200 {
            let tag = if i % 2 == 0 { "kept" } else { "gone" };
            let connection = signal.connect_with(None, handler(tag), ConnectionKind::Direct);
            if i % 2 == 1 {
                doomed.borrow_mut().push(connection);
            }
        }

        signal.emit(&[Value::from(1)]);

        assert_eq!(log.borrow().len(), 100);
        assert!(log.borrow().iter().all(|entry| entry == "kept:1"));
        assert_eq!(signal.connection_count(), 101);
    }

    #[test]
    fn handler_connected_mid_emit_waits_for_the_next_emit() {
        let signal = Signal::new("changed");
        let (log, handler) = recorder();
        let late = handler("late");

        signal.connect(move |_| {
            signal.connect_with(None, late.clone(), ConnectionKind::Unique);
            Ok(())
        });

        signal.emit(&[Value::from(1)]);
        assert!(log.borrow().is_empty());
        signal.emit(&[Value::from(2)]);
        assert_eq!(*log.borrow(), vec!["late:2"]);
    }

    #[test]
    fn failing_handler_does_not_stop_the_rest() {
        let signal = Signal::new("changed");
        let (log, handler) = recorder();
        signal.connect(|_| Err(ScriptError::new("nope")));
        signal.connect(|_| panic!("handler panicked"));
        signal.connect_with(None, handler("ok"), ConnectionKind::Direct);

        signal.emit(&[Value::from(1)]);

        assert_eq!(*log.borrow(), vec!["ok:1"]);
        assert_eq!(Runtime::diagnostics().handler_errors, 2);
        assert!(EvaluationContext::is_balanced());
    }

    #[test]
    fn disconnect_by_handler_and_receiver() {
        let signal = Signal::new("changed");
        let receiver = Object::new("Receiver", None);
        let (_, handler) = recorder();
        let shared = handler("x");

        signal.connect_with(None, shared.clone(), ConnectionKind::Direct);
        signal.connect_with(Some(receiver), handler("y"), ConnectionKind::Direct);
        signal.connect_with(Some(receiver), handler("z"), ConnectionKind::Direct);
        assert_eq!(receiver.teardown_len(), 2);

        assert_eq!(signal.disconnect_handler(&shared), 1);
        assert_eq!(signal.disconnect_receiver(receiver), 2);
        assert_eq!(receiver.teardown_len(), 0);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn connecting_a_destroyed_receiver_is_inert() {
        let signal = Signal::new("changed");
        let receiver = Object::new("Receiver", None);
        receiver.destroy();

        let connection = signal.connect_with(Some(receiver), Handler::new(|_| Ok(())), ConnectionKind::Direct);
        assert!(!connection.is_connected());
        assert_eq!(signal.connection_count(), 0);
    }
}
