//! Queued Delivery
//!
//! Queued connections do not run inside `emit`. Each emission appends a
//! delivery to a thread-local FIFO and, when the queue goes from empty to
//! non-empty, asks the host's [`Ticker`] to schedule a drain.
//!
//! The host decides what "next tick" means. [`ManualTicker`] leaves the
//! draining to the caller ([`drain_queued`]); [`TokioTicker`] spawns the
//! drain on the current `tokio::task::LocalSet`.

use std::cell::RefCell;
use std::collections::VecDeque;

use super::context::EvaluationContext;
use super::runtime;
use super::signal::{self, Connection, Handler};
use crate::value::Value;

/// The host's "run on next tick" primitive.
pub trait Ticker {
    /// Arrange for [`drain_queued`] to be called soon, outside the current
    /// call stack.
    fn schedule(&self);
}

/// A ticker that schedules nothing; the host calls [`drain_queued`] itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualTicker;

impl Ticker for ManualTicker {
    fn schedule(&self) {
        tracing::trace!("queued deliveries pending");
    }
}

/// Drains the queue on the tokio `LocalSet` the emission happens on.
///
/// The runtime is thread-local, so the drain must run on the same thread:
/// emissions must happen inside `LocalSet::run_until` (or a task spawned on
/// the set), otherwise `spawn_local` panics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTicker;

impl Ticker for TokioTicker {
    fn schedule(&self) {
        tokio::task::spawn_local(async {
            drain_queued();
        });
    }
}

struct Delivery {
    connection: Connection,
    handler: Handler,
    args: Vec<Value>,
}

thread_local! {
    static QUEUE: RefCell<VecDeque<Delivery>> = RefCell::new(VecDeque::new());
}

pub(crate) fn enqueue(connection: Connection, handler: Handler, args: Vec<Value>) {
    let was_empty = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let was_empty = queue.is_empty();
        queue.push_back(Delivery {
            connection,
            handler,
            args,
        });
        was_empty
    });
    if was_empty {
        runtime::ticker().schedule();
    }
}

/// Run every queued delivery in FIFO order, including deliveries queued
/// while draining. Returns how many handlers ran.
///
/// A delivery whose connection was removed after it was queued is dropped.
pub fn drain_queued() -> usize {
    let mut delivered = 0;
    loop {
        let next = QUEUE.with(|queue| queue.borrow_mut().pop_front());
        let Some(delivery) = next else {
            break;
        };
        if !delivery.connection.is_connected() {
            continue;
        }
        let _frame = EvaluationContext::push_frame();
        signal::invoke(delivery.connection, &delivery.handler, &delivery.args);
        runtime::record(|d| d.queued_deliveries += 1);
        delivered += 1;
    }
    delivered
}

/// Number of deliveries waiting in the queue.
pub fn pending_deliveries() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}

pub(crate) fn clear() {
    let dropped = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
    drop(dropped);
}
