//! Integration Tests for the Binding Runtime
//!
//! These tests verify that property cells, bindings, signals and objects
//! work together correctly through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::reactive::{drain_queued, pending_deliveries, TokioTicker};
use trellis_core::{
    Binding, ConnectionKind, EvaluationContext, Handler, Object, Runtime, RuntimeConfig,
    ScriptError, SetReason, Signal, Value,
};

fn sum_binding() -> Binding {
    Binding::expression("left + width", |scope| {
        let left = scope.read("left")?.to_number();
        let width = scope.read("width")?.to_number();
        Ok((left + width).into())
    })
}

/// `right` follows `left + width` and only recomputes when read.
#[test]
fn bound_property_recomputes_lazily() {
    let item = Object::new("Item", None);
    let width = item.declare_property("width", "real", 100.0).unwrap();
    let right = item.declare_property("right", "real", 0.0).unwrap();
    item.declare_property("left", "real", 10.0).unwrap();
    right.bind(sum_binding()).unwrap();

    assert_eq!(right.get(), Value::from(110.0));

    width.set(50.0, SetReason::User).unwrap();
    assert!(right.is_dirty());
    assert_eq!(right.peek(), Value::from(110.0));

    assert_eq!(right.get(), Value::from(60.0));
    assert!(!right.is_dirty());
    assert!(EvaluationContext::is_balanced());
}

/// Chained bindings pick up a change two hops upstream.
#[test]
fn dependencies_are_transitive() {
    let item = Object::new("Item", None);
    let base = item.declare_property("base", "real", 1.0).unwrap();
    let double = item.declare_property("double", "real", 0.0).unwrap();
    let quad = item.declare_property("quad", "real", 0.0).unwrap();
    double
        .bind(Binding::new(move |_| Ok((base.get().to_number() * 2.0).into())))
        .unwrap();
    quad.bind(Binding::new(move |_| Ok((double.get().to_number() * 2.0).into())))
        .unwrap();

    base.set(3.0, SetReason::User).unwrap();

    assert!(double.is_dirty());
    assert!(quad.is_dirty());
    assert_eq!(quad.get(), Value::from(12.0));
    assert!(!double.is_dirty());
}

/// A two-cell loop settles, logs one diagnostic and leaves both cells
/// holding numbers that later reads do not move.
#[test]
fn binding_loop_terminates_with_one_diagnostic() {
    let item = Object::new("Item", None);
    let a = item.declare_property("a", "real", 0.0).unwrap();
    let b = item.declare_property("b", "real", 0.0).unwrap();
    a.bind(Binding::expression("b + 1", move |_| {
        Ok((b.get().to_number() + 1.0).into())
    }))
    .unwrap();
    b.bind(Binding::expression("a + 1", move |_| {
        Ok((a.get().to_number() + 1.0).into())
    }))
    .unwrap();

    assert_eq!(Runtime::diagnostics().binding_loops, 1);
    assert!(!a.is_dirty());
    assert!(!b.is_dirty());

    for _ in 0..5 {
        assert_eq!(a.get(), Value::from(1.0));
        assert_eq!(b.get(), Value::from(2.0));
    }
    assert_eq!(Runtime::diagnostics().binding_loops, 1);
    assert!(EvaluationContext::is_balanced());
}

/// Writing an input of a loop runs the loop once more, reports it once,
/// and the cells settle again.
#[test]
fn binding_loop_settles_again_after_an_input_changes() {
    let item = Object::new("Item", None);
    let c = item.declare_property("c", "real", 0.0).unwrap();
    let a = item.declare_property("a", "real", 0.0).unwrap();
    let b = item.declare_property("b", "real", 0.0).unwrap();
    a.bind(Binding::expression("b + c", move |_| {
        Ok((b.get().to_number() + c.get().to_number()).into())
    }))
    .unwrap();
    b.bind(Binding::expression("a + 1", move |_| {
        Ok((a.get().to_number() + 1.0).into())
    }))
    .unwrap();
    assert_eq!(Runtime::diagnostics().binding_loops, 1);

    c.set(10.0, SetReason::User).unwrap();
    assert!(a.is_dirty());

    let settled = (a.get(), b.get());
    assert_eq!(settled, (Value::from(11.0), Value::from(1.0)));
    assert_eq!(Runtime::diagnostics().binding_loops, 2);

    for _ in 0..3 {
        assert_eq!((a.get(), b.get()), settled);
    }
    assert_eq!(Runtime::diagnostics().binding_loops, 2);
    assert!(EvaluationContext::is_balanced());
}

/// A self-reading binding sees its own previous value instead of recursing.
#[test]
fn self_reference_reads_the_settled_value() {
    let item = Object::new("Item", None);
    let counter = item.declare_property("counter", "real", 5.0).unwrap();
    counter
        .bind(Binding::new(move |_| Ok((counter.get().to_number() + 1.0).into())))
        .unwrap();

    assert_eq!(counter.get(), Value::from(6.0));
    assert!(EvaluationContext::is_balanced());
}

/// Connecting the same handler twice as unique dispatches once per emit.
#[test]
fn unique_connection_is_idempotent() {
    let receiver = Object::new("Receiver", None);
    let signal = Signal::new("clicked");
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let handler = Handler::new(move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    });

    let first = signal.connect_with(Some(receiver), handler.clone(), ConnectionKind::Unique);
    let second = signal.connect_with(Some(receiver), handler, ConnectionKind::Unique);
    assert_eq!(first, second);

    signal.emit(&[]);
    assert_eq!(calls.get(), 1);
    assert_eq!(signal.connection_count(), 1);
}

/// The first handler fails; the second still runs and `emit` returns.
#[test]
fn failing_handler_does_not_block_later_handlers() {
    let signal = Signal::new("changed");
    let reached = Rc::new(Cell::new(false));
    let flag = Rc::clone(&reached);

    signal.connect(|_| Err(ScriptError::new("TypeError: undefined is not a function")));
    signal.connect(move |_| {
        flag.set(true);
        Ok(())
    });
    signal.emit(&[Value::from(1.0)]);

    assert!(reached.get());
    assert_eq!(Runtime::diagnostics().handler_errors, 1);
    assert!(EvaluationContext::is_balanced());
}

/// Panicking handlers are contained like failing ones.
#[test]
fn panicking_handler_is_contained() {
    let signal = Signal::new("changed");
    let reached = Rc::new(Cell::new(false));
    let flag = Rc::clone(&reached);

    signal.connect(|_| panic!("handler exploded"));
    signal.connect(move |_| {
        flag.set(true);
        Ok(())
    });
    signal.emit(&[]);

    assert!(reached.get());
    assert_eq!(Runtime::diagnostics().handler_errors, 1);
    assert!(EvaluationContext::is_balanced());
}

/// Animation frames override a binding without removing it; ending the
/// animation hands the cell back to the binding.
#[test]
fn animation_override_is_reversible() {
    let item = Object::new("Item", None);
    let target = item.declare_property("target", "real", 40.0).unwrap();
    let opacity = item.declare_property("opacity", "real", 0.0).unwrap();
    opacity
        .bind(Binding::new(move |_| Ok((target.get().to_number() / 100.0).into())))
        .unwrap();
    assert_eq!(opacity.get(), Value::from(0.4));

    opacity.set(0.75, SetReason::Animation).unwrap();
    assert!(opacity.has_binding());
    assert_eq!(opacity.get(), Value::from(0.75));

    opacity.end_animation();
    assert_eq!(opacity.get(), Value::from(0.4));
}

/// A user write replaces the binding for good.
#[test]
fn user_write_detaches_the_binding() {
    let item = Object::new("Item", None);
    let source = item.declare_property("source", "real", 1.0).unwrap();
    let copy = item.declare_property("copy", "real", 0.0).unwrap();
    copy.bind(Binding::new(move |_| Ok(source.get()))).unwrap();

    copy.set(9.0, SetReason::User).unwrap();
    source.set(2.0, SetReason::User).unwrap();

    assert!(!copy.has_binding());
    assert!(source.dependents().is_empty());
    assert_eq!(copy.get(), Value::from(9.0));
}

/// Observed bindings recompute as soon as an input changes.
#[test]
fn listeners_see_binding_changes_immediately() {
    let item = Object::new("Item", None);
    let width = item.declare_property("width", "real", 10.0).unwrap();
    let area = item.declare_property("area", "real", 0.0).unwrap();
    area.bind(Binding::new(move |_| {
        let w = width.get().to_number();
        Ok((w * w).into())
    }))
    .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    area.on_changed(move |args| {
        sink.borrow_mut().push(args.to_vec());
        Ok(())
    });

    width.set(3.0, SetReason::User).unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![vec![Value::from(9.0), Value::from(100.0), Value::from("area")]]
    );
    assert!(!area.is_dirty());
}

/// With eager refresh turned off, observed bindings wait for a read too.
#[test]
fn eager_refresh_can_be_disabled() {
    Runtime::configure(
        RuntimeConfig::from_json(r#"{ "eager_observed_bindings": false }"#).unwrap(),
    );
    let item = Object::new("Item", None);
    let width = item.declare_property("width", "real", 10.0).unwrap();
    let copy = item.declare_property("copy", "real", 0.0).unwrap();
    copy.bind(Binding::new(move |_| Ok(width.get()))).unwrap();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    copy.on_changed(move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    });

    width.set(20.0, SetReason::User).unwrap();
    assert!(copy.is_dirty());
    assert_eq!(calls.get(), 0);

    assert_eq!(copy.get(), Value::from(20.0));
    assert_eq!(calls.get(), 1);
}

/// Bindings assigned during initialisation run once init completes, after
/// every sibling exists.
#[test]
fn init_phase_defers_bindings_until_complete() {
    Runtime::begin_init();
    let root = Object::new("Root", None);
    let total = root.declare_property("total", "real", 0.0).unwrap();
    total
        .bind(Binding::expression("child.size * 2", move |_| {
            let child = root
                .children()
                .first()
                .and_then(|c| c.property("size"))
                .ok_or_else(|| ScriptError::new("ReferenceError: child is not defined"))?;
            Ok((child.get().to_number() * 2.0).into())
        }))
        .unwrap();
    let child = Object::new("Child", Some(root));
    child.declare_property("size", "real", 21.0).unwrap();
    assert_eq!(total.peek(), Value::from(0.0));
    assert_eq!(Runtime::stats().pending_bindings, 1);

    assert_eq!(Runtime::complete_init(), 1);
    assert_eq!(total.get(), Value::from(42.0));
    assert_eq!(Runtime::diagnostics().binding_errors, 0);
}

/// A failing binding keeps its last good value and stays attached.
#[test]
fn broken_binding_fails_soft() {
    let item = Object::new("Item", None);
    let divisor = item.declare_property("divisor", "real", 2.0).unwrap();
    let ratio = item.declare_property("ratio", "real", 0.0).unwrap();
    ratio
        .bind(Binding::expression("10 / divisor", move |_| {
            let d = divisor.get().to_number();
            if d == 0.0 {
                return Err(ScriptError::new("RangeError: division by zero"));
            }
            Ok((10.0 / d).into())
        }))
        .unwrap();
    assert_eq!(ratio.get(), Value::from(5.0));

    divisor.set(0.0, SetReason::User).unwrap();
    assert_eq!(ratio.get(), Value::from(5.0));
    assert_eq!(Runtime::diagnostics().binding_errors, 1);

    divisor.set(4.0, SetReason::User).unwrap();
    assert_eq!(ratio.get(), Value::from(2.5));
}

/// Queued handlers run in FIFO order across signals, after the emitter
/// returns.
#[test]
fn queued_connections_preserve_global_order() {
    let first = Signal::new("first");
    let second = Signal::new("second");
    let order = Rc::new(RefCell::new(Vec::new()));
    for (signal, label) in [(first, "first"), (second, "second")] {
        let order = Rc::clone(&order);
        signal.connect_with(
            None,
            Handler::new(move |_| {
                order.borrow_mut().push(label);
                Ok(())
            }),
            ConnectionKind::Queued,
        );
    }

    second.emit(&[]);
    first.emit(&[]);
    second.emit(&[]);
    assert!(order.borrow().is_empty());
    assert_eq!(pending_deliveries(), 3);

    assert_eq!(drain_queued(), 3);
    assert_eq!(*order.borrow(), vec!["second", "first", "second"]);
}

/// The tokio ticker drains queued deliveries on the local task set.
#[tokio::test(flavor = "current_thread")]
async fn tokio_ticker_drains_on_the_local_set() {
    Runtime::set_ticker(Rc::new(TokioTicker));
    let local = tokio::task::LocalSet::new();
    let delivered = Rc::new(Cell::new(0));
    let counter = Rc::clone(&delivered);

    local
        .run_until(async move {
            let signal = Signal::new("tick");
            signal.connect_with(
                None,
                Handler::new(move |_| {
                    counter.set(counter.get() + 1);
                    Ok(())
                }),
                ConnectionKind::Queued,
            );
            signal.emit(&[]);
            signal.emit(&[]);
            assert_eq!(pending_deliveries(), 2);

            for _ in 0..10 {
                if pending_deliveries() == 0 {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await;

    assert_eq!(delivered.get(), 2);
    assert_eq!(Runtime::diagnostics().queued_deliveries, 2);
}
