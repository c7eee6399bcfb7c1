//! Evaluation Context
//!
//! The evaluation context tracks which property bindings are being
//! evaluated right now. It serves two purposes:
//!
//! 1. Dependency discovery: when a property is read, the innermost
//!    evaluating property becomes one of its dependents.
//!
//! 2. Re-entrancy: a property that is already being evaluated cannot be
//!    re-entered, and invalidation leaves the properties that are pulling
//!    a value right now alone.
//!
//! # Implementation
//!
//! The context is a stack of frames, each frame a stack of properties.
//! Signal delivery opens a new frame, so code running inside a handler
//! starts from a clean slate: properties read by a handler do not become
//! dependencies of whatever binding happened to trigger the signal, and
//! loop detection only looks at the frame that is currently active.
//!
//! There is always at least one frame. Both kinds of entry are popped by
//! RAII guards so the stack stays balanced even when user code panics.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::property::Property;
use super::runtime::PropertyKey;

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = RefCell::new(vec![Frame::default()]);
}

/// One frame of the context: the properties whose bindings are running.
#[derive(Debug, Default)]
struct Frame {
    evaluating: SmallVec<[PropertyKey; 8]>,
}

/// Access to the thread's evaluation context.
pub struct EvaluationContext;

impl EvaluationContext {
    /// Open a fresh frame. The frame is closed when the guard drops.
    pub fn push_frame() -> FrameGuard {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(Frame::default());
            frames.len()
        });
        FrameGuard { depth }
    }

    /// Mark `property` as being evaluated in the current frame.
    ///
    /// Returns `None` if it already is, which means its binding has
    /// re-entered itself.
    pub fn push_evaluating(property: Property) -> Option<EvaluatingGuard> {
        let key = property.key();
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            let frame = frames.last_mut()?;
            if frame.evaluating.contains(&key) {
                return None;
            }
            frame.evaluating.push(key);
            Some(EvaluatingGuard { key })
        })
    }

    /// The innermost property being evaluated in the current frame.
    pub fn current() -> Option<Property> {
        FRAMES.with(|frames| {
            frames
                .borrow()
                .last()
                .and_then(|frame| frame.evaluating.last().copied())
                .map(Property::from_key)
        })
    }

    /// Whether `property` is on the current frame's evaluation stack.
    pub fn is_evaluating(property: Property) -> bool {
        Self::is_evaluating_key(property.key())
    }

    pub(crate) fn is_evaluating_key(key: PropertyKey) -> bool {
        FRAMES.with(|frames| {
            frames
                .borrow()
                .last()
                .is_some_and(|frame| frame.evaluating.contains(&key))
        })
    }

    /// Number of frames opened on top of the base frame.
    pub fn frame_depth() -> usize {
        FRAMES.with(|frames| frames.borrow().len().saturating_sub(1))
    }

    /// Number of properties being evaluated in the current frame.
    pub fn evaluating_depth() -> usize {
        FRAMES.with(|frames| frames.borrow().last().map_or(0, |f| f.evaluating.len()))
    }

    /// True when only the base frame is open and nothing is evaluating.
    pub fn is_balanced() -> bool {
        FRAMES.with(|frames| {
            let frames = frames.borrow();
            frames.len() == 1 && frames[0].evaluating.is_empty()
        })
    }

    pub(crate) fn reset() {
        FRAMES.with(|frames| *frames.borrow_mut() = vec![Frame::default()]);
    }
}

/// Closes a frame opened by [`EvaluationContext::push_frame`].
#[must_use = "the frame closes as soon as the guard is dropped"]
pub struct FrameGuard {
    depth: usize,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            if !std::thread::panicking() {
                debug_assert_eq!(
                    frames.len(),
                    self.depth,
                    "EvaluationContext frame mismatch"
                );
            }
            // The base frame is never popped.
            if frames.len() > 1 {
                frames.pop();
            }
        });
    }
}

/// Pops a property pushed by [`EvaluationContext::push_evaluating`].
#[must_use = "the property leaves the evaluation stack as soon as the guard is dropped"]
pub struct EvaluatingGuard {
    key: PropertyKey,
}

impl Drop for EvaluatingGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let popped = frames
                .borrow_mut()
                .last_mut()
                .and_then(|frame| frame.evaluating.pop());
            if !std::thread::panicking() {
                debug_assert_eq!(
                    popped,
                    Some(self.key),
                    "EvaluationContext mismatch: expected {:?}, got {:?}",
                    self.key,
                    popped
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;

    fn cells() -> (Property, Property) {
        let object = Object::new("Root", None);
        (
            object.declare_property("a", "real", 0.0).unwrap(),
            object.declare_property("b", "real", 0.0).unwrap(),
        )
    }

    #[test]
    fn tracks_the_innermost_property() {
        let (a, b) = cells();
        assert!(EvaluationContext::current().is_none());

        {
            let _a = EvaluationContext::push_evaluating(a).unwrap();
            assert_eq!(EvaluationContext::current(), Some(a));
            {
                let _b = EvaluationContext::push_evaluating(b).unwrap();
                assert_eq!(EvaluationContext::current(), Some(b));
                assert_eq!(EvaluationContext::evaluating_depth(), 2);
            }
            assert_eq!(EvaluationContext::current(), Some(a));
        }

        assert!(EvaluationContext::is_balanced());
    }

    #[test]
    fn reentry_is_refused() {
        let (a, _) = cells();
        let _guard = EvaluationContext::push_evaluating(a).unwrap();
        assert!(EvaluationContext::push_evaluating(a).is_none());
        assert!(EvaluationContext::is_evaluating(a));
    }

    #[test]
    fn frames_isolate_the_evaluation_stack() {
        let (a, _) = cells();
        let _outer = EvaluationContext::push_evaluating(a).unwrap();
        {
            let _frame = EvaluationContext::push_frame();
            assert_eq!(EvaluationContext::frame_depth(), 1);
            assert!(EvaluationContext::current().is_none());
            assert!(!EvaluationContext::is_evaluating(a));

            // A new frame may evaluate the same property again.
            let _inner = EvaluationContext::push_evaluating(a).unwrap();
            assert_eq!(EvaluationContext::current(), Some(a));
        }
        assert_eq!(EvaluationContext::frame_depth(), 0);
        assert_eq!(EvaluationContext::current(), Some(a));
    }
}
