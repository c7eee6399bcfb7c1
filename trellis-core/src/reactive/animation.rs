//! Animation hook.
//!
//! The runtime does not interpolate anything itself. A property with an
//! attached [`Animation`] hands user writes to the animation, which then
//! drives the property with [`SetReason::Animation`](super::SetReason)
//! writes. Those writes keep any binding installed on the property, and
//! [`Property::end_animation`] hands control back to it.

use super::property::Property;
use crate::value::Value;

/// Something that can animate a property between two values.
pub trait Animation {
    /// Start (or restart) animating `target` from `from` towards `to`.
    ///
    /// Called in place of applying a user write, after the runtime has
    /// released all internal state, so the animation may write to `target`
    /// synchronously.
    fn restart(&self, target: Property, from: Value, to: Value);
}
