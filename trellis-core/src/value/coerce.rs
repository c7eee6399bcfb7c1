//! Value-type coercion.
//!
//! A pure function from (declared type, input) to value. Composite object
//! types are resolved by the property cell, which needs the object factory;
//! this module only deals with types present in the
//! [`TypeRegistry`](super::TypeRegistry).

use super::{TypeInfo, Value};
use crate::error::CoercionError;

/// Coerce `input` to the registered type `info`.
///
/// - `None` becomes the type's default when the type is non-nullable.
/// - Plain and require-constructor types always go through the constructor.
/// - Otherwise input that already has the produced kind passes through and
///   anything else is handed to the constructor.
pub fn coerce(info: &TypeInfo, input: Value) -> Result<Value, CoercionError> {
    if input.is_none() {
        return info.default_value();
    }
    if info.is_plain() || info.requires_constructor() {
        return info.construct(&[input]);
    }
    if input.kind() == info.produces() {
        return Ok(input);
    }
    info.construct(&[input])
}
