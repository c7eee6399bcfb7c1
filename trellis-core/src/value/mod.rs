//! Dynamic Values
//!
//! Properties hold a [`Value`], a tagged union with one variant per value
//! kind the runtime understands plus an object-handle variant. Declared
//! property types are plain names ("real", "color", "Rectangle", ...);
//! [`TypeRegistry`] maps a name to the constructor and flags that drive
//! [`coerce`].
//!
//! Conversions between value kinds follow the loose rules of a dynamic
//! language (strings parse to numbers, anything converts to a boolean by
//! truthiness). Those rules live on [`Value`] itself so constructors in the
//! registry stay one-liners.

mod coerce;
mod color;
mod registry;

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::object::Object;

pub use coerce::coerce;
pub use color::Color;
pub use registry::{Constructor, TypeInfo, TypeRegistry};

/// A dynamically typed property value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value.
    #[default]
    None,
    Number(f64),
    String(String),
    Bool(bool),
    /// An enumeration value.
    Enum(i32),
    Color(Color),
    /// A reference to a composite object.
    Object(Object),
    List(Vec<Value>),
    /// A description of a composite object, used to construct or update one.
    Element(ElementDescription),
}

/// The kind of a [`Value`], used for type checks and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    None,
    Number,
    String,
    Bool,
    Enum,
    Color,
    Object,
    List,
    Element,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::None => "none",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Bool => "bool",
            ValueKind::Enum => "enum",
            ValueKind::Color => "color",
            ValueKind::Object => "object",
            ValueKind::List => "list",
            ValueKind::Element => "element description",
        };
        f.write_str(name)
    }
}

/// Describes a composite object: its class and the properties to assign.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementDescription {
    /// Class to construct. `None` means "the property's declared type".
    pub class_name: Option<String>,
    /// Property assignments, applied in order.
    pub properties: IndexMap<String, Value>,
}

impl ElementDescription {
    /// An empty description of the given class.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: Some(class_name.into()),
            properties: IndexMap::new(),
        }
    }

    /// An untyped description; the declared type decides the class.
    pub fn untyped() -> Self {
        Self::default()
    }

    /// Add a property assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::None,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Bool(_) => ValueKind::Bool,
            Value::Enum(_) => ValueKind::Enum,
            Value::Color(_) => ValueKind::Color,
            Value::Object(_) => ValueKind::Object,
            Value::List(_) => ValueKind::List,
            Value::Element(_) => ValueKind::Element,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Equality used for change detection.
    ///
    /// Unlike `==`, NaN compares equal to NaN so a binding that keeps
    /// producing NaN does not fire its change signal on every evaluation.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            _ => self == other,
        }
    }

    /// Numeric conversion. Strings are parsed; unparsable input yields NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::None => 0.0,
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Enum(e) => f64::from(*e),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Color(_) | Value::Object(_) | Value::List(_) | Value::Element(_) => f64::NAN,
        }
    }

    /// Truthiness.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::None => false,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Enum(e) => *e != 0,
            Value::Color(_) | Value::Object(_) | Value::List(_) | Value::Element(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Object> {
        match self {
            Value::Object(o) => Some(*o),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("null"),
            Value::Number(n) => fmt_number(*n, f),
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Enum(e) => write!(f, "{e}"),
            Value::Color(c) => write!(f, "{c}"),
            Value::Object(o) => write!(f, "{o}"),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Element(desc) => {
                write!(f, "{}{{..}}", desc.class_name.as_deref().unwrap_or("element"))
            }
        }
    }
}

/// Integral numbers print without a fractional part.
fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_unit(),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Enum(e) => serializer.serialize_i32(*e),
            Value::Color(c) => serializer.serialize_str(&c.to_string()),
            Value::Object(o) => serializer.serialize_str(&o.to_string()),
            Value::List(items) => serializer.collect_seq(items),
            Value::Element(desc) => {
                let mut map = serializer.serialize_map(Some(desc.properties.len() + 1))?;
                map.serialize_entry("class", &desc.class_name)?;
                for (name, value) in &desc.properties {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<ElementDescription> for Value {
    fn from(desc: ElementDescription) -> Self {
        Value::Element(desc)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::None, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_to_number() {
        assert_eq!(Value::from(" 42 ").to_number(), 42.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("abc").to_number().is_nan());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::None.to_bool());
        assert!(!Value::Number(0.0).to_bool());
        assert!(!Value::Number(f64::NAN).to_bool());
        assert!(Value::from("x").to_bool());
        assert!(Value::List(Vec::new()).to_bool());
    }

    #[test]
    fn nan_is_the_same_as_nan() {
        let nan = Value::Number(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(nan.same_as(&Value::Number(f64::NAN)));
        assert!(!Value::Number(1.0).same_as(&Value::Number(2.0)));
    }

    #[test]
    fn integral_numbers_display_without_fraction() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(
            Value::List(vec![Value::from(1), Value::from("a")]).to_string(),
            "1,a"
        );
    }

    #[test]
    fn serializes_as_plain_json() {
        let value = Value::List(vec![Value::from(1.5), Value::Bool(true), Value::None]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[1.5,true,null]");
    }
}
