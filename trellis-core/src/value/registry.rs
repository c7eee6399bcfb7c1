//! Type Registry
//!
//! The registry maps a declared type name to a [`TypeInfo`]: a constructor
//! plus the flags that select how [`coerce`](super::coerce) uses it.
//!
//! # Thread Safety
//!
//! The registry is process-wide and shared by every runtime thread, so it
//! lives in a `DashMap` behind a `OnceLock`. Built-in types are installed
//! the first time the registry is touched.

use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::{Color, Value, ValueKind};
use crate::error::CoercionError;

/// Builds a value of a registered type from zero or one input values.
///
/// Called with no arguments to produce the type's default.
pub type Constructor = Arc<dyn Fn(&[Value]) -> Result<Value, CoercionError> + Send + Sync>;

/// Registration record for a value type.
#[derive(Clone)]
pub struct TypeInfo {
    name: String,
    produces: ValueKind,
    constructor: Constructor,
    plain_type: bool,
    non_nullable: bool,
    require_constructor: bool,
}

impl TypeInfo {
    /// Register a type producing values of `produces` through `constructor`.
    pub fn new<F>(name: impl Into<String>, produces: ValueKind, constructor: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CoercionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            produces,
            constructor: Arc::new(constructor),
            plain_type: false,
            non_nullable: false,
            require_constructor: false,
        }
    }

    /// Coerce through the constructor only; the result is a scalar.
    pub fn plain(mut self) -> Self {
        self.plain_type = true;
        self
    }

    /// Substitute the type's default when assigned `None`.
    pub fn non_nullable(mut self) -> Self {
        self.non_nullable = true;
        self
    }

    /// Run the constructor even when the input already has the right kind.
    pub fn require_constructor(mut self) -> Self {
        self.require_constructor = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn produces(&self) -> ValueKind {
        self.produces
    }

    pub fn is_plain(&self) -> bool {
        self.plain_type
    }

    pub fn is_non_nullable(&self) -> bool {
        self.non_nullable
    }

    pub fn requires_constructor(&self) -> bool {
        self.require_constructor
    }

    /// Invoke the constructor.
    pub fn construct(&self, args: &[Value]) -> Result<Value, CoercionError> {
        (self.constructor)(args)
    }

    /// The value a freshly declared property of this type starts with.
    pub fn default_value(&self) -> Result<Value, CoercionError> {
        if self.non_nullable {
            self.construct(&[])
        } else {
            Ok(Value::None)
        }
    }

    /// Build the standard "cannot convert" error for this type.
    pub fn reject(&self, found: &Value) -> CoercionError {
        CoercionError::Incompatible {
            type_name: self.name.clone(),
            found: found.kind(),
        }
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("produces", &self.produces)
            .field("plain_type", &self.plain_type)
            .field("non_nullable", &self.non_nullable)
            .field("require_constructor", &self.require_constructor)
            .finish()
    }
}

/// The process-wide type-coercion table.
pub struct TypeRegistry;

static TYPES: OnceLock<DashMap<String, Arc<TypeInfo>>> = OnceLock::new();

fn get_types() -> &'static DashMap<String, Arc<TypeInfo>> {
    TYPES.get_or_init(|| {
        let types = DashMap::new();
        for info in builtins() {
            types.insert(info.name.clone(), Arc::new(info));
        }
        types
    })
}

impl TypeRegistry {
    /// Register (or replace) a type under its name.
    pub fn register(info: TypeInfo) {
        get_types().insert(info.name.clone(), Arc::new(info));
    }

    /// Register an additional name for an existing type.
    pub fn alias(alias: impl Into<String>, target: &str) -> bool {
        let Some(info) = Self::lookup(target) else {
            return false;
        };
        get_types().insert(alias.into(), info);
        true
    }

    /// Look up a type by name.
    pub fn lookup(name: &str) -> Option<Arc<TypeInfo>> {
        get_types().get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(name: &str) -> bool {
        get_types().contains_key(name)
    }
}

fn expect_at_most_one<'a>(
    type_name: &str,
    args: &'a [Value],
) -> Result<Option<&'a Value>, CoercionError> {
    match args {
        [] => Ok(None),
        [value] => Ok(Some(value)),
        _ => Err(CoercionError::Arity {
            type_name: type_name.to_owned(),
            expected: 1,
            found: args.len(),
        }),
    }
}

fn number_type(name: &'static str, truncate: bool) -> TypeInfo {
    TypeInfo::new(name, ValueKind::Number, move |args| {
        let n = expect_at_most_one(name, args)?.map_or(0.0, Value::to_number);
        Ok(Value::Number(if truncate { n.trunc() } else { n }))
    })
    .plain()
    .non_nullable()
}

fn builtins() -> Vec<TypeInfo> {
    let color = TypeInfo::new("color", ValueKind::Color, |args| {
        match expect_at_most_one("color", args)? {
            None => Ok(Value::Color(Color::TRANSPARENT)),
            Some(Value::Color(c)) => Ok(Value::Color(*c)),
            Some(Value::String(s)) => Ok(Value::Color(Color::parse(s)?)),
            Some(other) => Err(CoercionError::Incompatible {
                type_name: "color".to_owned(),
                found: other.kind(),
            }),
        }
    })
    .non_nullable();

    let vector2d = TypeInfo::new("vector2d", ValueKind::List, |args| {
        match expect_at_most_one("vector2d", args)? {
            None => Ok(Value::List(vec![Value::Number(0.0), Value::Number(0.0)])),
            Some(Value::List(items)) if items.len() == 2 => Ok(Value::List(
                items.iter().map(|v| Value::Number(v.to_number())).collect(),
            )),
            Some(Value::List(items)) => Err(CoercionError::Arity {
                type_name: "vector2d".to_owned(),
                expected: 2,
                found: items.len(),
            }),
            Some(other) => Err(CoercionError::Incompatible {
                type_name: "vector2d".to_owned(),
                found: other.kind(),
            }),
        }
    })
    .require_constructor()
    .non_nullable();

    vec![
        number_type("real", false),
        number_type("double", false),
        number_type("number", false),
        number_type("int", true),
        TypeInfo::new("bool", ValueKind::Bool, |args| {
            Ok(Value::Bool(
                expect_at_most_one("bool", args)?.is_some_and(Value::to_bool),
            ))
        })
        .plain()
        .non_nullable(),
        TypeInfo::new("string", ValueKind::String, |args| {
            Ok(Value::String(
                expect_at_most_one("string", args)?
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            ))
        })
        .plain()
        .non_nullable(),
        TypeInfo::new("enum", ValueKind::Enum, |args| {
            let n = expect_at_most_one("enum", args)?.map_or(0.0, Value::to_number);
            Ok(Value::Enum(n as i32))
        })
        .plain()
        .non_nullable(),
        TypeInfo::new("list", ValueKind::List, |args| {
            Ok(Value::List(match expect_at_most_one("list", args)? {
                None => Vec::new(),
                Some(Value::List(items)) => items.clone(),
                Some(single) => vec![single.clone()],
            }))
        })
        .non_nullable(),
        color,
        vector2d,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        for name in ["real", "int", "bool", "string", "enum", "color", "list", "vector2d"] {
            assert!(TypeRegistry::contains(name), "missing builtin {name}");
        }
        assert!(!TypeRegistry::contains("var"));
    }

    #[test]
    fn defaults_come_from_the_constructor() {
        let real = TypeRegistry::lookup("real").unwrap();
        assert_eq!(real.default_value().unwrap(), Value::Number(0.0));

        let string = TypeRegistry::lookup("string").unwrap();
        assert_eq!(string.default_value().unwrap(), Value::from(""));
    }

    #[test]
    fn registered_types_can_be_replaced_and_aliased() {
        TypeRegistry::register(
            TypeInfo::new("percent", ValueKind::Number, |args| {
                Ok(Value::Number(
                    args.first().map_or(0.0, Value::to_number).clamp(0.0, 100.0),
                ))
            })
            .plain(),
        );
        assert!(TypeRegistry::alias("pct", "percent"));
        let info = TypeRegistry::lookup("pct").unwrap();
        assert_eq!(info.name(), "percent");
        assert_eq!(
            info.construct(&[Value::Number(140.0)]).unwrap(),
            Value::Number(100.0)
        );
        assert!(!TypeRegistry::alias("nope", "does-not-exist"));
    }

    #[test]
    fn vector2d_checks_component_count() {
        let info = TypeRegistry::lookup("vector2d").unwrap();
        let err = info
            .construct(&[Value::List(vec![Value::from(1); 3])])
            .unwrap_err();
        assert_eq!(
            err,
            CoercionError::Arity {
                type_name: "vector2d".to_owned(),
                expected: 2,
                found: 3
            }
        );
    }
}
