//! Object Snapshots
//!
//! A snapshot is a serialisable copy of an object subtree: class names,
//! settled property values, binding sources and children. Capturing reads
//! every property through [`Property::get`](crate::reactive::Property::get),
//! so dirty cells are recomputed first.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::object::Object;
use crate::value::Value;

/// A captured object subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSnapshot {
    pub class_name: String,
    pub properties: IndexMap<String, Value>,
    /// Source text of the bindings installed on the captured properties.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub bindings: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ObjectSnapshot>,
}

impl ObjectSnapshot {
    /// Capture `object` and its descendants.
    pub fn capture(object: Object) -> Result<Self> {
        let class_name = object
            .class_name()
            .ok_or(Error::Stale { kind: "object" })?;
        let mut properties = IndexMap::new();
        let mut bindings = IndexMap::new();
        for (name, property) in object.properties() {
            if let Some(binding) = property.binding() {
                bindings.insert(name.clone(), binding.source().to_owned());
            }
            properties.insert(name, property.get());
        }
        let children = object
            .children()
            .into_iter()
            .map(ObjectSnapshot::capture)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            class_name,
            properties,
            bindings,
            children,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| Error::Encode(err.to_string()))
    }

    /// Encode as MessagePack with named fields.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|err| Error::Encode(err.to_string()))
    }
}
