//! Objects
//!
//! An object is a named bag of property cells and signals with a parent, an
//! ordered list of children and a teardown list. Destroying an object
//! releases everything it owns or is connected to, so nothing in the graph
//! keeps referring to it afterwards.
//!
//! # Destruction Order
//!
//! 1. The teardown list runs in reverse: children are destroyed, incoming
//!    connections made on the object's behalf are severed and destruction
//!    callbacks run. Entries added while this happens run too.
//!
//! 2. Each property cell is removed from the graph. Cells depending on it
//!    are marked dirty, and observed ones recompute once everything else
//!    is gone.
//!
//! 3. Declared signals are disconnected and freed.
//!
//! 4. The object leaves its parent's children and teardown lists.
//!
//! Destroying an object twice, or from a callback that runs during its own
//! destruction, is a no-op.

mod teardown;

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use slotmap::Key;

use crate::error::{Error, Result};
use crate::reactive::property::{self, coerce_declared, Edges};
use crate::reactive::runtime::{self, ObjectKey, PropertyKey, SignalKey};
use crate::reactive::{Property, Signal};
use crate::value::Value;

pub(crate) use teardown::TeardownEntry;

/// Builds composite objects for properties whose declared type is a class.
pub trait ObjectFactory {
    /// Whether `class_name` is a class this factory can build.
    fn provides(&self, class_name: &str) -> bool;

    /// Construct an instance of `class_name` as a child of `parent`.
    fn create(&self, class_name: &str, parent: Object) -> Result<Object>;
}

pub(crate) struct ObjectSlot {
    pub(crate) class_name: String,
    pub(crate) parent: Option<ObjectKey>,
    pub(crate) children: Vec<ObjectKey>,
    pub(crate) teardown: Vec<TeardownEntry>,
    pub(crate) properties: IndexMap<String, PropertyKey>,
    pub(crate) signals: IndexMap<String, SignalKey>,
    /// Host data riding along with the object, dropped on destruction.
    pub(crate) attachment: Option<Rc<dyn Any>>,
    destroying: bool,
}

/// Handle to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Object {
    key: ObjectKey,
}

impl Object {
    /// Create an object, optionally as the last child of `parent`.
    pub fn new(class_name: impl Into<String>, parent: Option<Object>) -> Self {
        let class_name = class_name.into();
        let parent = parent.map(|p| p.key);
        let key = runtime::with_mut(|state| {
            let parent = parent.filter(|p| state.objects.contains_key(*p));
            let key = state.objects.insert(ObjectSlot {
                class_name,
                parent,
                children: Vec::new(),
                teardown: Vec::new(),
                properties: IndexMap::new(),
                signals: IndexMap::new(),
                attachment: None,
                destroying: false,
            });
            if let Some(parent) = parent.and_then(|p| state.objects.get_mut(p)) {
                parent.children.push(key);
                parent.teardown.push(TeardownEntry::Child(key));
            }
            key
        });
        Self { key }
    }

    pub(crate) fn from_key(key: ObjectKey) -> Self {
        Self { key }
    }

    pub(crate) fn key(&self) -> ObjectKey {
        self.key
    }

    pub fn is_alive(&self) -> bool {
        runtime::with(|state| state.objects.contains_key(self.key))
    }

    pub fn class_name(&self) -> Option<String> {
        runtime::with(|state| state.objects.get(self.key).map(|o| o.class_name.clone()))
    }

    pub fn parent(&self) -> Option<Object> {
        runtime::with(|state| state.objects.get(self.key).and_then(|o| o.parent))
            .map(Object::from_key)
    }

    pub fn children(&self) -> Vec<Object> {
        runtime::with(|state| {
            state.objects.get(self.key).map_or_else(Vec::new, |o| {
                o.children.iter().copied().map(Object::from_key).collect()
            })
        })
    }

    /// Move the object under `parent`, or detach it with `None`.
    pub fn set_parent(&self, parent: Option<Object>) -> Result<()> {
        let parent = parent.map(|p| p.key);
        runtime::with_mut(|state| {
            let Some(object) = state.objects.get(self.key) else {
                return Err(Error::Stale { kind: "object" });
            };
            let previous = object.parent;
            if previous == parent {
                return Ok(());
            }
            if let Some(target) = parent {
                if !state.objects.contains_key(target) {
                    return Err(Error::Stale { kind: "object" });
                }
                let mut ancestor = Some(target);
                while let Some(key) = ancestor {
                    if key == self.key {
                        return Err(Error::ParentCycle {
                            class_name: object.class_name.clone(),
                        });
                    }
                    ancestor = state.objects.get(key).and_then(|o| o.parent);
                }
            }

            if let Some(old) = previous.and_then(|p| state.objects.get_mut(p)) {
                old.children.retain(|c| *c != self.key);
                old.teardown.retain(|e| !e.is_child(self.key));
            }
            if let Some(new) = parent.and_then(|p| state.objects.get_mut(p)) {
                new.children.push(self.key);
                new.teardown.push(TeardownEntry::Child(self.key));
            }
            if let Some(object) = state.objects.get_mut(self.key) {
                object.parent = parent;
            }
            Ok(())
        })
    }

    /// Declare a property cell of type `type_name`.
    ///
    /// The initial value is coerced to the declared type; `Value::None`
    /// yields the type's default.
    pub fn declare_property(
        &self,
        name: &str,
        type_name: &str,
        initial: impl Into<Value>,
    ) -> Result<Property> {
        let Some((class_name, exists)) = runtime::with(|state| {
            state
                .objects
                .get(self.key)
                .map(|o| (o.class_name.clone(), o.properties.contains_key(name)))
        }) else {
            return Err(Error::Stale { kind: "object" });
        };
        if exists {
            return Err(Error::DuplicateProperty {
                class_name,
                name: name.to_owned(),
            });
        }
        let value = coerce_declared(type_name, initial.into(), &Value::None, *self)?;
        Ok(runtime::with_mut(|state| {
            Property::insert(state, self.key, name, type_name, value)
        }))
    }

    /// Declare a signal owned by this object.
    pub fn declare_signal(&self, name: &str) -> Result<Signal> {
        runtime::with_mut(|state| {
            let Some(object) = state.objects.get(self.key) else {
                return Err(Error::Stale { kind: "object" });
            };
            if object.signals.contains_key(name) {
                return Err(Error::DuplicateSignal {
                    class_name: object.class_name.clone(),
                    name: name.to_owned(),
                });
            }
            let signal = Signal::insert(state, Some(self.key), name.to_owned());
            if let Some(object) = state.objects.get_mut(self.key) {
                object.signals.insert(name.to_owned(), signal.key());
            }
            Ok(signal)
        })
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        runtime::with(|state| {
            state
                .objects
                .get(self.key)
                .and_then(|o| o.properties.get(name).copied())
        })
        .map(Property::from_key)
    }

    /// Like [`Object::property`], but a missing property is an error.
    pub fn require_property(&self, name: &str) -> Result<Property> {
        self.property(name).ok_or_else(|| Error::UnknownProperty {
            class_name: self.class_name().unwrap_or_default(),
            name: name.to_owned(),
        })
    }

    /// Declared properties in declaration order.
    pub fn properties(&self) -> Vec<(String, Property)> {
        runtime::with(|state| {
            state.objects.get(self.key).map_or_else(Vec::new, |o| {
                o.properties
                    .iter()
                    .map(|(name, key)| (name.clone(), Property::from_key(*key)))
                    .collect()
            })
        })
    }

    pub fn signal(&self, name: &str) -> Option<Signal> {
        runtime::with(|state| {
            state
                .objects
                .get(self.key)
                .and_then(|o| o.signals.get(name).copied())
        })
        .map(Signal::from_key)
    }

    /// Run `callback` when the object is destroyed.
    pub fn on_destroy(&self, callback: impl FnOnce() + 'static) {
        runtime::with_mut(|state| {
            if let Some(object) = state.objects.get_mut(self.key) {
                object.teardown.push(TeardownEntry::Cleanup(Box::new(callback)));
            }
        });
    }

    /// Attach host data to the object, replacing any previous attachment.
    pub fn attach(&self, data: Rc<dyn Any>) {
        let previous = runtime::with_mut(|state| {
            state
                .objects
                .get_mut(self.key)
                .and_then(|o| o.attachment.replace(data))
        });
        drop(previous);
    }

    pub fn attachment(&self) -> Option<Rc<dyn Any>> {
        runtime::with(|state| state.objects.get(self.key).and_then(|o| o.attachment.clone()))
    }

    /// Number of pending teardown entries.
    pub fn teardown_len(&self) -> usize {
        runtime::with(|state| state.objects.get(self.key).map_or(0, |o| o.teardown.len()))
    }

    /// Destroy the object and everything it owns.
    pub fn destroy(&self) {
        let started = runtime::with_mut(|state| match state.objects.get_mut(self.key) {
            Some(object) if !object.destroying => {
                object.destroying = true;
                true
            }
            _ => false,
        });
        if !started {
            return;
        }
        tracing::debug!(object = %self, "destroying object");

        while let Some(entry) = runtime::with_mut(|state| {
            state
                .objects
                .get_mut(self.key)
                .and_then(|o| o.teardown.pop())
        }) {
            entry.run();
        }

        let (properties, signals) = runtime::with(|state| {
            state.objects.get(self.key).map_or_else(Default::default, |o| {
                (
                    o.properties.values().copied().collect::<Vec<_>>(),
                    o.signals.values().copied().collect::<Vec<_>>(),
                )
            })
        });
        let mut eager = Edges::new();
        for key in properties {
            eager.extend(Property::from_key(key).dispose());
        }
        for key in signals {
            Signal::from_key(key).dispose();
        }

        let slot = runtime::with_mut(|state| {
            let slot = state.objects.remove(self.key)?;
            if let Some(parent) = slot.parent.and_then(|p| state.objects.get_mut(p)) {
                parent.children.retain(|c| *c != self.key);
                parent.teardown.retain(|e| !e.is_child(self.key));
            }
            Some(slot)
        });
        drop(slot);

        property::refresh(eager);
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.key.data().as_ffi() & 0xffff_ffff;
        match self.class_name() {
            Some(class_name) => write!(f, "{class_name}@{id}"),
            None => write!(f, "<destroyed>@{id}"),
        }
    }
}

// ---- Tests ----
