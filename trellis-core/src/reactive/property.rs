//! Property Cells
//!
//! A property cell holds a value of a declared type, optionally computed by
//! a [`Binding`]. Cells form a dependency graph discovered at run time.
//!
//! # How Property Cells Work
//!
//! 1. Reading a cell while another cell's binding is being evaluated links
//!    the two: the reader becomes a dependent of the cell it read.
//!
//! 2. Writing a cell walks its dependents breadth-first and marks every
//!    bound cell reached dirty. Nothing is recomputed during the walk.
//!
//! 3. A dirty cell recomputes on its next read (pull). Cells whose change
//!    signal has connections are recomputed right after the walk (push),
//!    since somebody is listening for their value.
//!
//! 4. A walk that leads back to the cell being written is a binding loop.
//!    It is reported, and the written cell and every cell on a path back
//!    to it are left clean, so the cycle settles on its current values. A
//!    dependent that is reading the written cell right
//!    now (it is on the current frame's evaluation stack) is left alone;
//!    one reached further down the walk is re-dirtied so its next read
//!    recomputes.
//!
//! # Change Notification
//!
//! Every cell owns a `<name>Changed` signal, emitted with
//! `[new value, old value, property name]` whenever the stored value
//! actually changes (NaN counts as equal to NaN).

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::animation::Animation;
use super::binding::{Binding, Scope};
use super::context::EvaluationContext;
use super::runtime::{self, ObjectKey, PropertyKey, SignalKey, State};
use super::signal::{Connection, Signal};
use crate::error::{CoercionError, Error, Result, ScriptError};
use crate::object::{Object, ObjectFactory};
use crate::value::{coerce, ElementDescription, TypeRegistry, Value};

pub(crate) type Edges = SmallVec<[PropertyKey; 4]>;

/// Why a property is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SetReason {
    /// An ordinary write. Removes any binding.
    #[default]
    User,
    /// Written while an object is being constructed.
    Init,
    /// A frame written by a running animation. Keeps the binding.
    Animation,
}

/// What is being assigned to a property.
#[derive(Debug, Clone)]
pub enum Assignment {
    Value(Value),
    Binding(Binding),
}

impl From<Value> for Assignment {
    fn from(value: Value) -> Self {
        Assignment::Value(value)
    }
}

impl From<Binding> for Assignment {
    fn from(binding: Binding) -> Self {
        Assignment::Binding(binding)
    }
}

pub(crate) struct PropertySlot {
    pub(crate) owner: ObjectKey,
    pub(crate) name: String,
    pub(crate) type_name: String,
    pub(crate) value: Value,
    pub(crate) binding: Option<Binding>,
    pub(crate) dirty: bool,
    /// Set by `end_animation`: the next store bypasses the animation.
    settling: bool,
    pub(crate) changed: SignalKey,
    /// Cells whose bindings read this cell.
    pub(crate) dependents: Edges,
    /// Cells this cell's binding read during its last evaluation.
    pub(crate) dependencies: Edges,
    animation: Option<Rc<dyn Animation>>,
}

/// Handle to a property cell.
///
/// Handles are cheap to copy. Operations on a handle whose cell has been
/// destroyed are no-ops: reads return [`Value::None`] and writes return
/// [`Error::Stale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Property {
    key: PropertyKey,
}

impl Property {
    pub(crate) fn insert(
        state: &mut State,
        owner: ObjectKey,
        name: &str,
        type_name: &str,
        value: Value,
    ) -> Self {
        let changed = Signal::insert(state, Some(owner), format!("{name}Changed")).key();
        let key = state.properties.insert(PropertySlot {
            owner,
            name: name.to_owned(),
            type_name: type_name.to_owned(),
            value,
            binding: None,
            dirty: false,
            settling: false,
            changed,
            dependents: Edges::new(),
            dependencies: Edges::new(),
            animation: None,
        });
        if let Some(object) = state.objects.get_mut(owner) {
            object.properties.insert(name.to_owned(), key);
        }
        Self { key }
    }

    pub(crate) fn from_key(key: PropertyKey) -> Self {
        Self { key }
    }

    pub(crate) fn key(&self) -> PropertyKey {
        self.key
    }

    pub fn is_alive(&self) -> bool {
        runtime::with(|state| state.properties.contains_key(self.key))
    }

    pub fn name(&self) -> Option<String> {
        runtime::with(|state| state.properties.get(self.key).map(|c| c.name.clone()))
    }

    pub fn type_name(&self) -> Option<String> {
        runtime::with(|state| state.properties.get(self.key).map(|c| c.type_name.clone()))
    }

    pub fn owner(&self) -> Option<Object> {
        runtime::with(|state| state.properties.get(self.key).map(|c| c.owner)).map(Object::from_key)
    }

    /// The `<name>Changed` signal. Dead if the cell is.
    pub fn changed(&self) -> Signal {
        let key = runtime::with(|state| state.properties.get(self.key).map(|c| c.changed));
        Signal::from_key(key.unwrap_or_default())
    }

    /// Connect a direct handler to the change signal.
    pub fn on_changed<F>(&self, f: F) -> Connection
    where
        F: Fn(&[Value]) -> std::result::Result<(), ScriptError> + 'static,
    {
        self.changed().connect(f)
    }

    pub fn is_dirty(&self) -> bool {
        runtime::with(|state| state.properties.get(self.key).is_some_and(|c| c.dirty))
    }

    pub fn has_binding(&self) -> bool {
        runtime::with(|state| {
            state
                .properties
                .get(self.key)
                .is_some_and(|c| c.binding.is_some())
        })
    }

    pub fn binding(&self) -> Option<Binding> {
        runtime::with(|state| state.properties.get(self.key).and_then(|c| c.binding.clone()))
    }

    pub fn dependents(&self) -> Vec<Property> {
        runtime::with(|state| {
            state.properties.get(self.key).map_or_else(Vec::new, |c| {
                c.dependents.iter().copied().map(Property::from_key).collect()
            })
        })
    }

    pub fn dependencies(&self) -> Vec<Property> {
        runtime::with(|state| {
            state.properties.get(self.key).map_or_else(Vec::new, |c| {
                c.dependencies.iter().copied().map(Property::from_key).collect()
            })
        })
    }

    /// The stored value, without recomputing or recording a dependency.
    pub fn peek(&self) -> Value {
        runtime::with(|state| {
            state
                .properties
                .get(self.key)
                .map(|c| c.value.clone())
                .unwrap_or_default()
        })
    }

    /// Read the value.
    ///
    /// Records the dependency if a binding is being evaluated, then
    /// recomputes the cell first if it is dirty. During the initialisation
    /// phase a dirty cell returns its stale value.
    pub fn get(&self) -> Value {
        let Some(dirty) = runtime::with(|state| state.properties.get(self.key).map(|c| c.dirty))
        else {
            tracing::trace!("read of a destroyed property");
            return Value::None;
        };
        if let Some(reader) = EvaluationContext::current() {
            link(self.key, reader.key);
        }
        if dirty && !runtime::in_init() {
            self.update();
        }
        self.peek()
    }

    /// Write a value. See [`Property::assign`].
    pub fn set(&self, value: impl Into<Value>, reason: SetReason) -> Result<()> {
        self.assign(Assignment::Value(value.into()), reason, None)
    }

    /// Install a binding evaluated against the owning object.
    pub fn bind(&self, binding: Binding) -> Result<()> {
        self.assign(Assignment::Binding(binding), SetReason::User, None)
    }

    /// Assign a value or a binding.
    ///
    /// A binding replaces any existing one and is evaluated at once, unless
    /// the runtime is initialising, in which case it is queued until
    /// [`Runtime::complete_init`](super::Runtime::complete_init).
    ///
    /// A value is coerced to the declared type (failures are returned and
    /// leave the cell untouched), removes any binding unless the write
    /// comes from an animation, and is stored. A user write to a cell with
    /// an attached animation restarts the animation instead of storing.
    pub fn assign(&self, assignment: Assignment, reason: SetReason, scope: Option<Scope>) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::Stale { kind: "property" });
        }
        match assignment {
            Assignment::Binding(binding) => {
                let binding = match scope {
                    Some(scope) => binding.with_scope(scope),
                    None => binding,
                };
                let (previous, deferred) = runtime::with_mut(|state| {
                    let initializing = state.init_depth > 0;
                    let Some(cell) = state.properties.get_mut(self.key) else {
                        return (None, true);
                    };
                    let previous = cell.binding.replace(binding);
                    if initializing {
                        cell.dirty = false;
                        if !state.pending_bindings.contains(&self.key) {
                            state.pending_bindings.push(self.key);
                        }
                    }
                    (previous, initializing)
                });
                drop(previous);
                if !deferred {
                    self.update();
                }
            }
            Assignment::Value(value) => {
                let value = self.coerce(value)?;
                if reason != SetReason::Animation {
                    self.detach_binding();
                }
                self.store(value, reason);
            }
        }
        Ok(())
    }

    /// Re-evaluate the binding and store its result.
    ///
    /// The cell is marked clean before evaluating. If the binding fails,
    /// the previous value and dependency set are kept and the failure is
    /// logged.
    pub fn update(&self) {
        let Some((binding, owner)) = runtime::with_mut(|state| {
            let cell = state.properties.get_mut(self.key)?;
            cell.dirty = false;
            Some((cell.binding.clone()?, cell.owner))
        }) else {
            return;
        };

        let Some(_evaluating) = EvaluationContext::push_evaluating(*self) else {
            report_binding_loop(*self);
            return;
        };

        let previous = runtime::with_mut(|state| {
            state
                .properties
                .get_mut(self.key)
                .map(|c| std::mem::take(&mut c.dependencies))
                .unwrap_or_default()
        });

        let scope = binding
            .scope()
            .unwrap_or_else(|| Scope::new(Object::from_key(owner)));
        let outcome = binding
            .evaluate(&scope)
            .and_then(|value| self.coerce(value).map_err(ScriptError::from));

        match outcome {
            Ok(value) => {
                self.prune_dependencies(&previous);
                self.store(value, SetReason::User);
            }
            Err(err) => {
                self.restore_dependencies(previous);
                runtime::record(|d| d.binding_errors += 1);
                tracing::warn!(
                    property = %self,
                    source = binding.source(),
                    kind = ?binding.kind(),
                    error = %err,
                    "binding evaluation failed, keeping previous value"
                );
            }
        }
    }

    /// Attach or remove the animation that intercepts user writes.
    pub fn set_animation(&self, animation: Option<Rc<dyn Animation>>) {
        let previous = runtime::with_mut(|state| {
            state
                .properties
                .get_mut(self.key)
                .and_then(|c| std::mem::replace(&mut c.animation, animation))
        });
        drop(previous);
    }

    /// Hand a bound cell back to its binding after animation frames.
    ///
    /// The cell is marked dirty so its next read reflects the binding and
    /// not the last frame.
    pub fn end_animation(&self) {
        let observed = runtime::with_mut(|state| {
            let eager = state.config.eager_observed_bindings && state.init_depth == 0;
            let cell = state.properties.get_mut(self.key)?;
            cell.binding.as_ref()?;
            cell.dirty = true;
            cell.settling = true;
            let changed = cell.changed;
            Some(eager && is_observed(state, changed))
        });
        let Some(observed) = observed else {
            return;
        };
        let mut eager = invalidate(self.key);
        if observed {
            eager.insert(0, self.key);
        }
        refresh(eager);
    }

    /// Remove the cell from the graph. Returns the dependents to refresh.
    pub(crate) fn dispose(&self) -> Edges {
        let changed = runtime::with(|state| state.properties.get(self.key).map(|c| c.changed));
        let Some(changed) = changed else {
            return Edges::new();
        };
        Signal::from_key(changed).dispose();
        let eager = invalidate(self.key);

        let slot = runtime::with_mut(|state| {
            let slot = state.properties.remove(self.key)?;
            for source in &slot.dependencies {
                if let Some(cell) = state.properties.get_mut(*source) {
                    cell.dependents.retain(|k| *k != self.key);
                }
            }
            for dependent in &slot.dependents {
                if let Some(cell) = state.properties.get_mut(*dependent) {
                    cell.dependencies.retain(|k| *k != self.key);
                }
            }
            state.pending_bindings.retain(|k| *k != self.key);
            Some(slot)
        });
        drop(slot);
        eager
    }

    /// `Class.name`, for log lines.
    pub fn describe(&self) -> String {
        runtime::with(|state| {
            state.properties.get(self.key).map_or_else(
                || "<destroyed property>".to_owned(),
                |cell| {
                    let class_name = state
                        .objects
                        .get(cell.owner)
                        .map_or("<destroyed>", |o| o.class_name.as_str());
                    format!("{class_name}.{}", cell.name)
                },
            )
        })
    }

    fn coerce(&self, value: Value) -> Result<Value> {
        let Some((type_name, owner, current)) = runtime::with(|state| {
            state
                .properties
                .get(self.key)
                .map(|c| (c.type_name.clone(), c.owner, c.value.clone()))
        }) else {
            return Err(Error::Stale { kind: "property" });
        };
        coerce_declared(&type_name, value, &current, Object::from_key(owner))
    }

    fn detach_binding(&self) {
        let previous = runtime::with_mut(|state| {
            let cell = state.properties.get_mut(self.key)?;
            let binding = cell.binding.take()?;
            cell.dirty = false;
            let sources = std::mem::take(&mut cell.dependencies);
            for source in sources {
                if let Some(cell) = state.properties.get_mut(source) {
                    cell.dependents.retain(|k| *k != self.key);
                }
            }
            Some(binding)
        });
        drop(previous);
    }

    /// Store an already coerced value and notify.
    fn store(&self, value: Value, reason: SetReason) {
        enum Outcome {
            Unchanged,
            Animate(Rc<dyn Animation>, Value, Value),
            Changed {
                new: Value,
                old: Value,
                name: String,
                signal: SignalKey,
            },
        }

        let outcome = runtime::with_mut(|state| {
            let Some(cell) = state.properties.get_mut(self.key) else {
                return Outcome::Unchanged;
            };
            let settling = std::mem::take(&mut cell.settling);
            if cell.value.same_as(&value) {
                return Outcome::Unchanged;
            }
            if reason == SetReason::User && !settling {
                if let Some(animation) = &cell.animation {
                    return Outcome::Animate(Rc::clone(animation), cell.value.clone(), value);
                }
            }
            let old = std::mem::replace(&mut cell.value, value);
            Outcome::Changed {
                new: cell.value.clone(),
                old,
                name: cell.name.clone(),
                signal: cell.changed,
            }
        });

        match outcome {
            Outcome::Unchanged => {}
            Outcome::Animate(animation, from, to) => animation.restart(*self, from, to),
            Outcome::Changed {
                new,
                old,
                name,
                signal,
            } => {
                let eager = invalidate(self.key);
                Signal::from_key(signal).emit(&[new, old, Value::String(name)]);
                refresh(eager);
            }
        }
    }

    fn prune_dependencies(&self, previous: &Edges) {
        runtime::with_mut(|state| {
            let current = state
                .properties
                .get(self.key)
                .map(|c| c.dependencies.clone())
                .unwrap_or_default();
            for source in previous.iter().filter(|k| !current.contains(k)) {
                if let Some(cell) = state.properties.get_mut(*source) {
                    cell.dependents.retain(|k| *k != self.key);
                }
            }
        });
    }

    fn restore_dependencies(&self, previous: Edges) {
        runtime::with_mut(|state| {
            if !state.properties.contains_key(self.key) {
                for source in previous {
                    if let Some(cell) = state.properties.get_mut(source) {
                        cell.dependents.retain(|k| *k != self.key);
                    }
                }
                return;
            }
            let live: Edges = previous
                .into_iter()
                .filter(|k| state.properties.contains_key(*k))
                .collect();
            if let Some(cell) = state.properties.get_mut(self.key) {
                for source in live {
                    if !cell.dependencies.contains(&source) {
                        cell.dependencies.push(source);
                    }
                }
            }
        });
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Record that `reader`'s binding read `source`.
fn link(source: PropertyKey, reader: PropertyKey) {
    runtime::with_mut(|state| {
        if !state.properties.contains_key(reader) {
            return;
        }
        let Some(cell) = state.properties.get_mut(source) else {
            return;
        };
        if !cell.dependents.contains(&reader) {
            cell.dependents.push(reader);
        }
        if let Some(cell) = state.properties.get_mut(reader) {
            if !cell.dependencies.contains(&source) {
                cell.dependencies.push(source);
            }
        }
    });
}

fn is_observed(state: &State, signal: SignalKey) -> bool {
    state
        .signals
        .get(signal)
        .is_some_and(|s| !s.connections.is_empty())
}

fn report_binding_loop(property: Property) {
    runtime::record(|d| d.binding_loops += 1);
    if runtime::config().report_binding_loops {
        tracing::warn!(property = %property, "binding loop detected");
    }
}

/// Mark everything downstream of `source` dirty.
///
/// Returns the observed cells that should be recomputed now.
fn invalidate(source: PropertyKey) -> Edges {
    let (eager, looped) = runtime::with_mut(|state| {
        let push = state.config.eager_observed_bindings && state.init_depth == 0;
        // (cell, reached directly from `source`)
        let mut queue: VecDeque<(PropertyKey, bool)> = state
            .properties
            .get(source)
            .map(|c| c.dependents.iter().map(|k| (*k, true)).collect())
            .unwrap_or_default();
        let mut eager = Edges::new();
        let mut walked = Edges::new();
        let mut looped = false;

        while let Some((key, direct)) = queue.pop_front() {
            if key == source {
                looped = true;
                continue;
            }
            let Some(cell) = state.properties.get_mut(key) else {
                continue;
            };
            if cell.binding.is_none() || cell.dirty {
                continue;
            }
            if EvaluationContext::is_evaluating_key(key) {
                // A direct dependent on the stack is pulling `source` and
                // will see the new value.
                if !direct {
                    cell.dirty = true;
                }
                continue;
            }
            cell.dirty = true;
            queue.extend(cell.dependents.iter().map(|k| (*k, false)));
            walked.push(key);
            let changed = cell.changed;
            if push && is_observed(state, changed) {
                eager.push(key);
            }
        }

        if looped {
            let cycle = leads_back(state, source, &walked);
            for key in &cycle {
                if let Some(cell) = state.properties.get_mut(*key) {
                    cell.dirty = false;
                }
            }
            eager.retain(|k| !cycle.contains(k));
        }
        (eager, looped)
    });

    if looped {
        report_binding_loop(Property::from_key(source));
    }
    eager
}

/// The cells of `walked` from which `source` can be reached again
/// through other cells of `walked`.
fn leads_back(state: &State, source: PropertyKey, walked: &[PropertyKey]) -> Edges {
    let mut cycle = Edges::new();
    loop {
        let found = cycle.len();
        for key in walked {
            if cycle.contains(key) {
                continue;
            }
            let reaches = state.properties.get(*key).is_some_and(|cell| {
                cell.dependents
                    .iter()
                    .any(|k| *k == source || cycle.contains(k))
            });
            if reaches {
                cycle.push(*key);
            }
        }
        if cycle.len() == found {
            return cycle;
        }
    }
}

/// Recompute the cells in `keys` that are still dirty.
pub(crate) fn refresh(keys: Edges) {
    for key in keys {
        let property = Property::from_key(key);
        if property.is_dirty() {
            property.update();
        }
    }
}

/// Coerce `value` to a property's declared type.
///
/// Registered value types go through the [`TypeRegistry`]. A type the
/// installed [`ObjectFactory`] provides is a composite object type. Any
/// other type name is opaque and accepts values as they are.
pub(crate) fn coerce_declared(
    type_name: &str,
    value: Value,
    current: &Value,
    owner: Object,
) -> Result<Value> {
    if let Some(info) = TypeRegistry::lookup(type_name) {
        return Ok(coerce(&info, value)?);
    }
    let factory = runtime::factory();
    if let Some(factory) = factory.as_deref().filter(|f| f.provides(type_name)) {
        return match value {
            Value::None | Value::Object(_) => Ok(value),
            Value::Element(description) => {
                build_element(factory, type_name, description, current, owner)
            }
            other => Err(CoercionError::Incompatible {
                type_name: type_name.to_owned(),
                found: other.kind(),
            }
            .into()),
        };
    }
    match value {
        Value::Element(description) => match description.class_name.clone() {
            Some(class_name) => match factory.as_deref().filter(|f| f.provides(&class_name)) {
                Some(factory) => build_element(factory, &class_name, description, current, owner),
                None => Err(Error::NoFactory { class_name }),
            },
            None => Ok(Value::Element(description)),
        },
        other => Ok(other),
    }
}

/// Reuse the current object when it already has the described class,
/// otherwise construct one, then apply the described properties.
fn build_element(
    factory: &dyn ObjectFactory,
    type_name: &str,
    description: ElementDescription,
    current: &Value,
    owner: Object,
) -> Result<Value> {
    let class_name = description.class_name.as_deref().unwrap_or(type_name);
    let reusable = current
        .as_object()
        .filter(|o| o.class_name().as_deref() == Some(class_name));
    let target = match reusable {
        Some(object) => object,
        None => factory.create(class_name, owner)?,
    };
    for (name, value) in description.properties {
        target.require_property(&name)?.set(value, SetReason::Init)?;
    }
    Ok(Value::Object(target))
}

// ---- Tests ----
