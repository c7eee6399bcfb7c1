//! Anchorable items and the per-axis resolver.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::children_rect::{self, Rect};
use super::geometry::{solve, Constraint, Margins};
use super::{Axis, AxisNames, Edge};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectFactory};
use crate::reactive::{Binding, Connection, ConnectionKind, Handler, Property, SetReason, Signal};
use crate::value::Value;

const GEOMETRY: &[&str] = &[
    "x",
    "y",
    "width",
    "height",
    "implicitWidth",
    "implicitHeight",
    "left",
    "right",
    "top",
    "bottom",
    "horizontalCenter",
    "verticalCenter",
    "anchors.margins",
    "childrenRect.x",
    "childrenRect.y",
    "childrenRect.width",
    "childrenRect.height",
];

/// Anchor properties; `None` means "not anchored".
const ANCHORS: &[&str] = &[
    "anchors.left",
    "anchors.right",
    "anchors.horizontalCenter",
    "anchors.top",
    "anchors.bottom",
    "anchors.verticalCenter",
    "anchors.fill",
    "anchors.centerIn",
    "anchors.leftMargin",
    "anchors.rightMargin",
    "anchors.topMargin",
    "anchors.bottomMargin",
];

struct AxisState {
    /// Set while this axis is being resolved.
    updating: Cell<bool>,
    /// Whether the size still follows the implicit size.
    using_implicit: Cell<bool>,
    /// Connections to other items' edges, for `fill`, `centerIn` and the
    /// parent's near edge.
    subscriptions: RefCell<Vec<Connection>>,
    /// Listens to the item's own properties.
    own: Handler,
    /// Listens to other items' properties.
    external: Handler,
    /// Listens to the implicit size.
    implicit: Handler,
}

impl AxisState {
    fn new(axis: Axis, item: &Weak<ItemInner>) -> Self {
        let own = {
            let item = item.clone();
            Handler::new(move |args: &[Value]| {
                if let Some(item) = item.upgrade() {
                    item.recompute(axis, args.get(2).and_then(Value::as_str));
                }
                Ok(())
            })
        };
        let external = {
            let item = item.clone();
            Handler::new(move |_: &[Value]| {
                if let Some(item) = item.upgrade() {
                    item.recompute(axis, None);
                }
                Ok(())
            })
        };
        let implicit = {
            let item = item.clone();
            Handler::new(move |_: &[Value]| {
                if let Some(item) = item.upgrade() {
                    item.follow_implicit_size(axis);
                }
                Ok(())
            })
        };
        Self {
            updating: Cell::new(false),
            using_implicit: Cell::new(true),
            subscriptions: RefCell::new(Vec::new()),
            own,
            external,
            implicit,
        }
    }
}

/// Clears the re-entrancy flag on every exit path.
struct Updating<'a>(&'a Cell<bool>);

impl Drop for Updating<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

struct ItemInner {
    object: Object,
    horizontal: AxisState,
    vertical: AxisState,
}

impl ItemInner {
    fn axis(&self, axis: Axis) -> &AxisState {
        match axis {
            Axis::Horizontal => &self.horizontal,
            Axis::Vertical => &self.vertical,
        }
    }

    fn read(&self, name: &str) -> Value {
        self.object.property(name).map_or(Value::None, |p| p.get())
    }

    fn write(&self, name: &str, value: f64) {
        let Some(property) = self.object.property(name) else {
            return;
        };
        if let Err(err) = property.set(value, SetReason::User) {
            tracing::debug!(item = %self.object, property = name, error = %err, "geometry write skipped");
        }
    }

    fn margin(&self, name: &str) -> f64 {
        self.read(name)
            .as_number()
            .unwrap_or_else(|| self.read("anchors.margins").to_number())
    }

    fn listen(&self) {
        for axis in Axis::BOTH {
            let names = axis.names();
            let state = self.axis(axis);
            let own = [
                names.pos,
                names.size,
                names.anchor_near,
                names.anchor_far,
                names.anchor_center,
                names.near_margin,
                names.far_margin,
                "anchors.fill",
                "anchors.centerIn",
                "anchors.margins",
            ];
            for name in own {
                if let Some(property) = self.object.property(name) {
                    property.changed().connect_with(
                        Some(self.object),
                        state.own.clone(),
                        ConnectionKind::Unique,
                    );
                }
            }
            if let Some(property) = self.object.property(names.implicit_size) {
                property.changed().connect_with(
                    Some(self.object),
                    state.implicit.clone(),
                    ConnectionKind::Unique,
                );
            }
        }

        if let Some(visible) = self.object.property("visible") {
            let object = self.object;
            visible.changed().connect_with(
                Some(object),
                Handler::new(move |_: &[Value]| {
                    if let Some(parent) = object.parent() {
                        children_rect::update(parent);
                    }
                    Ok(())
                }),
                ConnectionKind::Direct,
            );
        }
    }

    fn follow_implicit_size(&self, axis: Axis) {
        let state = self.axis(axis);
        if !state.using_implicit.get() {
            return;
        }
        let names = axis.names();
        let implicit = self.read(names.implicit_size).to_number();
        self.write(names.size, implicit);
        // The size write looks like a user write to the resolver.
        state.using_implicit.set(true);
    }

    /// Pick the active configuration and the external properties it reads.
    fn resolve(&self, names: &AxisNames) -> (Constraint, Vec<Property>) {
        let edge = |target: Object, name: &str| target.property(name);
        let number = |property: Option<Property>| property.map_or(0.0, |p| p.get().to_number());
        let live = |value: Value| value.as_object().filter(Object::is_alive);

        if let Some(target) = live(self.read("anchors.fill")) {
            let near = edge(target, names.near);
            let far = edge(target, names.far);
            let size = edge(target, names.size);
            let constraint = Constraint::Fill {
                near: number(near),
                far: number(far),
                size: number(size),
            };
            return (constraint, [near, far, size].into_iter().flatten().collect());
        }
        if let Some(target) = live(self.read("anchors.centerIn")) {
            let center = edge(target, names.center);
            let constraint = Constraint::CenterIn {
                center: number(center),
            };
            return (constraint, center.into_iter().collect());
        }

        let near = self.read(names.anchor_near).as_number();
        let far = self.read(names.anchor_far).as_number();
        let center = self.read(names.anchor_center).as_number();
        let constraint = match (near, far, center) {
            (Some(near), Some(far), _) => Constraint::Span { near, far },
            (Some(near), None, Some(center)) => Constraint::NearAndCenter { near, center },
            (Some(near), None, None) => Constraint::Near { near },
            (None, Some(far), Some(center)) => Constraint::FarAndCenter { far, center },
            (None, Some(far), None) => Constraint::Far { far },
            (None, None, Some(center)) => Constraint::Center { center },
            (None, None, None) => {
                let parent_near = self.object.parent().and_then(|p| edge(p, names.near));
                let pos = self.read(names.pos).to_number();
                return (Constraint::Free { pos }, parent_near.into_iter().collect());
            }
        };
        (constraint, Vec::new())
    }

    /// Keep exactly the subscriptions the current configuration needs.
    fn resubscribe(&self, state: &AxisState, sources: Vec<Property>) {
        let wanted: Vec<Connection> = sources
            .into_iter()
            .map(|property| {
                property.changed().connect_with(
                    Some(self.object),
                    state.external.clone(),
                    ConnectionKind::Unique,
                )
            })
            .collect();
        let previous = state.subscriptions.replace(wanted.clone());
        for connection in previous {
            if !wanted.contains(&connection) {
                connection.disconnect();
            }
        }
    }

    fn recompute(&self, axis: Axis, trigger: Option<&str>) {
        let state = self.axis(axis);
        if state.updating.replace(true) {
            return;
        }
        let updating = Updating(&state.updating);
        let names = axis.names();

        if trigger == Some(names.size) {
            state.using_implicit.set(false);
        }

        let (constraint, sources) = self.resolve(names);
        self.resubscribe(state, sources);

        let parent = self.object.parent();
        let parent_near = parent
            .and_then(|p| p.property(names.near))
            .map_or(0.0, |p| p.get().to_number());
        let margins = Margins {
            near: self.margin(names.near_margin),
            far: self.margin(names.far_margin),
        };
        let size = self.read(names.size).to_number();
        let solution = solve(constraint, size, parent_near, margins);

        if let Some(size) = solution.size {
            state.using_implicit.set(false);
            self.write(names.size, size);
        }
        if let Some(pos) = solution.pos {
            self.write(names.pos, pos);
        }
        self.write(names.near, solution.near);
        self.write(names.far, solution.far);
        self.write(names.center, solution.center);

        drop(updating);
        if let Some(parent) = parent {
            children_rect::update(parent);
        }
    }
}

/// An object with geometry and anchors.
///
/// `Item` is a handle: clones refer to the same item, and the geometry
/// state lives as long as the underlying object.
#[derive(Clone)]
pub struct Item {
    inner: Rc<ItemInner>,
}

impl Item {
    /// Create a plain `Item`.
    pub fn new(parent: Option<&Item>) -> Result<Self> {
        Self::with_class("Item", parent.map(Item::object))
    }

    /// Create an item of a custom class under any parent object.
    pub fn with_class(class_name: &str, parent: Option<Object>) -> Result<Self> {
        let object = Object::new(class_name, parent);
        if let Err(err) = declare(object) {
            object.destroy();
            return Err(err);
        }

        let inner = Rc::new_cyclic(|weak| ItemInner {
            object,
            horizontal: AxisState::new(Axis::Horizontal, weak),
            vertical: AxisState::new(Axis::Vertical, weak),
        });
        let attachment: Rc<dyn Any> = inner.clone();
        object.attach(attachment);
        inner.listen();
        for axis in Axis::BOTH {
            inner.recompute(axis, None);
        }
        Ok(Self { inner })
    }

    /// The item attached to `object`, if it is one.
    pub fn from_object(object: Object) -> Option<Self> {
        let inner = object.attachment()?.downcast::<ItemInner>().ok()?;
        Some(Self { inner })
    }

    pub fn object(&self) -> Object {
        self.inner.object
    }

    pub fn is_alive(&self) -> bool {
        self.inner.object.is_alive()
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        self.inner.object.property(name)
    }

    fn number(&self, name: &str) -> f64 {
        self.inner.read(name).to_number()
    }

    fn set_number(&self, name: &str, value: f64) -> Result<()> {
        self.inner
            .object
            .require_property(name)?
            .set(value, SetReason::User)
    }

    pub fn x(&self) -> f64 {
        self.number("x")
    }

    pub fn y(&self) -> f64 {
        self.number("y")
    }

    pub fn width(&self) -> f64 {
        self.number("width")
    }

    pub fn height(&self) -> f64 {
        self.number("height")
    }

    /// Absolute coordinate of an edge or center line.
    pub fn edge(&self, edge: Edge) -> f64 {
        self.number(edge.property_name())
    }

    pub fn set_x(&self, x: f64) -> Result<()> {
        self.set_number("x", x)
    }

    pub fn set_y(&self, y: f64) -> Result<()> {
        self.set_number("y", y)
    }

    pub fn set_width(&self, width: f64) -> Result<()> {
        self.set_number("width", width)
    }

    pub fn set_height(&self, height: f64) -> Result<()> {
        self.set_number("height", height)
    }

    pub fn set_implicit_width(&self, width: f64) -> Result<()> {
        self.set_number("implicitWidth", width)
    }

    pub fn set_implicit_height(&self, height: f64) -> Result<()> {
        self.set_number("implicitHeight", height)
    }

    pub fn is_visible(&self) -> bool {
        self.inner.read("visible").to_bool()
    }

    pub fn set_visible(&self, visible: bool) -> Result<()> {
        self.inner
            .object
            .require_property("visible")?
            .set(visible, SetReason::User)
    }

    /// Whether the size on `axis` still follows the implicit size.
    pub fn uses_implicit_size(&self, axis: Axis) -> bool {
        self.inner.axis(axis).using_implicit.get()
    }

    /// Anchor `edge` of this item to `target_edge` of `target`.
    pub fn anchor(&self, edge: Edge, target: &Item, target_edge: Edge) -> Result<()> {
        if edge.axis() != target_edge.axis() {
            return Err(Error::AnchorAxis {
                edge: edge.property_name(),
                target: target_edge.property_name(),
            });
        }
        let source = target.object().require_property(target_edge.property_name())?;
        let expression = format!("{}.{}", target.object(), target_edge.property_name());
        self.inner
            .object
            .require_property(edge.anchor_name())?
            .bind(Binding::expression(&expression, move |_| Ok(source.get())))
    }

    /// Remove the anchor on `edge`.
    pub fn unanchor(&self, edge: Edge) -> Result<()> {
        self.inner
            .object
            .require_property(edge.anchor_name())?
            .set(Value::None, SetReason::User)
    }

    /// Fill `target`, or stop filling with `None`.
    pub fn fill(&self, target: Option<&Item>) -> Result<()> {
        self.inner
            .object
            .require_property("anchors.fill")?
            .set(target.map(Item::object), SetReason::User)
    }

    /// Center on `target`, or stop centering with `None`.
    pub fn center_in(&self, target: Option<&Item>) -> Result<()> {
        self.inner
            .object
            .require_property("anchors.centerIn")?
            .set(target.map(Item::object), SetReason::User)
    }

    /// Remove every anchor. Margins are kept.
    pub fn clear_anchors(&self) -> Result<()> {
        for edge in [
            Edge::Left,
            Edge::Right,
            Edge::HorizontalCenter,
            Edge::Top,
            Edge::Bottom,
            Edge::VerticalCenter,
        ] {
            self.unanchor(edge)?;
        }
        self.fill(None)?;
        self.center_in(None)
    }

    /// Set the margin used by edges without a margin of their own.
    pub fn set_margins(&self, margins: f64) -> Result<()> {
        self.set_number("anchors.margins", margins)
    }

    /// Set (or with `None`, clear) the margin of one edge.
    pub fn set_margin(&self, edge: Edge, margin: Option<f64>) -> Result<()> {
        let Some(name) = edge.margin_name() else {
            return Err(Error::UnknownProperty {
                class_name: self.inner.object.class_name().unwrap_or_default(),
                name: format!("{}Margin", edge.property_name()),
            });
        };
        self.inner
            .object
            .require_property(name)?
            .set(margin, SetReason::User)
    }

    /// Move the item under another parent and lay it out again.
    pub fn set_parent(&self, parent: Option<&Item>) -> Result<()> {
        let previous = self.inner.object.parent();
        self.inner.object.set_parent(parent.map(Item::object))?;
        for axis in Axis::BOTH {
            self.inner.recompute(axis, None);
        }
        if let Some(previous) = previous {
            children_rect::update(previous);
        }
        Ok(())
    }

    pub fn children_rect(&self) -> Rect {
        Rect {
            x: self.number("childrenRect.x"),
            y: self.number("childrenRect.y"),
            width: self.number("childrenRect.width"),
            height: self.number("childrenRect.height"),
        }
    }

    /// Number of subscriptions to other items held by the resolver.
    pub fn external_subscriptions(&self) -> usize {
        Axis::BOTH
            .iter()
            .map(|axis| {
                self.inner
                    .axis(*axis)
                    .subscriptions
                    .borrow()
                    .iter()
                    .filter(|c| c.is_connected())
                    .count()
            })
            .sum()
    }

    pub fn destroy(&self) {
        self.inner.object.destroy();
    }

    /// The change signal of a geometry property.
    pub fn changed(&self, name: &str) -> Option<Signal> {
        self.property(name).map(|p| p.changed())
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object == other.inner.object
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("object", &self.inner.object)
            .finish_non_exhaustive()
    }
}

fn declare(object: Object) -> Result<()> {
    for name in GEOMETRY {
        object.declare_property(name, "real", 0.0)?;
    }
    object.declare_property("visible", "bool", true)?;
    for name in ANCHORS {
        object.declare_property(name, "var", Value::None)?;
    }
    Ok(())
}

/// Builds items for composite properties whose type is an item class.
#[derive(Debug, Clone)]
pub struct ItemFactory {
    classes: Vec<String>,
}

impl ItemFactory {
    /// A factory providing the given item classes.
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for ItemFactory {
    fn default() -> Self {
        Self::new(["Item"])
    }
}

impl ObjectFactory for ItemFactory {
    fn provides(&self, class_name: &str) -> bool {
        self.classes.iter().any(|c| c == class_name)
    }

    fn create(&self, class_name: &str, parent: Object) -> Result<Object> {
        Ok(Item::with_class(class_name, Some(parent))?.object())
    }
}
