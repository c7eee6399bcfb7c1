//! Integration Tests for Anchoring
//!
//! These tests verify that the anchor resolver keeps item geometry in
//! sync with the items it is anchored to.

use std::rc::Rc;

use trellis_core::{
    Axis, EvaluationContext, ElementDescription, Edge, Error, Item, ItemFactory, Rect, Runtime,
    SetReason, Value,
};

fn item(parent: Option<&Item>, x: f64, y: f64, width: f64, height: f64) -> Item {
    let item = Item::new(parent).unwrap();
    item.set_x(x).unwrap();
    item.set_y(y).unwrap();
    item.set_width(width).unwrap();
    item.set_height(height).unwrap();
    item
}

/// Anchoring X's left edge to Y's right edge moves X when Y grows, and
/// leaves X's width alone.
#[test]
fn left_edge_follows_sibling_right_edge() {
    let root = item(None, 0.0, 0.0, 400.0, 300.0);
    let y = item(Some(&root), 0.0, 0.0, 20.0, 20.0);
    let x = item(Some(&root), 0.0, 0.0, 10.0, 10.0);

    x.anchor(Edge::Left, &y, Edge::Right).unwrap();
    assert_eq!(x.x(), 20.0);
    let width_before = x.width();

    y.set_width(40.0).unwrap();

    assert_eq!(x.x(), 40.0);
    assert_eq!(x.width(), width_before);
    assert!(!x.uses_implicit_size(Axis::Horizontal));
    assert!(EvaluationContext::is_balanced());
}

/// Edge coordinates are absolute; positions stay parent-relative.
#[test]
fn anchors_resolve_across_parents() {
    let root = item(None, 0.0, 0.0, 400.0, 300.0);
    let panel = item(Some(&root), 100.0, 0.0, 200.0, 100.0);
    let sidebar = item(Some(&root), 0.0, 0.0, 50.0, 100.0);
    let label = item(Some(&panel), 0.0, 0.0, 30.0, 10.0);

    label.anchor(Edge::Left, &sidebar, Edge::Right).unwrap();

    assert_eq!(label.edge(Edge::Left), 50.0);
    assert_eq!(label.x(), -50.0);
}

/// A single edge anchor keeps following the item's implicit width.
#[test]
fn single_edge_anchor_keeps_implicit_sizing() {
    let root = item(None, 0.0, 0.0, 400.0, 300.0);
    let icon = item(Some(&root), 0.0, 0.0, 24.0, 24.0);
    let text = Item::new(Some(&root)).unwrap();
    text.set_implicit_width(80.0).unwrap();

    text.anchor(Edge::Left, &icon, Edge::Right).unwrap();
    assert!(text.uses_implicit_size(Axis::Horizontal));

    text.set_implicit_width(120.0).unwrap();
    assert_eq!(text.width(), 120.0);
    assert_eq!(text.x(), 24.0);
}

/// Anchoring both edges sizes the item from them, with margins.
#[test]
fn opposite_edges_span_the_item() {
    let root = item(None, 0.0, 0.0, 300.0, 200.0);
    let bar = Item::new(Some(&root)).unwrap();
    bar.set_margin(Edge::Left, Some(10.0)).unwrap();
    bar.set_margin(Edge::Right, Some(20.0)).unwrap();
    bar.anchor(Edge::Left, &root, Edge::Left).unwrap();
    bar.anchor(Edge::Right, &root, Edge::Right).unwrap();

    assert_eq!(bar.x(), 10.0);
    assert_eq!(bar.width(), 270.0);

    root.set_width(500.0).unwrap();
    assert_eq!(bar.width(), 470.0);
    assert!(!bar.uses_implicit_size(Axis::Horizontal));
}

/// `fill` tracks the target's geometry on both axes.
#[test]
fn fill_tracks_the_target() {
    let root = item(None, 0.0, 0.0, 200.0, 100.0);
    let background = Item::new(Some(&root)).unwrap();
    background.set_margins(10.0).unwrap();
    background.fill(Some(&root)).unwrap();

    assert_eq!(
        (background.x(), background.y(), background.width(), background.height()),
        (10.0, 10.0, 180.0, 80.0)
    );

    root.set_width(300.0).unwrap();
    root.set_height(150.0).unwrap();
    assert_eq!(background.width(), 280.0);
    assert_eq!(background.height(), 130.0);
}

/// Switching from `fill` to a single anchor drops the fill subscriptions.
#[test]
fn switching_configuration_releases_old_subscriptions() {
    let root = item(None, 0.0, 0.0, 200.0, 100.0);
    let other = item(Some(&root), 0.0, 0.0, 50.0, 50.0);
    let child = Item::new(Some(&root)).unwrap();

    child.fill(Some(&other)).unwrap();
    assert!(child.external_subscriptions() > 0);
    let filled = child.external_subscriptions();

    child.fill(None).unwrap();
    child.anchor(Edge::Left, &other, Edge::Right).unwrap();

    assert!(child.external_subscriptions() < filled);
    other.set_width(60.0).unwrap();
    assert_eq!(child.x(), 60.0);
}

/// `centerIn` centers the item and follows the target's center.
#[test]
fn center_in_follows_the_target_center() {
    let root = item(None, 0.0, 0.0, 200.0, 100.0);
    let dialog = item(Some(&root), 0.0, 0.0, 50.0, 20.0);
    dialog.center_in(Some(&root)).unwrap();

    assert_eq!((dialog.x(), dialog.y()), (75.0, 40.0));
    assert_eq!(dialog.width(), 50.0);

    root.set_width(400.0).unwrap();
    assert_eq!(dialog.x(), 175.0);
}

/// Anchoring a horizontal edge to a vertical one is refused.
#[test]
fn mismatched_axes_are_an_error() {
    let a = Item::new(None).unwrap();
    let b = Item::new(None).unwrap();
    assert!(matches!(
        a.anchor(Edge::Left, &b, Edge::Top),
        Err(Error::AnchorAxis { .. })
    ));
}

/// The children rect bounds the visible children.
#[test]
fn children_rect_bounds_visible_children() {
    let root = item(None, 0.0, 0.0, 400.0, 300.0);
    let _a = item(Some(&root), 10.0, 5.0, 20.0, 10.0);
    let b = item(Some(&root), 50.0, 0.0, 10.0, 40.0);

    assert_eq!(
        root.children_rect(),
        Rect {
            x: 10.0,
            y: 0.0,
            width: 50.0,
            height: 40.0
        }
    );

    b.set_visible(false).unwrap();
    assert_eq!(
        root.children_rect(),
        Rect {
            x: 10.0,
            y: 5.0,
            width: 20.0,
            height: 10.0
        }
    );
}

/// Destroying an anchored target leaves no subscriptions behind.
#[test]
fn destroying_a_fill_target_is_clean() {
    let root = item(None, 0.0, 0.0, 200.0, 100.0);
    let target = item(Some(&root), 0.0, 0.0, 50.0, 50.0);
    let child = Item::new(Some(&root)).unwrap();
    child.fill(Some(&target)).unwrap();

    target.destroy();

    assert_eq!(child.external_subscriptions(), 0);
    assert_eq!(Runtime::dangling_references(), 0);
    root.set_width(250.0).unwrap();
    assert!(EvaluationContext::is_balanced());
}

/// A composite property of an item type builds the item from a
/// description, and reuses it for the next description.
#[test]
fn element_descriptions_build_items() {
    Runtime::set_object_factory(Rc::new(ItemFactory::default()));
    let root = Item::new(None).unwrap();
    let header = root
        .object()
        .declare_property("header", "Item", Value::None)
        .unwrap();

    header
        .set(
            ElementDescription::untyped().with("width", 120.0),
            SetReason::User,
        )
        .unwrap();
    let built = header.get().as_object().and_then(Item::from_object).unwrap();
    assert_eq!(built.width(), 120.0);
    assert_eq!(built.object().parent(), Some(root.object()));

    header
        .set(
            ElementDescription::untyped().with("width", 60.0),
            SetReason::User,
        )
        .unwrap();
    assert_eq!(header.get().as_object(), Some(built.object()));
    assert_eq!(built.width(), 60.0);

    let delegate = root
        .object()
        .declare_property("delegate", "var", Value::None)
        .unwrap();
    assert!(matches!(
        delegate.set(ElementDescription::new("ListView"), SetReason::User),
        Err(Error::NoFactory { .. })
    ));
}
