//! Anchoring
//!
//! Items are objects with geometry properties (`x`, `width`, `left`, ...)
//! and an anchor group (`anchors.left`, `anchors.fill`, ...). Each axis has
//! a resolver that turns the anchors into position and size writes.
//!
//! # How Anchoring Works
//!
//! 1. An edge anchor is a binding on `anchors.<edge>` that reads the target
//!    item's edge property, so the ordinary dependency graph carries the
//!    link between the two items.
//!
//! 2. The resolver listens to the item's own anchor, position and size
//!    properties. `fill` and `centerIn` hold an object reference, so the
//!    resolver subscribes to the target's edges itself, and an unanchored
//!    item subscribes to its parent's near edge.
//!
//! 3. A resolver run writes position, size and edge properties. Those
//!    writes feed back into the resolver's own listeners; a per-axis guard
//!    makes each triggering write cost one pass.
//!
//! 4. After the guard is released, the parent's `childrenRect` is
//!    recomputed.

mod children_rect;
mod geometry;
mod item;

pub use children_rect::Rect;
pub use geometry::{solve, Constraint, Margins, Solution};
pub use item::{Item, ItemFactory};

/// One of the two layout axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Property names used by the resolver for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisNames {
    pub pos: &'static str,
    pub size: &'static str,
    pub implicit_size: &'static str,
    pub near: &'static str,
    pub far: &'static str,
    pub center: &'static str,
    pub anchor_near: &'static str,
    pub anchor_far: &'static str,
    pub anchor_center: &'static str,
    pub near_margin: &'static str,
    pub far_margin: &'static str,
}

const HORIZONTAL: AxisNames = AxisNames {
    pos: "x",
    size: "width",
    implicit_size: "implicitWidth",
    near: "left",
    far: "right",
    center: "horizontalCenter",
    anchor_near: "anchors.left",
    anchor_far: "anchors.right",
    anchor_center: "anchors.horizontalCenter",
    near_margin: "anchors.leftMargin",
    far_margin: "anchors.rightMargin",
};

const VERTICAL: AxisNames = AxisNames {
    pos: "y",
    size: "height",
    implicit_size: "implicitHeight",
    near: "top",
    far: "bottom",
    center: "verticalCenter",
    anchor_near: "anchors.top",
    anchor_far: "anchors.bottom",
    anchor_center: "anchors.verticalCenter",
    near_margin: "anchors.topMargin",
    far_margin: "anchors.bottomMargin",
};

impl Axis {
    pub const BOTH: [Axis; 2] = [Axis::Horizontal, Axis::Vertical];

    pub fn names(self) -> &'static AxisNames {
        match self {
            Axis::Horizontal => &HORIZONTAL,
            Axis::Vertical => &VERTICAL,
        }
    }
}

/// An anchorable edge or center line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Left,
    Right,
    HorizontalCenter,
    Top,
    Bottom,
    VerticalCenter,
}

impl Edge {
    pub fn axis(self) -> Axis {
        match self {
            Edge::Left | Edge::Right | Edge::HorizontalCenter => Axis::Horizontal,
            Edge::Top | Edge::Bottom | Edge::VerticalCenter => Axis::Vertical,
        }
    }

    /// The item property holding this edge's absolute coordinate.
    pub fn property_name(self) -> &'static str {
        let names = self.axis().names();
        match self {
            Edge::Left | Edge::Top => names.near,
            Edge::Right | Edge::Bottom => names.far,
            Edge::HorizontalCenter | Edge::VerticalCenter => names.center,
        }
    }

    /// The anchor property for this edge.
    pub fn anchor_name(self) -> &'static str {
        let names = self.axis().names();
        match self {
            Edge::Left | Edge::Top => names.anchor_near,
            Edge::Right | Edge::Bottom => names.anchor_far,
            Edge::HorizontalCenter | Edge::VerticalCenter => names.anchor_center,
        }
    }

    /// The per-edge margin property. Center lines have none.
    pub fn margin_name(self) -> Option<&'static str> {
        let names = self.axis().names();
        match self {
            Edge::Left | Edge::Top => Some(names.near_margin),
            Edge::Right | Edge::Bottom => Some(names.far_margin),
            Edge::HorizontalCenter | Edge::VerticalCenter => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_map_to_their_axis_properties() {
        assert_eq!(Edge::Right.axis(), Axis::Horizontal);
        assert_eq!(Edge::Right.property_name(), "right");
        assert_eq!(Edge::Top.anchor_name(), "anchors.top");
        assert_eq!(Edge::Bottom.margin_name(), Some("anchors.bottomMargin"));
        assert_eq!(Edge::VerticalCenter.margin_name(), None);
    }
}
