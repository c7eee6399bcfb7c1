//! Children bounding box.

use serde::Serialize;

use crate::object::Object;
use crate::reactive::SetReason;

/// An axis-aligned rectangle in parent coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    fn union_point(self, x: f64, y: f64, right: f64, bottom: f64) -> Self {
        let min_x = self.x.min(x);
        let min_y = self.y.min(y);
        let max_x = (self.x + self.width).max(right);
        let max_y = (self.y + self.height).max(bottom);
        Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

fn number(object: Object, name: &str) -> f64 {
    object.property(name).map_or(0.0, |p| p.get().to_number())
}

/// Bounding box of the visible item children of `parent`.
pub(crate) fn measure(parent: Object) -> Rect {
    let mut bounds: Option<Rect> = None;
    for child in parent.children() {
        let Some(visible) = child.property("visible") else {
            continue;
        };
        if !visible.get().to_bool() {
            continue;
        }
        let x = number(child, "x");
        let y = number(child, "y");
        let right = x + number(child, "width");
        let bottom = y + number(child, "height");
        bounds = Some(match bounds {
            Some(rect) => rect.union_point(x, y, right, bottom),
            None => Rect {
                x,
                y,
                width: right - x,
                height: bottom - y,
            },
        });
    }
    bounds.unwrap_or_default()
}

/// Recompute `parent`'s `childrenRect.*` properties, if it has them.
pub(crate) fn update(parent: Object) {
    if parent.property("childrenRect.x").is_none() {
        return;
    }
    let rect = measure(parent);
    for (name, value) in [
        ("childrenRect.x", rect.x),
        ("childrenRect.y", rect.y),
        ("childrenRect.width", rect.width),
        ("childrenRect.height", rect.height),
    ] {
        if let Some(property) = parent.property(name) {
            if let Err(err) = property.set(value, SetReason::User) {
                tracing::debug!(property = name, error = %err, "children rect write skipped");
            }
        }
    }
}
