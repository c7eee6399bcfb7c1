//! Per-axis geometry solver.
//!
//! A pure function from the active anchor configuration to the values an
//! item's position, size and edge properties should take. Edge and center
//! coordinates are absolute; the position is relative to the parent's near
//! edge.

/// The anchor configuration of one axis, with the anchored coordinates
/// already read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    /// Mirror another item's near and far edges. `size` is its extent.
    Fill { near: f64, far: f64, size: f64 },
    /// Center on another item's center line.
    CenterIn { center: f64 },
    /// Both edges anchored.
    Span { near: f64, far: f64 },
    /// Near edge and center line anchored.
    NearAndCenter { near: f64, center: f64 },
    /// Far edge and center line anchored.
    FarAndCenter { far: f64, center: f64 },
    Near { near: f64 },
    Far { far: f64 },
    /// Center line anchored.
    Center { center: f64 },
    /// No anchors: the item's own position decides.
    Free { pos: f64 },
}

/// Margins applied to the near and far edge anchors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Margins {
    pub near: f64,
    pub far: f64,
}

/// The values to write back to the item.
///
/// `pos` is `None` when the item's position is its own; `size` is `None`
/// when the configuration leaves the size alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    pub pos: Option<f64>,
    pub size: Option<f64>,
    pub near: f64,
    pub far: f64,
    pub center: f64,
}

impl Solution {
    /// Whether the configuration decides the item's size, which turns
    /// implicit sizing off.
    pub fn sizes_item(&self) -> bool {
        self.size.is_some()
    }
}

/// Solve one axis.
///
/// `size` is the item's current size and `parent_near` the absolute
/// coordinate of the parent's near edge (zero without a parent).
pub fn solve(constraint: Constraint, size: f64, parent_near: f64, margins: Margins) -> Solution {
    match constraint {
        Constraint::Fill {
            near,
            far,
            size: extent,
        } => {
            let near = near + margins.near;
            let far = far - margins.far;
            Solution {
                pos: Some(near - parent_near),
                size: Some(extent - margins.near - margins.far),
                near,
                far,
                center: (near + far) / 2.0,
            }
        }
        Constraint::CenterIn { center } | Constraint::Center { center } => Solution {
            pos: Some(center - size / 2.0 - parent_near),
            size: None,
            near: center - size / 2.0,
            far: center + size / 2.0,
            center,
        },
        Constraint::Span { near, far } => {
            let near = near + margins.near;
            let far = far - margins.far;
            Solution {
                pos: Some(near - parent_near),
                size: Some(far - near),
                near,
                far,
                center: (near + far) / 2.0,
            }
        }
        Constraint::NearAndCenter { near, center } => {
            let near = near + margins.near;
            Solution {
                pos: Some(near - parent_near),
                size: Some((center - near) * 2.0),
                near,
                far: 2.0 * center - near,
                center,
            }
        }
        Constraint::FarAndCenter { far, center } => {
            let far = far - margins.far;
            let near = 2.0 * center - far;
            Solution {
                pos: Some(near - parent_near),
                size: Some((far - center) * 2.0),
                near,
                far,
                center,
            }
        }
        Constraint::Near { near } => {
            let near = near + margins.near;
            Solution {
                pos: Some(near - parent_near),
                size: None,
                near,
                far: near + size,
                center: near + size / 2.0,
            }
        }
        Constraint::Far { far } => {
            let far = far - margins.far;
            Solution {
                pos: Some(far - size - parent_near),
                size: None,
                near: far - size,
                far,
                center: far - size / 2.0,
            }
        }
        Constraint::Free { pos } => {
            let near = pos + parent_near;
            Solution {
                pos: None,
                size: None,
                near,
                far: near + size,
                center: near + size / 2.0,
            }
        }
    }
}
