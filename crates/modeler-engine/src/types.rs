//! Core layout types shared by models, nodes and inputs
//!
//! Layout coordinates are opaque to execution; they are carried so a
//! persisted model reopens exactly where the user left it.

use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Unique name of a node within a model
pub type NodeName = String;

/// Unique name of a model input
pub type InputName = String;

/// Width of a node box on the model canvas
pub const BOX_WIDTH: f64 = 200.0;

/// Height of a node box on the model canvas
pub const BOX_HEIGHT: f64 = 30.0;

/// A layout coordinate on the model canvas
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Default position of the `index`-th promoted output of a node at `origin`
///
/// Outputs are stacked vertically to the right of the node box.
pub fn default_output_position(origin: Point, index: usize) -> Point {
    origin + Point::new(BOX_WIDTH, (index as f64 + 1.5) * BOX_HEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_position_stacks_outputs() {
        let origin = Point::new(100.0, 50.0);
        assert_eq!(default_output_position(origin, 0), Point::new(300.0, 95.0));
        assert_eq!(default_output_position(origin, 1), Point::new(300.0, 125.0));
    }

    #[test]
    fn test_point_from_tuple() {
        let p: Point = (1.5, -2.0).into();
        assert_eq!(p, Point::new(1.5, -2.0));
    }
}
