//! Common geometry types shared by the locator, motion, and OCR layers.

use serde::{Deserialize, Serialize};

/// A point in screen coordinates. Origin is the top-left corner of the
/// primary monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = (other.x - self.x) as f64;
        let dy = (other.y - self.y) as f64;
        dx.hypot(dy)
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangular screen region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a region from two corner points, clamping negatives to zero.
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        let left = x1.min(x2).max(0) as u32;
        let top = y1.min(y2).max(0) as u32;
        let right = x1.max(x2).max(0) as u32;
        let bottom = y1.max(y2).max(0) as u32;
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Point::new(0, 0);
        let b = Point::new(3, 4);
        assert_eq!(a.distance_to(b), 5.0);
    }

    #[test]
    fn region_from_swapped_corners() {
        let r = Region::from_corners(200, 150, 100, 50);
        assert_eq!(r, Region::new(100, 50, 100, 100));
    }

    #[test]
    fn region_clamps_negative_corners() {
        let r = Region::from_corners(-10, -5, 90, 45);
        assert_eq!(r, Region::new(0, 0, 90, 45));
    }
}
