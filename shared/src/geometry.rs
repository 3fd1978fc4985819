//! Axis-aligned rectangle helpers and sorted-insert search
//!
//! These are pure functions over integer grid coordinates. The server uses
//! them to clip a player's view window against the board and to keep the
//! per-row edge lists of the enclosure tracer sorted.

use crate::Point;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle with its origin at the top-left corner
///
/// `w` and `h` are exclusive extents, so the rectangle covers
/// `x..x + w` horizontally and `y..y + h` vertically. A rectangle with a
/// non-positive extent is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Square of side `2 * radius + 1` centred on `center`
    pub fn around(center: Point, radius: i32) -> Self {
        Self {
            x: center.x - radius,
            y: center.y - radius,
            w: 2 * radius + 1,
            h: 2 * radius + 1,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Intersection of two rectangles
    ///
    /// Disjoint inputs produce a rectangle with a non-positive extent,
    /// which `is_empty` reports.
    pub fn clip(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let w = (self.x + self.w).min(other.x + other.w) - x;
        let h = (self.y + self.h).min(other.y + other.h) - y;
        Rect { x, y, w, h }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.w && p.y >= self.y && p.y < self.y + self.h
    }
}

/// Index at which `item` can be inserted into `sorted` keeping it sorted
///
/// Equal elements stay ahead of the inserted one.
pub fn sorted_insert_index(sorted: &[i32], item: i32) -> usize {
    sorted.partition_point(|&v| v <= item)
}

/// Inserts `item` into an ascending vector in place
pub fn insert_sorted(sorted: &mut Vec<i32>, item: i32) {
    let index = sorted_insert_index(sorted, item);
    sorted.insert(index, item);
}
