//! Grid Coordinates and Gem Handles
//!
//! `GridIndex` is the logical (lane, node) coordinate of a cell.
//! `GemId` is a non-owning handle into the grid's gem arena.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Logical grid coordinate.
///
/// `x` is the lane index, `y` the node index inside the lane.
/// Ordered by `x` then `y`, which is the column-major scan order
/// of the position map.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct GridIndex {
    /// Lane index
    pub x: i32,
    /// Node index within the lane
    pub y: i32,
}

impl GridIndex {
    /// Coordinate of a gem that is not attached to any node.
    pub const UNPLACED: Self = Self { x: -1, y: -1 };

    /// Create a new coordinate.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Whether this is a real cell coordinate (both components non-negative).
    #[inline]
    pub fn is_placed(self) -> bool {
        self.x >= 0 && self.y >= 0
    }

    /// Coordinate shifted by `(dx, dy)`.
    #[inline]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Whether `other` is one step away along exactly one axis.
    pub fn is_adjacent(self, other: Self) -> bool {
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        dx + dy == 1
    }
}

impl fmt::Debug for GridIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl fmt::Display for GridIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for GridIndex {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Handle to a gem owned by the grid.
///
/// The `epoch` is bumped every time the grid is cleared, so handles
/// taken before a clear never resolve to a gem of the new roster.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GemId {
    pub(crate) slot: u32,
    pub(crate) epoch: u32,
}

impl GemId {
    /// Slot in the gem arena.
    #[inline]
    pub fn slot(self) -> u32 {
        self.slot
    }

    /// Grid generation this handle belongs to.
    #[inline]
    pub fn epoch(self) -> u32 {
        self.epoch
    }
}

impl fmt::Debug for GemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gem#{}@{}", self.slot, self.epoch)
    }
}

impl fmt::Display for GemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.slot)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_unplaced_sentinel() {
        assert!(!GridIndex::UNPLACED.is_placed());
        assert!(GridIndex::new(0, 0).is_placed());
        assert!(!GridIndex::new(3, -1).is_placed());
    }

    #[test]
    fn test_adjacency() {
        let c = GridIndex::new(2, 2);
        assert!(c.is_adjacent(c.offset(1, 0)));
        assert!(c.is_adjacent(c.offset(0, -1)));
        assert!(!c.is_adjacent(c.offset(1, 1)));
        assert!(!c.is_adjacent(c));
    }

    #[test]
    fn test_ordering_is_lane_major() {
        // BTreeMap iteration walks a lane fully before the next one
        let mut map = BTreeMap::new();
        map.insert(GridIndex::new(1, 0), 'c');
        map.insert(GridIndex::new(0, 1), 'b');
        map.insert(GridIndex::new(0, 0), 'a');

        let order: String = map.values().collect();
        assert_eq!(order, "abc");
    }
}
