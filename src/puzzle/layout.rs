//! Grid Spatial Layout
//!
//! Maps logical coordinates to world space. Lanes advance along the lane
//! direction, nodes inside a lane along the node direction, and the whole
//! footprint is centred on the grid origin.

use crate::core::vec3::Vec3;
use super::config::{GridConfig, GridSize, NodeSize};
use super::index::GridIndex;

/// World-space frame of an initialized grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    size: GridSize,
    origin: Vec3,
    node_dir: Vec3,
    lane_dir: Vec3,
    first_lane: Vec3,
    recycling_zone_distance: f32,
}

impl GridLayout {
    /// Build the frame for `size` cells spaced by `node_size`.
    ///
    /// Axes are normalized here; spacing comes only from `node_size`.
    pub fn new(config: &GridConfig, size: GridSize, node_size: NodeSize) -> Self {
        let node_dir = config.node_axis.safe_normal() * node_size.node_spacing;
        let lane_dir = config.lane_axis.safe_normal() * node_size.lane_spacing;

        // Centre the footprint on the origin
        let half_lanes = (size.lanes - 1).max(0) as f32 * 0.5;
        let half_nodes = (size.lane_length - 1).max(0) as f32 * 0.5;
        let first_lane = config.origin - lane_dir * half_lanes - node_dir * half_nodes;

        Self {
            size,
            origin: config.origin,
            node_dir,
            lane_dir,
            first_lane,
            recycling_zone_distance: config.recycling_zone_distance,
        }
    }

    /// Grid footprint.
    #[inline]
    pub fn size(&self) -> GridSize {
        self.size
    }

    /// Grid centre.
    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Offset between consecutive nodes of a lane.
    #[inline]
    pub fn node_direction(&self) -> Vec3 {
        self.node_dir
    }

    /// Offset between consecutive lanes.
    #[inline]
    pub fn lane_direction(&self) -> Vec3 {
        self.lane_dir
    }

    /// Unit normal of the grid plane (`node_dir x lane_dir`).
    #[inline]
    pub fn grid_normal(&self) -> Vec3 {
        self.node_dir.cross(self.lane_dir).safe_normal()
    }

    /// Extra distance used by the spawn offsets.
    #[inline]
    pub fn recycling_zone_distance(&self) -> f32 {
        self.recycling_zone_distance
    }

    /// Whether `index` is inside the footprint.
    #[inline]
    pub fn contains(&self, index: GridIndex) -> bool {
        index.x >= 0 && index.y >= 0 && index.x < self.size.lanes && index.y < self.size.lane_length
    }

    /// World position of lane `x` (its node 0).
    #[inline]
    pub fn lane_location(&self, x: i32) -> Vec3 {
        self.first_lane + self.lane_dir * x as f32
    }

    /// World position of the node at `index`.
    #[inline]
    pub fn node_location(&self, index: GridIndex) -> Vec3 {
        self.lane_location(index.x) + self.node_dir * index.y as f32
    }

    /// Where lane `x` pulls gems out of the recycler, past its last node.
    #[inline]
    pub fn recycler_location(&self, x: i32) -> Vec3 {
        let reach = self.size.lane_length as f32 + self.recycling_zone_distance;
        self.lane_location(x) + self.node_dir * reach
    }

    /// Column `x` in node order.
    pub fn column(&self, x: i32) -> Vec<GridIndex> {
        (0..self.size.lane_length).map(|y| GridIndex::new(x, y)).collect()
    }

    /// Row `y` in lane order.
    pub fn row(&self, y: i32) -> Vec<GridIndex> {
        (0..self.size.lanes).map(|x| GridIndex::new(x, y)).collect()
    }

    /// Every cell, lane by lane.
    pub fn cells(&self) -> impl Iterator<Item = GridIndex> + '_ {
        (0..self.size.lanes).flat_map(move |x| (0..self.size.lane_length).map(move |y| GridIndex::new(x, y)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
