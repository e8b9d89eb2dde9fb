//! Grid Lane
//!
//! An ordered column of nodes. Empty nodes pull the gem resting on the
//! node after them; the last node, or a node that waited too long, pulls
//! straight from the grid's recycler.

use crate::core::hash::StateHasher;
use crate::core::vec3::Vec3;
use super::config::GridConfig;
use super::gem::GemArena;
use super::grid::GridStore;
use super::hooks::GridHooks;
use super::index::{GemId, GridIndex};
use super::layout::GridLayout;
use super::node::{Node, NodeLanding, PopMethod};

/// A column of nodes.
#[derive(Clone, Debug)]
pub struct Lane {
    index: i32,
    location: Vec3,
    recycler_location: Vec3,
    nodes: Vec<Node>,
}

impl Lane {
    /// Build lane `index` with `length` nodes.
    ///
    /// The first node pops gems from the lane's beginning and the last
    /// from its end, unless `for_all` applies `inner_pop` everywhere.
    pub fn new(
        layout: &GridLayout,
        config: &GridConfig,
        index: i32,
        length: i32,
        inner_pop: PopMethod,
        for_all: bool,
    ) -> Self {
        let nodes = (0..length)
            .map(|y| {
                let pop = if for_all {
                    inner_pop
                } else if y == 0 {
                    PopMethod::FromBeginOfLane
                } else if y == length - 1 {
                    PopMethod::FromEndOfLane
                } else {
                    inner_pop
                };
                let node_index = GridIndex::new(index, y);
                Node::new(node_index, layout.node_location(node_index), pop, config)
            })
            .collect();

        Self {
            index,
            location: layout.lane_location(index),
            recycler_location: layout.recycler_location(index),
            nodes,
        }
    }

    /// Lane index.
    #[inline]
    pub fn index(&self) -> i32 {
        self.index
    }

    /// World position of node 0.
    #[inline]
    pub fn location(&self) -> Vec3 {
        self.location
    }

    /// Where gems pulled from the recycler appear.
    #[inline]
    pub fn recycler_location(&self) -> Vec3 {
        self.recycler_location
    }

    /// Nodes in order.
    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node `y`, if in range.
    #[inline]
    pub fn node(&self, y: i32) -> Option<&Node> {
        usize::try_from(y).ok().and_then(|y| self.nodes.get(y))
    }

    /// Node `y`, mutably.
    #[inline]
    pub fn node_mut(&mut self, y: i32) -> Option<&mut Node> {
        usize::try_from(y).ok().and_then(move |y| self.nodes.get_mut(y))
    }

    /// Number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the lane has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find a gem for the node after `below`.
    ///
    /// With `Some(y)` and a node `y + 1` present, that node's gem is
    /// released (if it may move) and nothing else is tried. Otherwise the
    /// grid recycler is asked and the gem is moved to the lane's recycler
    /// location. The flag is true for recycler gems.
    pub fn gem_cascade(
        &mut self,
        below: Option<usize>,
        delta: f32,
        store: &mut GridStore,
        hooks: &mut dyn GridHooks,
    ) -> Option<(GemId, bool)> {
        if let Some(next) = below.map(|y| y + 1).filter(|&next| next < self.nodes.len()) {
            return self.nodes[next]
                .detach_gem(&mut store.gems, &mut store.map, false)
                .map(|id| (id, false));
        }

        let id = store.recycled_gem(delta, hooks)?;
        if let Some(gem) = store.gems.get_mut(id) {
            gem.set_location(self.recycler_location);
        }
        Some((id, true))
    }

    /// Refill node `y` if it is empty.
    pub fn request_gem(
        &mut self,
        y: usize,
        delta: f32,
        store: &mut GridStore,
        layout: &GridLayout,
        hooks: &mut dyn GridHooks,
    ) {
        let Some(node) = self.nodes.get(y) else {
            return;
        };
        if node.gem().is_some() {
            return;
        }

        let direct = node.grid_request_due() || node.gem_from_grid_only;
        let found = self.gem_cascade(if direct { None } else { Some(y) }, delta, store, hooks);

        let node = &mut self.nodes[y];
        node.record_request(found.is_some(), delta);
        if let Some((id, from_grid)) = found {
            if let Some(gem) = store.gems.get_mut(id) {
                node.attach_gem(gem, from_grid, &mut store.map, layout);
            }
        }
    }

    /// Tick every node: refill, then move. Landings are appended to `landings`.
    pub fn tick_nodes(
        &mut self,
        delta: f32,
        store: &mut GridStore,
        layout: &GridLayout,
        hooks: &mut dyn GridHooks,
        landings: &mut Vec<NodeLanding>,
    ) {
        for y in 0..self.nodes.len() {
            self.request_gem(y, delta, store, layout, hooks);
            if let Some(landing) = self.nodes[y].move_gem_to_node(&mut store.gems, layout, delta) {
                landings.push(landing);
            }
        }
    }

    /// Push every resting gem of the lane.
    pub fn add_force(&mut self, gems: &mut GemArena, force: Vec3) {
        for node in &mut self.nodes {
            node.add_impulse(gems, force);
        }
    }

    /// Push resting gems away from `center`, fading linearly to zero at `radius`.
    pub fn add_radial_force(&mut self, gems: &mut GemArena, center: Vec3, radius: f32, max_intensity: f32) {
        for node in &mut self.nodes {
            let offset = node.location() - center;
            let distance = offset.length();
            if distance >= radius {
                continue;
            }
            let intensity = (1.0 - (distance / radius).clamp(0.0, 1.0)) * max_intensity;
            node.add_impulse(gems, offset.safe_normal() * intensity);
        }
    }

    /// Hash every node.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_i32(self.index);
        for node in &self.nodes {
            node.hash_into(hasher);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
