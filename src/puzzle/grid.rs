//! Grid
//!
//! The orchestrator. Owns the gem arena, the lanes, the coordinate map
//! and the deletion and recycling pools, and applies every structural
//! change so that map, nodes and gems agree on who sits where.
//!
//! Swap handling lives in `swap.rs`, match detection in `matching.rs`
//! and the per-tick pipeline in `tick.rs`; all of them work on `Grid`.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info};
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::core::hash::{compute_state_hash, StateHash, StateHasher};
use crate::core::vec3::Vec3;
use super::capability::GemAttachment;
#[cfg(test)]
use super::capability::GemComparator;
use super::config::{validate_grid_size, validate_node_size, ConfigError, GridConfig, GridSize, NodeSize};
use super::events::GridEvent;
use super::gem::{Gem, GemArena, GemNotice, GemState};
use super::hooks::GridHooks;
use super::index::{GemId, GridIndex};
use super::lane::Lane;
use super::layout::GridLayout;
use super::node::{Node, NodeLanding, PopMethod};
use super::swap::GemSwap;

// =============================================================================
// GEM MAP
// =============================================================================

/// Coordinate to occupant map.
///
/// Holds a key for every cell of the grid; only existing keys can be
/// written, so a stray coordinate never grows the map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GemMap {
    cells: BTreeMap<GridIndex, Option<GemId>>,
}

impl GemMap {
    /// One empty cell per coordinate of `layout`.
    pub fn for_layout(layout: &GridLayout) -> Self {
        Self {
            cells: layout.cells().map(|index| (index, None)).collect(),
        }
    }

    /// Occupant of `index`.
    #[inline]
    pub fn get(&self, index: GridIndex) -> Option<GemId> {
        self.cells.get(&index).copied().flatten()
    }

    /// Whether `index` is a cell of the grid.
    #[inline]
    pub fn contains_cell(&self, index: GridIndex) -> bool {
        self.cells.contains_key(&index)
    }

    pub(crate) fn set(&mut self, index: GridIndex, gem: Option<GemId>) {
        if let Some(slot) = self.cells.get_mut(&index) {
            *slot = gem;
        }
    }

    /// Every cell in coordinate order.
    pub fn iter(&self) -> impl Iterator<Item = (GridIndex, Option<GemId>)> + '_ {
        self.cells.iter().map(|(&index, &gem)| (index, gem))
    }

    /// Occupied cells in coordinate order.
    pub fn occupied(&self) -> impl Iterator<Item = (GridIndex, GemId)> + '_ {
        self.cells.iter().filter_map(|(&index, &gem)| gem.map(|gem| (index, gem)))
    }

    /// Cell holding `gem`.
    pub fn position_of(&self, gem: GemId) -> Option<GridIndex> {
        self.occupied().find(|&(_, id)| id == gem).map(|(index, _)| index)
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the map has no cells.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Drop every cell.
    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Which pool a live gem is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GemPool {
    /// On the board or travelling to a node
    Active,
    /// Matched, waiting for its countdown
    PendingDeletion,
    /// Hidden and available for reuse
    Recycled,
}

/// Gem storage shared between the grid and its lanes.
#[derive(Debug, Default)]
pub struct GridStore {
    pub(crate) gems: GemArena,
    pub(crate) map: GemMap,
    pub(crate) recycler: Vec<GemId>,
    pub(crate) pending: Vec<GemId>,
    pub(crate) swap_history: Vec<GridIndex>,
    pub(crate) events: Vec<GridEvent>,
    pub(crate) tick: u64,
}

impl GridStore {
    /// Hand out the most recently recycled gem, if the hooks allow it.
    ///
    /// The gem is respawned and left in `GemState::None`; the caller
    /// places it.
    pub(crate) fn recycled_gem(&mut self, delta: f32, hooks: &mut dyn GridHooks) -> Option<GemId> {
        let id = *self.recycler.last()?;
        let gem = self.gems.get_mut(id)?;
        if !hooks.spawn_gem_condition(gem) {
            return None;
        }

        gem.update_velocity(delta);
        gem.spawn();
        hooks.on_gem_spawned(gem, false);
        gem.set_state(GemState::None);

        self.recycler.pop();
        self.emit(GridEvent::gem_spawned(self.tick, id, false));
        debug!(gem = %id, remaining = self.recycler.len(), "gem pulled from recycler");
        Some(id)
    }

    /// Record or forget a recent swap target. Unplaced coordinates are ignored.
    pub(crate) fn update_swap_history(&mut self, position: GridIndex, remove: bool) {
        if !position.is_placed() {
            return;
        }
        if remove {
            self.swap_history.retain(|&p| p != position);
        } else if !self.swap_history.contains(&position) {
            self.swap_history.push(position);
        }
    }

    /// Queue a grid event after every gem notice raised so far.
    pub(crate) fn emit(&mut self, event: GridEvent) {
        self.flush_notices();
        self.events.push(event);
    }

    /// Move queued gem notices into the event queue, in slot order.
    pub(crate) fn flush_notices(&mut self) {
        let tick = self.tick;
        for gem in self.gems.iter_mut() {
            for notice in gem.take_notices() {
                self.events.push(GridEvent::gem(tick, gem.id(), notice));
            }
        }
    }
}

// =============================================================================
// GRID
// =============================================================================

/// The puzzle grid.
pub struct Grid {
    pub(crate) config: GridConfig,
    pub(crate) layout: GridLayout,
    pub(crate) lanes: Vec<Lane>,
    pub(crate) store: GridStore,
    pub(crate) hooks: Box<dyn GridHooks>,
    pub(crate) swaps: Vec<GemSwap>,
    pub(crate) swap_exceptions: Vec<GridIndex>,
    pub(crate) last_selected: Option<GemId>,
    pub(crate) time_scale: f32,
}

#[inline]
fn lane_slot(x: i32) -> Option<usize> {
    usize::try_from(x).ok()
}

/// Node at `index` out of a borrowed lane list.
pub(crate) fn lane_node(lanes: &mut [Lane], index: GridIndex) -> Option<&mut Node> {
    lane_slot(index.x)
        .and_then(|x| lanes.get_mut(x))
        .and_then(|lane| lane.node_mut(index.y))
}

impl Grid {
    /// Validate `config` and build a grid with one recycled gem per cell.
    pub fn new(config: GridConfig, hooks: impl GridHooks + 'static) -> Result<Self, ConfigError> {
        config.validate()?;

        let layout = GridLayout::new(&config, config.grid_size, config.node_size);
        let (size, node_size) = (config.grid_size, config.node_size);
        let mut grid = Self {
            config,
            layout,
            lanes: Vec::new(),
            store: GridStore::default(),
            hooks: Box::new(hooks),
            swaps: Vec::new(),
            swap_exceptions: Vec::new(),
            last_selected: None,
            time_scale: 1.0,
        };
        grid.initialize(size, node_size)?;
        Ok(grid)
    }

    /// Rebuild the grid with a new footprint.
    ///
    /// Clears everything first. Handles taken before the call no longer
    /// resolve. Every new gem goes straight to the recycler, so the board
    /// fills through the lanes on the following ticks.
    pub fn initialize(&mut self, size: GridSize, node_size: NodeSize) -> Result<(), ConfigError> {
        validate_grid_size(size)?;
        validate_node_size(node_size)?;

        self.clear();
        self.config.grid_size = size;
        self.config.node_size = node_size;
        self.layout = GridLayout::new(&self.config, size, node_size);

        let (pop, for_all) = self.config.filling_strategy.pop_method();
        let last = size.lanes - 1;
        self.lanes = (0..size.lanes)
            .map(|x| {
                let lane_pop = if for_all {
                    pop
                } else if x == last {
                    PopMethod::FromNextLaneDirection
                } else if x == 0 {
                    PopMethod::FromLastLaneDirection
                } else {
                    pop
                };
                Lane::new(&self.layout, &self.config, x, size.lane_length, lane_pop, for_all)
            })
            .collect();

        self.store.map = GemMap::for_layout(&self.layout);

        let origin = self.layout.origin();
        for _ in 0..size.cell_count() {
            let id = self.store.gems.insert(self.config.gem);
            if let Some(gem) = self.store.gems.get_mut(id) {
                gem.set_location(origin);
                gem.custom_time_dilation = self.time_scale;
                self.hooks.on_gem_spawned(gem, true);
            }
            self.store.emit(GridEvent::gem_spawned(self.store.tick, id, true));
            self.delete_gem_internal(id);
        }

        self.store
            .emit(GridEvent::grid_init(self.store.tick, size.lanes, size.lane_length));
        info!(
            lanes = size.lanes,
            lane_length = size.lane_length,
            gems = self.store.gems.len(),
            "grid initialized"
        );
        Ok(())
    }

    /// Drop every gem, lane and pool.
    pub fn clear(&mut self) {
        let had_gems = !self.store.gems.is_empty();
        self.store.flush_notices();

        self.lanes.clear();
        self.store.gems.clear();
        self.store.map.clear();
        self.store.recycler.clear();
        self.store.pending.clear();
        self.store.swap_history.clear();
        self.swaps.clear();
        self.swap_exceptions.clear();
        self.last_selected = None;

        if had_gems {
            self.store.emit(GridEvent::grid_cleared(self.store.tick));
            info!(epoch = self.store.gems.epoch(), "grid cleared");
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Active configuration.
    #[inline]
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// World geometry.
    #[inline]
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Lanes in order.
    #[inline]
    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    /// Coordinate map.
    #[inline]
    pub fn map(&self) -> &GemMap {
        &self.store.map
    }

    /// Ticks simulated so far.
    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.store.tick
    }

    /// Gem registered at `index`.
    #[inline]
    pub fn gem_at(&self, index: GridIndex) -> Option<GemId> {
        self.store.map.get(index)
    }

    /// Node at `index`.
    pub fn node_at(&self, index: GridIndex) -> Option<&Node> {
        lane_slot(index.x)
            .and_then(|x| self.lanes.get(x))
            .and_then(|lane| lane.node(index.y))
    }

    /// Resolve a handle.
    #[inline]
    pub fn gem(&self, id: GemId) -> Option<&Gem> {
        self.store.gems.get(id)
    }

    /// Resolve a handle mutably.
    #[inline]
    pub fn gem_mut(&mut self, id: GemId) -> Option<&mut Gem> {
        self.store.gems.get_mut(id)
    }

    /// Every gem of the current roster, in slot order.
    pub fn gems(&self) -> impl Iterator<Item = &Gem> {
        self.store.gems.iter()
    }

    /// Whether `id` is waiting for its deletion countdown.
    #[inline]
    pub fn is_gem_pending_deletion(&self, id: GemId) -> bool {
        self.store.pending.contains(&id)
    }

    /// Pool `id` is in, or `None` for a stale handle.
    pub fn gem_pool(&self, id: GemId) -> Option<GemPool> {
        if !self.store.gems.contains(id) {
            None
        } else if self.store.recycler.contains(&id) {
            Some(GemPool::Recycled)
        } else if self.store.pending.contains(&id) {
            Some(GemPool::PendingDeletion)
        } else {
            Some(GemPool::Active)
        }
    }

    /// Recycled gems; the last one is handed out next.
    #[inline]
    pub fn recycler(&self) -> &[GemId] {
        &self.store.recycler
    }

    /// Gems waiting for their deletion countdown.
    #[inline]
    pub fn pending_deletion(&self) -> &[GemId] {
        &self.store.pending
    }

    /// Recent swap targets, used to prioritize matches.
    #[inline]
    pub fn swap_history(&self) -> &[GridIndex] {
        &self.store.swap_history
    }

    /// World step between consecutive nodes of a lane.
    #[inline]
    pub fn node_direction(&self) -> Vec3 {
        self.layout.node_direction()
    }

    /// World step between consecutive lanes.
    #[inline]
    pub fn lane_direction(&self) -> Vec3 {
        self.layout.lane_direction()
    }

    /// Current time scale.
    #[inline]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Scale the grid clock and every gem's own clock.
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale;
        for gem in self.store.gems.iter_mut() {
            gem.custom_time_dilation = scale;
        }
    }

    /// The grid's hooks.
    pub fn hooks(&self) -> &dyn GridHooks {
        self.hooks.as_ref()
    }

    // -------------------------------------------------------------------------
    // Deletion
    // -------------------------------------------------------------------------

    /// Mark `id` for deletion.
    ///
    /// No-op for stale handles, gems already pending or recycled, and
    /// gems an attachment refuses to let go.
    pub fn delete_gem(&mut self, id: GemId) {
        let store = &mut self.store;
        if store.pending.contains(&id) || store.recycler.contains(&id) {
            return;
        }
        let Some(gem) = store.gems.get_mut(id) else {
            return;
        };
        if !gem.can_delete() {
            return;
        }

        store.pending.push(id);
        gem.mark_for_deletion();
        gem.set_state(GemState::PendingDeletion);
        debug!(gem = %id, index = %gem.grid_index(), "gem marked for deletion");
    }

    /// Move `id` to the recycler right away.
    ///
    /// Returns false for stale handles and gems already recycled.
    pub(crate) fn delete_gem_internal(&mut self, id: GemId) -> bool {
        let Some(index) = self.store.gems.get(id).map(Gem::grid_index) else {
            return false;
        };
        if self.store.recycler.contains(&id) {
            return false;
        }

        self.store.update_swap_history(index, true);
        self.store.recycler.push(id);
        self.store.map.set(index, None);
        self.store.emit(GridEvent::gem_deleted(self.store.tick, id, index));
        if let Some(gem) = self.store.gems.get_mut(id) {
            gem.finalize_deletion();
        }

        let Grid { lanes, store, .. } = self;
        if let Some(node) = lane_node(lanes, index) {
            if node.gem() == Some(id) {
                node.detach_gem(&mut store.gems, &mut store.map, true);
            }
        }
        true
    }

    /// Advance deletion countdowns and recycle the gems that ran out.
    pub(crate) fn handle_gems_to_delete(&mut self, delta: f32) {
        let scaled = delta * self.time_scale;
        for i in (0..self.store.pending.len()).rev() {
            let id = self.store.pending[i];
            let expired = match self.store.gems.get_mut(id) {
                Some(gem) => gem.update_deletion_countdown(scaled),
                None => true,
            };
            if expired {
                self.delete_gem_internal(id);
                self.store.pending.remove(i);
            }
        }
    }

    /// Hand out a recycled gem, if the hooks allow it.
    pub fn recycled_gem(&mut self, delta: f32) -> Option<GemId> {
        self.store.recycled_gem(delta, self.hooks.as_mut())
    }

    // -------------------------------------------------------------------------
    // Motion
    // -------------------------------------------------------------------------

    /// Refill and move every node, then resolve landings.
    pub(crate) fn tick_nodes(&mut self, delta: f32) {
        let node_delta = delta * self.time_scale;
        let mut landings = Vec::new();
        {
            let Grid { lanes, store, layout, hooks, .. } = self;
            for lane in lanes.iter_mut() {
                lane.tick_nodes(node_delta, store, layout, hooks.as_mut(), &mut landings);
            }
        }
        for landing in landings {
            self.resolve_landing(landing);
        }
    }

    fn resolve_landing(&mut self, landing: NodeLanding) {
        let other = if landing.target != landing.node {
            self.store.map.get(landing.target).filter(|&other| other != landing.gem)
        } else {
            None
        };
        let Some(gem) = self.store.gems.get_mut(landing.gem) else {
            return;
        };

        gem.notify(GemNotice::Landed {
            on: landing.target,
            force: landing.force,
        });
        if let Some(other) = other {
            for attachment in gem.live_attachments() {
                attachment.on_gem_hit_another_one(landing.gem, other);
            }
        }

        #[cfg(feature = "debug-tracing")]
        trace!(gem = %landing.gem, node = %landing.node, target = %landing.target, "gem landed");
    }

    /// Per-gem upkeep with each gem's own clock.
    pub(crate) fn tick_gems(&mut self, delta: f32) {
        for gem in self.store.gems.iter_mut().filter(|gem| gem.is_active()) {
            gem.prune_attachments();
            let own_delta = delta * gem.custom_time_dilation;
            gem.update_velocity(own_delta);
        }
    }

    /// Push every resting gem.
    pub fn add_force(&mut self, force: Vec3) {
        let Grid { lanes, store, .. } = self;
        for lane in lanes.iter_mut() {
            lane.add_force(&mut store.gems, force);
        }
    }

    /// Push resting gems away from `center`, fading to zero at `radius`.
    pub fn add_radial_force(&mut self, center: Vec3, radius: f32, max_intensity: f32) {
        let Grid { lanes, store, .. } = self;
        for lane in lanes.iter_mut() {
            lane.add_radial_force(&mut store.gems, center, radius, max_intensity);
        }
    }

    // -------------------------------------------------------------------------
    // Attachments
    // -------------------------------------------------------------------------

    /// Attach to a gem. False if the handle is stale or the gem refused.
    pub fn attach_to_gem(&mut self, id: GemId, attachment: &Rc<dyn GemAttachment>) -> bool {
        self.store
            .gems
            .get_mut(id)
            .is_some_and(|gem| gem.attach(attachment))
    }

    /// Detach from a gem.
    pub fn detach_from_gem(&mut self, id: GemId, attachment: &Rc<dyn GemAttachment>) {
        if let Some(gem) = self.store.gems.get_mut(id) {
            gem.detach(attachment);
        }
    }

    /// Move an attachment from one gem to another.
    ///
    /// False if either handle is stale or the target refused; in the
    /// latter case the attachment is gone from both gems.
    pub fn transfer_attachment(&mut self, from: GemId, to: GemId, attachment: &Rc<dyn GemAttachment>) -> bool {
        let Some((source, target)) = self.store.gems.pair_mut(from, to) else {
            return false;
        };
        source.detach_as(attachment, true);
        if !target.attach_as(attachment, true) {
            return false;
        }
        attachment.transfer_from_to(from, to);
        true
    }

    // -------------------------------------------------------------------------
    // Output
    // -------------------------------------------------------------------------

    /// Drain pending events, gem notices included.
    pub fn take_events(&mut self) -> Vec<GridEvent> {
        self.store.flush_notices();
        std::mem::take(&mut self.store.events)
    }

    /// Hash the whole simulation state.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.store.tick, self.time_scale, |hasher| {
            hasher.update_u32(self.store.gems.epoch());
            hasher.update_u32(self.store.gems.len() as u32);
            for gem in self.store.gems.iter() {
                gem.hash_into(hasher);
            }

            for (index, gem) in self.store.map.iter() {
                hash_index(hasher, index);
                hasher.update_u32(gem.map_or(u32::MAX, GemId::slot));
            }

            for lane in &self.lanes {
                lane.hash_into(hasher);
            }

            hash_ids(hasher, &self.store.recycler);
            hash_ids(hasher, &self.store.pending);

            hasher.update_u32(self.store.swap_history.len() as u32);
            for &index in &self.store.swap_history {
                hash_index(hasher, index);
            }

            hasher.update_u32(self.swaps.len() as u32);
            for swap in &self.swaps {
                swap.hash_into(hasher);
            }

            hasher.update_u32(self.last_selected.map_or(u32::MAX, GemId::slot));
        })
    }

    /// Put a recycled gem on `at`, settled and idle.
    #[cfg(test)]
    pub(crate) fn place_gem_for_test(
        &mut self,
        at: GridIndex,
        comparator: Option<Box<dyn GemComparator>>,
    ) -> Option<GemId> {
        let Grid { lanes, store, layout, .. } = self;
        let node = lane_node(lanes, at)?;
        let id = *store.recycler.last()?;
        let gem = store.gems.get_mut(id)?;
        store.recycler.pop();

        gem.spawn();
        gem.set_comparator(comparator);
        node.attach_gem(gem, false, &mut store.map, layout);

        let location = node.location();
        gem.set_location(location);
        gem.update_velocity(1.0);
        gem.update_velocity(1.0);
        gem.set_state(GemState::Idle);
        node.settle_from(location);
        Some(id)
    }
}

fn hash_index(hasher: &mut StateHasher, index: GridIndex) {
    hasher.update_i32(index.x);
    hasher.update_i32(index.y);
}

fn hash_ids(hasher: &mut StateHasher, ids: &[GemId]) {
    hasher.update_u32(ids.len() as u32);
    for id in ids {
        hasher.update_u32(id.slot());
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("size", &self.layout.size())
            .field("tick", &self.store.tick)
            .field("gems", &self.store.gems.len())
            .field("recycled", &self.store.recycler.len())
            .field("pending", &self.store.pending.len())
            .field("swaps", &self.swaps.len())
            .field("time_scale", &self.time_scale)
            .finish()
    }
}

// =============================================================================
// TEST SUPPORT
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use std::any::Any;

    use super::*;
    use crate::core::hash::StateHasher;

    /// Cell left empty by `grid_from_kinds`.
    pub const EMPTY: u8 = u8::MAX;

    /// Colour comparator for tests.
    #[derive(Debug)]
    pub struct Kind(pub u8);

    impl GemComparator for Kind {
        fn gem_equals(&self, other: &dyn GemComparator) -> bool {
            other.as_any().downcast_ref::<Kind>().is_some_and(|k| k.0 == self.0)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn hash_into(&self, hasher: &mut StateHasher) {
            hasher.update_u8(self.0);
        }
    }

    /// Hooks whose recycler never hands anything out.
    #[derive(Debug, Default)]
    pub struct NoRefill;

    impl GridHooks for NoRefill {
        fn spawn_gem_condition(&mut self, _gem: &Gem) -> bool {
            false
        }
    }

    /// Settled grid; `columns[x][y]` is the kind at `(x, y)`.
    pub fn grid_from_kinds(columns: &[&[u8]], config: GridConfig) -> Grid {
        grid_from_kinds_with(columns, config, NoRefill)
    }

    /// Like `grid_from_kinds` with custom hooks.
    pub fn grid_from_kinds_with(columns: &[&[u8]], mut config: GridConfig, hooks: impl GridHooks + 'static) -> Grid {
        config.grid_size = GridSize::new(columns.len() as i32, columns[0].len() as i32);
        let mut grid = Grid::new(config, hooks).unwrap();
        for (x, column) in columns.iter().enumerate() {
            for (y, &kind) in column.iter().enumerate() {
                if kind == EMPTY {
                    continue;
                }
                grid.place_gem_for_test(GridIndex::new(x as i32, y as i32), Some(Box::new(Kind(kind))))
                    .unwrap();
            }
        }
        grid.take_events();
        grid
    }
}

// =============================================================================
// TESTS
// =============================================================================
