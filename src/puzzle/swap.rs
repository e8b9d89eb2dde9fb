//! Gem Swaps
//!
//! Selection tracking and the swap state machine. A swap detaches both
//! gems from their nodes, re-attaches them crosswise, animates them along
//! the node easing, and on completion either produces a match or (for
//! player swaps) queues the reverse swap.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::easing::ease;
use crate::core::hash::StateHasher;
use super::events::GridEvent;
use super::gem::{GemNotice, GemState};
use super::grid::{lane_node, Grid};
use super::index::{GemId, GridIndex};

/// The input collaborator's request for one tick.
///
/// `first` alone selects a gem; `first` and `second` together ask for a swap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Selected gem
    pub first: Option<GemId>,
    /// Swap partner
    pub second: Option<GemId>,
    /// Made by the player; unmatched player swaps are reversed
    pub user_made: bool,
}

impl SwapRequest {
    /// No input.
    pub const NONE: Self = Self {
        first: None,
        second: None,
        user_made: false,
    };

    /// Player request to swap two gems.
    pub fn between(first: GemId, second: GemId) -> Self {
        Self {
            first: Some(first),
            second: Some(second),
            user_made: true,
        }
    }

    /// Select a single gem.
    pub fn select(gem: GemId) -> Self {
        Self {
            first: Some(gem),
            ..Self::NONE
        }
    }

    /// Both gems, if this is a swap request.
    pub fn pair(&self) -> Option<(GemId, GemId)> {
        self.first.zip(self.second)
    }
}

/// An in-flight swap.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GemSwap {
    /// Gem that was requested first
    pub first: GemId,
    /// Its partner
    pub second: GemId,
    /// Progress; 0 before the gems left their nodes, >= 1 when done
    pub completion: f32,
    /// Asked for by the player; unmatched player swaps are reversed
    pub user_made: bool,
}

impl GemSwap {
    /// New swap that has not started yet.
    pub fn new(first: GemId, second: GemId, user_made: bool) -> Self {
        Self {
            first,
            second,
            completion: 0.0,
            user_made,
        }
    }

    /// Whether `gem` takes part.
    #[inline]
    pub fn involves(&self, gem: GemId) -> bool {
        self.first == gem || self.second == gem
    }

    /// Hash swap progress.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.first.slot());
        hasher.update_u32(self.second.slot());
        hasher.update_f32(self.completion);
        hasher.update_bool(self.user_made);
    }
}

impl Grid {
    /// In-flight swaps, oldest first.
    #[inline]
    pub fn active_swaps(&self) -> &[GemSwap] {
        &self.swaps
    }

    /// Currently selected gem.
    #[inline]
    pub fn last_selected(&self) -> Option<GemId> {
        self.last_selected
    }

    /// Both gems exist and may move.
    pub fn is_swap_valid(&self, first: GemId, second: GemId) -> bool {
        let can_move = |id| self.gem(id).is_some_and(|gem| gem.can_move());
        can_move(first) && can_move(second)
    }

    /// Queue a swap.
    ///
    /// Refused when a gem is off the board, the gems may not swap, or one
    /// of them is already part of a swap. Both cells are recorded in the
    /// swap history.
    pub fn queue_swap(&mut self, first: GemId, second: GemId, user_made: bool) -> bool {
        if first == second || !self.is_swap_valid(first, second) {
            return false;
        }
        let (Some(a), Some(b)) = (self.gem(first), self.gem(second)) else {
            return false;
        };
        if !a.grid_index().is_placed() || !b.grid_index().is_placed() {
            return false;
        }
        if !a.can_swap() || !b.can_swap() {
            return false;
        }
        if self.swaps.iter().any(|s| s.involves(first) || s.involves(second)) {
            return false;
        }

        let (index_a, index_b) = (a.grid_index(), b.grid_index());
        self.swaps.push(GemSwap::new(first, second, user_made));
        self.store.update_swap_history(index_a, false);
        self.store.update_swap_history(index_b, false);
        debug!(first = %first, second = %second, user_made, "swap queued");
        true
    }

    /// Move the selection to `first`.
    pub(crate) fn handle_selected(&mut self, first: Option<GemId>) {
        if self.last_selected == first {
            return;
        }

        if let Some(previous) = self.last_selected.and_then(|id| self.store.gems.get_mut(id)) {
            if previous.state() == GemState::Selected {
                previous.notify(GemNotice::SelectionReleased);
                previous.set_state(GemState::Falling);
            }
        }

        if let Some(gem) = first.and_then(|id| self.store.gems.get_mut(id)) {
            if gem.state() == GemState::Idle && gem.can_select() {
                gem.notify(GemNotice::Selected);
                gem.set_state(GemState::Selected);
            }
        }

        self.last_selected = first;
    }

    /// Advance every in-flight swap by `delta` seconds.
    ///
    /// Runs newest first; swaps queued while finishing (reversals) start
    /// on the next tick. Positions of successful swap matches are added
    /// to the grid's swap exceptions.
    pub(crate) fn advance_swaps(&mut self, delta: f32) {
        for i in (0..self.swaps.len()).rev() {
            let swap = self.swaps[i];

            if !self.is_swap_valid(swap.first, swap.second) {
                self.abort_swap(i);
                continue;
            }
            let (Some(index_a), Some(index_b)) = (
                self.gem(swap.first).map(|g| g.grid_index()),
                self.gem(swap.second).map(|g| g.grid_index()),
            ) else {
                self.abort_swap(i);
                continue;
            };
            if self.node_at(index_a).is_none() || self.node_at(index_b).is_none() {
                self.abort_swap(i);
                continue;
            }

            if swap.completion >= 1.0 {
                self.finish_swap(i, index_a, index_b);
            } else if swap.completion <= 0.0 {
                self.begin_swap(i, index_a, index_b, delta);
            } else {
                self.animate_swap(i, index_a, index_b, delta);
            }
        }
    }

    fn abort_swap(&mut self, i: usize) {
        let swap = self.swaps.remove(i);
        for id in [swap.first, swap.second] {
            let Some(gem) = self.store.gems.get_mut(id) else {
                continue;
            };
            let index = gem.grid_index();
            // Recycled and doomed gems keep their state
            if gem.is_active() && gem.state() != GemState::PendingDeletion {
                gem.set_state(GemState::Falling);
            }
            self.store.update_swap_history(index, true);
        }
        self.store
            .emit(GridEvent::swap_aborted(self.store.tick, swap.first, swap.second));
        debug!(first = %swap.first, second = %swap.second, "swap aborted");
    }

    /// Gems leave their nodes and are attached crosswise.
    fn begin_swap(&mut self, i: usize, index_a: GridIndex, index_b: GridIndex, delta: f32) {
        let swap = self.swaps[i];
        for index in [index_a, index_b] {
            let Grid { lanes, store, .. } = self;
            if let Some(node) = lane_node(lanes, index) {
                node.detach_gem(&mut store.gems, &mut store.map, true);
            }
        }

        for (index, id) in [(index_a, swap.second), (index_b, swap.first)] {
            let Grid { lanes, store, layout, .. } = self;
            if let (Some(node), Some(gem)) = (lane_node(lanes, index), store.gems.get_mut(id)) {
                node.attach_gem(gem, false, &mut store.map, layout);
            }
        }

        for id in [swap.first, swap.second] {
            if let Some(gem) = self.store.gems.get_mut(id) {
                gem.set_state(GemState::Swapping);
            }
        }
        self.swaps[i].completion += delta;
        self.store
            .emit(GridEvent::swap_started(self.store.tick, swap.first, swap.second));
    }

    /// Slide both gems toward their new nodes.
    ///
    /// `index_a` is where the first gem now lives, i.e. where the second
    /// gem came from.
    fn animate_swap(&mut self, i: usize, index_a: GridIndex, index_b: GridIndex, delta: f32) {
        let swap = self.swaps[i];
        let (Some(node_a), Some(node_b)) = (self.node_at(index_a), self.node_at(index_b)) else {
            return;
        };
        let (from_a, to_a, easing_a) = (node_b.location(), node_a.location(), node_a.easing);
        let (from_b, to_b, easing_b) = (node_a.location(), node_b.location(), node_b.easing);

        if let Some(gem) = self.store.gems.get_mut(swap.first) {
            gem.set_state(GemState::Swapping);
            gem.set_location(from_a.lerp(to_a, ease(easing_a, swap.completion)));
        }
        if let Some(gem) = self.store.gems.get_mut(swap.second) {
            gem.set_state(GemState::Swapping);
            gem.set_location(from_b.lerp(to_b, ease(easing_b, swap.completion)));
        }

        self.swaps[i].completion += delta * self.config.swap_speed * self.time_scale;
    }

    /// Settle both gems and look for matches around them.
    fn finish_swap(&mut self, i: usize, index_a: GridIndex, index_b: GridIndex) {
        let swap = self.swaps[i];

        for (id, index) in [(swap.first, index_a), (swap.second, index_b)] {
            let Grid { lanes, store, .. } = self;
            let Some(gem) = store.gems.get_mut(id) else {
                continue;
            };
            gem.set_state(GemState::Falling);
            let location = gem.location();
            if let Some(node) = lane_node(lanes, index) {
                node.settle_from(location);
            }
        }

        let mut positions = Vec::new();
        let matched_a = self.check_match_around_position(index_a, &mut positions);
        let matched_b = self.check_match_around_position(index_b, &mut positions);
        let matched = matched_a || matched_b;

        if !matched {
            if swap.user_made {
                self.swaps.push(GemSwap::new(swap.second, swap.first, false));
            }
            self.store.update_swap_history(index_b, true);
            self.store.update_swap_history(index_a, true);
        }
        for position in positions {
            if !self.swap_exceptions.contains(&position) {
                self.swap_exceptions.push(position);
            }
        }

        self.store
            .emit(GridEvent::swap_ended(self.store.tick, matched, index_b, index_a));
        self.swaps.remove(i);
        debug!(first = %swap.first, second = %swap.second, matched, "swap finished");
    }
}

// =============================================================================
// TESTS
// =============================================================================
