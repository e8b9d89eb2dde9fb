//! Grid Events
//!
//! Everything the presentation layer may react to, recorded in the order
//! the simulation produced it. Gem-level notices are folded in as
//! `GridEventData::Gem`.

use serde::{Serialize, Deserialize};

use super::gem::GemNotice;
use super::index::{GemId, GridIndex};

/// Grid event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GridEventData {
    /// Grid (re)built with the given footprint
    GridInit {
        /// Number of lanes
        lanes: i32,
        /// Nodes per lane
        lane_length: i32,
    },

    /// Every gem, lane and pool was dropped
    GridCleared,

    /// A gem was spawned, either while building the grid or out of the recycler
    GemSpawned {
        /// Spawned gem
        gem: GemId,
        /// Part of grid initialization
        grid_init: bool,
    },

    /// A gem finished its deletion and entered the recycler
    GemDeleted {
        /// Deleted gem
        gem: GemId,
        /// Cell it was removed from
        index: GridIndex,
    },

    /// Two gems left their nodes to trade places
    SwapStarted {
        /// Gem that was requested first
        first: GemId,
        /// Its partner
        second: GemId,
    },

    /// A swap reached completion
    SwapEnded {
        /// The swap produced a match
        matched: bool,
        /// Cell of the second gem
        from: GridIndex,
        /// Cell of the first gem
        to: GridIndex,
    },

    /// A swap was dropped because a gem vanished or may no longer move
    SwapAborted {
        /// Gem that was requested first
        first: GemId,
        /// Its partner
        second: GemId,
    },

    /// A match was accepted for destruction
    MatchDestroyed {
        /// Cells of the match
        positions: Vec<GridIndex>,
        /// The match overlaps recent swap targets
        from_swap: bool,
    },

    /// Something happened to a single gem
    Gem {
        /// Affected gem
        gem: GemId,
        /// What happened
        notice: GemNotice,
    },
}

/// A grid event with timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridEvent {
    /// Tick when the event occurred
    pub tick: u64,

    /// Gem involved, if any
    pub gem: Option<GemId>,

    /// Event data
    pub data: GridEventData,
}

impl GridEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GridEventData) -> Self {
        let gem = match &data {
            GridEventData::GemSpawned { gem, .. } => Some(*gem),
            GridEventData::GemDeleted { gem, .. } => Some(*gem),
            GridEventData::SwapStarted { first, .. } => Some(*first),
            GridEventData::SwapAborted { first, .. } => Some(*first),
            GridEventData::Gem { gem, .. } => Some(*gem),
            _ => None,
        };

        Self { tick, gem, data }
    }

    /// Create grid init event.
    pub fn grid_init(tick: u64, lanes: i32, lane_length: i32) -> Self {
        Self::new(tick, GridEventData::GridInit { lanes, lane_length })
    }

    /// Create grid cleared event.
    pub fn grid_cleared(tick: u64) -> Self {
        Self::new(tick, GridEventData::GridCleared)
    }

    /// Create gem spawned event.
    pub fn gem_spawned(tick: u64, gem: GemId, grid_init: bool) -> Self {
        Self::new(tick, GridEventData::GemSpawned { gem, grid_init })
    }

    /// Create gem deleted event.
    pub fn gem_deleted(tick: u64, gem: GemId, index: GridIndex) -> Self {
        Self::new(tick, GridEventData::GemDeleted { gem, index })
    }

    /// Create swap started event.
    pub fn swap_started(tick: u64, first: GemId, second: GemId) -> Self {
        Self::new(tick, GridEventData::SwapStarted { first, second })
    }

    /// Create swap ended event.
    pub fn swap_ended(tick: u64, matched: bool, from: GridIndex, to: GridIndex) -> Self {
        Self::new(tick, GridEventData::SwapEnded { matched, from, to })
    }

    /// Create swap aborted event.
    pub fn swap_aborted(tick: u64, first: GemId, second: GemId) -> Self {
        Self::new(tick, GridEventData::SwapAborted { first, second })
    }

    /// Create match destroyed event.
    pub fn match_destroyed(tick: u64, positions: Vec<GridIndex>, from_swap: bool) -> Self {
        Self::new(tick, GridEventData::MatchDestroyed { positions, from_swap })
    }

    /// Wrap a gem notice.
    pub fn gem(tick: u64, gem: GemId, notice: GemNotice) -> Self {
        Self::new(tick, GridEventData::Gem { gem, notice })
    }

    /// The wrapped gem notice, if this is one.
    pub fn notice(&self) -> Option<&GemNotice> {
        match &self.data {
            GridEventData::Gem { notice, .. } => Some(notice),
            _ => None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
