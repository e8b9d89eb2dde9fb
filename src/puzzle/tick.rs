//! Grid Simulation Tick
//!
//! One strictly ordered pass over the grid: input, swaps, matches,
//! deletions, node motion, gem upkeep. Given the same configuration,
//! hooks and request sequence the grid reaches the same state hash.

use super::config::{ConfigError, GameplayMode, GridConfig};
use super::events::GridEvent;
use super::grid::Grid;
use super::hooks::GridHooks;
use super::swap::SwapRequest;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GridEvent>,
    /// The request's swap was queued
    pub swap_accepted: bool,
    /// Matches destroyed this tick
    pub matches_destroyed: usize,
}

/// Run one simulation tick of `delta` seconds.
///
/// `request` is at most one input for this tick; invalid requests are
/// ignored.
pub fn tick(grid: &mut Grid, request: &SwapRequest, delta: f32) -> TickResult {
    let mut result = TickResult::default();

    // 0. Advance tick counter
    grid.store.tick += 1;

    // 1. Selection follows the request's first gem
    grid.handle_selected(request.first);

    // 2. Gameplay
    match grid.config.gameplay_mode {
        GameplayMode::ClickAndDestroy => {
            if let Some(first) = request.first {
                grid.delete_gem(first);
            }
        }
        GameplayMode::SwapGemAndMatch => {
            if let Some((first, second)) = request.pair() {
                result.swap_accepted = grid.queue_swap(first, second, request.user_made);
            }
            grid.advance_swaps(delta);
            result.matches_destroyed = grid.handle_grid_matches();
        }
    }

    // 3. Deletion countdowns and recycling
    grid.handle_gems_to_delete(delta);

    // 4. Node refill and motion
    grid.tick_nodes(delta);

    // 5. Per-gem upkeep
    grid.tick_gems(delta);

    result.events = grid.take_events();
    result
}

/// Build a grid and feed it one request per tick.
///
/// Returns the final grid and every event, initialization included.
pub fn replay_grid(
    config: GridConfig,
    hooks: impl GridHooks + 'static,
    requests: &[SwapRequest],
    delta: f32,
) -> Result<(Grid, Vec<GridEvent>), ConfigError> {
    let mut grid = Grid::new(config, hooks)?;
    let mut all_events = grid.take_events();

    for request in requests {
        let result = tick(&mut grid, request, delta);
        all_events.extend(result.events);
    }

    Ok((grid, all_events))
}

// =============================================================================
// TESTS
// =============================================================================
