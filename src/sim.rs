//! Headless Session
//!
//! Runs the grid without a presentation layer: every spawned gem gets a
//! seeded random kind, a script issues swaps by cell coordinate, and the
//! recorded requests replay to the same state hash.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::hash::{StateHash, StateHasher};
use crate::core::rng::DeterministicRng;
use crate::puzzle::capability::GemComparator;
use crate::puzzle::config::{ConfigError, GridConfig, GridSize};
use crate::puzzle::events::GridEventData;
use crate::puzzle::gem::Gem;
use crate::puzzle::grid::Grid;
use crate::puzzle::hooks::GridHooks;
use crate::puzzle::index::GridIndex;
use crate::puzzle::swap::SwapRequest;
use crate::puzzle::tick::{replay_grid, tick};

// =============================================================================
// PALETTE
// =============================================================================

/// Gems are equal when their kinds are.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KindComparator {
    /// Colour index
    pub kind: u8,
}

impl KindComparator {
    /// Create a comparator for `kind`.
    pub const fn new(kind: u8) -> Self {
        Self { kind }
    }
}

impl GemComparator for KindComparator {
    fn gem_equals(&self, other: &dyn GemComparator) -> bool {
        other
            .as_any()
            .downcast_ref::<KindComparator>()
            .is_some_and(|o| o.kind == self.kind)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u8(self.kind);
    }
}

/// Paints every spawned gem with a seeded random kind.
#[derive(Clone, Debug)]
pub struct PaletteHooks {
    rng: DeterministicRng,
    kinds: u8,
}

impl PaletteHooks {
    /// `kinds` distinct colours, drawn from `seed`.
    pub fn new(seed: u64, kinds: u8) -> Self {
        Self {
            rng: DeterministicRng::new(seed),
            kinds: kinds.max(1),
        }
    }

    /// Number of colours.
    pub fn kinds(&self) -> u8 {
        self.kinds
    }
}

impl GridHooks for PaletteHooks {
    fn on_gem_spawned(&mut self, gem: &mut Gem, _grid_init: bool) {
        let kind = self.rng.next_int(u32::from(self.kinds)) as u8;
        gem.set_comparator(Some(Box::new(KindComparator::new(kind))));
    }
}

// =============================================================================
// SCRIPT
// =============================================================================

/// A swap between two cells, resolved to gems on the tick it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedSwap {
    /// Cell of the selected gem
    pub from: GridIndex,
    /// Cell of its partner
    pub to: GridIndex,
}

/// Per-tick swap requests by coordinate.
///
/// Swaps between cells that are not neighbours are skipped when the
/// session runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionScript {
    moves: BTreeMap<u64, ScriptedSwap>,
}

impl SessionScript {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a swap; a later push for the same tick replaces it.
    pub fn push(&mut self, tick: u64, from: GridIndex, to: GridIndex) -> &mut Self {
        self.moves.insert(tick, ScriptedSwap { from, to });
        self
    }

    /// One random adjacent swap every `every` ticks, all inside `size`.
    pub fn random(seed: u64, size: GridSize, ticks: u64, every: u64) -> Self {
        const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

        let mut script = Self::new();
        if size.cell_count() == 0 {
            return script;
        }

        let mut rng = DeterministicRng::new(seed);
        let every = every.max(1);
        let mut t = every;
        while t <= ticks {
            let from = GridIndex::new(
                rng.next_int(size.lanes as u32) as i32,
                rng.next_int(size.lane_length as u32) as i32,
            );
            let (dx, dy) = DIRECTIONS[rng.next_int(4) as usize];
            let to = from.offset(dx, dy);
            if (0..size.lanes).contains(&to.x) && (0..size.lane_length).contains(&to.y) {
                script.push(t, from, to);
            }
            t += every;
        }
        script
    }

    /// Swap scheduled for `tick`.
    pub fn get(&self, tick: u64) -> Option<ScriptedSwap> {
        self.moves.get(&tick).copied()
    }

    /// Number of scheduled swaps.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Nothing scheduled.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Session parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Palette seed
    pub seed: u64,
    /// Number of gem kinds
    pub kinds: u8,
    /// Ticks to run
    pub ticks: u64,
    /// Seconds per tick
    pub delta: f32,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            kinds: 5,
            ticks: 30 * u64::from(crate::DEFAULT_TICK_RATE),
            delta: 1.0 / crate::DEFAULT_TICK_RATE as f32,
        }
    }
}

/// What a finished session produced.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Final grid
    pub grid: Grid,
    /// The request fed on each tick, for replay
    pub requests: Vec<SwapRequest>,
    /// Hash of the final grid
    pub final_hash: StateHash,
    /// Events observed, initialization included
    pub events: usize,
    /// Swaps the grid accepted
    pub swaps_accepted: usize,
    /// Matches destroyed
    pub matches_destroyed: usize,
    /// Gems handed out by the recycler after initialization
    pub gems_respawned: usize,
}

/// Run a scripted session.
pub fn run_session(
    config: &GridConfig,
    params: &SessionParams,
    script: &SessionScript,
) -> Result<SessionOutcome, ConfigError> {
    let mut grid = Grid::new(config.clone(), PaletteHooks::new(params.seed, params.kinds))?;
    let mut events = grid.take_events().len();
    let mut requests = Vec::with_capacity(params.ticks as usize);
    let mut swaps_accepted = 0;
    let mut matches_destroyed = 0;
    let mut gems_respawned = 0;

    for t in 1..=params.ticks {
        let request = script
            .get(t)
            .filter(|swap| swap.from.is_adjacent(swap.to))
            .map(|swap| SwapRequest {
                first: grid.gem_at(swap.from),
                second: grid.gem_at(swap.to),
                user_made: true,
            })
            .unwrap_or_default();

        let result = tick(&mut grid, &request, params.delta);
        if result.swap_accepted {
            swaps_accepted += 1;
            debug!(tick = t, "scripted swap accepted");
        }
        matches_destroyed += result.matches_destroyed;
        gems_respawned += result
            .events
            .iter()
            .filter(|e| matches!(e.data, GridEventData::GemSpawned { grid_init: false, .. }))
            .count();
        events += result.events.len();
        requests.push(request);
    }

    let final_hash = grid.compute_hash();
    info!(
        ticks = params.ticks,
        swaps_accepted,
        matches_destroyed,
        gems_respawned,
        "session finished"
    );

    Ok(SessionOutcome {
        grid,
        requests,
        final_hash,
        events,
        swaps_accepted,
        matches_destroyed,
        gems_respawned,
    })
}

/// Re-run recorded requests and return the final state hash.
pub fn replay_session(
    config: &GridConfig,
    params: &SessionParams,
    requests: &[SwapRequest],
) -> Result<StateHash, ConfigError> {
    let hooks = PaletteHooks::new(params.seed, params.kinds);
    let (grid, _) = replay_grid(config.clone(), hooks, requests, params.delta)?;
    Ok(grid.compute_hash())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> GridConfig {
        GridConfig {
            grid_size: GridSize::new(6, 6),
            ..Default::default()
        }
    }

    fn short_params(seed: u64) -> SessionParams {
        SessionParams {
            seed,
            kinds: 4,
            ticks: 600,
            ..Default::default()
        }
    }

    #[test]
    fn test_kind_comparator() {
        let red = KindComparator::new(1);
        assert!(red.gem_equals(&KindComparator::new(1)));
        assert!(!red.gem_equals(&KindComparator::new(2)));
    }

    #[test]
    fn test_palette_stays_in_range() {
        let grid = Grid::new(small_config(), PaletteHooks::new(3, 4)).unwrap();
        for gem in grid.gems() {
            let kind = gem
                .comparator()
                .and_then(|c| c.as_any().downcast_ref::<KindComparator>())
                .map(|k| k.kind)
                .unwrap();
            assert!(kind < 4);
        }
    }

    #[test]
    fn test_random_script_stays_on_grid() {
        let size = GridSize::new(4, 3);
        let script = SessionScript::random(9, size, 500, 5);
        assert!(!script.is_empty());
        assert!(script.len() <= 100);

        for t in 0..=500 {
            if let Some(swap) = script.get(t) {
                assert_eq!(t % 5, 0);
                assert!(swap.from.is_adjacent(swap.to));
                for cell in [swap.from, swap.to] {
                    assert!((0..4).contains(&cell.x) && (0..3).contains(&cell.y));
                }
            }
        }
    }

    #[test]
    fn test_script_push_replaces() {
        let mut script = SessionScript::new();
        script
            .push(10, GridIndex::new(0, 0), GridIndex::new(1, 0))
            .push(10, GridIndex::new(2, 2), GridIndex::new(2, 3));
        assert_eq!(script.len(), 1);
        assert_eq!(script.get(10).unwrap().from, GridIndex::new(2, 2));
        assert_eq!(script.get(11), None);
    }

    #[test]
    fn test_session_skips_distant_swaps() {
        let config = GridConfig {
            grid_size: GridSize::new(4, 4),
            ..Default::default()
        };
        // Wide palette so the settled board holds no runs
        let params = SessionParams {
            seed: 11,
            kinds: 200,
            ticks: 300,
            ..Default::default()
        };

        let mut distant = SessionScript::new();
        distant.push(250, GridIndex::new(0, 0), GridIndex::new(2, 0));
        let outcome = run_session(&config, &params, &distant).unwrap();
        assert_eq!(outcome.swaps_accepted, 0);
        assert_eq!(outcome.requests[249], SwapRequest::NONE);

        let mut neighbours = SessionScript::new();
        neighbours.push(250, GridIndex::new(0, 0), GridIndex::new(1, 0));
        let outcome = run_session(&config, &params, &neighbours).unwrap();
        assert_eq!(outcome.swaps_accepted, 1);
    }

    #[test]
    fn test_session_replays_to_same_hash() {
        let config = small_config();
        let params = short_params(42);
        let script = SessionScript::random(42, config.grid_size, params.ticks, 20);

        let outcome = run_session(&config, &params, &script).unwrap();
        assert_eq!(outcome.requests.len(), 600);
        assert_eq!(outcome.grid.tick_count(), 600);
        assert!(outcome.swaps_accepted > 0);

        let replayed = replay_session(&config, &params, &outcome.requests).unwrap();
        assert_eq!(outcome.final_hash, replayed);
    }

    #[test]
    fn test_seed_changes_outcome() {
        let config = small_config();
        let script = SessionScript::new();
        let a = run_session(&config, &short_params(1), &script).unwrap();
        let b = run_session(&config, &short_params(2), &script).unwrap();
        assert_ne!(a.final_hash, b.final_hash);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = GridConfig {
            grid_size: GridSize::new(0, 4),
            ..Default::default()
        };
        let result = run_session(&config, &SessionParams::default(), &SessionScript::new());
        assert!(matches!(result, Err(ConfigError::InvalidGridSize { .. })));
    }
}
