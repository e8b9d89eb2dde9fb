//! Grid Hooks
//!
//! Decisions the grid asks its owner about. Plain notifications go
//! through the event queue instead; hooks are only for questions whose
//! answer changes what the simulation does next.

use super::gem::Gem;

/// Overridable grid decisions.
pub trait GridHooks {
    /// May the recycler hand out `gem` right now?
    fn spawn_gem_condition(&mut self, _gem: &Gem) -> bool {
        true
    }

    /// Keep `gem` alive although it belongs to a destroyed match.
    ///
    /// `as_intersection` is set for the last cell of a match longer than
    /// the minimum.
    fn avoid_destroy_on_match(&mut self, _gem: &Gem, _match_size: usize, _as_intersection: bool) -> bool {
        false
    }

    /// `gem` was just created (`grid_init`) or pulled from the recycler.
    ///
    /// This is where owners assign a comparator or attachments.
    fn on_gem_spawned(&mut self, _gem: &mut Gem, _grid_init: bool) {}
}

/// Hooks that accept every default.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

impl GridHooks for DefaultHooks {}
