//! Match Detection
//!
//! Line scans over columns and rows, the local scan around a swapped
//! cell, merging of crossing matches, and destruction of the matches
//! whose gems are all at rest.

use serde::{Serialize, Deserialize};
use tracing::debug;

use super::events::GridEvent;
use super::gem::{Gem, GemState};
use super::grid::Grid;
use super::index::GridIndex;

/// A run of matching cells.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMatch {
    /// Cells, without duplicates
    pub positions: Vec<GridIndex>,
    /// Cells that were recent swap targets
    pub priority: Vec<GridIndex>,
}

impl GridMatch {
    /// Build a match, tagging the cells found in `history`.
    pub fn new(positions: impl IntoIterator<Item = GridIndex>, history: &[GridIndex]) -> Self {
        let mut unique = Vec::new();
        for position in positions {
            push_unique(&mut unique, position);
        }
        let priority = unique.iter().copied().filter(|p| history.contains(p)).collect();
        Self {
            positions: unique,
            priority,
        }
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the match was cleared or never held cells.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether `position` belongs to the match.
    #[inline]
    pub fn contains(&self, position: GridIndex) -> bool {
        self.positions.contains(&position)
    }

    /// The match touches a recent swap target.
    #[inline]
    pub fn is_from_swap(&self) -> bool {
        !self.priority.is_empty()
    }

    /// First cell shared with `other`.
    pub fn intersection(&self, other: &GridMatch) -> Option<GridIndex> {
        self.positions.iter().copied().find(|&p| other.contains(p))
    }

    /// Drop every cell.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.priority.clear();
    }
}

fn push_unique(list: &mut Vec<GridIndex>, position: GridIndex) {
    if !list.contains(&position) {
        list.push(position);
    }
}

/// Merge two crossing matches.
///
/// The result holds the cells of `a`, then those of `b`, then the shared
/// cell last. Both inputs are cleared. `None` if they do not cross.
pub fn merge_matches(a: &mut GridMatch, b: &mut GridMatch) -> Option<GridMatch> {
    let shared = a.intersection(b)?;

    let mut merged = GridMatch::default();
    for &position in a.positions.iter().chain(&b.positions) {
        if position != shared {
            push_unique(&mut merged.positions, position);
        }
    }
    merged.positions.push(shared);
    for &position in a.priority.iter().chain(&b.priority) {
        push_unique(&mut merged.priority, position);
    }

    a.clear();
    b.clear();
    Some(merged)
}

/// Merge crossing matches in place.
///
/// One sweep over the pairs present on entry; merged results are
/// appended and not merged again. Empty matches are dropped at the end.
pub fn compact_matches_on_intersections(matches: &mut Vec<GridMatch>) {
    let count = matches.len();
    for i in (0..count).rev() {
        for j in (0..count).rev() {
            if i == j {
                continue;
            }
            let (a, b) = pair_mut(matches, i, j);
            if let Some(merged) = merge_matches(a, b) {
                matches.push(merged);
            }
        }
    }
    matches.retain(|m| !m.is_empty());
}

fn pair_mut(matches: &mut [GridMatch], i: usize, j: usize) -> (&mut GridMatch, &mut GridMatch) {
    if i < j {
        let (left, right) = matches.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = matches.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}

impl Grid {
    fn matchable_gem(&self, position: GridIndex) -> Option<&Gem> {
        self.gem_at(position)
            .and_then(|id| self.gem(id))
            .filter(|gem| gem.can_match())
    }

    /// Collect the cells matching `origin` from `position` outward.
    fn scan_direction(&self, origin: &Gem, position: GridIndex, (dx, dy): (i32, i32), run: &mut Vec<GridIndex>) {
        let mut cursor = position.offset(dx, dy);
        while self.layout.contains(cursor) {
            match self.matchable_gem(cursor) {
                Some(gem) if origin.compare_to(gem) => run.push(cursor),
                _ => break,
            }
            cursor = cursor.offset(dx, dy);
        }
    }

    /// Look for a match through `position` and add its cells to `out`.
    ///
    /// Each axis counts only with at least two neighbours in line. True
    /// if at least two cells were added; the origin is added as well.
    pub fn check_match_around_position(&self, position: GridIndex, out: &mut Vec<GridIndex>) -> bool {
        let Some(origin) = self.gem_at(position).and_then(|id| self.gem(id)) else {
            return false;
        };

        let before = out.len();
        for (forward, backward) in [((1, 0), (-1, 0)), ((0, 1), (0, -1))] {
            let mut run = Vec::new();
            self.scan_direction(origin, position, forward, &mut run);
            self.scan_direction(origin, position, backward, &mut run);
            if run.len() >= 2 {
                for cell in run {
                    push_unique(out, cell);
                }
            }
        }

        if out.len() - before >= 2 {
            push_unique(out, position);
            true
        } else {
            false
        }
    }

    fn linked(&self, previous: GridIndex, current: GridIndex) -> bool {
        match (self.matchable_gem(previous), self.matchable_gem(current)) {
            (Some(a), Some(b)) => a.compare_to(b),
            _ => false,
        }
    }

    /// Emit every maximal run of at least `min_count` cells along `line`.
    pub fn check_matches_in_line(&self, line: &[GridIndex], min_count: usize, out: &mut Vec<GridMatch>) -> bool {
        let history = &self.store.swap_history;
        let before = out.len();
        let mut run: Vec<GridIndex> = Vec::new();

        for &position in line {
            let continues = run.last().is_some_and(|&previous| self.linked(previous, position));
            if !continues {
                if run.len() >= min_count {
                    out.push(GridMatch::new(run.drain(..), history));
                }
                run.clear();
            }
            run.push(position);
        }
        if run.len() >= min_count {
            out.push(GridMatch::new(run, history));
        }

        out.len() > before
    }

    /// Scan every column, then every row, and merge crossing matches.
    pub fn find_grid_matches(&self) -> Vec<GridMatch> {
        let size = self.layout.size();
        let min_count = self.config.min_match_count;
        let mut matches = Vec::new();

        for x in 0..size.lanes {
            self.check_matches_in_line(&self.layout.column(x), min_count, &mut matches);
        }
        for y in 0..size.lane_length {
            self.check_matches_in_line(&self.layout.row(y), min_count, &mut matches);
        }

        compact_matches_on_intersections(&mut matches);
        matches
    }

    /// Every gem of the match rests, or sits on an excepted cell.
    pub fn can_destroy_match(&self, grid_match: &GridMatch, exceptions: &[GridIndex]) -> bool {
        grid_match.positions.iter().all(|&position| {
            match self.gem_at(position).and_then(|id| self.gem(id)) {
                Some(gem) => exceptions.contains(&position) || gem.state() == GemState::Idle,
                None => true,
            }
        })
    }

    /// Find matches and mark their gems for deletion.
    ///
    /// Uses and then clears this tick's swap exceptions. Returns the
    /// number of matches destroyed.
    pub(crate) fn handle_grid_matches(&mut self) -> usize {
        let matches = self.find_grid_matches();
        let exceptions = std::mem::take(&mut self.swap_exceptions);
        let min_count = self.config.min_match_count;
        let mut destroyed = 0;

        for grid_match in matches {
            if grid_match.is_empty() || !self.can_destroy_match(&grid_match, &exceptions) {
                continue;
            }
            destroyed += 1;

            let size = grid_match.len();
            for (i, &position) in grid_match.positions.iter().enumerate() {
                let Some(id) = self.store.map.get(position) else {
                    continue;
                };
                let Some(gem) = self.store.gems.get(id) else {
                    continue;
                };
                let as_intersection = i == size - 1 && size > min_count;
                if self.hooks.avoid_destroy_on_match(gem, size, as_intersection) {
                    continue;
                }
                self.delete_gem(id);
            }

            let from_swap = grid_match.is_from_swap();
            debug!(size, from_swap, "match destroyed");
            self.store
                .emit(GridEvent::match_destroyed(self.store.tick, grid_match.positions, from_swap));
        }

        destroyed
    }
}

// =============================================================================
// TESTS
// =============================================================================
