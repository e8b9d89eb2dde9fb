//! Gem Entity
//!
//! The unit the grid moves, swaps, matches and recycles. A gem knows its
//! coordinate, motion state and world location, folds its attachments'
//! vetoes, and compares itself to other gems through its comparator.
//!
//! Gems never call back into the grid. Anything the presentation layer
//! should hear about is queued as a `GemNotice` and drained by the grid.

use std::fmt;
use std::rc::{Rc, Weak};
use serde::{Serialize, Deserialize};

use crate::core::hash::StateHasher;
use crate::core::vec3::Vec3;
use super::capability::{same_attachment, GemAttachment, GemComparator};
use super::config::GemParams;
use super::index::{GemId, GridIndex};

/// Countdown used when a gem has no positive deletion delay.
pub const FALLBACK_DELETION_DELAY: f32 = 0.5;

/// Countdown residue still treated as expired.
const COUNTDOWN_TOLERANCE: f32 = 1e-6;

// =============================================================================
// STATE & NOTICES
// =============================================================================

/// Motion state of a gem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum GemState {
    /// Not attached to a node, or just pulled from the recycler
    #[default]
    None = 0,
    /// Resting on its node
    Idle = 1,
    /// Moving toward its node
    Falling = 2,
    /// Part of an active swap
    Swapping = 3,
    /// Picked by the input collaborator
    Selected = 4,
    /// Matched and waiting for its deletion countdown
    PendingDeletion = 5,
}

/// Something that happened to a single gem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GemNotice {
    /// Reactivated out of the recycler
    Spawned,
    /// Marked for deletion
    MarkedForDestroy,
    /// Deletion finalized; the gem is hidden and recycled
    Deleted,
    /// Became selected
    Selected,
    /// Lost selection
    SelectionReleased,
    /// Touched down; `on` is the cell the landing force points at
    Landed {
        /// Cell in the direction of the landing force
        on: GridIndex,
        /// Landing force
        force: Vec3,
    },
    /// An attachment was added
    AttachmentAdded {
        /// Part of a transfer between gems
        as_transfer: bool,
    },
    /// An attachment was removed
    AttachmentRemoved {
        /// Part of a transfer between gems
        as_transfer: bool,
    },
    /// The comparator was replaced
    ComparatorChanged {
        /// A comparator was set before
        had_previous: bool,
        /// A comparator is set now
        has_new: bool,
    },
}

// =============================================================================
// GEM
// =============================================================================

/// A gem owned by the grid's arena.
pub struct Gem {
    id: GemId,
    grid_index: GridIndex,
    state: GemState,

    location: Vec3,
    last_location: Vec3,
    velocity: Vec3,

    /// Movement and lifetime tunables of this gem
    pub params: GemParams,
    /// Time multiplier applied to this gem's own tick
    pub custom_time_dilation: f32,

    deletion_countdown: f32,
    visible: bool,
    collidable: bool,
    active: bool,

    attachments: Vec<Weak<dyn GemAttachment>>,
    comparator: Option<Box<dyn GemComparator>>,
    notices: Vec<GemNotice>,
}

impl Gem {
    /// Create a live, unplaced gem.
    pub(crate) fn new(id: GemId, params: GemParams) -> Self {
        Self {
            id,
            grid_index: GridIndex::UNPLACED,
            state: GemState::None,
            location: Vec3::ZERO,
            last_location: Vec3::ZERO,
            velocity: Vec3::ZERO,
            params,
            custom_time_dilation: 1.0,
            deletion_countdown: params.deletion_delay,
            visible: true,
            collidable: true,
            active: true,
            attachments: Vec::new(),
            comparator: None,
            notices: Vec::new(),
        }
    }

    /// Handle of this gem.
    #[inline]
    pub fn id(&self) -> GemId {
        self.id
    }

    /// Current coordinate, or `GridIndex::UNPLACED`.
    #[inline]
    pub fn grid_index(&self) -> GridIndex {
        self.grid_index
    }

    /// Set the coordinate.
    #[inline]
    pub fn set_grid_index(&mut self, index: GridIndex) {
        self.grid_index = index;
    }

    /// Current motion state.
    #[inline]
    pub fn state(&self) -> GemState {
        self.state
    }

    #[inline]
    pub(crate) fn set_state(&mut self, state: GemState) {
        self.state = state;
    }

    /// World location.
    #[inline]
    pub fn location(&self) -> Vec3 {
        self.location
    }

    /// Teleport the gem. The velocity baseline is left untouched.
    #[inline]
    pub fn set_location(&mut self, location: Vec3) {
        self.location = location;
    }

    /// Velocity measured by the last `update_velocity`.
    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Remaining deletion countdown in seconds.
    #[inline]
    pub fn deletion_countdown(&self) -> f32 {
        self.deletion_countdown
    }

    /// Shown by the presentation layer.
    #[inline]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Takes part in collisions.
    #[inline]
    pub fn is_collidable(&self) -> bool {
        self.collidable
    }

    /// Ticked every frame. Recycled gems are inactive.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Reactivate out of the recycler.
    pub fn spawn(&mut self) {
        self.deletion_countdown = if self.params.deletion_delay > 0.0 {
            self.params.deletion_delay
        } else {
            FALLBACK_DELETION_DELAY
        };
        self.visible = true;
        self.collidable = true;
        self.active = true;
        self.notices.push(GemNotice::Spawned);
    }

    /// Announce the pending deletion. The grid owns the state change.
    pub fn mark_for_deletion(&mut self) {
        self.notices.push(GemNotice::MarkedForDestroy);
    }

    /// Hide, deactivate and strip every attachment, newest first.
    pub fn finalize_deletion(&mut self) {
        self.notices.push(GemNotice::Deleted);
        self.visible = false;
        self.collidable = false;
        self.active = false;

        let attachments = std::mem::take(&mut self.attachments);
        for weak in attachments.iter().rev() {
            if let Some(attachment) = weak.upgrade() {
                attachment.on_detach(self.id, false);
                self.notices.push(GemNotice::AttachmentRemoved { as_transfer: false });
            }
        }
    }

    /// Advance the deletion countdown. True once it has run out.
    pub fn update_deletion_countdown(&mut self, delta: f32) -> bool {
        self.deletion_countdown -= delta;
        self.deletion_countdown <= COUNTDOWN_TOLERANCE
    }

    /// Measure velocity from the distance covered since the last call.
    pub fn update_velocity(&mut self, delta: f32) {
        if delta <= 0.0 {
            return;
        }
        self.velocity = (self.location - self.last_location) / delta;
        self.last_location = self.location;
    }

    // -------------------------------------------------------------------------
    // Attachments
    // -------------------------------------------------------------------------

    /// Attach a capability. See `attach_as`.
    pub fn attach(&mut self, attachment: &Rc<dyn GemAttachment>) -> bool {
        self.attach_as(attachment, false)
    }

    /// Attach a capability unless an existing one refuses it.
    ///
    /// A refused attachment gets `on_detach` and `false` is returned.
    /// Attaching twice keeps a single entry but notifies again.
    pub fn attach_as(&mut self, attachment: &Rc<dyn GemAttachment>, as_transfer: bool) -> bool {
        let refused = self
            .live_attachments()
            .any(|existing| !existing.can_attach_to_gem(self.id, attachment));
        if refused {
            attachment.on_detach(self.id, as_transfer);
            return false;
        }

        if !self.has_attachment(attachment) {
            self.attachments.push(Rc::downgrade(attachment));
        }
        attachment.on_attach(self.id, as_transfer);
        self.notices.push(GemNotice::AttachmentAdded { as_transfer });
        true
    }

    /// Detach a capability. See `detach_as`.
    pub fn detach(&mut self, attachment: &Rc<dyn GemAttachment>) {
        self.detach_as(attachment, false)
    }

    /// Remove a capability and notify it.
    pub fn detach_as(&mut self, attachment: &Rc<dyn GemAttachment>, as_transfer: bool) {
        self.attachments.retain(|weak| !same_attachment(weak, attachment));
        attachment.on_detach(self.id, as_transfer);
        self.notices.push(GemNotice::AttachmentRemoved { as_transfer });
    }

    /// Whether `attachment` is on this gem.
    pub fn has_attachment(&self, attachment: &Rc<dyn GemAttachment>) -> bool {
        self.attachments.iter().any(|weak| same_attachment(weak, attachment))
    }

    /// Attachments whose owner is still alive, oldest first.
    pub fn live_attachments(&self) -> impl Iterator<Item = Rc<dyn GemAttachment>> + '_ {
        self.attachments.iter().filter_map(Weak::upgrade)
    }

    /// Number of attachment handles, dead ones included.
    #[inline]
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Drop handles whose attachment no longer exists.
    pub fn prune_attachments(&mut self) {
        self.attachments.retain(|weak| weak.strong_count() > 0);
    }

    /// Fold a veto over every live attachment. All are asked, even after a refusal.
    fn all_allow(&self, check: impl Fn(&dyn GemAttachment, GemId) -> bool) -> bool {
        self.live_attachments()
            .fold(true, |allowed, attachment| check(attachment.as_ref(), self.id) && allowed)
    }

    /// May this gem be selected?
    pub fn can_select(&self) -> bool {
        self.all_allow(|a, id| a.can_select_gem(id))
    }

    /// May this gem be swapped?
    pub fn can_swap(&self) -> bool {
        self.all_allow(|a, id| a.can_swap_gem(id))
    }

    /// May this gem move?
    pub fn can_move(&self) -> bool {
        self.all_allow(|a, id| a.can_move_gem(id))
    }

    /// May this gem be deleted?
    pub fn can_delete(&self) -> bool {
        self.all_allow(|a, id| a.can_delete_gem(id))
    }

    /// May this gem match?
    pub fn can_match(&self) -> bool {
        self.all_allow(|a, id| a.can_match_gem(id))
    }

    // -------------------------------------------------------------------------
    // Comparison
    // -------------------------------------------------------------------------

    /// Current comparator.
    pub fn comparator(&self) -> Option<&dyn GemComparator> {
        self.comparator.as_deref()
    }

    /// Replace the comparator. The previous one is dropped.
    pub fn set_comparator(&mut self, comparator: Option<Box<dyn GemComparator>>) {
        self.notices.push(GemNotice::ComparatorChanged {
            had_previous: self.comparator.is_some(),
            has_new: comparator.is_some(),
        });
        self.comparator = comparator;
    }

    /// Whether this gem matches `other`.
    ///
    /// Gems without comparators match anything, including when only one
    /// side has a comparator.
    pub fn compare_to(&self, other: &Gem) -> bool {
        match (&self.comparator, &other.comparator) {
            (Some(mine), Some(theirs)) => mine.gem_equals(theirs.as_ref()),
            (None, None) => true,
            // Exactly one side has a comparator
            _ => true,
        }
    }

    // -------------------------------------------------------------------------
    // Notices
    // -------------------------------------------------------------------------

    pub(crate) fn notify(&mut self, notice: GemNotice) {
        self.notices.push(notice);
    }

    /// Drain queued notices.
    pub fn take_notices(&mut self) -> Vec<GemNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Hash everything that affects simulation.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.id.slot);
        hasher.update_i32(self.grid_index.x);
        hasher.update_i32(self.grid_index.y);
        hasher.update_u8(self.state as u8);
        hasher.update_vec3(self.location);
        hasher.update_vec3(self.last_location);
        hasher.update_vec3(self.velocity);
        hasher.update_f32(self.deletion_countdown);
        hasher.update_f32(self.custom_time_dilation);
        hasher.update_bool(self.visible);
        hasher.update_bool(self.active);
        hasher.update_u32(self.attachments.len() as u32);
        match &self.comparator {
            Some(comparator) => {
                hasher.update_bool(true);
                comparator.hash_into(hasher);
            }
            None => hasher.update_bool(false),
        }
    }
}

impl fmt::Debug for Gem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gem")
            .field("id", &self.id)
            .field("grid_index", &self.grid_index)
            .field("state", &self.state)
            .field("location", &self.location)
            .field("attachments", &self.attachments.len())
            .field("comparator", &self.comparator)
            .finish()
    }
}

// =============================================================================
// ARENA
// =============================================================================

/// Owner of every gem of the current grid.
///
/// Slots are never reused while the grid lives; `clear` drops all gems
/// and starts a new epoch so stale handles stop resolving.
#[derive(Debug, Default)]
pub struct GemArena {
    gems: Vec<Gem>,
    epoch: u32,
}

impl GemArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new gem.
    pub fn insert(&mut self, params: GemParams) -> GemId {
        let id = GemId {
            slot: self.gems.len() as u32,
            epoch: self.epoch,
        };
        self.gems.push(Gem::new(id, params));
        id
    }

    /// Look up a gem.
    #[inline]
    pub fn get(&self, id: GemId) -> Option<&Gem> {
        if id.epoch != self.epoch {
            return None;
        }
        self.gems.get(id.slot as usize)
    }

    /// Look up a gem mutably.
    #[inline]
    pub fn get_mut(&mut self, id: GemId) -> Option<&mut Gem> {
        if id.epoch != self.epoch {
            return None;
        }
        self.gems.get_mut(id.slot as usize)
    }

    /// Borrow two distinct gems mutably.
    pub fn pair_mut(&mut self, a: GemId, b: GemId) -> Option<(&mut Gem, &mut Gem)> {
        if a == b || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (i, j) = (a.slot as usize, b.slot as usize);
        if i < j {
            let (left, right) = self.gems.split_at_mut(j);
            Some((&mut left[i], &mut right[0]))
        } else {
            let (left, right) = self.gems.split_at_mut(i);
            Some((&mut right[0], &mut left[j]))
        }
    }

    /// Whether `id` resolves.
    #[inline]
    pub fn contains(&self, id: GemId) -> bool {
        self.get(id).is_some()
    }

    /// Number of gems.
    #[inline]
    pub fn len(&self) -> usize {
        self.gems.len()
    }

    /// Whether the arena holds no gems.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.gems.is_empty()
    }

    /// Current epoch.
    #[inline]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Gems in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Gem> {
        self.gems.iter()
    }

    /// Gems in slot order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Gem> {
        self.gems.iter_mut()
    }

    /// Handles in slot order.
    pub fn ids(&self) -> impl Iterator<Item = GemId> + '_ {
        self.gems.iter().map(Gem::id)
    }

    /// Drop every gem and invalidate outstanding handles.
    pub fn clear(&mut self) {
        self.gems.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::cell::Cell;

    /// Attachment with switchable vetoes and call counters.
    #[derive(Default)]
    struct Recorder {
        deny_delete: bool,
        deny_attach: bool,
        delete_checks: Cell<u32>,
        attached: Cell<u32>,
        detached: Cell<u32>,
    }

    impl GemAttachment for Recorder {
        fn on_attach(&self, _gem: GemId, _as_transfer: bool) {
            self.attached.set(self.attached.get() + 1);
        }
        fn on_detach(&self, _gem: GemId, _as_transfer: bool) {
            self.detached.set(self.detached.get() + 1);
        }
        fn can_delete_gem(&self, _gem: GemId) -> bool {
            self.delete_checks.set(self.delete_checks.get() + 1);
            !self.deny_delete
        }
        fn can_attach_to_gem(&self, _gem: GemId, _attachment: &Rc<dyn GemAttachment>) -> bool {
            !self.deny_attach
        }
    }

    #[derive(Debug)]
    struct Color(u8, Rc<Cell<u32>>);

    impl Drop for Color {
        fn drop(&mut self) {
            self.1.set(self.1.get() + 1);
        }
    }

    impl GemComparator for Color {
        fn gem_equals(&self, other: &dyn GemComparator) -> bool {
            other.as_any().downcast_ref::<Color>().map_or(false, |o| o.0 == self.0)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn gem() -> Gem {
        let mut arena = GemArena::new();
        let id = arena.insert(GemParams::default());
        Gem::new(id, GemParams::default())
    }

    fn color(kind: u8) -> Box<dyn GemComparator> {
        Box::new(Color(kind, Rc::new(Cell::new(0))))
    }

    #[test]
    fn test_spawn_resets_countdown() {
        let mut g = gem();
        g.params.deletion_delay = 0.0;
        g.finalize_deletion();
        assert!(!g.is_visible() && !g.is_active());

        g.spawn();
        assert_eq!(g.deletion_countdown(), FALLBACK_DELETION_DELAY);
        assert!(g.is_visible() && g.is_collidable() && g.is_active());

        g.params.deletion_delay = 1.25;
        g.spawn();
        assert_eq!(g.deletion_countdown(), 1.25);
    }

    #[test]
    fn test_deletion_countdown() {
        let mut g = gem();
        g.spawn();
        assert!(!g.update_deletion_countdown(0.25));
        assert!(g.update_deletion_countdown(0.25));
    }

    #[test]
    fn test_deletion_countdown_absorbs_rounding() {
        let mut g = gem();
        g.spawn();
        // 0.1 is not exact in f32; five steps leave a tiny positive residue
        for _ in 0..4 {
            assert!(!g.update_deletion_countdown(0.1));
        }
        assert!(g.update_deletion_countdown(0.1));
    }

    #[test]
    fn test_velocity_from_displacement() {
        let mut g = gem();
        g.set_location(Vec3::new(10.0, 0.0, 0.0));
        g.update_velocity(0.5);
        assert_eq!(g.velocity(), Vec3::new(20.0, 0.0, 0.0));

        // Zero delta keeps the last measurement
        g.set_location(Vec3::new(50.0, 0.0, 0.0));
        g.update_velocity(0.0);
        assert_eq!(g.velocity(), Vec3::new(20.0, 0.0, 0.0));
    }

    #[test]
    fn test_veto_asks_every_attachment() {
        let mut g = gem();
        let deny = Rc::new(Recorder { deny_delete: true, ..Default::default() });
        let allow = Rc::new(Recorder::default());
        let deny_dyn: Rc<dyn GemAttachment> = deny.clone();
        let allow_dyn: Rc<dyn GemAttachment> = allow.clone();

        assert!(g.can_delete());
        assert!(g.attach(&deny_dyn));
        assert!(g.attach(&allow_dyn));

        assert!(!g.can_delete());
        // The refusal came first, the second was still asked
        assert_eq!(deny.delete_checks.get(), 1);
        assert_eq!(allow.delete_checks.get(), 1);
    }

    #[test]
    fn test_attach_refused_by_existing() {
        let mut g = gem();
        let gate: Rc<dyn GemAttachment> = Rc::new(Recorder { deny_attach: true, ..Default::default() });
        let late = Rc::new(Recorder::default());
        let late_dyn: Rc<dyn GemAttachment> = late.clone();

        assert!(g.attach(&gate));
        assert!(!g.attach(&late_dyn));
        assert_eq!(g.attachment_count(), 1);
        assert_eq!(late.attached.get(), 0);
        assert_eq!(late.detached.get(), 1);
    }

    #[test]
    fn test_attach_is_unique() {
        let mut g = gem();
        let recorder = Rc::new(Recorder::default());
        let recorder_dyn: Rc<dyn GemAttachment> = recorder.clone();

        g.attach(&recorder_dyn);
        g.attach(&recorder_dyn);
        assert_eq!(g.attachment_count(), 1);
        assert_eq!(recorder.attached.get(), 2);

        g.detach(&recorder_dyn);
        assert_eq!(g.attachment_count(), 0);
        assert_eq!(recorder.detached.get(), 1);
    }

    #[test]
    fn test_prune_dead_attachments() {
        let mut g = gem();
        {
            let temp: Rc<dyn GemAttachment> = Rc::new(Recorder::default());
            g.attach(&temp);
        }
        assert_eq!(g.attachment_count(), 1);
        // A dead attachment no longer vetoes anything
        assert!(g.can_delete());

        g.prune_attachments();
        assert_eq!(g.attachment_count(), 0);
    }

    #[test]
    fn test_finalize_detaches_everything() {
        let mut g = gem();
        let a = Rc::new(Recorder::default());
        let b = Rc::new(Recorder::default());
        let a_dyn: Rc<dyn GemAttachment> = a.clone();
        let b_dyn: Rc<dyn GemAttachment> = b.clone();
        g.attach(&a_dyn);
        g.attach(&b_dyn);
        g.take_notices();

        g.finalize_deletion();
        assert_eq!(g.attachment_count(), 0);
        assert_eq!(a.detached.get(), 1);
        assert_eq!(b.detached.get(), 1);

        let notices = g.take_notices();
        assert_eq!(notices[0], GemNotice::Deleted);
        assert_eq!(notices.len(), 3);
    }

    #[test]
    fn test_compare_to() {
        let mut a = gem();
        let mut b = gem();

        // Neither has a comparator
        assert!(a.compare_to(&b));

        // Only one has a comparator: still a match
        a.set_comparator(Some(color(1)));
        assert!(a.compare_to(&b));
        assert!(b.compare_to(&a));

        b.set_comparator(Some(color(2)));
        assert!(!a.compare_to(&b));

        b.set_comparator(Some(color(1)));
        assert!(a.compare_to(&b));
    }

    #[test]
    fn test_set_comparator_drops_previous() {
        let mut g = gem();
        let drops = Rc::new(Cell::new(0));
        g.set_comparator(Some(Box::new(Color(3, drops.clone()))));
        assert_eq!(drops.get(), 0);

        g.set_comparator(None);
        assert_eq!(drops.get(), 1);

        let notices = g.take_notices();
        assert_eq!(
            notices.last(),
            Some(&GemNotice::ComparatorChanged { had_previous: true, has_new: false })
        );
    }

    #[test]
    fn test_arena_epoch_invalidates_handles() {
        let mut arena = GemArena::new();
        let a = arena.insert(GemParams::default());
        let b = arena.insert(GemParams::default());
        assert!(arena.pair_mut(a, b).is_some());
        assert!(arena.pair_mut(a, a).is_none());

        arena.clear();
        assert!(arena.get(a).is_none());

        let c = arena.insert(GemParams::default());
        assert_eq!(c.slot(), a.slot());
        assert_ne!(c, a);
        assert!(arena.get(c).is_some());
    }
}
