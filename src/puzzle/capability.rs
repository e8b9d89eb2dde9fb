//! Gem Capabilities
//!
//! The two pluggable collaborators a gem consults:
//!
//! - `GemAttachment`: behaviour modifiers (locks, bombs, ice...) that can
//!   veto operations on the gem they are attached to and get notified
//!   about its life. Gems hold them weakly; the owner keeps the `Rc`.
//! - `GemComparator`: the equality strategy used by matching.
//!
//! Every check defaults to permissive and every notification to a no-op.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::hash::StateHasher;
use super::index::GemId;

/// Behaviour modifier attached to a gem.
///
/// Methods take `&self`; implementations that keep state use interior
/// mutability (`Cell`, `RefCell`), since the same attachment can be
/// shared and transferred between gems.
pub trait GemAttachment {
    /// Attached to `gem`, either directly or as part of a transfer.
    fn on_attach(&self, _gem: GemId, _as_transfer: bool) {}

    /// Detached from `gem`. Also called when an attach was refused.
    fn on_detach(&self, _gem: GemId, _as_transfer: bool) {}

    /// `gem` landed against `other`.
    fn on_gem_hit_another_one(&self, _gem: GemId, _other: GemId) {}

    /// Moved from `last_gem` to `new_gem`.
    fn transfer_from_to(&self, _last_gem: GemId, _new_gem: GemId) {}

    /// May `gem` become selected?
    fn can_select_gem(&self, _gem: GemId) -> bool {
        true
    }

    /// May `gem` take part in a swap?
    fn can_swap_gem(&self, _gem: GemId) -> bool {
        true
    }

    /// May `gem` move (fall, cascade, swap)?
    fn can_move_gem(&self, _gem: GemId) -> bool {
        true
    }

    /// May `gem` be marked for deletion?
    fn can_delete_gem(&self, _gem: GemId) -> bool {
        true
    }

    /// May `attachment` join this one on `gem`?
    fn can_attach_to_gem(&self, _gem: GemId, _attachment: &Rc<dyn GemAttachment>) -> bool {
        true
    }

    /// May `gem` be part of a match?
    fn can_match_gem(&self, _gem: GemId) -> bool {
        true
    }
}

/// Equality strategy of a gem.
pub trait GemComparator: fmt::Debug {
    /// Whether this gem should match a gem carrying `other`.
    fn gem_equals(&self, other: &dyn GemComparator) -> bool;

    /// Downcast support for `gem_equals` implementations.
    fn as_any(&self) -> &dyn Any;

    /// Feed the comparator's identity into a state hash.
    fn hash_into(&self, _hasher: &mut StateHasher) {}
}

/// Whether a weak handle points at the same attachment as `rc`.
///
/// Compares data addresses, ignoring vtables.
#[inline]
pub(crate) fn same_attachment(weak: &Weak<dyn GemAttachment>, rc: &Rc<dyn GemAttachment>) -> bool {
    std::ptr::eq(weak.as_ptr() as *const (), Rc::as_ptr(rc) as *const ())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl GemAttachment for Plain {}

    #[test]
    fn test_defaults_are_permissive() {
        let id = GemId { slot: 0, epoch: 0 };
        let plain: Rc<dyn GemAttachment> = Rc::new(Plain);

        assert!(plain.can_select_gem(id));
        assert!(plain.can_swap_gem(id));
        assert!(plain.can_move_gem(id));
        assert!(plain.can_delete_gem(id));
        assert!(plain.can_match_gem(id));
        assert!(plain.can_attach_to_gem(id, &plain));
    }

    #[test]
    fn test_same_attachment() {
        let a: Rc<dyn GemAttachment> = Rc::new(Plain);
        let b: Rc<dyn GemAttachment> = Rc::new(Plain);
        let weak_a = Rc::downgrade(&a);

        assert!(same_attachment(&weak_a, &a));
        assert!(!same_attachment(&weak_a, &b));
    }
}
