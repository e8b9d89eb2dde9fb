//! Grid Node
//!
//! A fixed cell of a lane. It holds at most one gem and drives that gem's
//! motion: falls eased toward the node, impulse pushes, landing
//! detection and the spawn point of gems pulled from the recycler.
//!
//! Occupant lifecycle:
//!
//! ```text
//! Empty --attach--> Falling --motion done--> Idle --detach--> Empty
//!                      ^                       |
//!                      +--- knocked off slot --+
//! ```

use serde::{Serialize, Deserialize};

use crate::core::easing::{sine_out, Easing};
use crate::core::hash::StateHasher;
use crate::core::vec3::Vec3;
use super::config::GridConfig;
use super::gem::{Gem, GemArena, GemState};
use super::grid::GemMap;
use super::index::{GemId, GridIndex};
use super::layout::GridLayout;

/// Eased progress at which a fall counts as landed.
pub const LANDING_THRESHOLD: f32 = 0.95;

/// Squared distance an idle gem may drift before falling back.
pub const REST_DISTANCE_SQ: f32 = 1.0;

/// Fall speed multiplier while an external push is active.
pub const PUSH_SPEED_MULTIPLIER: f32 = 4.0;

/// Scale from gem velocity to landing force.
pub const LANDING_FORCE_SCALE: f32 = 5.0;

/// Where a gem pulled from the recycler first appears.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PopMethod {
    /// At the lane's recycler location, past the last node
    FromEndOfLane = 0,
    /// Before the lane's first node
    FromBeginOfLane = 1,
    /// Beside the node, on the previous lane's side
    FromLastLaneDirection = 2,
    /// Beside the node, on the next lane's side
    FromNextLaneDirection = 3,
    /// In front of the grid plane
    FromGridNormal = 4,
    /// Behind the grid plane
    FromGridInverseNormal = 5,
    /// On the node itself
    #[default]
    PopAtPosition = 6,
}

/// A landing that just resolved on a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeLanding {
    /// Gem that landed
    pub gem: GemId,
    /// Node it landed on
    pub node: GridIndex,
    /// Cell the landing force points at
    pub target: GridIndex,
    /// Landing force
    pub force: Vec3,
}

/// Fixed cell of a lane.
#[derive(Clone, Debug)]
pub struct Node {
    index: GridIndex,
    location: Vec3,

    /// Spawn policy for gems taken from the recycler
    pub pop_method: PopMethod,
    /// Fall and swap easing
    pub easing: Easing,
    /// Only ever take gems from the recycler
    pub gem_from_grid_only: bool,
    /// Seconds to wait on the lane before asking the recycler directly
    pub delay_grid_direct_request: f32,

    gem: Option<GemId>,
    movement_start: Vec3,
    movement_amount: f32,
    last_eased: f32,
    push_force: Vec3,
    landing_force: Vec3,
    landing_timer: Option<f32>,
    grid_request_chrono: f32,
}

impl Node {
    /// Create an empty node.
    pub fn new(index: GridIndex, location: Vec3, pop_method: PopMethod, config: &GridConfig) -> Self {
        Self {
            index,
            location,
            pop_method,
            easing: config.node_easing,
            gem_from_grid_only: config.gem_from_grid_only,
            delay_grid_direct_request: config.delay_grid_direct_request,
            gem: None,
            movement_start: location,
            movement_amount: 0.0,
            last_eased: 0.0,
            push_force: Vec3::ZERO,
            landing_force: Vec3::ZERO,
            landing_timer: None,
            grid_request_chrono: 0.0,
        }
    }

    /// Coordinate of this node.
    #[inline]
    pub fn index(&self) -> GridIndex {
        self.index
    }

    /// Rest position of the occupant.
    #[inline]
    pub fn location(&self) -> Vec3 {
        self.location
    }

    /// Current occupant.
    #[inline]
    pub fn gem(&self) -> Option<GemId> {
        self.gem
    }

    /// Fall progress, 1.0 when settled.
    #[inline]
    pub fn movement_amount(&self) -> f32 {
        self.movement_amount
    }

    /// Accumulated external push.
    #[inline]
    pub fn push_force(&self) -> Vec3 {
        self.push_force
    }

    /// Seconds spent waiting on the lane.
    #[inline]
    pub fn grid_request_chrono(&self) -> f32 {
        self.grid_request_chrono
    }

    // -------------------------------------------------------------------------
    // Occupancy
    // -------------------------------------------------------------------------

    /// Bind `gem` to this node and start its fall.
    ///
    /// Gems fresh out of the recycler are first moved to the spawn point
    /// given by the pop method.
    pub fn attach_gem(&mut self, gem: &mut Gem, from_grid: bool, map: &mut GemMap, layout: &GridLayout) {
        self.gem = Some(gem.id());
        gem.set_grid_index(self.index);
        map.set(self.index, Some(gem.id()));
        gem.set_state(GemState::Falling);

        if from_grid {
            let spawn = self.spawn_location(layout, gem.location());
            gem.set_location(spawn);
        }

        self.movement_start = gem.location();
        self.movement_amount = 0.0;
        self.landing_timer = None;
    }

    /// Release the occupant.
    ///
    /// Without `forced`, only an idle or falling gem that may move is
    /// released.
    pub fn detach_gem(&mut self, gems: &mut GemArena, map: &mut GemMap, forced: bool) -> Option<GemId> {
        let id = self.gem?;
        let Some(gem) = gems.get_mut(id) else {
            // Handle from a cleared roster
            self.gem = None;
            return None;
        };

        let movable = matches!(gem.state(), GemState::Idle | GemState::Falling) && gem.can_move();
        if !movable && !forced {
            return None;
        }

        map.set(self.index, None);
        gem.set_grid_index(GridIndex::UNPLACED);
        gem.set_state(GemState::None);
        self.gem = None;
        Some(id)
    }

    /// Whether the lane wait has run out.
    #[inline]
    pub(crate) fn grid_request_due(&self) -> bool {
        self.grid_request_chrono >= self.delay_grid_direct_request
    }

    /// Book-keeping after asking the lane for a gem.
    pub(crate) fn record_request(&mut self, found: bool, delta: f32) {
        if self.grid_request_due() {
            self.grid_request_chrono = 0.0;
        }
        if found {
            self.grid_request_chrono = 0.0;
        } else if !self.grid_request_due() && !self.gem_from_grid_only {
            self.grid_request_chrono += delta;
        }
    }

    /// Pretend the occupant just finished moving here.
    pub(crate) fn settle_from(&mut self, location: Vec3) {
        self.movement_start = location;
        self.movement_amount = 1.0;
    }

    // -------------------------------------------------------------------------
    // Motion
    // -------------------------------------------------------------------------

    /// Advance the occupant's motion by `delta` seconds.
    ///
    /// Returns the landing that resolved this tick, if any.
    pub fn move_gem_to_node(&mut self, gems: &mut GemArena, layout: &GridLayout, delta: f32) -> Option<NodeLanding> {
        let id = self.gem?;
        let gem = gems.get_mut(id)?;

        if !gem.can_move() {
            if gem.state() == GemState::Falling {
                gem.set_state(GemState::Idle);
            }
            gem.set_location(self.location);
            return None;
        }

        match gem.state() {
            GemState::Falling => self.advance_fall(gem, delta),
            GemState::Idle => {
                if gem.location().distance_squared(self.location) > REST_DISTANCE_SQ {
                    gem.set_state(GemState::Falling);
                    self.movement_start = gem.location();
                    self.last_eased = 0.0;
                    self.movement_amount = 0.0;
                }
            }
            _ => {}
        }

        // Landing notification after the landing delay
        match self.landing_timer {
            Some(timer) if timer <= 0.0 => {
                self.landing_timer = None;
                Some(NodeLanding {
                    gem: id,
                    node: self.index,
                    target: self.index_in_direction(layout, self.landing_force),
                    force: self.landing_force,
                })
            }
            Some(timer) => {
                self.landing_timer = Some(timer - delta);
                None
            }
            None => None,
        }
    }

    fn advance_fall(&mut self, gem: &mut Gem, delta: f32) {
        let pushed = !self.push_force.is_zero();
        let speed_scale = if pushed { PUSH_SPEED_MULTIPLIER } else { 1.0 };
        self.movement_amount += delta * gem.params.speed * speed_scale;

        let eased = if pushed {
            let eased = sine_out(self.movement_amount);
            if eased > 0.0 && self.last_eased <= 0.0 {
                self.landing_force = self.push_force;
                self.landing_timer = Some(gem.params.landing_delay);
            }
            eased
        } else {
            let eased = self.easing.apply(self.movement_amount);
            if eased >= LANDING_THRESHOLD && self.last_eased < LANDING_THRESHOLD {
                self.landing_force = gem.velocity() * LANDING_FORCE_SCALE * delta;
                self.landing_timer = Some(gem.params.landing_delay);
            }
            eased
        };

        self.last_eased = eased;
        let target = self.location + self.push_force;
        gem.set_location(self.movement_start.lerp(target, eased));

        if self.movement_amount >= 1.0 {
            self.movement_amount = 1.0;
            gem.set_location(target);
            gem.set_state(GemState::Idle);
            self.last_eased = 0.0;
            self.push_force = Vec3::ZERO;
        }
    }

    /// Knock a resting occupant off its slot.
    pub fn add_impulse(&mut self, gems: &mut GemArena, force: Vec3) {
        let Some(gem) = self.gem.and_then(|id| gems.get_mut(id)) else {
            return;
        };
        if gem.state() != GemState::Idle {
            return;
        }
        self.movement_start = gem.location();
        self.last_eased = 0.0;
        gem.set_state(GemState::Falling);
        self.push_force += force * gem.params.external_force_transfer_scale;
        self.movement_amount = 0.0;
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    /// Neighbouring coordinate in a world direction.
    ///
    /// Each axis steps by one when the unit direction leans more than
    /// 0.5 along it. Never leaves the 3x3 neighbourhood.
    pub fn index_in_direction(&self, layout: &GridLayout, direction: Vec3) -> GridIndex {
        let Some(dir) = direction.try_normalize() else {
            return self.index;
        };
        let step = |dot: f32| {
            if dot > 0.5 {
                1
            } else if dot < -0.5 {
                -1
            } else {
                0
            }
        };
        let along_lane = dir.dot(layout.lane_direction().safe_normal());
        let along_node = dir.dot(layout.node_direction().safe_normal());
        self.index.offset(step(along_lane), step(along_node))
    }

    /// Spawn point for a recycled gem currently at `base`.
    pub fn spawn_location(&self, layout: &GridLayout, base: Vec3) -> Vec3 {
        let zone = layout.recycling_zone_distance();
        match self.pop_method {
            PopMethod::FromEndOfLane => base,
            PopMethod::FromGridNormal => {
                self.location + layout.grid_normal() * (layout.lane_direction().length() + zone)
            }
            PopMethod::FromGridInverseNormal => {
                self.location - layout.grid_normal() * (layout.lane_direction().length() + zone)
            }
            PopMethod::FromBeginOfLane => {
                let lane_start = layout.node_location(GridIndex::new(self.index.x, 0));
                lane_start - layout.node_direction() * zone
            }
            PopMethod::PopAtPosition => self.location,
            PopMethod::FromLastLaneDirection => self.location - layout.lane_direction() * zone,
            PopMethod::FromNextLaneDirection => self.location + layout.lane_direction() * zone,
        }
    }

    /// Hash motion state.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.gem.map_or(u32::MAX, |id| id.slot()));
        hasher.update_vec3(self.movement_start);
        hasher.update_f32(self.movement_amount);
        hasher.update_f32(self.last_eased);
        hasher.update_vec3(self.push_force);
        hasher.update_vec3(self.landing_force);
        hasher.update_f32(self.landing_timer.unwrap_or(f32::NEG_INFINITY));
        hasher.update_f32(self.grid_request_chrono);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use crate::puzzle::capability::GemAttachment;
    use crate::puzzle::config::{GemParams, GridSize, NodeSize};

    struct Frozen;
    impl GemAttachment for Frozen {
        fn can_move_gem(&self, _gem: GemId) -> bool {
            false
        }
    }

    struct Fixture {
        layout: GridLayout,
        gems: GemArena,
        map: GemMap,
        config: GridConfig,
    }

    fn fixture() -> Fixture {
        let config = GridConfig::default();
        let layout = GridLayout::new(&config, GridSize::new(3, 3), NodeSize::new(100.0, 100.0));
        Fixture {
            map: GemMap::for_layout(&layout),
            layout,
            gems: GemArena::new(),
            config,
        }
    }

    fn node_at(f: &Fixture, x: i32, y: i32, pop: PopMethod) -> Node {
        let index = GridIndex::new(x, y);
        Node::new(index, f.layout.node_location(index), pop, &f.config)
    }

    /// Attach a new gem already resting on the node.
    fn settled(f: &mut Fixture, node: &mut Node) -> GemId {
        let id = f.gems.insert(GemParams::default());
        let gem = f.gems.get_mut(id).unwrap();
        node.attach_gem(gem, false, &mut f.map, &f.layout);
        gem.set_location(node.location());
        gem.set_state(GemState::Idle);
        id
    }

    #[test]
    fn test_attach_binds_gem_and_map() {
        let mut f = fixture();
        let mut node = node_at(&f, 1, 2, PopMethod::PopAtPosition);
        let id = f.gems.insert(GemParams::default());

        node.attach_gem(f.gems.get_mut(id).unwrap(), false, &mut f.map, &f.layout);

        let gem = f.gems.get(id).unwrap();
        assert_eq!(node.gem(), Some(id));
        assert_eq!(gem.grid_index(), GridIndex::new(1, 2));
        assert_eq!(gem.state(), GemState::Falling);
        assert_eq!(f.map.get(GridIndex::new(1, 2)), Some(id));
    }

    #[test]
    fn test_attach_from_grid_uses_pop_method() {
        let mut f = fixture();
        let mut node = node_at(&f, 1, 1, PopMethod::FromGridInverseNormal);
        let id = f.gems.insert(GemParams::default());

        node.attach_gem(f.gems.get_mut(id).unwrap(), true, &mut f.map, &f.layout);

        // Centre node sits on the origin; lane spacing 100 + zone 5 behind the plane
        let gem = f.gems.get(id).unwrap();
        assert_eq!(gem.location(), Vec3::new(0.0, 0.0, -105.0));
    }

    #[test]
    fn test_spawn_locations() {
        let f = fixture();
        let base = Vec3::new(7.0, 7.0, 7.0);
        let centre = f.layout.node_location(GridIndex::new(1, 1));

        let at = |pop| node_at(&f, 1, 1, pop).spawn_location(&f.layout, base);
        assert_eq!(at(PopMethod::FromEndOfLane), base);
        assert_eq!(at(PopMethod::PopAtPosition), centre);
        assert_eq!(at(PopMethod::FromGridNormal), centre + Vec3::Z * 105.0);
        assert_eq!(at(PopMethod::FromLastLaneDirection), centre - Vec3::Y * 500.0);
        assert_eq!(at(PopMethod::FromNextLaneDirection), centre + Vec3::Y * 500.0);

        let lane_start = f.layout.node_location(GridIndex::new(1, 0));
        assert_eq!(at(PopMethod::FromBeginOfLane), lane_start - Vec3::X * 500.0);
    }

    #[test]
    fn test_detach_rules() {
        let mut f = fixture();
        let mut node = node_at(&f, 0, 0, PopMethod::PopAtPosition);
        let id = settled(&mut f, &mut node);

        // Mid-swap gems only leave when forced
        f.gems.get_mut(id).unwrap().set_state(GemState::Swapping);
        assert_eq!(node.detach_gem(&mut f.gems, &mut f.map, false), None);
        assert_eq!(node.detach_gem(&mut f.gems, &mut f.map, true), Some(id));

        let gem = f.gems.get(id).unwrap();
        assert_eq!(gem.grid_index(), GridIndex::UNPLACED);
        assert_eq!(gem.state(), GemState::None);
        assert_eq!(f.map.get(GridIndex::new(0, 0)), None);
        assert_eq!(node.gem(), None);
    }

    #[test]
    fn test_detach_respects_move_veto() {
        let mut f = fixture();
        let mut node = node_at(&f, 0, 0, PopMethod::PopAtPosition);
        let id = settled(&mut f, &mut node);
        let frozen: Rc<dyn GemAttachment> = Rc::new(Frozen);
        f.gems.get_mut(id).unwrap().attach(&frozen);

        assert_eq!(node.detach_gem(&mut f.gems, &mut f.map, false), None);
        assert_eq!(node.gem(), Some(id));
    }

    #[test]
    fn test_fall_reaches_node_and_lands() {
        let mut f = fixture();
        let mut node = node_at(&f, 1, 1, PopMethod::PopAtPosition);
        let id = f.gems.insert(GemParams::default());
        let gem = f.gems.get_mut(id).unwrap();
        gem.set_location(node.location() + Vec3::X * 100.0);
        node.attach_gem(gem, false, &mut f.map, &f.layout);

        // Speed 5, linear: 0.1s covers half the way
        assert_eq!(node.move_gem_to_node(&mut f.gems, &f.layout, 0.1), None);
        let gem = f.gems.get(id).unwrap();
        assert_eq!(gem.state(), GemState::Falling);
        assert!((gem.location().x - (node.location().x + 50.0)).abs() < 1e-3);

        // Crossing the threshold lands at once with no landing delay
        let landing = node.move_gem_to_node(&mut f.gems, &f.layout, 0.1);
        assert!(landing.is_some());
        let landing = landing.unwrap();
        assert_eq!(landing.gem, id);
        assert_eq!(landing.node, GridIndex::new(1, 1));

        let gem = f.gems.get(id).unwrap();
        assert_eq!(gem.state(), GemState::Idle);
        assert_eq!(gem.location(), node.location());
        assert_eq!(node.movement_amount(), 1.0);

        // Only once
        assert_eq!(node.move_gem_to_node(&mut f.gems, &f.layout, 0.1), None);
    }

    #[test]
    fn test_landing_delay_postpones_notification() {
        let mut f = fixture();
        let mut node = node_at(&f, 1, 1, PopMethod::PopAtPosition);
        let mut params = GemParams::default();
        params.landing_delay = 0.15;
        let id = f.gems.insert(params);
        let gem = f.gems.get_mut(id).unwrap();
        gem.set_location(node.location() + Vec3::X * 100.0);
        node.attach_gem(gem, false, &mut f.map, &f.layout);

        assert_eq!(node.move_gem_to_node(&mut f.gems, &f.layout, 0.1), None);
        // Armed at 0.15 and counted down to 0.05 on the same tick
        assert_eq!(node.move_gem_to_node(&mut f.gems, &f.layout, 0.1), None);
        assert_eq!(node.move_gem_to_node(&mut f.gems, &f.layout, 0.1), None);
        assert!(node.move_gem_to_node(&mut f.gems, &f.layout, 0.1).is_some());
    }

    #[test]
    fn test_knocked_idle_gem_falls_back() {
        let mut f = fixture();
        let mut node = node_at(&f, 1, 1, PopMethod::PopAtPosition);
        let id = settled(&mut f, &mut node);

        // Within the rest distance nothing happens
        f.gems.get_mut(id).unwrap().set_location(node.location() + Vec3::X * 0.5);
        node.move_gem_to_node(&mut f.gems, &f.layout, 0.0);
        assert_eq!(f.gems.get(id).unwrap().state(), GemState::Idle);

        f.gems.get_mut(id).unwrap().set_location(node.location() + Vec3::X * 30.0);
        node.move_gem_to_node(&mut f.gems, &f.layout, 0.0);
        assert_eq!(f.gems.get(id).unwrap().state(), GemState::Falling);
    }

    #[test]
    fn test_impulse_only_when_idle() {
        let mut f = fixture();
        let mut node = node_at(&f, 1, 1, PopMethod::PopAtPosition);
        let id = settled(&mut f, &mut node);

        node.add_impulse(&mut f.gems, Vec3::Y * 10.0);
        assert_eq!(f.gems.get(id).unwrap().state(), GemState::Falling);
        assert!((node.push_force().y - 9.0).abs() < 1e-5);

        // Already falling: ignored
        node.add_impulse(&mut f.gems, Vec3::Y * 10.0);
        assert!((node.push_force().y - 9.0).abs() < 1e-5);

        // Pushed falls resolve four times faster and clear the push
        let landing = node.move_gem_to_node(&mut f.gems, &f.layout, 0.01);
        assert!(landing.is_some());
        assert_eq!(landing.unwrap().target, GridIndex::new(2, 1));

        for _ in 0..10 {
            node.move_gem_to_node(&mut f.gems, &f.layout, 0.01);
        }
        assert_eq!(node.push_force(), Vec3::ZERO);
    }

    #[test]
    fn test_frozen_gem_snaps_to_node() {
        let mut f = fixture();
        let mut node = node_at(&f, 0, 0, PopMethod::PopAtPosition);
        let id = f.gems.insert(GemParams::default());
        let gem = f.gems.get_mut(id).unwrap();
        gem.set_location(Vec3::new(999.0, 0.0, 0.0));
        node.attach_gem(gem, false, &mut f.map, &f.layout);
        let frozen: Rc<dyn GemAttachment> = Rc::new(Frozen);
        f.gems.get_mut(id).unwrap().attach(&frozen);

        node.move_gem_to_node(&mut f.gems, &f.layout, 0.016);
        let gem = f.gems.get(id).unwrap();
        assert_eq!(gem.state(), GemState::Idle);
        assert_eq!(gem.location(), node.location());
    }

    #[test]
    fn test_index_in_direction() {
        let f = fixture();
        let node = node_at(&f, 1, 1, PopMethod::PopAtPosition);

        assert_eq!(node.index_in_direction(&f.layout, Vec3::ZERO), GridIndex::new(1, 1));
        // Node axis is +X, lane axis is +Y
        assert_eq!(node.index_in_direction(&f.layout, Vec3::X * 3.0), GridIndex::new(1, 2));
        assert_eq!(node.index_in_direction(&f.layout, -Vec3::X), GridIndex::new(1, 0));
        assert_eq!(node.index_in_direction(&f.layout, Vec3::Y), GridIndex::new(2, 1));
        assert_eq!(node.index_in_direction(&f.layout, Vec3::new(1.0, 1.0, 0.0)), GridIndex::new(2, 2));
        // Straight out of the plane stays put
        assert_eq!(node.index_in_direction(&f.layout, Vec3::Z), GridIndex::new(1, 1));
    }

    #[test]
    fn test_request_chrono() {
        let f = fixture();
        let mut node = node_at(&f, 0, 0, PopMethod::PopAtPosition);
        node.delay_grid_direct_request = 1.0;

        node.record_request(false, 0.6);
        assert!(!node.grid_request_due());
        node.record_request(false, 0.6);
        assert!(node.grid_request_due());

        // The due request resets the wait even when it fails
        node.record_request(false, 0.6);
        assert!((node.grid_request_chrono() - 0.6).abs() < 1e-6);

        node.record_request(true, 0.6);
        assert_eq!(node.grid_request_chrono(), 0.0);
    }
}
