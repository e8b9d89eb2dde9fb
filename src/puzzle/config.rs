//! Grid Configuration
//!
//! Every tunable of the grid in one serde-friendly struct. Missing JSON
//! fields fall back to the defaults below.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::easing::Easing;
use crate::core::vec3::Vec3;
use super::node::PopMethod;

// =============================================================================
// ERRORS
// =============================================================================

/// Rejected grid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Lane count or lane length is not positive.
    #[error("grid size must be positive, got {lanes} lanes x {lane_length} nodes")]
    InvalidGridSize {
        /// Requested lane count
        lanes: i32,
        /// Requested nodes per lane
        lane_length: i32,
    },

    /// Lane or node spacing is not a positive finite number.
    #[error("node size must be positive, got lane spacing {lane_spacing}, node spacing {node_spacing}")]
    InvalidNodeSize {
        /// Distance between lanes
        lane_spacing: f32,
        /// Distance between nodes of a lane
        node_spacing: f32,
    },

    /// A rate that must be strictly positive is not.
    #[error("{field} must be positive, got {value}")]
    NonPositive {
        /// Offending field
        field: &'static str,
        /// Offending value
        value: f32,
    },

    /// A duration or distance that must not be negative is.
    #[error("{field} must not be negative, got {value}")]
    Negative {
        /// Offending field
        field: &'static str,
        /// Offending value
        value: f32,
    },

    /// Matches shorter than two cells would make every gem a match.
    #[error("min match count must be at least 2, got {0}")]
    MinMatchTooSmall(usize),

    /// Node and lane axes are zero or parallel, so the grid has no plane.
    #[error("node axis {node_axis} and lane axis {lane_axis} do not span a plane")]
    DegenerateAxes {
        /// Node axis
        node_axis: Vec3,
        /// Lane axis
        lane_axis: Vec3,
    },

    /// JSON could not be parsed.
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// ENUMS
// =============================================================================

/// How the grid reacts to a swap request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameplayMode {
    /// Swap the two requested gems and resolve matches.
    #[default]
    SwapGemAndMatch,
    /// Delete the first requested gem; no swaps, no matching.
    ClickAndDestroy,
}

/// Where recycled gems appear before falling into their node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FillStrategy {
    /// Inner nodes pop from behind the grid plane.
    #[default]
    NoStrategy,
    /// Every node pops in place.
    EveryOnePop,
    /// Inner nodes pop in place.
    InnerOnlyPop,
    /// Every node pops from in front of the grid plane.
    EveryOneNormal,
    /// Inner nodes pop from in front of the grid plane.
    InnerOnlyNormal,
    /// Every node pops from behind the grid plane.
    EveryOneNormalInverse,
    /// Inner nodes pop from behind the grid plane.
    InnerOnlyNormalInverse,
}

impl FillStrategy {
    /// Pop method for inner nodes, and whether it also overrides the
    /// lane-edge and lane-end methods.
    pub fn pop_method(self) -> (PopMethod, bool) {
        match self {
            FillStrategy::NoStrategy => (PopMethod::FromGridInverseNormal, false),
            FillStrategy::EveryOnePop => (PopMethod::PopAtPosition, true),
            FillStrategy::InnerOnlyPop => (PopMethod::PopAtPosition, false),
            FillStrategy::EveryOneNormal => (PopMethod::FromGridNormal, true),
            FillStrategy::InnerOnlyNormal => (PopMethod::FromGridNormal, false),
            FillStrategy::EveryOneNormalInverse => (PopMethod::FromGridInverseNormal, true),
            FillStrategy::InnerOnlyNormalInverse => (PopMethod::FromGridInverseNormal, false),
        }
    }
}

// =============================================================================
// SIZES
// =============================================================================

/// Grid footprint: lanes x nodes per lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    /// Number of lanes
    pub lanes: i32,
    /// Nodes per lane
    pub lane_length: i32,
}

impl GridSize {
    /// Create a grid size.
    pub const fn new(lanes: i32, lane_length: i32) -> Self {
        Self { lanes, lane_length }
    }

    /// Number of cells.
    pub fn cell_count(self) -> usize {
        (self.lanes.max(0) as usize) * (self.lane_length.max(0) as usize)
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self::new(8, 8)
    }
}

/// World-space spacing between lanes and between nodes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSize {
    /// Distance between two adjacent lanes
    pub lane_spacing: f32,
    /// Distance between two adjacent nodes of a lane
    pub node_spacing: f32,
}

impl NodeSize {
    /// Create a node size.
    pub const fn new(lane_spacing: f32, node_spacing: f32) -> Self {
        Self { lane_spacing, node_spacing }
    }
}

impl Default for NodeSize {
    fn default() -> Self {
        Self::new(100.0, 100.0)
    }
}

// =============================================================================
// GEM PARAMETERS
// =============================================================================

/// Per-gem tunables, copied onto every gem the grid creates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GemParams {
    /// Fall progress per second (1.0 = one full node move per second)
    pub speed: f32,
    /// Seconds between being marked for deletion and being recycled
    pub deletion_delay: f32,
    /// Fraction of an external impulse converted into node push
    pub external_force_transfer_scale: f32,
    /// Seconds between touching down and the landing notification
    pub landing_delay: f32,
}

impl Default for GemParams {
    fn default() -> Self {
        Self {
            speed: 5.0,
            deletion_delay: 0.5,
            external_force_transfer_scale: 0.9,
            landing_delay: 0.0,
        }
    }
}

// =============================================================================
// GRID CONFIG
// =============================================================================

/// Full grid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Lanes x nodes per lane
    pub grid_size: GridSize,
    /// Lane and node spacing
    pub node_size: NodeSize,
    /// World position of the grid centre
    pub origin: Vec3,
    /// Direction nodes advance along inside a lane
    pub node_axis: Vec3,
    /// Direction lanes advance along
    pub lane_axis: Vec3,
    /// Swap progress per second
    pub swap_speed: f32,
    /// Shortest run along one axis that counts as a match
    pub min_match_count: usize,
    /// Spawn origin policy for recycled gems
    pub filling_strategy: FillStrategy,
    /// Swap-and-match or click-to-destroy
    pub gameplay_mode: GameplayMode,
    /// Easing applied to falls and swaps
    pub node_easing: Easing,
    /// Extra distance beyond the lane end where recycled gems appear
    pub recycling_zone_distance: f32,
    /// Seconds an empty node waits on its lane before asking the recycler directly
    pub delay_grid_direct_request: f32,
    /// Nodes only take gems from the recycler, never from the node above
    pub gem_from_grid_only: bool,
    /// Per-gem tunables
    pub gem: GemParams,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            grid_size: GridSize::default(),
            node_size: NodeSize::default(),
            origin: Vec3::ZERO,
            node_axis: Vec3::X,
            lane_axis: Vec3::Y,
            swap_speed: 2.0,
            min_match_count: 3,
            filling_strategy: FillStrategy::NoStrategy,
            gameplay_mode: GameplayMode::SwapGemAndMatch,
            node_easing: Easing::Linear,
            recycling_zone_distance: 5.0,
            delay_grid_direct_request: 3.0,
            gem_from_grid_only: false,
            gem: GemParams::default(),
        }
    }
}

impl GridConfig {
    /// Parse a config from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GridConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every field the simulation relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_grid_size(self.grid_size)?;
        validate_node_size(self.node_size)?;

        if self.node_axis.cross(self.lane_axis).try_normalize().is_none() {
            return Err(ConfigError::DegenerateAxes {
                node_axis: self.node_axis,
                lane_axis: self.lane_axis,
            });
        }

        positive("swap_speed", self.swap_speed)?;
        positive("gem.speed", self.gem.speed)?;

        if self.min_match_count < 2 {
            return Err(ConfigError::MinMatchTooSmall(self.min_match_count));
        }

        non_negative("recycling_zone_distance", self.recycling_zone_distance)?;
        non_negative("delay_grid_direct_request", self.delay_grid_direct_request)?;
        non_negative("gem.deletion_delay", self.gem.deletion_delay)?;
        non_negative("gem.landing_delay", self.gem.landing_delay)?;
        non_negative("gem.external_force_transfer_scale", self.gem.external_force_transfer_scale)?;

        Ok(())
    }
}

/// Reject empty footprints.
pub(crate) fn validate_grid_size(size: GridSize) -> Result<(), ConfigError> {
    if size.lanes <= 0 || size.lane_length <= 0 {
        return Err(ConfigError::InvalidGridSize {
            lanes: size.lanes,
            lane_length: size.lane_length,
        });
    }
    Ok(())
}

/// Reject zero, negative and non-finite spacing.
pub(crate) fn validate_node_size(size: NodeSize) -> Result<(), ConfigError> {
    let ok = |v: f32| v.is_finite() && v > 0.0;
    if !ok(size.lane_spacing) || !ok(size.node_spacing) {
        return Err(ConfigError::InvalidNodeSize {
            lane_spacing: size.lane_spacing,
            node_spacing: size.node_spacing,
        });
    }
    Ok(())
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GridConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_match_count, 3);
        assert_eq!(config.swap_speed, 2.0);
        assert_eq!(config.node_size, NodeSize::new(100.0, 100.0));
        assert_eq!(config.gem.deletion_delay, 0.5);
    }

    #[test]
    fn test_fill_strategy_table() {
        use PopMethod::*;
        assert_eq!(FillStrategy::NoStrategy.pop_method(), (FromGridInverseNormal, false));
        assert_eq!(FillStrategy::EveryOnePop.pop_method(), (PopAtPosition, true));
        assert_eq!(FillStrategy::InnerOnlyPop.pop_method(), (PopAtPosition, false));
        assert_eq!(FillStrategy::EveryOneNormal.pop_method(), (FromGridNormal, true));
        assert_eq!(FillStrategy::InnerOnlyNormal.pop_method(), (FromGridNormal, false));
        assert_eq!(FillStrategy::EveryOneNormalInverse.pop_method(), (FromGridInverseNormal, true));
        assert_eq!(FillStrategy::InnerOnlyNormalInverse.pop_method(), (FromGridInverseNormal, false));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = GridConfig::default();
        config.grid_size = GridSize::new(0, 5);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGridSize { .. })));

        let mut config = GridConfig::default();
        config.min_match_count = 1;
        assert!(matches!(config.validate(), Err(ConfigError::MinMatchTooSmall(1))));

        let mut config = GridConfig::default();
        config.lane_axis = config.node_axis * 2.0;
        assert!(matches!(config.validate(), Err(ConfigError::DegenerateAxes { .. })));

        let mut config = GridConfig::default();
        config.gem.deletion_delay = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Negative { .. })));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GridConfig::from_json(
            r#"{ "grid_size": { "lanes": 5, "lane_length": 6 }, "gem": { "speed": 8.0 } }"#,
        )
        .unwrap();

        assert_eq!(config.grid_size, GridSize::new(5, 6));
        assert_eq!(config.gem.speed, 8.0);
        assert_eq!(config.gem.deletion_delay, 0.5);
        assert_eq!(config.filling_strategy, FillStrategy::NoStrategy);
    }

    #[test]
    fn test_json_errors() {
        assert!(matches!(GridConfig::from_json("{ nope"), Err(ConfigError::Json(_))));
        assert!(matches!(
            GridConfig::from_json(r#"{ "swap_speed": 0.0 }"#),
            Err(ConfigError::NonPositive { field: "swap_speed", .. })
        ));
    }

    #[test]
    fn test_json_roundtrip_keeps_enums() {
        let mut config = GridConfig::default();
        config.gameplay_mode = GameplayMode::ClickAndDestroy;
        config.node_easing = Easing::BounceOut;

        let json = config.to_json().unwrap();
        assert_eq!(GridConfig::from_json(&json).unwrap(), config);
    }
}
