//! Puzzle Grid Module
//!
//! The match-3 simulation core. Deterministic given the same
//! configuration, hooks and request sequence.
//!
//! ## Module Structure
//!
//! - `index`: Grid coordinates and generational gem handles
//! - `config`: Grid configuration and validation
//! - `layout`: World-space placement of lanes and nodes
//! - `capability`: Attachment and comparator capability traits
//! - `gem`: Gem state machine and the gem arena
//! - `node`: Single grid cell, gem landing and pop origin
//! - `lane`: Column of nodes, cascades and refill requests
//! - `grid`: Gem pools, initialization, deletion and recycling
//! - `swap`: Selection and the swap state machine
//! - `matching`: Line scans, match merging and destruction
//! - `events`: Grid events for presentation and replay
//! - `hooks`: Decisions the grid asks its owner about
//! - `tick`: Per-tick pipeline

pub mod index;
pub mod config;
pub mod layout;
pub mod capability;
pub mod gem;
pub mod node;
pub mod lane;
pub mod grid;
pub mod swap;
pub mod matching;
pub mod events;
pub mod hooks;
pub mod tick;

// Re-export key types
pub use index::{GemId, GridIndex};
pub use config::{ConfigError, FillStrategy, GameplayMode, GemParams, GridConfig, GridSize, NodeSize};
pub use layout::GridLayout;
pub use capability::{GemAttachment, GemComparator};
pub use gem::{Gem, GemNotice, GemState};
pub use node::PopMethod;
pub use grid::{GemMap, GemPool, Grid};
pub use swap::{GemSwap, SwapRequest};
pub use matching::GridMatch;
pub use events::{GridEvent, GridEventData};
pub use hooks::{DefaultHooks, GridHooks};
pub use tick::{replay_grid, tick, TickResult};
