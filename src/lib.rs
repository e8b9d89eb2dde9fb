//! # Puzzle Grid
//!
//! Deterministic simulation core for a match-3 puzzle grid.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PUZZLE GRID                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── vec3.rs     - World-space vector                        │
//! │  ├── easing.rs   - Easing curves for swap animation          │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  puzzle/         - Grid simulation (deterministic)           │
//! │  ├── gem.rs      - Gem state machine and arena               │
//! │  ├── node.rs     - Cells, landing, pop origin                │
//! │  ├── lane.rs     - Columns, cascades, refill                 │
//! │  ├── grid.rs     - Pools, deletion, recycling, forces        │
//! │  ├── swap.rs     - Selection and swap state machine          │
//! │  ├── matching.rs - Line scans, merging, destruction          │
//! │  └── tick.rs     - Per-tick pipeline and replay              │
//! │                                                              │
//! │  sim.rs          - Seeded headless sessions                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! A grid is driven only by its configuration, its hooks and the
//! sequence of `(SwapRequest, delta)` pairs fed to [`puzzle::tick::tick`]:
//! - Gem handles are allocated from an arena in a fixed order
//! - Pools and swaps are plain vectors walked in a fixed order
//! - No system time dependencies
//! - Headless sessions draw colours from seeded Xorshift128+
//!
//! Given identical inputs the grid reaches an identical
//! [`puzzle::Grid::compute_hash`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod puzzle;
pub mod sim;

// Re-export commonly used types
pub use core::vec3::Vec3;
pub use core::easing::Easing;
pub use core::rng::DeterministicRng;
pub use core::hash::StateHash;
pub use puzzle::{Grid, GridConfig, GridEvent, GridHooks, GemId, GridIndex, SwapRequest, TickResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default simulation tick rate (Hz)
pub const DEFAULT_TICK_RATE: u32 = 60;
