//! Core deterministic primitives.
//!
//! Nothing in here knows about gems or grids. The grid is built on top:
//! world-space vectors, the easing table, a seeded PRNG for headless
//! sessions and the state hasher used for replay verification.

pub mod vec3;
pub mod easing;
pub mod rng;
pub mod hash;

// Re-export core types
pub use vec3::Vec3;
pub use easing::{Easing, ease};
pub use rng::DeterministicRng;
pub use hash::{StateHash, StateHasher, compute_state_hash};
