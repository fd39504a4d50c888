//! Shared types for the tether workspace: entity identity, kinematic state,
//! and the deterministic random source used by world effects.

pub mod rng;
pub mod types;

pub use rng::SplitMix64;
pub use types::{EntityId, Kinematics};
