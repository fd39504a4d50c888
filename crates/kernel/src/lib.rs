//! World kernel: entity lifecycle, collision protocol, and the world entity
//! registry, wired through the `tether-event` substrate.
//!
//! # Invariants
//! - One logical thread of control; all dispatch is synchronous and reentrant.
//! - Each step runs update, then collisions, then render.
//! - Worlds are explicit context objects. There is no process-wide state.

pub mod behaviors;
pub mod config;
pub mod entity;
pub mod error;
pub mod services;
pub mod world;

pub use behaviors::{Ballistic, Explosive, KillFloor, ProjectileModel, StopOnCollision, projectile};
pub use config::{ProjectileConfig, SimulationConfig};
pub use entity::{
    Behavior, Collision, CollisionResponse, Entity, EntityBuilder, EntityKind, EntityRef, Surface,
    Update,
};
pub use error::KernelError;
pub use services::{
    CollisionDetector, Contact, DrawCommand, Explosion, NullTerrain, RecordingTerrain,
    RenderTarget, Terrain,
};
pub use world::{CollisionReport, FrameReport, RenderFrame, World};

pub fn crate_info() -> &'static str {
    "tether-kernel v0.1.0"
}
