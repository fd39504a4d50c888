//! Boundaries to collaborators that live outside the kernel: terrain effects,
//! geometric collision detection, and draw submission.

use std::cell::RefCell;

use glam::{Mat4, Vec3};
use tether_common::EntityId;

use crate::entity::{EntityKind, EntityRef, Surface};

/// Terrain/world effect service.
pub trait Terrain {
    /// Apply a destructive effect of `radius` around `center`.
    fn generate_explosion(&self, center: Vec3, radius: f32);
}

/// Terrain that ignores every effect.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTerrain;

impl Terrain for NullTerrain {
    fn generate_explosion(&self, _center: Vec3, _radius: f32) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Explosion {
    pub center: Vec3,
    pub radius: f32,
}

/// Terrain that only records the effects it was asked for.
#[derive(Debug, Default)]
pub struct RecordingTerrain {
    explosions: RefCell<Vec<Explosion>>,
}

impl RecordingTerrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn explosions(&self) -> Vec<Explosion> {
        self.explosions.borrow().clone()
    }
}

impl Terrain for RecordingTerrain {
    fn generate_explosion(&self, center: Vec3, radius: f32) {
        self.explosions.borrow_mut().push(Explosion { center, radius });
    }
}

/// One geometric overlap found by a [`CollisionDetector`].
///
/// `entity` always takes part; when `other` is an entity too, both sides are
/// tested.
#[derive(Debug, Clone)]
pub struct Contact {
    pub entity: EntityRef,
    pub other: Surface,
    pub intersection: Vec3,
}

/// Finds overlaps among the current entities. Geometry lives outside the kernel.
pub trait CollisionDetector {
    fn detect(&mut self, entities: &[EntityRef]) -> Vec<Contact>;
}

/// A draw request produced by an entity's render hook.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub entity: EntityId,
    pub kind: EntityKind,
    pub model: Mat4,
}

/// Sink for draw requests.
pub trait RenderTarget {
    fn submit(&mut self, command: DrawCommand);
}

impl RenderTarget for Vec<DrawCommand> {
    fn submit(&mut self, command: DrawCommand) {
        self.push(command);
    }
}
