//! Stock behaviors and the projectile they compose into.

use glam::{Mat4, Quat, Vec3};
use tether_event::EventError;

use crate::config::ProjectileConfig;
use crate::entity::{
    Behavior, Collision, CollisionResponse, Entity, EntityKind, EntityRef, Update,
};
use crate::services::{DrawCommand, RenderTarget};

/// Integrates velocity (plus optional constant acceleration) every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ballistic {
    pub gravity: Vec3,
}

impl Ballistic {
    pub fn with_gravity(gravity: Vec3) -> Self {
        Self { gravity }
    }
}

impl Behavior for Ballistic {
    fn name(&self) -> &'static str {
        "ballistic"
    }

    fn on_update(&self, entity: &EntityRef, update: &Update) -> Result<(), EventError> {
        let mut k = entity.kinematics();
        k.velocity += self.gravity * update.dt;
        k.integrate(update.dt);
        entity.set_kinematics(k);
        Ok(())
    }
}

/// Removes the entity from its world once it falls below `y`.
#[derive(Debug, Clone, Copy)]
pub struct KillFloor {
    pub y: f32,
}

impl KillFloor {
    pub fn new(y: f32) -> Self {
        Self { y }
    }
}

impl Behavior for KillFloor {
    fn name(&self) -> &'static str {
        "kill_floor"
    }

    fn on_update(&self, entity: &EntityRef, update: &Update) -> Result<(), EventError> {
        if entity.position().y < self.y && update.world.remove(entity)? {
            tracing::debug!(entity = %entity.id(), floor = self.y, "fell out of the world");
        }
        Ok(())
    }
}

/// On collision: damages terrain around the intersection and pushes every other
/// registered entity away from it.
#[derive(Debug, Clone, Copy)]
pub struct Explosive {
    pub radius: f32,
    pub max_push: f32,
    pub falloff: f32,
}

impl Explosive {
    pub fn from_config(config: &ProjectileConfig) -> Self {
        Self {
            radius: config.explosion_radius,
            max_push: config.max_push,
            falloff: config.push_falloff,
        }
    }

    /// Push strength at squared distance `distance_sq`. A zero distance gets the
    /// full `max_push`.
    pub fn strength(&self, distance_sq: f32) -> f32 {
        self.max_push.min(self.falloff / distance_sq)
    }
}

impl Behavior for Explosive {
    fn name(&self) -> &'static str {
        "explosive"
    }

    fn on_collide(&self, entity: &EntityRef, collision: &Collision) -> Result<(), EventError> {
        let origin = collision.intersection;
        let world = &collision.world;
        world.terrain().generate_explosion(origin, self.radius);

        let mut pushed = 0usize;
        for other in world.entities().iter() {
            if other == *entity {
                continue;
            }
            let offset = other.position() - origin;
            let strength = self.strength(offset.length_squared());
            // Coincident positions have no direction of their own.
            let direction = offset
                .try_normalize()
                .unwrap_or_else(|| world.random_unit_vector());
            other.add_velocity(direction * strength);
            pushed += 1;
        }
        tracing::debug!(entity = %entity.id(), ?origin, pushed, "explosion");
        Ok(())
    }
}

/// Leaves the world on the first collision.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOnCollision;

impl Behavior for StopOnCollision {
    fn name(&self) -> &'static str {
        "stop_on_collision"
    }

    fn collision_response(
        &self,
        entity: &EntityRef,
        collision: &Collision,
    ) -> Result<CollisionResponse, EventError> {
        collision.world.remove(entity)?;
        Ok(CollisionResponse::Stop)
    }
}

/// Draws the entity as a small model facing along its velocity.
#[derive(Debug, Clone, Copy)]
pub struct ProjectileModel {
    pub scale: f32,
}

impl Default for ProjectileModel {
    fn default() -> Self {
        Self { scale: 0.2 }
    }
}

impl ProjectileModel {
    pub fn model_matrix(&self, entity: &Entity) -> Mat4 {
        let facing = entity
            .velocity()
            .try_normalize()
            .map(|dir| Quat::from_rotation_arc(Vec3::NEG_Z, dir))
            .unwrap_or(Quat::IDENTITY);
        Mat4::from_translation(entity.position())
            * Mat4::from_quat(facing)
            * Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2)
            * Mat4::from_scale(Vec3::splat(self.scale))
    }
}

impl Behavior for ProjectileModel {
    fn name(&self) -> &'static str {
        "projectile_model"
    }

    fn render(&self, entity: &Entity, target: &mut dyn RenderTarget) {
        target.submit(DrawCommand {
            entity: entity.id(),
            kind: entity.kind(),
            model: self.model_matrix(entity),
        });
    }
}

/// A rocket: flies straight, explodes and stops on its first collision, and
/// leaves the world if it falls past the kill floor.
pub fn projectile(config: &ProjectileConfig, position: Vec3, velocity: Vec3) -> EntityRef {
    Entity::builder(EntityKind::Projectile)
        .position(position)
        .velocity(velocity)
        .behavior(Ballistic::default())
        .behavior(KillFloor::new(config.kill_floor))
        .behavior(Explosive::from_config(config))
        .behavior(StopOnCollision)
        .behavior(ProjectileModel::default())
        .build()
}
