use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Simulation-wide settings. Every field has a default, so partial YAML files work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seconds advanced per step.
    pub dt: f32,
    /// Seed for the world RNG (fallback directions of area effects).
    pub seed: u64,
    pub projectile: ProjectileConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            seed: 0,
            projectile: ProjectileConfig::default(),
        }
    }
}

/// Tuning for projectiles and their explosions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileConfig {
    /// Projectiles below this height leave the world.
    pub kill_floor: f32,
    /// Radius of the destructive terrain effect.
    pub explosion_radius: f32,
    /// Upper bound on the velocity change applied to a pushed entity.
    pub max_push: f32,
    /// Push strength is `falloff / distance²`, capped at `max_push`.
    pub push_falloff: f32,
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        Self {
            kill_floor: -200.0,
            explosion_radius: 3.0,
            max_push: 2.0,
            push_falloff: 10.0,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), KernelError> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(KernelError::InvalidConfig(format!(
                "dt must be positive and finite, got {}",
                self.dt
            )));
        }
        let p = &self.projectile;
        for (name, value) in [
            ("explosion_radius", p.explosion_radius),
            ("max_push", p.max_push),
            ("push_falloff", p.push_falloff),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(KernelError::InvalidConfig(format!(
                    "projectile.{name} must be non-negative, got {value}"
                )));
            }
        }
        if p.kill_floor.is_nan() {
            return Err(KernelError::InvalidConfig(
                "projectile.kill_floor must be a number".into(),
            ));
        }
        Ok(())
    }
}
