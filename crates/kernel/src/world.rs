use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tether_common::{EntityId, SplitMix64};
use tether_event::{Channel, EventError, ReactiveSet, Subscription};

use crate::config::SimulationConfig;
use crate::entity::{Collision, CollisionResponse, EntityRef, Surface, Update};
use crate::error::KernelError;
use crate::services::{CollisionDetector, Contact, NullTerrain, RenderTarget, Terrain};

/// Payload of one render notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderFrame {
    pub tick: u64,
}

/// Counters from one collision phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionReport {
    /// Collision tests actually run.
    pub tested: usize,
    /// Tests that answered [`CollisionResponse::Stop`].
    pub stopped: usize,
    /// Participants skipped because they had left the world or already stopped.
    pub skipped: usize,
}

/// Counters from one full frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameReport {
    pub tick: u64,
    pub collisions: CollisionReport,
    pub draw_calls: usize,
    pub entities: usize,
}

struct WorldInner {
    config: SimulationConfig,
    entities: ReactiveSet<EntityRef>,
    on_update: Channel<Update>,
    on_render: Channel<RenderFrame>,
    terrain: Rc<dyn Terrain>,
    rng: Cell<SplitMix64>,
    tick: Cell<u64>,
}

/// The simulation context: entity registry, frame channels and world services.
///
/// A `World` is a cheap-clone handle; every clone sees the same state. Nothing
/// here is process-wide, so independent worlds can run side by side.
///
/// # Invariants
/// - Update always runs before render within a step.
/// - Registry passes are snapshot-stable: entities removed mid-pass are not
///   visited afterwards, entities added mid-pass wait for the next pass.
/// - An entity spawned with disposal-on-removal is disposed exactly when its
///   remove event fires.
#[derive(Clone)]
pub struct World {
    inner: Rc<WorldInner>,
}

impl World {
    /// Create a world with no terrain effects.
    pub fn new(config: SimulationConfig) -> Result<Self, KernelError> {
        Self::with_terrain(config, Rc::new(NullTerrain))
    }

    /// Create a world whose explosions damage `terrain`.
    pub fn with_terrain(
        config: SimulationConfig,
        terrain: Rc<dyn Terrain>,
    ) -> Result<Self, KernelError> {
        config.validate()?;
        let rng = SplitMix64::new(config.seed);
        Ok(Self {
            inner: Rc::new(WorldInner {
                config,
                entities: ReactiveSet::new(),
                on_update: Channel::new(),
                on_render: Channel::new(),
                terrain,
                rng: Cell::new(rng),
                tick: Cell::new(0),
            }),
        })
    }

    /// Validated configuration the world was built with.
    pub fn config(&self) -> &SimulationConfig {
        &self.inner.config
    }

    /// Steps taken since creation or the last reset.
    pub fn tick(&self) -> u64 {
        self.inner.tick.get()
    }

    /// The entity registry.
    pub fn entities(&self) -> &ReactiveSet<EntityRef> {
        &self.inner.entities
    }

    /// Number of registered entities.
    pub fn entity_count(&self) -> usize {
        self.inner.entities.len()
    }

    /// Whether `entity` is currently registered.
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.inner.entities.contains(entity)
    }

    /// Terrain service receiving explosion damage.
    pub fn terrain(&self) -> &dyn Terrain {
        self.inner.terrain.as_ref()
    }

    /// Register `entity`. Returns `false` if it was already registered.
    ///
    /// Installs the entity's removal hook first: a registry listener, owned by
    /// the entity's own aggregate, that disposes the entity when it is removed
    /// (unless it opted out via [`crate::Entity::set_dispose_on_removal`]).
    /// Respawning replaces the hook left by an earlier spawn.
    pub fn spawn(&self, entity: EntityRef) -> Result<bool, EventError> {
        if self.contains(&entity) {
            return Ok(false);
        }
        let id = entity.id();
        let hook = self.inner.entities.on_remove(move |removed| {
            if removed.id() == id && removed.disposes_on_removal() {
                removed.dispose()?;
            }
            Ok(())
        });
        let key = entity.disposables().add(hook);
        entity.replace_removal_hook(key)?;
        tracing::debug!(entity = %id, kind = ?entity.kind(), "spawn");
        self.inner.entities.insert(entity)
    }

    /// Unregister `entity`. Removing an absent entity returns `false`.
    pub fn remove(&self, entity: &EntityRef) -> Result<bool, EventError> {
        let removed = self.inner.entities.remove(entity)?;
        if removed {
            tracing::debug!(entity = %entity.id(), "remove");
        }
        Ok(removed)
    }

    /// Listen to world-level update notifications.
    pub fn on_update<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Update) -> Result<(), EventError> + 'static,
    {
        self.inner.on_update.subscribe(listener)
    }

    /// Listen to world-level render notifications.
    pub fn on_render<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RenderFrame) -> Result<(), EventError> + 'static,
    {
        self.inner.on_render.subscribe(listener)
    }

    /// Advance one step: publish the world update, then run the update hooks of
    /// every registered entity.
    pub fn step(&self) -> Result<(), EventError> {
        let tick = self.inner.tick.get() + 1;
        self.inner.tick.set(tick);
        let _span = tracing::info_span!("world_step", tick).entered();

        let update = Update {
            world: self.clone(),
            tick,
            dt: self.inner.config.dt,
        };
        self.inner.on_update.publish(&update)?;
        for entity in self.inner.entities.iter() {
            entity.update(&update)?;
        }
        Ok(())
    }

    /// Publish the render notification, then let every entity submit draws.
    pub fn render(&self, target: &mut dyn RenderTarget) -> Result<(), EventError> {
        self.inner.on_render.publish(&RenderFrame { tick: self.tick() })?;
        for entity in self.inner.entities.iter() {
            entity.render(target);
        }
        Ok(())
    }

    /// Run the collision tests for `contacts`, in order.
    ///
    /// Each participant of a contact is tested once. Participants that are no
    /// longer registered, or that already answered `Stop` in this phase, are
    /// skipped.
    pub fn resolve_contacts(&self, contacts: &[Contact]) -> Result<CollisionReport, EventError> {
        let _span = tracing::info_span!("collision_phase", contacts = contacts.len()).entered();
        let mut report = CollisionReport::default();
        let mut stopped: BTreeSet<EntityId> = BTreeSet::new();

        for contact in contacts {
            let mut tests = vec![(contact.entity.clone(), contact.other.clone())];
            if let Surface::Entity(other) = &contact.other {
                tests.push((other.clone(), Surface::Entity(contact.entity.clone())));
            }

            for (entity, other) in tests {
                if stopped.contains(&entity.id()) || !self.contains(&entity) {
                    report.skipped += 1;
                    continue;
                }
                let collision = Collision {
                    world: self.clone(),
                    other,
                    intersection: contact.intersection,
                };
                report.tested += 1;
                if entity.on_collision_test(&collision)? == CollisionResponse::Stop {
                    stopped.insert(entity.id());
                    report.stopped += 1;
                }
            }
        }

        tracing::debug!(
            tested = report.tested,
            stopped = report.stopped,
            skipped = report.skipped,
            "collision phase complete"
        );
        Ok(report)
    }

    /// Ask `detector` for this step's contacts and resolve them.
    pub fn run_collision_phase(
        &self,
        detector: &mut dyn CollisionDetector,
    ) -> Result<CollisionReport, EventError> {
        let contacts = detector.detect(&self.inner.entities.snapshot());
        self.resolve_contacts(&contacts)
    }

    /// One full frame: update, collisions, then render.
    pub fn advance_frame(
        &self,
        detector: &mut dyn CollisionDetector,
        target: &mut dyn RenderTarget,
    ) -> Result<FrameReport, KernelError> {
        self.step()?;
        let collisions = self.run_collision_phase(detector)?;

        let mut counter = CountingTarget {
            inner: target,
            submitted: 0,
        };
        self.render(&mut counter)?;

        Ok(FrameReport {
            tick: self.tick(),
            collisions,
            draw_calls: counter.submitted,
            entities: self.entity_count(),
        })
    }

    /// Pseudo-random unit vector from the world's seeded generator.
    pub fn random_unit_vector(&self) -> Vec3 {
        let mut rng = self.inner.rng.get();
        let v = rng.unit_vector();
        self.inner.rng.set(rng);
        v
    }

    /// Restart the simulation: remove every entity (running their removal
    /// hooks), rewind the tick and reseed the generator.
    pub fn reset(&self) -> Result<(), EventError> {
        tracing::debug!(entities = self.entity_count(), "reset");
        self.inner.entities.clear()?;
        self.inner.tick.set(0);
        self.inner.rng.set(SplitMix64::new(self.inner.config.seed));
        Ok(())
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.tick())
            .field("entities", &self.entity_count())
            .finish()
    }
}

struct CountingTarget<'a> {
    inner: &'a mut dyn RenderTarget,
    submitted: usize,
}

impl RenderTarget for CountingTarget<'_> {
    fn submit(&mut self, command: crate::services::DrawCommand) {
        self.submitted += 1;
        self.inner.submit(command);
    }
}
