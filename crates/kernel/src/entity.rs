//! Entities: kinematic state plus behavior composed through hook channels.
//!
//! # Invariants
//! - Every hook subscription an entity makes is owned by the entity's own
//!   [`Disposables`]; disposing the entity stops all of its hooks.
//! - Identity is the [`EntityId`]: two [`EntityRef`]s are equal iff they point
//!   at the same entity.
//! - Removal from a world and disposal are separate operations. A world links
//!   them at spawn time unless the entity opts out.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tether_common::{EntityId, Kinematics};
use tether_event::{Channel, Disposable, DisposableKey, Disposables, EventError};

use crate::services::RenderTarget;
use crate::world::World;

/// Tag carried by every entity. Views select entities by tag rather than by
/// inspecting behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Projectile,
    Player,
    Prop,
    Marker,
}

/// Outcome of a collision test for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionResponse {
    /// The entity ceases independent existence because of this collision.
    Stop,
    /// Nothing changes; keep testing the entity.
    Continue,
}

/// What an entity collided with.
#[derive(Debug, Clone)]
pub enum Surface {
    Terrain,
    Entity(EntityRef),
}

/// Payload of one update notification.
#[derive(Debug, Clone)]
pub struct Update {
    pub world: World,
    pub tick: u64,
    pub dt: f32,
}

/// Payload of one collision test.
#[derive(Debug, Clone)]
pub struct Collision {
    pub world: World,
    pub other: Surface,
    pub intersection: Vec3,
}

/// Per-entity behavior, attached with [`Entity::attach`].
///
/// Every hook has a no-op default, so a behavior implements only what it needs.
pub trait Behavior {
    fn name(&self) -> &'static str;

    fn on_update(&self, _entity: &EntityRef, _update: &Update) -> Result<(), EventError> {
        Ok(())
    }

    fn on_collide(&self, _entity: &EntityRef, _collision: &Collision) -> Result<(), EventError> {
        Ok(())
    }

    /// Any removal implied by the response is this hook's job.
    fn collision_response(
        &self,
        _entity: &EntityRef,
        _collision: &Collision,
    ) -> Result<CollisionResponse, EventError> {
        Ok(CollisionResponse::Continue)
    }

    fn render(&self, _entity: &Entity, _target: &mut dyn RenderTarget) {}
}

/// A simulation participant.
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    kinematics: Cell<Kinematics>,
    on_update: Channel<Update>,
    on_collide: Channel<Collision>,
    behaviors: RefCell<Vec<Rc<dyn Behavior>>>,
    disposables: Disposables,
    dispose_on_removal: Cell<bool>,
    removal_hook: Cell<Option<DisposableKey>>,
    this: Weak<Entity>,
}

impl Entity {
    /// Start building an entity tagged `kind`.
    pub fn builder(kind: EntityKind) -> EntityBuilder {
        EntityBuilder {
            kind,
            kinematics: Kinematics::default(),
            behaviors: Vec::new(),
            dispose_on_removal: true,
        }
    }

    /// Stable identity; equality and registry order follow it.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Tag assigned at build time.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Current position and velocity.
    pub fn kinematics(&self) -> Kinematics {
        self.kinematics.get()
    }

    /// Overwrite position and velocity together.
    pub fn set_kinematics(&self, kinematics: Kinematics) {
        self.kinematics.set(kinematics);
    }

    /// World-space position.
    pub fn position(&self) -> Vec3 {
        self.kinematics.get().position
    }

    /// Move the entity without touching its velocity.
    pub fn set_position(&self, position: Vec3) {
        let mut k = self.kinematics.get();
        k.position = position;
        self.kinematics.set(k);
    }

    /// Velocity in units per second.
    pub fn velocity(&self) -> Vec3 {
        self.kinematics.get().velocity
    }

    /// Replace the velocity.
    pub fn set_velocity(&self, velocity: Vec3) {
        let mut k = self.kinematics.get();
        k.velocity = velocity;
        self.kinematics.set(k);
    }

    /// Add an impulse to the current velocity.
    pub fn add_velocity(&self, delta: Vec3) {
        self.set_velocity(self.velocity() + delta);
    }

    /// The aggregate that scopes this entity's subscriptions. Anything added here
    /// is released together with the entity.
    pub fn disposables(&self) -> &Disposables {
        &self.disposables
    }

    /// Channel published once per world step.
    pub fn update_channel(&self) -> &Channel<Update> {
        &self.on_update
    }

    /// Channel published before collision responses are collected.
    pub fn collide_channel(&self) -> &Channel<Collision> {
        &self.on_collide
    }

    /// Whether leaving a world also disposes this entity.
    pub fn disposes_on_removal(&self) -> bool {
        self.dispose_on_removal.get()
    }

    /// Choose whether removal from a world also disposes this entity.
    pub fn set_dispose_on_removal(&self, enabled: bool) {
        self.dispose_on_removal.set(enabled);
    }

    /// Store the key of the registry hook installed by the last spawn and release
    /// the one it replaces. An entity tracks a single world at a time.
    pub(crate) fn replace_removal_hook(&self, key: DisposableKey) -> Result<(), EventError> {
        if let Some(previous) = self.removal_hook.replace(Some(key)) {
            self.disposables.release(previous)?;
        }
        Ok(())
    }

    /// Names of the attached behaviors, in attach order.
    pub fn behavior_names(&self) -> Vec<&'static str> {
        self.behaviors.borrow().iter().map(|b| b.name()).collect()
    }

    /// Subscribe `behavior`'s hooks into this entity's channels.
    pub fn attach(&self, behavior: Rc<dyn Behavior>) {
        let (this, hook) = (self.this.clone(), Rc::clone(&behavior));
        self.disposables
            .add(self.on_update.subscribe(move |update| match this.upgrade() {
                Some(entity) => hook.on_update(&EntityRef(entity), update),
                None => Ok(()),
            }));
        let (this, hook) = (self.this.clone(), Rc::clone(&behavior));
        self.disposables
            .add(self.on_collide.subscribe(move |collision| match this.upgrade() {
                Some(entity) => hook.on_collide(&EntityRef(entity), collision),
                None => Ok(()),
            }));
        tracing::debug!(entity = %self.id, behavior = behavior.name(), "behavior attached");
        self.behaviors.borrow_mut().push(behavior);
    }

    /// Scope a plain closure as an update hook of this entity.
    pub fn hook_update<F>(&self, hook: F)
    where
        F: Fn(&EntityRef, &Update) -> Result<(), EventError> + 'static,
    {
        let this = self.this.clone();
        self.disposables
            .add(self.on_update.subscribe(move |update| match this.upgrade() {
                Some(entity) => hook(&EntityRef(entity), update),
                None => Ok(()),
            }));
    }

    /// Scope a plain closure as a collision hook of this entity.
    pub fn hook_collide<F>(&self, hook: F)
    where
        F: Fn(&EntityRef, &Collision) -> Result<(), EventError> + 'static,
    {
        let this = self.this.clone();
        self.disposables
            .add(self.on_collide.subscribe(move |collision| match this.upgrade() {
                Some(entity) => hook(&EntityRef(entity), collision),
                None => Ok(()),
            }));
    }

    /// Fire the update hooks.
    pub fn update(&self, update: &Update) -> Result<(), EventError> {
        self.on_update.publish(update)
    }

    /// Run one collision test: fire the collision hooks, then ask each behavior
    /// for its response. The first `Stop` wins.
    pub fn on_collision_test(
        &self,
        collision: &Collision,
    ) -> Result<CollisionResponse, EventError> {
        self.on_collide.publish(collision)?;
        let Some(entity) = self.this.upgrade().map(EntityRef) else {
            return Ok(CollisionResponse::Continue);
        };
        let behaviors = self.behaviors.borrow().clone();
        for behavior in behaviors {
            if behavior.collision_response(&entity, collision)? == CollisionResponse::Stop {
                tracing::debug!(entity = %self.id, behavior = behavior.name(), "collision stop");
                return Ok(CollisionResponse::Stop);
            }
        }
        Ok(CollisionResponse::Continue)
    }

    pub fn render(&self, target: &mut dyn RenderTarget) {
        let behaviors = self.behaviors.borrow().clone();
        for behavior in behaviors {
            behavior.render(self, target);
        }
    }

    /// Release every hook and drop the attached behaviors.
    pub fn dispose(&self) -> Result<(), EventError> {
        tracing::debug!(entity = %self.id, "dispose");
        let released = self.disposables.dispose();
        self.behaviors.borrow_mut().clear();
        released
    }

    pub fn is_disposed(&self) -> bool {
        self.disposables.is_disposed()
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("kinematics", &self.kinematics.get())
            .finish()
    }
}

/// Shared handle to an [`Entity`], compared and ordered by id.
#[derive(Clone)]
pub struct EntityRef(Rc<Entity>);

impl std::ops::Deref for EntityRef {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &self.0
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for EntityRef {}

impl PartialOrd for EntityRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

impl std::hash::Hash for EntityRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl std::fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}#{}", self.0.kind, self.0.id)
    }
}

/// Builder for entities.
pub struct EntityBuilder {
    kind: EntityKind,
    kinematics: Kinematics,
    behaviors: Vec<Rc<dyn Behavior>>,
    dispose_on_removal: bool,
}

impl EntityBuilder {
    pub fn position(mut self, position: Vec3) -> Self {
        self.kinematics.position = position;
        self
    }

    pub fn velocity(mut self, velocity: Vec3) -> Self {
        self.kinematics.velocity = velocity;
        self
    }

    pub fn behavior(mut self, behavior: impl Behavior + 'static) -> Self {
        self.behaviors.push(Rc::new(behavior));
        self
    }

    /// Keep hooks alive after the entity leaves a world.
    pub fn keep_subscriptions_on_removal(mut self) -> Self {
        self.dispose_on_removal = false;
        self
    }

    pub fn build(self) -> EntityRef {
        let entity = EntityRef(Rc::new_cyclic(|this| Entity {
            id: EntityId::new(),
            kind: self.kind,
            kinematics: Cell::new(self.kinematics),
            on_update: Channel::new(),
            on_collide: Channel::new(),
            behaviors: RefCell::new(Vec::new()),
            disposables: Disposables::new(),
            dispose_on_removal: Cell::new(self.dispose_on_removal),
            removal_hook: Cell::new(None),
            this: this.clone(),
        }));
        for behavior in self.behaviors {
            entity.attach(behavior);
        }
        entity
    }
}
