//! Scoped release of subscriptions and other resources.
//!
//! # Invariants
//! - Releasing a handle more than once has no additional effect.
//! - An aggregate releases each child exactly once, in insertion order, and keeps
//!   going past failures; failures are reported after every child was attempted.
//! - Dropping a handle or aggregate releases whatever is still active.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Weak;

use crate::channel::Unsubscribe;
use crate::error::EventError;

/// Something that stays active until released.
pub trait Disposable {
    /// Release the resource. Idempotent.
    fn dispose(&self) -> Result<(), EventError>;

    fn is_disposed(&self) -> bool;
}

impl<D: Disposable + ?Sized> Disposable for Box<D> {
    fn dispose(&self) -> Result<(), EventError> {
        (**self).dispose()
    }

    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }
}

/// Handle for one channel listener.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    channel: Weak<dyn Unsubscribe>,
    id: u64,
    active: Cell<bool>,
}

impl Subscription {
    pub(crate) fn new(channel: Weak<dyn Unsubscribe>, id: u64) -> Self {
        Self {
            channel,
            id,
            active: Cell::new(true),
        }
    }

    /// Keep the listener registered for as long as the channel lives.
    pub fn detach(self) {
        self.active.set(false);
    }
}

impl Disposable for Subscription {
    fn dispose(&self) -> Result<(), EventError> {
        if self.active.replace(false) {
            if let Some(channel) = self.channel.upgrade() {
                channel.unsubscribe(self.id);
            }
        }
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        !self.active.get()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Unsubscribing cannot fail.
        let _ = self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .finish()
    }
}

/// A one-shot release action.
#[must_use = "dropping an OnDispose runs its action immediately"]
pub struct OnDispose<F>
where
    F: FnOnce() -> Result<(), EventError>,
{
    action: RefCell<Option<F>>,
}

/// Wrap `action` as a [`Disposable`]. It runs on the first release only.
pub fn on_dispose<F>(action: F) -> OnDispose<F>
where
    F: FnOnce() -> Result<(), EventError>,
{
    OnDispose {
        action: RefCell::new(Some(action)),
    }
}

impl<F> Disposable for OnDispose<F>
where
    F: FnOnce() -> Result<(), EventError>,
{
    fn dispose(&self) -> Result<(), EventError> {
        let action = self.action.borrow_mut().take();
        match action {
            Some(action) => action(),
            None => Ok(()),
        }
    }

    fn is_disposed(&self) -> bool {
        self.action.borrow().is_none()
    }
}

impl<F> Drop for OnDispose<F>
where
    F: FnOnce() -> Result<(), EventError>,
{
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            tracing::warn!(error = %err, "release action failed on drop");
        }
    }
}

/// Key of a child inside a [`Disposables`] aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisposableKey(u64);

/// An aggregate of child handles released together.
///
/// Children are kept in insertion order. The aggregate is itself [`Disposable`],
/// so aggregates nest. Dropping it releases the remaining children.
#[derive(Default)]
pub struct Disposables {
    next_key: Cell<u64>,
    children: RefCell<BTreeMap<DisposableKey, Box<dyn Disposable>>>,
    disposed: Cell<bool>,
}

impl Disposables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `child`. It is released by the next [`Disposables::dispose`].
    pub fn add(&self, child: impl Disposable + 'static) -> DisposableKey {
        let key = DisposableKey(self.next_key.get());
        self.next_key.set(key.0 + 1);
        self.children.borrow_mut().insert(key, Box::new(child));
        self.disposed.set(false);
        key
    }

    /// Release a single child ahead of the rest. Returns `false` if the key is
    /// unknown or was already released.
    pub fn release(&self, key: DisposableKey) -> Result<bool, EventError> {
        let child = self.children.borrow_mut().remove(&key);
        match child {
            Some(child) => child.dispose().map(|()| true),
            None => Ok(false),
        }
    }

    /// Number of children still waiting to be released.
    pub fn len(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Disposable for Disposables {
    fn dispose(&self) -> Result<(), EventError> {
        // Detach the children first: a release may add to or release from this
        // aggregate without hitting an outstanding borrow.
        let children = std::mem::take(&mut *self.children.borrow_mut());
        self.disposed.set(true);

        let attempted = children.len();
        let mut failures = Vec::new();
        for (_, child) in children {
            if let Err(err) = child.dispose() {
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            tracing::debug!(attempted, failed = failures.len(), "aggregate release failed");
            Err(EventError::Release {
                attempted,
                failures,
            })
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get() && self.children.borrow().is_empty()
    }
}

impl Drop for Disposables {
    fn drop(&mut self) {
        if self.children.get_mut().is_empty() {
            return;
        }
        if let Err(err) = self.dispose() {
            tracing::warn!(error = %err, "implicit release failed");
        }
    }
}

impl std::fmt::Debug for Disposables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposables")
            .field("children", &self.len())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}
