use std::cell::RefCell;
use std::rc::Rc;

use crate::channel::Channel;
use crate::disposable::Subscription;
use crate::error::EventError;

/// A single mutable value that announces changes.
///
/// Clones share the value and the change channel.
pub struct Observable<T> {
    value: Rc<RefCell<T>>,
    on_change: Channel<T>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
            on_change: self.on_change.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Observable").field(&*self.value.borrow()).finish()
    }
}

impl<T: PartialEq + Clone + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
            on_change: Channel::new(),
        }
    }

    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Store `value`. Listeners are notified only when it differs from the
    /// current value; returns whether it did.
    pub fn set(&self, value: T) -> Result<bool, EventError> {
        if *self.value.borrow() == value {
            return Ok(false);
        }
        *self.value.borrow_mut() = value.clone();
        self.on_change.publish(&value)?;
        Ok(true)
    }

    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) -> Result<(), EventError> + 'static,
    {
        self.on_change.subscribe(listener)
    }
}
