//! Typed publish/subscribe with synchronous, ordered delivery.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::disposable::Subscription;
use crate::error::EventError;

type Listener<T> = Rc<dyn Fn(&T) -> Result<(), EventError>>;

struct Slot<T> {
    id: u64,
    listener: Listener<T>,
}

pub(crate) struct ChannelInner<T> {
    next_id: Cell<u64>,
    slots: RefCell<Vec<Slot<T>>>,
}

/// Detaches a listener by id. Lets a [`Subscription`] stay untyped.
pub(crate) trait Unsubscribe {
    fn unsubscribe(&self, id: u64);
}

impl<T> Unsubscribe for ChannelInner<T> {
    fn unsubscribe(&self, id: u64) {
        self.slots.borrow_mut().retain(|slot| slot.id != id);
    }
}

/// A notification channel carrying values of type `T`.
///
/// Cloning a channel yields another handle to the same listener list.
///
/// # Invariants
/// - Listeners fire synchronously, in subscription order, on the publishing thread.
/// - Publish iterates a snapshot of the listener list: a listener may subscribe or
///   unsubscribe (itself or others) mid-publish without skipping or repeating anyone.
///   A listener removed mid-publish still sees that publish, and no later one.
/// - No history is kept; late subscribers only see later publishes.
pub struct Channel<T> {
    inner: Rc<ChannelInner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("listeners", &self.inner.slots.borrow().len())
            .finish()
    }
}

impl<T: 'static> Channel<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ChannelInner {
                next_id: Cell::new(0),
                slots: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register a listener. It stays registered until the returned handle is
    /// disposed or dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) -> Result<(), EventError> + 'static,
    {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.slots.borrow_mut().push(Slot {
            id,
            listener: Rc::new(listener),
        });
        let inner: Rc<dyn Unsubscribe> = self.inner.clone();
        Subscription::new(Rc::downgrade(&inner), id)
    }

    /// Invoke every current listener with `value`.
    ///
    /// The first listener error aborts the rest of this dispatch and is returned
    /// to the caller unchanged.
    pub fn publish(&self, value: &T) -> Result<(), EventError> {
        let snapshot: Vec<Listener<T>> = self
            .inner
            .slots
            .borrow()
            .iter()
            .map(|slot| Rc::clone(&slot.listener))
            .collect();
        tracing::trace!(listeners = snapshot.len(), "publish");
        for listener in snapshot {
            listener(value)?;
        }
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listener_count() == 0
    }

    #[cfg(test)]
    pub(crate) fn downgrade(&self) -> std::rc::Weak<ChannelInner<T>> {
        Rc::downgrade(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposable::Disposable;

    #[test]
    fn listeners_fire_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let channel = Channel::<u32>::new();
        let l1 = log.clone();
        let _a = channel.subscribe(move |v| {
            l1.borrow_mut().push(format!("a{v}"));
            Ok(())
        });
        let l2 = log.clone();
        let _b = channel.subscribe(move |v| {
            l2.borrow_mut().push(format!("b{v}"));
            Ok(())
        });
        channel.publish(&1).unwrap();
        channel.publish(&2).unwrap();
        assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn dropping_subscription_detaches() {
        let channel = Channel::<()>::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = channel.subscribe(move |_| {
            h.set(h.get() + 1);
            Ok(())
        });
        channel.publish(&()).unwrap();
        drop(sub);
        channel.publish(&()).unwrap();
        assert_eq!(hits.get(), 1);
        assert!(channel.is_empty());
    }

    #[test]
    fn detached_subscription_keeps_listening() {
        let channel = Channel::<()>::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        channel
            .subscribe(move |_| {
                h.set(h.get() + 1);
                Ok(())
            })
            .detach();
        channel.publish(&()).unwrap();
        channel.publish(&()).unwrap();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn self_unsubscribe_during_publish_does_not_skip_others() {
        let channel = Channel::<()>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let own = slot.clone();
        let l = log.clone();
        *slot.borrow_mut() = Some(channel.subscribe(move |_| {
            l.borrow_mut().push("once");
            if let Some(sub) = own.borrow_mut().take() {
                sub.dispose()?;
            }
            Ok(())
        }));
        let l = log.clone();
        let _other = channel.subscribe(move |_| {
            l.borrow_mut().push("other");
            Ok(())
        });

        channel.publish(&()).unwrap();
        channel.publish(&()).unwrap();
        assert_eq!(*log.borrow(), vec!["once", "other", "other"]);
    }

    #[test]
    fn unsubscribing_another_listener_applies_to_next_publish() {
        let channel = Channel::<()>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let v = victim.clone();
        let l = log.clone();
        let _killer = channel.subscribe(move |_| {
            l.borrow_mut().push("killer");
            if let Some(sub) = v.borrow_mut().take() {
                sub.dispose()?;
            }
            Ok(())
        });
        let l = log.clone();
        *victim.borrow_mut() = Some(channel.subscribe(move |_| {
            l.borrow_mut().push("victim");
            Ok(())
        }));

        channel.publish(&()).unwrap();
        channel.publish(&()).unwrap();
        // In-flight publish still reaches the victim; the next one does not.
        assert_eq!(*log.borrow(), vec!["killer", "victim", "killer"]);
    }

    #[test]
    fn subscribing_during_publish_takes_effect_next_time() {
        let channel = Channel::<()>::new();
        let hits = Rc::new(Cell::new(0));
        let keep: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let ch = channel.clone();
        let h = hits.clone();
        let k = keep.clone();
        let _spawner = channel.subscribe(move |_| {
            let h = h.clone();
            k.borrow_mut().push(ch.subscribe(move |_| {
                h.set(h.get() + 1);
                Ok(())
            }));
            Ok(())
        });

        channel.publish(&()).unwrap();
        assert_eq!(hits.get(), 0);
        channel.publish(&()).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn listener_error_aborts_remaining_dispatch() {
        let channel = Channel::<()>::new();
        let reached = Rc::new(Cell::new(false));
        let _fail = channel.subscribe(|_| Err(EventError::msg("boom")));
        let r = reached.clone();
        let _after = channel.subscribe(move |_| {
            r.set(true);
            Ok(())
        });

        let err = channel.publish(&()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(!reached.get());
    }

    #[test]
    fn reentrant_publish_on_same_channel() {
        let channel = Channel::<u32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let ch = channel.clone();
        let l = log.clone();
        let _sub = channel.subscribe(move |v| {
            l.borrow_mut().push(*v);
            if *v > 0 {
                ch.publish(&(v - 1))?;
            }
            Ok(())
        });
        channel.publish(&3).unwrap();
        assert_eq!(*log.borrow(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn subscription_outliving_channel_is_harmless() {
        let channel = Channel::<()>::new();
        let weak = channel.downgrade();
        let sub = channel.subscribe(|_| Ok(()));
        drop(channel);
        assert!(weak.upgrade().is_none());
        sub.dispose().unwrap();
        assert!(sub.is_disposed());
    }
}
