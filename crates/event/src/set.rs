//! A mutable set instrumented with add/remove channels.
//!
//! # Invariants
//! - Every successful insert publishes exactly one add event, every successful
//!   remove exactly one remove event, and always after the store has changed.
//! - Redundant operations (inserting a member, removing a non-member) publish nothing.
//! - Bulk operations are pointwise compositions of single inserts/removes.
//! - Iteration runs over a snapshot taken at pass start, so listeners may mutate
//!   the set while a pass or a bulk operation is in progress.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::channel::Channel;
use crate::disposable::{Disposables, Subscription};
use crate::error::EventError;
use crate::observable::Observable;

/// A set with add/remove notifications.
///
/// Membership is by `Ord` equality and iteration follows `Ord` order. Clones
/// share the same store and channels.
pub struct ReactiveSet<T> {
    items: Rc<RefCell<BTreeSet<T>>>,
    on_add: Channel<T>,
    on_remove: Channel<T>,
}

impl<T> Clone for ReactiveSet<T> {
    fn clone(&self) -> Self {
        Self {
            items: Rc::clone(&self.items),
            on_add: self.on_add.clone(),
            on_remove: self.on_remove.clone(),
        }
    }
}

impl<T: Ord + Clone + 'static> Default for ReactiveSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReactiveSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.items.borrow().iter()).finish()
    }
}

impl<T: Ord + Clone + 'static> ReactiveSet<T> {
    pub fn new() -> Self {
        Self::with_channels(Channel::new(), Channel::new())
    }

    /// Build a set that publishes on existing channels.
    pub fn with_channels(on_add: Channel<T>, on_remove: Channel<T>) -> Self {
        Self {
            items: Rc::new(RefCell::new(BTreeSet::new())),
            on_add,
            on_remove,
        }
    }

    pub fn add_channel(&self) -> &Channel<T> {
        &self.on_add
    }

    pub fn remove_channel(&self) -> &Channel<T> {
        &self.on_remove
    }

    /// Insert `item`; returns whether it was newly added.
    pub fn insert(&self, item: T) -> Result<bool, EventError> {
        let added = self.items.borrow_mut().insert(item.clone());
        if added {
            tracing::trace!(len = self.len(), "set insert");
            self.on_add.publish(&item)?;
        }
        Ok(added)
    }

    /// Remove `item`; returns whether it was present. Removing a non-member is
    /// a no-op, not an error.
    pub fn remove(&self, item: &T) -> Result<bool, EventError> {
        let removed = self.items.borrow_mut().take(item);
        match removed {
            Some(removed) => {
                tracing::trace!(len = self.len(), "set remove");
                self.on_remove.publish(&removed)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.borrow().contains(item)
    }

    pub fn contains_all<'a, I>(&self, items: I) -> bool
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let store = self.items.borrow();
        items.into_iter().all(|item| store.contains(item))
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Copy of the current members in iteration order.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.borrow().iter().cloned().collect()
    }

    /// Remove every member. The former members are captured before the store
    /// is emptied; one remove event then fires per former member.
    pub fn clear(&self) -> Result<(), EventError> {
        let former = std::mem::take(&mut *self.items.borrow_mut());
        tracing::trace!(removed = former.len(), "set clear");
        for item in &former {
            self.on_remove.publish(item)?;
        }
        Ok(())
    }

    /// Snapshot-stable pass over the members.
    pub fn iter(&self) -> Cursor<T> {
        Cursor {
            set: self.clone(),
            pending: self.snapshot().into_iter(),
            current: None,
        }
    }

    /// Insert each item; returns whether any was newly added.
    pub fn insert_all<I>(&self, items: I) -> Result<bool, EventError>
    where
        I: IntoIterator<Item = T>,
    {
        let mut changed = false;
        for item in items {
            changed |= self.insert(item)?;
        }
        Ok(changed)
    }

    /// Remove each item; returns whether any was present.
    pub fn remove_all<'a, I>(&self, items: I) -> Result<bool, EventError>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut changed = false;
        for item in items {
            changed |= self.remove(item)?;
        }
        Ok(changed)
    }

    /// Keep only the members for which `keep` holds; returns whether any was removed.
    pub fn retain<F>(&self, mut keep: F) -> Result<bool, EventError>
    where
        F: FnMut(&T) -> bool,
    {
        let mut changed = false;
        let mut cursor = self.iter();
        while let Some(item) = cursor.next() {
            if !keep(&item) {
                changed |= cursor.remove_current()?;
            }
        }
        Ok(changed)
    }

    /// Keep only the members that also appear in `items`.
    pub fn retain_only<'a, I>(&self, items: I) -> Result<bool, EventError>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let keep: BTreeSet<&T> = items.into_iter().collect();
        self.retain(|item| keep.contains(item))
    }

    pub fn on_add<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) -> Result<(), EventError> + 'static,
    {
        self.on_add.subscribe(listener)
    }

    pub fn on_remove<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) -> Result<(), EventError> + 'static,
    {
        self.on_remove.subscribe(listener)
    }

    /// Listen to both adds and removes. The returned aggregate owns both
    /// subscriptions.
    pub fn on_any_change<F>(&self, listener: F) -> Disposables
    where
        F: Fn(&T) -> Result<(), EventError> + 'static,
    {
        let listener = Rc::new(listener);
        let subs = Disposables::new();
        let on_add = Rc::clone(&listener);
        subs.add(self.on_add.subscribe(move |item| on_add(item)));
        subs.add(self.on_remove.subscribe(move |item| listener(item)));
        subs
    }

    /// Live view of the members that `project` maps to `Some`.
    ///
    /// The view is seeded from the current members, then kept in sync by two
    /// subscriptions that are handed to `sink`. Disposing `sink` freezes the view.
    /// `project` must give the same answer for an item every time it is asked.
    /// Several members may project to the same value; it stays in the view until
    /// the last of them leaves.
    pub fn derive_filtered<U, F>(&self, project: F, sink: &Disposables) -> FilteredView<U>
    where
        U: Ord + Clone + 'static,
        F: Fn(&T) -> Option<U> + 'static,
    {
        let mut seed: BTreeMap<U, usize> = BTreeMap::new();
        for u in self.items.borrow().iter().filter_map(&project) {
            *seed.entry(u).or_default() += 1;
        }
        let view = Rc::new(RefCell::new(seed));
        let project = Rc::new(project);

        let (target, map) = (Rc::clone(&view), Rc::clone(&project));
        sink.add(self.on_add.subscribe(move |item| {
            if let Some(u) = map(item) {
                *target.borrow_mut().entry(u).or_default() += 1;
            }
            Ok(())
        }));
        let target = Rc::clone(&view);
        sink.add(self.on_remove.subscribe(move |item| {
            if let Some(u) = project(item) {
                let mut counts = target.borrow_mut();
                if let Some(count) = counts.get_mut(&u) {
                    *count -= 1;
                    if *count == 0 {
                        counts.remove(&u);
                    }
                }
            }
            Ok(())
        }));

        FilteredView { items: view }
    }

    /// Live view of the members satisfying `predicate`.
    pub fn derive_filtered_by<F>(&self, predicate: F, sink: &Disposables) -> FilteredView<T>
    where
        F: Fn(&T) -> bool + 'static,
    {
        self.derive_filtered(move |item| predicate(item).then(|| item.clone()), sink)
    }

    /// Observable that reads `true` exactly while `item` is a member.
    pub fn observe_contains(&self, item: T, sink: &Disposables) -> Observable<bool> {
        let observable = Observable::new(self.contains(&item));
        let item = Rc::new(item);

        let (watched, flag) = (Rc::clone(&item), observable.clone());
        sink.add(self.on_add.subscribe(move |added| {
            if *added == *watched {
                flag.set(true)?;
            }
            Ok(())
        }));
        let flag = observable.clone();
        sink.add(self.on_remove.subscribe(move |removed| {
            if *removed == *item {
                flag.set(false)?;
            }
            Ok(())
        }));

        observable
    }
}

/// Snapshot-stable cursor over a [`ReactiveSet`].
///
/// Visits the members present when the cursor was created, skipping any that
/// were removed before being reached. Members added during the pass are not
/// visited.
pub struct Cursor<T> {
    set: ReactiveSet<T>,
    pending: std::vec::IntoIter<T>,
    current: Option<T>,
}

impl<T: Ord + Clone + 'static> Cursor<T> {
    /// Remove the element last returned by `next`, publishing its remove event.
    /// Returns `false` if there is no current element or it is already gone.
    pub fn remove_current(&mut self) -> Result<bool, EventError> {
        match self.current.take() {
            Some(item) => self.set.remove(&item),
            None => Ok(false),
        }
    }
}

impl<T: Ord + Clone + 'static> Iterator for Cursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        for item in self.pending.by_ref() {
            if self.set.contains(&item) {
                self.current = Some(item.clone());
                return Some(item);
            }
        }
        self.current = None;
        None
    }
}

/// Read-only projection of a [`ReactiveSet`], kept in sync incrementally.
///
/// Each projected value carries the number of members currently mapping to it.
pub struct FilteredView<U> {
    items: Rc<RefCell<BTreeMap<U, usize>>>,
}

impl<U> Clone for FilteredView<U> {
    fn clone(&self) -> Self {
        Self {
            items: Rc::clone(&self.items),
        }
    }
}

impl<U: std::fmt::Debug> std::fmt::Debug for FilteredView<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.items.borrow().keys()).finish()
    }
}

impl<U: Ord + Clone> FilteredView<U> {
    pub fn contains(&self, item: &U) -> bool {
        self.items.borrow().contains_key(item)
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn snapshot(&self) -> Vec<U> {
        self.items.borrow().keys().cloned().collect()
    }
}
