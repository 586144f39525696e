// Copyright 2025 Cowboy AI, LLC.

//! Category queues and fixed-order lock acquisition

use crate::events::{AccessModel, CategorySet, EventCategory, TemporalEvent};
use parking_lot::{Mutex, MutexGuard};
use std::mem;

/// FIFO of admitted events of one category
#[derive(Debug)]
pub struct CategoryQueue<P: AccessModel> {
    category: EventCategory,
    items: Vec<TemporalEvent<P>>,
}

impl<P: AccessModel> CategoryQueue<P> {
    fn new(category: EventCategory) -> Self {
        Self {
            category,
            items: Vec::new(),
        }
    }

    /// Category of the queued events
    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Live item count
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Queued events in admission order
    pub fn events(&self) -> &[TemporalEvent<P>] {
        &self.items
    }

    pub(crate) fn push(&mut self, event: TemporalEvent<P>) {
        debug_assert_eq!(event.category(), self.category);
        self.items.push(event);
    }

    pub(crate) fn take(&mut self) -> Vec<TemporalEvent<P>> {
        mem::take(&mut self.items)
    }
}

/// The ten queues, each behind its own lock
#[derive(Debug)]
pub(crate) struct CategoryQueues<P: AccessModel> {
    queues: [Mutex<CategoryQueue<P>>; EventCategory::COUNT],
}

impl<P: AccessModel> CategoryQueues<P> {
    pub(crate) fn new() -> Self {
        Self {
            queues: std::array::from_fn(|index| {
                Mutex::new(CategoryQueue::new(EventCategory::ALL[index]))
            }),
        }
    }

    /// Acquire the locks of `set` in lock order
    pub(crate) fn lock(&self, set: CategorySet) -> HeldLocks<'_, P> {
        let mut guards = Vec::with_capacity(set.len());
        for category in set.iter() {
            guards.push((category, self.queues[category.index()].lock()));
        }
        HeldLocks { set, guards }
    }

    pub(crate) fn is_locked(&self, category: EventCategory) -> bool {
        self.queues[category.index()].is_locked()
    }

    /// Move every queue's contents out while holding all ten locks.
    ///
    /// `on_drained` runs for each emptied category before any lock is released.
    pub(crate) fn drain_all(
        &self,
        mut on_drained: impl FnMut(EventCategory, usize),
    ) -> Vec<Vec<TemporalEvent<P>>> {
        let mut held = self.lock(CategorySet::all());
        held.guards
            .iter_mut()
            .map(|(category, queue)| {
                let items = queue.take();
                on_drained(*category, items.len());
                items
            })
            .collect()
    }
}

/// Queue locks held by one admission or drain.
///
/// Locks are released in reverse acquisition order when dropped.
pub struct HeldLocks<'a, P: AccessModel> {
    set: CategorySet,
    guards: Vec<(EventCategory, MutexGuard<'a, CategoryQueue<P>>)>,
}

impl<'a, P: AccessModel> HeldLocks<'a, P> {
    /// Categories whose locks are held
    pub fn categories(&self) -> CategorySet {
        self.set
    }

    /// A held queue
    pub fn queue(&self, category: EventCategory) -> Option<&CategoryQueue<P>> {
        self.guards
            .iter()
            .find(|(held, _)| *held == category)
            .map(|(_, queue)| &**queue)
    }

    pub(crate) fn queue_mut(&mut self, category: EventCategory) -> Option<&mut CategoryQueue<P>> {
        self.guards
            .iter_mut()
            .find(|(held, _)| *held == category)
            .map(|(_, queue)| &mut **queue)
    }
}

impl<'a, P: AccessModel> Drop for HeldLocks<'a, P> {
    fn drop(&mut self) {
        while let Some((_, guard)) = self.guards.pop() {
            drop(guard);
        }
    }
}
