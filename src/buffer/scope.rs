// Copyright 2025 Cowboy AI, LLC.

//! Admission under an explicitly held lock set

use super::queues::HeldLocks;
use super::sink::AccessEventSink;
use super::EventBuffer;
use crate::errors::{BufferError, BufferResult};
use crate::events::{AccessModel, CategorySet, EventCategory, Mutation, TemporalEvent};
use crate::identifiers::SequenceNumber;
use crate::validation::ValidationContext;
use std::cell::RefCell;
use tracing::debug;

/// Queue locks held on behalf of a composite operation.
///
/// Handed out by [`EventBuffer::with_locks`]. Admissions through the scope
/// never lock again, so a composite operation can issue any number of narrower
/// admissions without deadlocking on its own locks. An admission whose lock
/// set is not covered by the scope fails with [`BufferError::LockNotHeld`].
///
/// Calling [`EventBuffer::admit`] or [`EventBuffer::with_locks`] from inside
/// a scope deadlocks if the lock sets overlap; admit through the scope.
pub struct AdmissionScope<'b, P: AccessModel> {
    buffer: &'b EventBuffer<P>,
    held: RefCell<HeldLocks<'b, P>>,
    reported: RefCell<[Option<usize>; EventCategory::COUNT]>,
}

impl<'b, P: AccessModel> AdmissionScope<'b, P> {
    pub(super) fn new(buffer: &'b EventBuffer<P>, held: HeldLocks<'b, P>) -> Self {
        Self {
            buffer,
            held: RefCell::new(held),
            reported: RefCell::new([None; EventCategory::COUNT]),
        }
    }

    /// Categories whose queue locks this scope holds
    pub fn categories(&self) -> CategorySet {
        self.held.borrow().categories()
    }

    /// Live item count of a held queue
    pub fn item_count(&self, category: EventCategory) -> Option<usize> {
        self.held.borrow().queue(category).map(|queue| queue.item_count())
    }

    /// Copy of a held queue's pending events
    pub fn pending(&self, category: EventCategory) -> Option<Vec<TemporalEvent<P>>> {
        self.held
            .borrow()
            .queue(category)
            .map(|queue| queue.events().to_vec())
    }

    /// Release the locks in reverse order and return the final item count of
    /// every queue this scope appended to
    pub(super) fn release(self) -> Vec<(EventCategory, usize)> {
        let AdmissionScope { held, reported, .. } = self;
        drop(held);
        reported
            .into_inner()
            .iter()
            .enumerate()
            .filter_map(|(index, count)| count.map(|count| (EventCategory::ALL[index], count)))
            .collect()
    }

    fn admit_held(&self, mutation: Mutation<P>) -> BufferResult<SequenceNumber> {
        let held_set = self.categories();
        if let Some(category) = first_outside(mutation.lock_set().iter(), held_set) {
            return Err(BufferError::LockNotHeld { category });
        }
        self.buffer.ensure_accepting()?;

        let buffer = self.buffer;
        let implied = {
            let held = self.held.borrow();
            let context = ValidationContext::new(&held, &buffer.queues, &buffer.sequence);
            buffer.validator.validate(&mutation, &context)?
        };
        if let Some(category) = first_outside(implied.iter().map(Mutation::category), held_set) {
            return Err(BufferError::LockNotHeld { category });
        }

        let mut batch = implied;
        batch.push(mutation);
        let hash_codes = batch
            .iter()
            .map(|mutation| buffer.hashers.hash_code(&mutation.payload))
            .collect::<Result<Vec<_>, _>>()?;

        // Nothing below can reject, so no sequence number is ever skipped
        let stamps = buffer.sequence.stamp(batch.len())?;

        let mut held = self.held.borrow_mut();
        let mut reported = self.reported.borrow_mut();
        let mut assigned = SequenceNumber::default();
        for ((mutation, hash_code), stamp) in batch.into_iter().zip(hash_codes).zip(stamps) {
            let category = mutation.category();
            let queue = held
                .queue_mut(category)
                .ok_or(BufferError::LockNotHeld { category })?;
            queue.push(TemporalEvent {
                event_id: stamp.event_id,
                action: mutation.action,
                occurred_time: stamp.occurred_time,
                sequence_number: stamp.sequence_number,
                hash_code,
                payload: mutation.payload,
            });
            reported[category.index()] = Some(queue.item_count());

            debug!(
                %category,
                action = ?mutation.action,
                sequence = %stamp.sequence_number,
                hash_code,
                "Event buffered"
            );
            buffer.metrics.increment("events.buffered");
            buffer
                .metrics
                .increment(&format!("events.buffered.{}", category.name()));
            assigned = stamp.sequence_number;
        }
        Ok(assigned)
    }
}

impl<P: AccessModel> AccessEventSink<P> for AdmissionScope<'_, P> {
    fn admit(&self, mutation: Mutation<P>) -> BufferResult<SequenceNumber> {
        self.admit_held(mutation)
    }
}

fn first_outside(
    mut categories: impl Iterator<Item = EventCategory>,
    held: CategorySet,
) -> Option<EventCategory> {
    categories.find(|category| !held.contains(*category))
}
