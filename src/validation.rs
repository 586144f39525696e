// Copyright 2025 Cowboy AI, LLC.

//! Admission-time validation of mutations

use crate::buffer::queues::{CategoryQueues, HeldLocks};
use crate::buffer::sequence::SequenceClock;
use crate::errors::ValidationError;
use crate::events::{AccessModel, CategorySet, EventCategory, Mutation, TemporalEvent};

/// Validates a mutation against current state before it is admitted.
///
/// Called while the queue locks of the mutation's lock set are held. Returns
/// the implied mutations a composite operation cascades into (for example the
/// entity removals a removed entity type drags along); these are admitted
/// ahead of the validated mutation and must fall inside the held lock set.
pub trait EventValidator<P: AccessModel>: Send + Sync {
    /// Accept (with implied mutations) or reject `mutation`
    fn validate(
        &self,
        mutation: &Mutation<P>,
        context: &ValidationContext<'_, '_, P>,
    ) -> Result<Vec<Mutation<P>>, ValidationError>;
}

/// Validator that accepts everything and implies nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

impl<P: AccessModel> EventValidator<P> for AcceptAllValidator {
    fn validate(
        &self,
        _mutation: &Mutation<P>,
        _context: &ValidationContext<'_, '_, P>,
    ) -> Result<Vec<Mutation<P>>, ValidationError> {
        Ok(Vec::new())
    }
}

/// View of the buffer handed to a validator
pub struct ValidationContext<'s, 'a, P: AccessModel> {
    held: &'s HeldLocks<'a, P>,
    queues: &'s CategoryQueues<P>,
    sequence: &'s SequenceClock,
}

impl<'s, 'a, P: AccessModel> ValidationContext<'s, 'a, P> {
    pub(crate) fn new(
        held: &'s HeldLocks<'a, P>,
        queues: &'s CategoryQueues<P>,
        sequence: &'s SequenceClock,
    ) -> Self {
        Self {
            held,
            queues,
            sequence,
        }
    }

    /// Categories whose queue locks this admission holds
    pub fn held_categories(&self) -> CategorySet {
        self.held.categories()
    }

    /// Pending (not yet flushed) events of a held category, in admission order.
    ///
    /// `None` for categories outside the held set, whose contents may change
    /// concurrently.
    pub fn pending(&self, category: EventCategory) -> Option<&[TemporalEvent<P>]> {
        self.held.queue(category).map(|queue| queue.events())
    }

    /// Whether some thread currently holds the queue lock of `category`
    pub fn is_queue_locked(&self, category: EventCategory) -> bool {
        self.queues.is_locked(category)
    }

    /// Whether some thread currently holds the sequence lock
    pub fn is_sequence_locked(&self) -> bool {
        self.sequence.is_locked()
    }
}
