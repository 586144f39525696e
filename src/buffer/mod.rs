// Copyright 2025 Cowboy AI, LLC.

//! Partitioned temporal event buffer
//!
//! Admitted mutations are stamped with a buffer-wide sequence number and an
//! occurred time, then queued by [`EventCategory`]. Each category queue has
//! its own lock; an admission takes only the locks of its mutation's lock set,
//! always in ascending category order.
//!
//! ## Admission
//!
//! 1. Acquire the lock set of the mutation
//! 2. Validate; the validator may add implied mutations inside that set
//! 3. Hash every event's partition key
//! 4. Take a contiguous block of sequence numbers under the sequence lock
//! 5. Append, release the locks in reverse order, then report the new
//!    counts to the flush trigger
//!
//! Sequence numbers are assigned while the queue locks are held, so each queue
//! is in sequence order and a flush, which drains all ten queues under all ten
//! locks, sees every event of one batch before any event of the next.

pub(crate) mod queues;
pub(crate) mod sequence;

mod flush;
mod scope;
mod sink;

pub use flush::BufferSnapshot;
pub use flush::FlushReport;
pub use queues::{CategoryQueue, HeldLocks};
pub use scope::AdmissionScope;
pub use sink::AccessEventSink;

use crate::clock::{EventClock, SystemClock};
use crate::config::BufferConfig;
use crate::errors::{BufferError, BufferResult, BufferingFault};
use crate::events::{AccessModel, CategorySet, EventCategory, Mutation, TemporalEvent};
use crate::flush::{FlushReason, FlushTrigger, TriggerState};
use crate::identifiers::SequenceNumber;
use crate::partition::PartitionHashers;
use crate::persistence::{BufferMetrics, BulkPersister, MetricsInstrumented};
use crate::validation::{AcceptAllValidator, EventValidator};
use flush::BufferFlushHandler;
use queues::CategoryQueues;
use sequence::SequenceClock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Callback receiving fatal persistence faults
pub type FaultHandler = Arc<dyn Fn(BufferingFault) + Send + Sync>;

/// In-memory staging area for permission-graph events
pub struct EventBuffer<P: AccessModel> {
    queues: CategoryQueues<P>,
    sequence: SequenceClock,
    validator: Arc<dyn EventValidator<P>>,
    hashers: PartitionHashers<P>,
    persister: Arc<dyn BulkPersister<P>>,
    trigger: Option<FlushTrigger>,
    fault_handler: Option<FaultHandler>,
    metrics: BufferMetrics,
    flush_gate: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    tripped: AtomicBool,
}

impl<P: AccessModel> EventBuffer<P> {
    /// Start building a buffer
    pub fn builder() -> EventBufferBuilder<P> {
        EventBufferBuilder::new()
    }

    /// Hold the queue locks of `set` for the duration of `f`.
    ///
    /// Every admission made through the scope runs under these locks without
    /// acquiring any further queue lock. Counts are reported to the trigger
    /// once the locks are released.
    pub fn with_locks<R, F>(&self, set: CategorySet, f: F) -> BufferResult<R>
    where
        F: FnOnce(&AdmissionScope<'_, P>) -> BufferResult<R>,
    {
        let held = self.queues.lock(set);
        self.ensure_accepting()?;

        let scope = AdmissionScope::new(self, held);
        let result = f(&scope);
        for (category, count) in scope.release() {
            self.notify_trigger(category, count);
        }
        result
    }

    /// Start the flush trigger, wiring its requests to [`flush`](Self::flush).
    ///
    /// A buffer built without a trigger is flushed manually only.
    pub async fn start(self: &Arc<Self>) -> BufferResult<()> {
        self.ensure_accepting()?;
        if let Some(trigger) = &self.trigger {
            let handler = Arc::new(BufferFlushHandler::new(Arc::downgrade(self)));
            trigger.start(handler).await?;
            info!(state = ?trigger.state(), "Event buffer started");
        }
        Ok(())
    }

    /// Stop accepting admissions, stop the trigger and flush what is left.
    ///
    /// The final flush runs even when the trigger fails to stop. A flush
    /// error takes precedence; otherwise a trigger error is returned after
    /// the remaining events have been persisted.
    pub async fn shutdown(&self) -> BufferResult<FlushReport> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BufferError::Closed);
        }
        let stopped = match &self.trigger {
            Some(trigger) if trigger.state() == TriggerState::Started => trigger.stop().await,
            _ => Ok(()),
        };
        if let Err(e) = &stopped {
            error!(error = %e, "Flush trigger did not stop cleanly, flushing anyway");
        }

        let report = self.flush(FlushReason::Manual).await?;
        info!(final_events = report.event_count, "Event buffer shut down");
        stopped?;
        Ok(report)
    }

    /// Copy of the pending events of one category
    pub fn pending(&self, category: EventCategory) -> Vec<TemporalEvent<P>> {
        let held = self.queues.lock(CategorySet::of(&[category]));
        held.queue(category)
            .map(|queue| queue.events().to_vec())
            .unwrap_or_default()
    }

    /// Live item count of one category
    pub fn item_count(&self, category: EventCategory) -> usize {
        let held = self.queues.lock(CategorySet::of(&[category]));
        held.queue(category).map_or(0, CategoryQueue::item_count)
    }

    /// Live item count across all categories
    pub fn total_item_count(&self) -> usize {
        EventCategory::ALL
            .iter()
            .map(|category| self.item_count(*category))
            .sum()
    }

    /// Sequence number the next admitted event receives
    pub fn next_sequence_number(&self) -> SequenceNumber {
        self.sequence.peek_next()
    }

    /// The configured trigger, if any
    pub fn flush_trigger(&self) -> Option<&FlushTrigger> {
        self.trigger.as_ref()
    }

    /// Whether a fatal fault has stopped the buffer
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether some thread holds the queue lock of `category`
    pub fn is_queue_locked(&self, category: EventCategory) -> bool {
        self.queues.is_locked(category)
    }

    /// Whether some thread holds the sequence lock
    pub fn is_sequence_locked(&self) -> bool {
        self.sequence.is_locked()
    }

    fn ensure_not_tripped(&self) -> BufferResult<()> {
        if self.is_tripped() {
            return Err(BufferError::Tripped);
        }
        Ok(())
    }

    fn ensure_accepting(&self) -> BufferResult<()> {
        self.ensure_not_tripped()?;
        if self.is_closed() {
            return Err(BufferError::Closed);
        }
        Ok(())
    }

    fn notify_trigger(&self, category: EventCategory, count: usize) {
        if let Some(trigger) = &self.trigger {
            trigger.notify_count_changed(category, count);
        }
    }
}

impl<P: AccessModel> AccessEventSink<P> for EventBuffer<P> {
    fn admit(&self, mutation: Mutation<P>) -> BufferResult<SequenceNumber> {
        self.with_locks(mutation.lock_set(), |scope| scope.admit(mutation))
    }
}

impl<P: AccessModel> MetricsInstrumented for EventBuffer<P> {
    fn metrics(&self) -> &BufferMetrics {
        &self.metrics
    }
}

impl<P: AccessModel> fmt::Debug for EventBuffer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBuffer")
            .field("next_sequence_number", &self.sequence.peek_next())
            .field("trigger", &self.trigger)
            .field("closed", &self.is_closed())
            .field("tripped", &self.is_tripped())
            .finish_non_exhaustive()
    }
}

/// Builder for [`EventBuffer`]
pub struct EventBufferBuilder<P: AccessModel> {
    persister: Option<Arc<dyn BulkPersister<P>>>,
    validator: Arc<dyn EventValidator<P>>,
    clock: Arc<dyn EventClock>,
    hashers: PartitionHashers<P>,
    trigger: Option<FlushTrigger>,
    fault_handler: Option<FaultHandler>,
    initial_sequence: SequenceNumber,
    metrics: BufferMetrics,
}

impl<P: AccessModel> EventBufferBuilder<P> {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            persister: None,
            validator: Arc::new(AcceptAllValidator),
            clock: Arc::new(SystemClock),
            hashers: PartitionHashers::default(),
            trigger: None,
            fault_handler: None,
            initial_sequence: SequenceNumber::default(),
            metrics: BufferMetrics::new(),
        }
    }

    /// Apply a configuration: its trigger and first sequence number
    pub fn config(mut self, config: &BufferConfig) -> BufferResult<Self> {
        config.validate()?;
        self.trigger = Some(config.flush.build()?);
        self.initial_sequence = config.initial_sequence();
        Ok(self)
    }

    /// Set the bulk persister (required)
    pub fn persister(mut self, persister: Arc<dyn BulkPersister<P>>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Set the validator
    pub fn validator(mut self, validator: Arc<dyn EventValidator<P>>) -> Self {
        self.validator = validator;
        self
    }

    /// Set the clock and identity source
    pub fn clock(mut self, clock: Arc<dyn EventClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the partition hashers
    pub fn hashers(mut self, hashers: PartitionHashers<P>) -> Self {
        self.hashers = hashers;
        self
    }

    /// Set the flush trigger
    pub fn flush_trigger(mut self, trigger: impl Into<FlushTrigger>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Set the fatal fault callback
    pub fn on_fault(mut self, handler: impl Fn(BufferingFault) + Send + Sync + 'static) -> Self {
        self.fault_handler = Some(Arc::new(handler));
        self
    }

    /// Set the first sequence number; must be below `u64::MAX`
    pub fn initial_sequence_number(mut self, first: impl Into<SequenceNumber>) -> Self {
        self.initial_sequence = first.into();
        self
    }

    /// Share a metrics collector
    pub fn metrics(mut self, metrics: BufferMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Build the buffer
    pub fn build(self) -> BufferResult<EventBuffer<P>> {
        let persister = self.persister.ok_or_else(|| {
            BufferError::Configuration("a bulk persister is required".to_string())
        })?;
        if self.initial_sequence.checked_next().is_none() {
            return Err(BufferError::Configuration(
                "initial sequence number must be below u64::MAX".to_string(),
            ));
        }

        Ok(EventBuffer {
            queues: CategoryQueues::new(),
            sequence: SequenceClock::new(self.clock, self.initial_sequence),
            validator: self.validator,
            hashers: self.hashers,
            persister,
            trigger: self.trigger,
            fault_handler: self.fault_handler,
            metrics: self.metrics,
            flush_gate: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            tripped: AtomicBool::new(false),
        })
    }
}

impl<P: AccessModel> Default for EventBufferBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}
