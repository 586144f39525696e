// Copyright 2025 Cowboy AI, LLC.

//! Drain, merge and persist

use super::EventBuffer;
use crate::errors::{BufferError, BufferResult, BufferingFault};
use crate::events::{AccessModel, TemporalEvent};
use crate::flush::{FlushHandler, FlushReason};
use crate::identifiers::SequenceNumber;
use crate::persistence::MetricsInstrumented;
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::Ordering;
use std::sync::Weak;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Events drained by one flush, merged into ascending sequence order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSnapshot<P: AccessModel> {
    events: Vec<TemporalEvent<P>>,
}

impl<P: AccessModel> BufferSnapshot<P> {
    /// Merge per-category drains, each already in ascending sequence order
    pub fn merge(drained: Vec<Vec<TemporalEvent<P>>>) -> Self {
        let total = drained.iter().map(Vec::len).sum();
        let mut sources: Vec<_> = drained
            .into_iter()
            .map(|queue| queue.into_iter().peekable())
            .collect();

        let mut heads = BinaryHeap::with_capacity(sources.len());
        for (index, source) in sources.iter_mut().enumerate() {
            if let Some(event) = source.peek() {
                heads.push(Reverse((event.sequence_number, index)));
            }
        }

        let mut events = Vec::with_capacity(total);
        while let Some(Reverse((_, index))) = heads.pop() {
            let source = &mut sources[index];
            if let Some(event) = source.next() {
                events.push(event);
            }
            if let Some(next) = source.peek() {
                heads.push(Reverse((next.sequence_number, index)));
            }
        }

        debug_assert!(events
            .windows(2)
            .all(|pair| pair[0].sequence_number < pair[1].sequence_number));
        Self { events }
    }

    /// Merged events
    pub fn events(&self) -> &[TemporalEvent<P>] {
        &self.events
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing was drained
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Lowest sequence number in the batch
    pub fn first_sequence(&self) -> Option<SequenceNumber> {
        self.events.first().map(|event| event.sequence_number)
    }

    /// Highest sequence number in the batch
    pub fn last_sequence(&self) -> Option<SequenceNumber> {
        self.events.last().map(|event| event.sequence_number)
    }

    /// Hand the events over to a persister
    pub fn into_events(self) -> Vec<TemporalEvent<P>> {
        self.events
    }
}

/// Outcome of one flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Why the flush ran
    pub reason: FlushReason,
    /// Events handed to the persister
    pub event_count: usize,
    /// Lowest persisted sequence number
    pub first_sequence: Option<SequenceNumber>,
    /// Highest persisted sequence number
    pub last_sequence: Option<SequenceNumber>,
    /// Drain and persist time
    pub duration: Duration,
}

impl FlushReport {
    fn empty(reason: FlushReason) -> Self {
        Self {
            reason,
            event_count: 0,
            first_sequence: None,
            last_sequence: None,
            duration: Duration::ZERO,
        }
    }

    /// Whether the flush found nothing to persist
    pub fn is_empty(&self) -> bool {
        self.event_count == 0
    }
}

impl<P: AccessModel> EventBuffer<P> {
    /// Drain every queue and persist the merged batch.
    ///
    /// Flushes run one at a time. The persister is called without any queue
    /// lock held, so admissions continue into the next batch meanwhile. A
    /// persister failure is fatal: the batch is dropped, the fault handler is
    /// called once, and the buffer trips.
    #[instrument(skip_all, fields(%reason))]
    pub async fn flush(&self, reason: FlushReason) -> BufferResult<FlushReport> {
        self.ensure_not_tripped()?;
        let _gate = self.flush_gate.lock().await;
        self.ensure_not_tripped()?;

        self.metrics.increment("flush.triggered");
        self.metrics
            .increment(&format!("flush.triggered.{}", reason.name()));

        let timer = self.timer("flush");
        let drained = self
            .queues
            .drain_all(|category, _| self.notify_trigger(category, 0));
        let snapshot = BufferSnapshot::merge(drained);
        if snapshot.is_empty() {
            debug!("Nothing buffered, skipping persister");
            self.metrics.increment("flush.empty");
            return Ok(FlushReport::empty(reason));
        }

        let event_count = snapshot.len();
        let first_sequence = snapshot.first_sequence();
        let last_sequence = snapshot.last_sequence();

        match self.persister.persist_events(snapshot.into_events()).await {
            Ok(()) => {
                let duration = timer.record();
                self.metrics.increment("flush.completed");
                info!(
                    event_count,
                    first_sequence = ?first_sequence,
                    last_sequence = ?last_sequence,
                    duration_ms = duration.as_millis() as u64,
                    "Flushed buffered events"
                );
                Ok(FlushReport {
                    reason,
                    event_count,
                    first_sequence,
                    last_sequence,
                    duration,
                })
            }
            Err(source) => {
                timer.record_error();
                self.tripped.store(true, Ordering::SeqCst);
                let fault = BufferingFault {
                    event_count,
                    first_sequence: first_sequence.unwrap_or_default(),
                    last_sequence: last_sequence.unwrap_or_default(),
                    source,
                };
                error!(error = %fault, "Persisting flushed batch failed; buffer tripped");
                if let Some(handler) = &self.fault_handler {
                    handler(fault.clone());
                }
                Err(fault.into())
            }
        }
    }
}

/// Connects a flush trigger to the buffer it flushes
pub(crate) struct BufferFlushHandler<P: AccessModel> {
    buffer: Weak<EventBuffer<P>>,
}

impl<P: AccessModel> BufferFlushHandler<P> {
    pub(crate) fn new(buffer: Weak<EventBuffer<P>>) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl<P: AccessModel> FlushHandler for BufferFlushHandler<P> {
    async fn flush_requested(&self, reason: FlushReason) {
        let Some(buffer) = self.buffer.upgrade() else {
            debug!(%reason, "Buffer dropped, ignoring flush request");
            return;
        };
        match buffer.flush(reason).await {
            Ok(_) => {}
            Err(BufferError::Tripped) => {
                debug!(%reason, "Buffer tripped, ignoring flush request");
            }
            // Already delivered to the fault handler
            Err(BufferError::Fault(_)) => {}
            Err(e) => warn!(%reason, error = %e, "Requested flush failed"),
        }
    }
}
