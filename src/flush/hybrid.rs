// Copyright 2025 Cowboy AI, LLC.

//! Count-or-interval flushing

use super::{CountTrigger, FlushHandler, FlushReason, IntervalTrigger, TriggerState};
use crate::errors::FlushTriggerError;
use crate::events::EventCategory;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Requests a flush when either the count threshold is reached or the interval
/// elapses. A request arriving while another flush is still running is
/// dropped.
#[derive(Debug)]
pub struct HybridTrigger {
    count: CountTrigger,
    interval: IntervalTrigger,
    suppressed: Arc<AtomicU64>,
}

impl HybridTrigger {
    /// Trigger firing at `threshold` buffered items or every `interval`
    pub fn new(threshold: usize, interval: Duration) -> Result<Self, FlushTriggerError> {
        Ok(Self {
            count: CountTrigger::new(threshold)?,
            interval: IntervalTrigger::new(interval)?,
            suppressed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// The count half
    pub fn count_trigger(&self) -> &CountTrigger {
        &self.count
    }

    /// The interval half
    pub fn interval_trigger(&self) -> &IntervalTrigger {
        &self.interval
    }

    /// Requests dropped because a flush was already running
    pub fn suppressed_flushes(&self) -> u64 {
        self.suppressed.load(Ordering::SeqCst)
    }

    /// Current lifecycle state
    pub fn state(&self) -> TriggerState {
        self.count.state()
    }

    /// Start both halves behind one serializing handler
    pub fn start(&self, handler: Arc<dyn FlushHandler>) -> Result<(), FlushTriggerError> {
        let serialized: Arc<dyn FlushHandler> = Arc::new(SerializedFlushHandler {
            inner: handler,
            in_flight: tokio::sync::Mutex::new(()),
            suppressed: Arc::clone(&self.suppressed),
        });
        self.count.start(Arc::clone(&serialized))?;
        // The interval half can be started on its own through `interval_trigger`
        if let Err(e) = self.interval.start(serialized) {
            self.count.rollback_start();
            return Err(e);
        }
        Ok(())
    }

    /// Stop both halves and wait for their workers to exit
    pub async fn stop(&self) -> Result<(), FlushTriggerError> {
        let (count, interval) = futures::join!(self.count.stop(), self.interval.stop());
        count.and(interval)
    }

    /// Forward a category count to the count half
    pub fn notify_count_changed(&self, category: EventCategory, count: usize) {
        self.count.notify_count_changed(category, count);
    }
}

/// Lets at most one flush run at a time across both trigger sources
struct SerializedFlushHandler {
    inner: Arc<dyn FlushHandler>,
    in_flight: tokio::sync::Mutex<()>,
    suppressed: Arc<AtomicU64>,
}

#[async_trait]
impl FlushHandler for SerializedFlushHandler {
    async fn flush_requested(&self, reason: FlushReason) {
        match self.in_flight.try_lock() {
            Ok(_running) => self.inner.flush_requested(reason).await,
            Err(_) => {
                self.suppressed.fetch_add(1, Ordering::SeqCst);
                warn!(%reason, "Flush already in progress, dropping concurrent request");
            }
        }
    }
}
