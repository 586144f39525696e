// Copyright 2025 Cowboy AI, LLC.

//! Count-triggered flushing

use super::{
    cancel_worker, join_worker, spawn_worker, FlushHandler, FlushReason, Lifecycle, TriggerState, WorkerSignal,
};
use crate::errors::FlushTriggerError;
use crate::events::EventCategory;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Requests a flush when the summed item count of all categories reaches a
/// threshold.
///
/// The trigger's own accounting is reset the moment it fires; the buffer
/// reports zero counts once the drain has actually happened.
#[derive(Debug)]
pub struct CountTrigger {
    threshold: usize,
    counts: Mutex<[usize; EventCategory::COUNT]>,
    lifecycle: Lifecycle,
    signal: Arc<WorkerSignal>,
    worker: Mutex<Option<JoinHandle<()>>>,
    requests: AtomicU64,
}

impl CountTrigger {
    /// Trigger firing at `threshold` buffered items
    pub fn new(threshold: usize) -> Result<Self, FlushTriggerError> {
        if threshold == 0 {
            return Err(FlushTriggerError::InvalidConfiguration(
                "count threshold must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            threshold,
            counts: Mutex::new([0; EventCategory::COUNT]),
            lifecycle: Lifecycle::new(),
            signal: Arc::new(WorkerSignal::default()),
            worker: Mutex::new(None),
            requests: AtomicU64::new(0),
        })
    }

    /// Configured threshold
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of flushes requested so far
    pub fn requested_flushes(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Current lifecycle state
    pub fn state(&self) -> TriggerState {
        self.lifecycle.current()
    }

    /// Summed count the trigger is currently tracking
    pub fn tracked_total(&self) -> usize {
        self.counts.lock().iter().sum()
    }

    /// Last count reported for `category` since the trigger last fired
    pub fn tracked_count(&self, category: EventCategory) -> usize {
        self.counts.lock()[category.index()]
    }

    /// Start the worker that delivers requests to `handler`
    pub fn start(&self, handler: Arc<dyn FlushHandler>) -> Result<(), FlushTriggerError> {
        self.lifecycle.begin_start()?;
        let signal = Arc::clone(&self.signal);
        let handle = match spawn_worker(run_worker(signal, handler)) {
            Ok(handle) => handle,
            Err(e) => {
                self.lifecycle.abort_start();
                return Err(e);
            }
        };
        *self.worker.lock() = Some(handle);

        // Counts reported before start may already be over the threshold
        let overdue = {
            let mut counts = self.counts.lock();
            let total: usize = counts.iter().sum();
            if total >= self.threshold {
                counts.fill(0);
            }
            total >= self.threshold
        };
        if overdue {
            self.fire();
        }
        Ok(())
    }

    /// Stop the worker and wait for it to exit
    pub async fn stop(&self) -> Result<(), FlushTriggerError> {
        self.lifecycle.begin_stop()?;
        self.signal.request_stop();
        let handle = self.worker.lock().take();
        join_worker(handle).await
    }

    /// Undo a successful `start` whose sibling trigger failed to start
    pub(super) fn rollback_start(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.lifecycle.abort_start();
    }

    /// Record the live item count of `category`; fires when the total reaches
    /// the threshold. No effect once stopped.
    pub fn notify_count_changed(&self, category: EventCategory, count: usize) {
        let state = self.lifecycle.current();
        if state == TriggerState::Stopped {
            return;
        }

        let fired = {
            let mut counts = self.counts.lock();
            counts[category.index()] = count;
            let total: usize = counts.iter().sum();
            if state == TriggerState::Started && total >= self.threshold {
                *counts = [0; EventCategory::COUNT];
                Some(total)
            } else {
                None
            }
        };

        if let Some(total) = fired {
            debug!(total, threshold = self.threshold, "Buffered item count reached flush threshold");
            self.fire();
        }
    }

    fn fire(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.signal.wake();
    }
}

impl Drop for CountTrigger {
    fn drop(&mut self) {
        cancel_worker(&self.signal, self.worker.get_mut().take());
    }
}

async fn run_worker(signal: Arc<WorkerSignal>, handler: Arc<dyn FlushHandler>) {
    loop {
        signal.notify.notified().await;
        if signal.is_stopping() {
            break;
        }
        handler.flush_requested(FlushReason::CountThreshold).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingHandler {
        calls: AtomicU64,
    }

    #[async_trait]
    impl FlushHandler for RecordingHandler {
        async fn flush_requested(&self, reason: FlushReason) {
            assert_eq!(reason, FlushReason::CountThreshold);
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn test_zero_threshold_rejected() {
        assert!(matches!(
            CountTrigger::new(0),
            Err(FlushTriggerError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_fires_once_at_threshold() {
        let handler = Arc::new(RecordingHandler::default());
        let trigger = CountTrigger::new(3).unwrap();
        trigger.start(handler.clone()).unwrap();

        trigger.notify_count_changed(EventCategory::User, 1);
        trigger.notify_count_changed(EventCategory::Group, 1);
        settle().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

        trigger.notify_count_changed(EventCategory::User, 2);
        settle().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(trigger.tracked_total(), 0);

        // Buffer reports the drain, then one more admission
        trigger.notify_count_changed(EventCategory::User, 0);
        trigger.notify_count_changed(EventCategory::Group, 0);
        trigger.notify_count_changed(EventCategory::Entity, 1);
        settle().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(trigger.requested_flushes(), 1);

        trigger.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_counts_ignored_after_stop() {
        let handler = Arc::new(RecordingHandler::default());
        let trigger = CountTrigger::new(1).unwrap();
        trigger.start(handler.clone()).unwrap();
        trigger.stop().await.unwrap();

        trigger.notify_count_changed(EventCategory::User, 5);
        settle().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(trigger.state(), TriggerState::Stopped);
    }

    #[tokio::test]
    async fn test_lifecycle_usage_errors() {
        let trigger = CountTrigger::new(10).unwrap();
        assert_eq!(trigger.stop().await, Err(FlushTriggerError::NotStarted));

        trigger.start(Arc::new(RecordingHandler::default())).unwrap();
        assert_eq!(
            trigger.start(Arc::new(RecordingHandler::default())),
            Err(FlushTriggerError::AlreadyStarted)
        );

        trigger.stop().await.unwrap();
        assert_eq!(trigger.stop().await, Err(FlushTriggerError::AlreadyStopped));
        assert_eq!(
            trigger.start(Arc::new(RecordingHandler::default())),
            Err(FlushTriggerError::AlreadyStopped)
        );
    }

    #[tokio::test]
    async fn test_dropping_started_trigger_ends_worker() {
        let handler = Arc::new(RecordingHandler::default());
        let trigger = CountTrigger::new(10).unwrap();
        trigger.start(handler.clone()).unwrap();
        assert_eq!(Arc::strong_count(&handler), 2);

        drop(trigger);
        settle().await;
        assert_eq!(Arc::strong_count(&handler), 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rollback_returns_to_created() {
        let handler = Arc::new(RecordingHandler::default());
        let trigger = CountTrigger::new(10).unwrap();
        trigger.start(handler.clone()).unwrap();

        trigger.rollback_start();
        settle().await;
        assert_eq!(trigger.state(), TriggerState::Created);
        assert_eq!(Arc::strong_count(&handler), 1);

        trigger.start(handler.clone()).unwrap();
        trigger.notify_count_changed(EventCategory::User, 10);
        settle().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        trigger.stop().await.unwrap();
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let trigger = CountTrigger::new(10).unwrap();
        assert_eq!(
            trigger.start(Arc::new(RecordingHandler::default())),
            Err(FlushTriggerError::NoRuntime)
        );
        assert_eq!(trigger.state(), TriggerState::Created);
    }
}
