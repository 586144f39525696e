// Copyright 2025 Cowboy AI, LLC.

//! Interval-triggered flushing

use super::{
    cancel_worker, join_worker, spawn_worker, FlushHandler, FlushReason, Lifecycle, TriggerState, WorkerSignal,
};
use crate::errors::FlushTriggerError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Requests a flush every `interval`, whether or not anything is buffered
#[derive(Debug)]
pub struct IntervalTrigger {
    interval: Duration,
    lifecycle: Lifecycle,
    signal: Arc<WorkerSignal>,
    worker: Mutex<Option<JoinHandle<()>>>,
    ticks: Arc<AtomicU64>,
}

impl IntervalTrigger {
    /// Trigger firing every `interval`
    pub fn new(interval: Duration) -> Result<Self, FlushTriggerError> {
        if interval.is_zero() {
            return Err(FlushTriggerError::InvalidConfiguration(
                "flush interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            interval,
            lifecycle: Lifecycle::new(),
            signal: Arc::new(WorkerSignal::default()),
            worker: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of flushes requested so far
    pub fn requested_flushes(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Current lifecycle state
    pub fn state(&self) -> TriggerState {
        self.lifecycle.current()
    }

    /// Start the timer; the first request fires one interval from now
    pub fn start(&self, handler: Arc<dyn FlushHandler>) -> Result<(), FlushTriggerError> {
        self.lifecycle.begin_start()?;
        let worker = run_timer(
            self.interval,
            Arc::clone(&self.signal),
            Arc::clone(&self.ticks),
            handler,
        );
        match spawn_worker(worker) {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.lifecycle.abort_start();
                Err(e)
            }
        }
    }

    /// Stop the timer and wait for it to exit
    pub async fn stop(&self) -> Result<(), FlushTriggerError> {
        self.lifecycle.begin_stop()?;
        self.signal.request_stop();
        let handle = self.worker.lock().take();
        join_worker(handle).await
    }
}

impl Drop for IntervalTrigger {
    fn drop(&mut self) {
        cancel_worker(&self.signal, self.worker.get_mut().take());
    }
}

async fn run_timer(
    period: Duration,
    signal: Arc<WorkerSignal>,
    ticks: Arc<AtomicU64>,
    handler: Arc<dyn FlushHandler>,
) {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {}
            _ = signal.notify.notified() => {}
        }
        if signal.is_stopping() {
            break;
        }
        ticks.fetch_add(1, Ordering::SeqCst);
        handler.flush_requested(FlushReason::Interval).await;
    }
}
