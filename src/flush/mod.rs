// Copyright 2025 Cowboy AI, LLC.

//! Flush trigger policies
//!
//! A trigger watches buffered item counts and/or elapsed time and tells a
//! [`FlushHandler`] when the buffer should be flushed. The three policies are a
//! closed set held by [`FlushTrigger`]:
//!
//! - [`CountTrigger`]: fires when the total buffered count reaches a threshold
//! - [`IntervalTrigger`]: fires on a fixed period
//! - [`HybridTrigger`]: either condition, with at most one flush in flight
//!
//! Every trigger moves through `Created -> Started -> Stopped`. `stop` waits
//! for the background worker to exit, so no flush is requested once it returns.

mod count;
mod hybrid;
mod interval;

pub use count::CountTrigger;
pub use hybrid::HybridTrigger;
pub use interval::IntervalTrigger;

use crate::errors::FlushTriggerError;
use crate::events::EventCategory;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Why a flush was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlushReason {
    /// Buffered item count reached the threshold
    CountThreshold,
    /// The flush interval elapsed
    Interval,
    /// Requested explicitly (shutdown or caller)
    Manual,
}

impl FlushReason {
    /// Stable name used in logs and metric keys
    pub fn name(self) -> &'static str {
        match self {
            FlushReason::CountThreshold => "count_threshold",
            FlushReason::Interval => "interval",
            FlushReason::Manual => "manual",
        }
    }
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receives flush requests from a trigger's background worker
#[async_trait]
pub trait FlushHandler: Send + Sync {
    /// Perform (or schedule) one flush
    async fn flush_requested(&self, reason: FlushReason);
}

/// Lifecycle of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerState {
    /// Constructed, not yet started
    Created,
    /// Worker running
    Started,
    /// Stopped; terminal
    Stopped,
}

/// The flush trigger policies
#[derive(Debug)]
pub enum FlushTrigger {
    /// Fire on buffered item count
    Count(CountTrigger),
    /// Fire on a fixed period
    Interval(IntervalTrigger),
    /// Fire on either, one flush at a time
    Hybrid(HybridTrigger),
}

impl FlushTrigger {
    /// Start the background worker, delivering requests to `handler`
    pub async fn start(&self, handler: Arc<dyn FlushHandler>) -> Result<(), FlushTriggerError> {
        match self {
            FlushTrigger::Count(trigger) => trigger.start(handler),
            FlushTrigger::Interval(trigger) => trigger.start(handler),
            FlushTrigger::Hybrid(trigger) => trigger.start(handler),
        }
    }

    /// Stop the worker and wait for it to exit
    pub async fn stop(&self) -> Result<(), FlushTriggerError> {
        match self {
            FlushTrigger::Count(trigger) => trigger.stop().await,
            FlushTrigger::Interval(trigger) => trigger.stop().await,
            FlushTrigger::Hybrid(trigger) => trigger.stop().await,
        }
    }

    /// Report the new live item count of one category
    pub fn notify_count_changed(&self, category: EventCategory, count: usize) {
        match self {
            FlushTrigger::Count(trigger) => trigger.notify_count_changed(category, count),
            // Time based only
            FlushTrigger::Interval(_) => {}
            FlushTrigger::Hybrid(trigger) => trigger.notify_count_changed(category, count),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TriggerState {
        match self {
            FlushTrigger::Count(trigger) => trigger.state(),
            FlushTrigger::Interval(trigger) => trigger.state(),
            FlushTrigger::Hybrid(trigger) => trigger.state(),
        }
    }
}

impl From<CountTrigger> for FlushTrigger {
    fn from(trigger: CountTrigger) -> Self {
        FlushTrigger::Count(trigger)
    }
}

impl From<IntervalTrigger> for FlushTrigger {
    fn from(trigger: IntervalTrigger) -> Self {
        FlushTrigger::Interval(trigger)
    }
}

impl From<HybridTrigger> for FlushTrigger {
    fn from(trigger: HybridTrigger) -> Self {
        FlushTrigger::Hybrid(trigger)
    }
}

/// Lifecycle bookkeeping shared by the count and interval triggers
#[derive(Debug)]
struct Lifecycle {
    state: Mutex<TriggerState>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: Mutex::new(TriggerState::Created),
        }
    }

    fn current(&self) -> TriggerState {
        *self.state.lock()
    }

    fn begin_start(&self) -> Result<(), FlushTriggerError> {
        let mut state = self.state.lock();
        match *state {
            TriggerState::Created => {
                *state = TriggerState::Started;
                Ok(())
            }
            TriggerState::Started => Err(FlushTriggerError::AlreadyStarted),
            TriggerState::Stopped => Err(FlushTriggerError::AlreadyStopped),
        }
    }

    /// Undo `begin_start` when the worker could not be spawned
    fn abort_start(&self) {
        *self.state.lock() = TriggerState::Created;
    }

    fn begin_stop(&self) -> Result<(), FlushTriggerError> {
        let mut state = self.state.lock();
        match *state {
            TriggerState::Started => {
                *state = TriggerState::Stopped;
                Ok(())
            }
            TriggerState::Created => Err(FlushTriggerError::NotStarted),
            TriggerState::Stopped => Err(FlushTriggerError::AlreadyStopped),
        }
    }
}

/// Wake-up channel between a trigger and its background worker
#[derive(Debug, Default)]
struct WorkerSignal {
    notify: Notify,
    stopping: AtomicBool,
}

impl WorkerSignal {
    fn wake(&self) {
        self.notify.notify_one();
    }

    fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// Spawn a worker on the current Tokio runtime
fn spawn_worker<F>(worker: F) -> Result<JoinHandle<()>, FlushTriggerError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| FlushTriggerError::NoRuntime)?;
    Ok(runtime.spawn(worker))
}

/// Tear down a worker whose trigger is going away without `stop`
fn cancel_worker(signal: &WorkerSignal, handle: Option<JoinHandle<()>>) {
    signal.request_stop();
    if let Some(handle) = handle {
        handle.abort();
    }
}

/// Wait for a worker handle taken out of its slot
async fn join_worker(handle: Option<JoinHandle<()>>) -> Result<(), FlushTriggerError> {
    match handle {
        Some(handle) => handle
            .await
            .map_err(|e| FlushTriggerError::WorkerFailed(e.to_string())),
        None => Ok(()),
    }
}
