// Copyright 2025 Cowboy AI, LLC.

//! # Persistence Layer
//!
//! Durable storage of flushed batches is delegated to a [`BulkPersister`].
//! The buffer hands it one sequence-ordered batch per flush and treats any
//! error as fatal for that batch.
//!
//! ## Components
//!
//! - **Bulk persistence**: the [`BulkPersister`] seam and an in-memory store
//! - **Metrics**: counters and timings recorded by the buffer

pub mod in_memory;
pub mod metrics;

pub use in_memory::InMemoryBulkPersister;
pub use metrics::{BufferMetrics, DurationStats, MetricsInstrumented, MetricsSummary, MetricsTimer};

use crate::errors::PersistError;
use crate::events::{AccessModel, TemporalEvent};
use async_trait::async_trait;

/// Writes a drained batch to durable storage
#[async_trait]
pub trait BulkPersister<P: AccessModel>: Send + Sync {
    /// Persist `events`, which arrive in ascending sequence order.
    ///
    /// Called outside every buffer lock. An error loses the batch.
    async fn persist_events(&self, events: Vec<TemporalEvent<P>>) -> Result<(), PersistError>;
}
