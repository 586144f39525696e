// Copyright 2025 Cowboy AI, LLC.

//! # CIM Access Buffer
//!
//! Partitioned temporal event buffer for access-control permission graphs.
//!
//! Many callers admit permission-graph mutations concurrently. Each admitted
//! event gets a buffer-wide sequence number and an occurred time, is stamped
//! with the partition hash code of its primary key, and waits in one of ten
//! category queues until a flush trigger asks for it to be persisted:
//! - **Buffer**: [`EventBuffer`] and its lock scopes ([`AdmissionScope`])
//! - **Triggers**: count, interval and hybrid policies ([`FlushTrigger`])
//! - **Persistence**: the [`BulkPersister`] seam and buffering metrics
//! - **Collaborators**: [`EventValidator`], [`PartitionHasher`], [`EventClock`]
//!
//! ## Design Principles
//!
//! 1. **Total order**: sequence numbers are gap-free and occurred times never
//!    decrease along them
//! 2. **Deadlock freedom**: queue locks are always taken in [`EventCategory`]
//!    order and composite operations admit through an explicit lock scope
//! 3. **Fail static**: a failed persist is fatal; the buffer trips and refuses
//!    further work
//!
//! ## Example
//!
//! ```no_run
//! use cim_access_buffer::{
//!     AccessEventSink, BufferConfig, EventBuffer, InMemoryBulkPersister, StringAccessModel,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), cim_access_buffer::BufferError> {
//! let buffer = Arc::new(
//!     EventBuffer::<StringAccessModel>::builder()
//!         .persister(Arc::new(InMemoryBulkPersister::<StringAccessModel>::new()))
//!         .config(&BufferConfig::default())?
//!         .build()?,
//! );
//! buffer.start().await?;
//!
//! buffer.add_user("alice".to_string())?;
//! buffer.add_group("admins".to_string())?;
//! buffer.add_user_to_group("alice".to_string(), "admins".to_string())?;
//!
//! buffer.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod clock;
mod errors;
mod events;
mod identifiers;
mod partition;
mod validation;

pub mod buffer;
pub mod config;
pub mod flush;
pub mod persistence;

pub use buffer::{
    AccessEventSink, AdmissionScope, BufferSnapshot, CategoryQueue, EventBuffer,
    EventBufferBuilder, FaultHandler, FlushReport, HeldLocks,
};
pub use clock::{EventClock, SystemClock};
pub use config::{BufferConfig, FlushPolicyConfig};
pub use errors::{
    BufferError, BufferResult, BufferingFault, FlushTriggerError, PartitionHashError,
    PersistError, ValidationError,
};
pub use events::{
    AccessModel, CategorySet, EventAction, EventCategory, EventKey, EventPayload, Mutation,
    PartitionKey, StringAccessModel, TemporalEvent,
};
pub use flush::{
    CountTrigger, FlushHandler, FlushReason, FlushTrigger, HybridTrigger, IntervalTrigger,
    TriggerState,
};
pub use identifiers::{EventId, SequenceNumber};
pub use partition::{PartitionHasher, PartitionHashers, Xxh3PartitionHasher};
pub use persistence::{BufferMetrics, BulkPersister, InMemoryBulkPersister};
pub use validation::{AcceptAllValidator, EventValidator, ValidationContext};
