// Copyright 2025 Cowboy AI, LLC.

//! Error types for buffering operations

use crate::events::EventCategory;
use crate::identifiers::SequenceNumber;
use thiserror::Error;

/// Rejection raised by an event validator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The mutation conflicts with current state
    #[error("Mutation rejected: {reason}")]
    Rejected {
        /// Why the mutation was rejected
        reason: String,
    },

    /// The mutation refers to an element that does not exist
    #[error("{kind} '{key}' does not exist")]
    NotFound {
        /// Kind of element (user, group, entity type, ...)
        kind: String,
        /// Key of the missing element
        key: String,
    },

    /// The mutation would add an element that already exists
    #[error("{kind} '{key}' already exists")]
    AlreadyExists {
        /// Kind of element (user, group, entity type, ...)
        kind: String,
        /// Key of the existing element
        key: String,
    },
}

impl ValidationError {
    /// Create a generic rejection
    pub fn rejected(reason: impl Into<String>) -> Self {
        ValidationError::Rejected {
            reason: reason.into(),
        }
    }
}

/// Failure of a partition hasher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Partition hash failed for {key_kind} key: {message}")]
pub struct PartitionHashError {
    /// Kind of key being hashed (user, group, entity type)
    pub key_kind: &'static str,
    /// Hasher-supplied description
    pub message: String,
}

impl PartitionHashError {
    /// Create a new hashing error
    pub fn new(key_kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            key_kind,
            message: message.into(),
        }
    }
}

/// Errors raised by a bulk persister
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    /// Failed to reach the backing store
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The backing store refused or failed the write
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Failed to encode events for the backing store
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::SerializationError(err.to_string())
    }
}

/// Unrecoverable failure to persist a drained batch.
///
/// The batch is gone from the buffer once this is raised; upstream is expected
/// to stop accepting writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Fatal buffering fault: failed to persist {event_count} events (sequence {first_sequence}..={last_sequence})"
)]
pub struct BufferingFault {
    /// Number of events in the lost batch
    pub event_count: usize,
    /// Lowest sequence number in the lost batch
    pub first_sequence: SequenceNumber,
    /// Highest sequence number in the lost batch
    pub last_sequence: SequenceNumber,
    /// Underlying persister error
    #[source]
    pub source: PersistError,
}

/// Usage and configuration errors of a flush trigger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlushTriggerError {
    /// `start` called on a trigger that is already running
    #[error("Flush trigger has already been started")]
    AlreadyStarted,

    /// `start` or `stop` called on a trigger that has been stopped
    #[error("Flush trigger has already been stopped")]
    AlreadyStopped,

    /// `stop` called before `start`
    #[error("Flush trigger has not been started")]
    NotStarted,

    /// Threshold or interval out of range
    #[error("Invalid flush trigger configuration: {0}")]
    InvalidConfiguration(String),

    /// `start` called outside a Tokio runtime
    #[error("Flush trigger requires a running Tokio runtime")]
    NoRuntime,

    /// The background worker panicked or was cancelled
    #[error("Flush trigger worker failed: {0}")]
    WorkerFailed(String),
}

/// Errors that can occur in buffer operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The validator rejected the mutation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A partition hasher failed
    #[error(transparent)]
    PartitionHash(#[from] PartitionHashError),

    /// A narrow admission needed a queue lock the enclosing scope does not hold
    #[error("Queue lock for {category} is not held by this admission scope")]
    LockNotHeld {
        /// Category whose lock is missing
        category: EventCategory,
    },

    /// Flush trigger usage or configuration error
    #[error("Flush trigger error: {0}")]
    Trigger(#[from] FlushTriggerError),

    /// A flush failed to persist its batch
    #[error(transparent)]
    Fault(#[from] BufferingFault),

    /// The buffer stopped accepting work after a fatal fault
    #[error("Event buffer has tripped after a fatal persistence fault")]
    Tripped,

    /// The buffer has been shut down
    #[error("Event buffer is closed")]
    Closed,

    /// No room left in the sequence number space for the admission
    #[error("Sequence numbers exhausted: cannot assign {requested} more after {next}")]
    SequenceExhausted {
        /// The next unassigned sequence number
        next: SequenceNumber,
        /// Number of events the admission needed
        requested: usize,
    },

    /// Invalid buffer configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for buffer operations
pub type BufferResult<T> = Result<T, BufferError>;

impl From<serde_json::Error> for BufferError {
    fn from(err: serde_json::Error) -> Self {
        BufferError::Configuration(err.to_string())
    }
}

impl BufferError {
    /// Check if this is a validation rejection
    pub fn is_validation_error(&self) -> bool {
        matches!(self, BufferError::Validation(_))
    }

    /// Check if this is a usage or configuration error
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            BufferError::LockNotHeld { .. }
                | BufferError::Trigger(_)
                | BufferError::Closed
                | BufferError::Configuration(_)
        )
    }

    /// Check if this error means upstream must stop accepting writes
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BufferError::Fault(_) | BufferError::Tripped | BufferError::SequenceExhausted { .. }
        )
    }
}
