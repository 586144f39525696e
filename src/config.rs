// Copyright 2025 Cowboy AI, LLC.

//! Buffer configuration
//!
//! ```json
//! {
//!   "flush": { "strategy": "hybrid", "threshold": 500, "interval_ms": 30000 },
//!   "initial_sequence_number": 0
//! }
//! ```

use crate::errors::{BufferError, BufferResult};
use crate::flush::{CountTrigger, FlushTrigger, HybridTrigger, IntervalTrigger};
use crate::identifiers::SequenceNumber;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default count threshold
pub const DEFAULT_FLUSH_THRESHOLD: usize = 500;

/// Default flush interval in milliseconds
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 30_000;

/// Which flush trigger to run, and its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FlushPolicyConfig {
    /// Flush when the total buffered count reaches `threshold`
    Count {
        /// Buffered item count that triggers a flush
        threshold: usize,
    },
    /// Flush every `interval_ms`
    Interval {
        /// Flush period in milliseconds
        interval_ms: u64,
    },
    /// Flush on whichever comes first
    Hybrid {
        /// Buffered item count that triggers a flush
        threshold: usize,
        /// Flush period in milliseconds
        interval_ms: u64,
    },
}

impl Default for FlushPolicyConfig {
    fn default() -> Self {
        FlushPolicyConfig::Hybrid {
            threshold: DEFAULT_FLUSH_THRESHOLD,
            interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
        }
    }
}

impl FlushPolicyConfig {
    /// Reject zero thresholds and intervals
    pub fn validate(&self) -> BufferResult<()> {
        let (threshold, interval_ms) = match *self {
            FlushPolicyConfig::Count { threshold } => (Some(threshold), None),
            FlushPolicyConfig::Interval { interval_ms } => (None, Some(interval_ms)),
            FlushPolicyConfig::Hybrid {
                threshold,
                interval_ms,
            } => (Some(threshold), Some(interval_ms)),
        };
        if threshold == Some(0) {
            return Err(BufferError::Configuration(
                "flush threshold must be at least 1".to_string(),
            ));
        }
        if interval_ms == Some(0) {
            return Err(BufferError::Configuration(
                "flush interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Construct the configured trigger
    pub fn build(&self) -> BufferResult<FlushTrigger> {
        self.validate()?;
        let trigger = match *self {
            FlushPolicyConfig::Count { threshold } => CountTrigger::new(threshold)?.into(),
            FlushPolicyConfig::Interval { interval_ms } => {
                IntervalTrigger::new(Duration::from_millis(interval_ms))?.into()
            }
            FlushPolicyConfig::Hybrid {
                threshold,
                interval_ms,
            } => HybridTrigger::new(threshold, Duration::from_millis(interval_ms))?.into(),
        };
        Ok(trigger)
    }
}

/// Event buffer configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Flush trigger policy
    pub flush: FlushPolicyConfig,
    /// Sequence number of the first admitted event; a restarted node passes
    /// one past the last persisted number
    pub initial_sequence_number: u64,
}

impl BufferConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> BufferResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for invalid values
    pub fn validate(&self) -> BufferResult<()> {
        // u64::MAX is never assigned, so starting there leaves no room
        if self.initial_sequence_number == u64::MAX {
            return Err(BufferError::Configuration(
                "initial_sequence_number must be below u64::MAX".to_string(),
            ));
        }
        self.flush.validate()
    }

    /// First sequence number as a typed value
    pub fn initial_sequence(&self) -> SequenceNumber {
        SequenceNumber::new(self.initial_sequence_number)
    }
}
