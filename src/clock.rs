// Copyright 2025 Cowboy AI, LLC.

//! Clock and identity source for admitted events

use crate::identifiers::EventId;
use chrono::{DateTime, Utc};
use std::fmt;

/// Supplies the identifier and timestamp of each admitted event.
///
/// Swap in a deterministic implementation for tests.
pub trait EventClock: Send + Sync + fmt::Debug {
    /// A fresh, never reused event identifier
    fn next_event_id(&self) -> EventId;

    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock with random UUID identifiers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl EventClock for SystemClock {
    fn next_event_id(&self) -> EventId {
        EventId::new()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
