// Copyright 2025 Cowboy AI, LLC.

//! Global sequence number and occurred-time assignment

use crate::clock::EventClock;
use crate::errors::{BufferError, BufferResult};
use crate::identifiers::{EventId, SequenceNumber};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Identity and position handed to one admitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stamp {
    pub event_id: EventId,
    pub sequence_number: SequenceNumber,
    pub occurred_time: DateTime<Utc>,
}

#[derive(Debug)]
struct SequenceState {
    next: SequenceNumber,
    last_occurred: Option<DateTime<Utc>>,
}

/// Serialization point for the total order.
///
/// Sequence numbers and occurred times are taken together under one lock so
/// that a higher sequence number never carries an earlier time.
#[derive(Debug)]
pub(crate) struct SequenceClock {
    clock: Arc<dyn EventClock>,
    state: Mutex<SequenceState>,
}

impl SequenceClock {
    pub(crate) fn new(clock: Arc<dyn EventClock>, first: SequenceNumber) -> Self {
        Self {
            clock,
            state: Mutex::new(SequenceState {
                next: first,
                last_occurred: None,
            }),
        }
    }

    /// Stamp `count` events with consecutive sequence numbers.
    ///
    /// The whole block must fit below `u64::MAX`; otherwise nothing is
    /// assigned and the next sequence number is left untouched.
    pub(crate) fn stamp(&self, count: usize) -> BufferResult<Vec<Stamp>> {
        let mut state = self.state.lock();
        let exhausted = BufferError::SequenceExhausted {
            next: state.next,
            requested: count,
        };
        let end = u64::try_from(count)
            .ok()
            .and_then(|count| state.next.value().checked_add(count))
            .ok_or(exhausted)?;

        let mut stamps = Vec::with_capacity(count);
        for _ in 0..count {
            let now = self.clock.now();
            let occurred_time = match state.last_occurred {
                Some(last) if last > now => last,
                _ => now,
            };
            stamps.push(Stamp {
                event_id: self.clock.next_event_id(),
                sequence_number: state.next,
                occurred_time,
            });
            state.last_occurred = Some(occurred_time);
            state.next = SequenceNumber::new(state.next.value() + 1);
        }
        debug_assert_eq!(state.next.value(), end);
        Ok(stamps)
    }

    /// The sequence number the next admitted event will receive
    pub(crate) fn peek_next(&self) -> SequenceNumber {
        self.state.lock().next
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.state.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// Clock replaying a fixed list of times, repeating the last one
    #[derive(Debug)]
    struct ScriptedClock {
        times: Mutex<Vec<DateTime<Utc>>>,
    }

    impl EventClock for ScriptedClock {
        fn next_event_id(&self) -> EventId {
            EventId::new()
        }

        fn now(&self) -> DateTime<Utc> {
            let mut times = self.times.lock();
            if times.len() > 1 {
                times.remove(0)
            } else {
                times[0]
            }
        }
    }

    #[test]
    fn test_consecutive_sequence_numbers() {
        let clock = SequenceClock::new(Arc::new(crate::clock::SystemClock), SequenceNumber::new(100));
        let stamps = clock.stamp(3).unwrap();
        let numbers: Vec<u64> = stamps.iter().map(|s| s.sequence_number.value()).collect();
        assert_eq!(numbers, vec![100, 101, 102]);
        assert_eq!(clock.peek_next(), SequenceNumber::new(103));
    }

    #[test]
    fn test_occurred_time_never_goes_backwards() {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let clock = SequenceClock::new(
            Arc::new(ScriptedClock {
                times: Mutex::new(vec![base, base - Duration::seconds(5), base + Duration::seconds(1)]),
            }),
            SequenceNumber::default(),
        );

        let stamps = clock.stamp(3).unwrap();
        assert_eq!(stamps[0].occurred_time, base);
        assert_eq!(stamps[1].occurred_time, base);
        assert_eq!(stamps[2].occurred_time, base + Duration::seconds(1));
    }

    #[test]
    fn test_lock_released_after_stamping() {
        let clock = SequenceClock::new(Arc::new(crate::clock::SystemClock), SequenceNumber::default());
        clock.stamp(1).unwrap();
        assert!(!clock.is_locked());
    }

    #[test]
    fn test_block_that_does_not_fit_assigns_nothing() {
        let clock = SequenceClock::new(
            Arc::new(crate::clock::SystemClock),
            SequenceNumber::new(u64::MAX - 2),
        );

        let err = clock.stamp(3).unwrap_err();
        assert_eq!(
            err,
            BufferError::SequenceExhausted {
                next: SequenceNumber::new(u64::MAX - 2),
                requested: 3,
            }
        );
        assert_eq!(clock.peek_next(), SequenceNumber::new(u64::MAX - 2));
        assert!(!clock.is_locked());

        let stamps = clock.stamp(2).unwrap();
        assert_eq!(stamps[1].sequence_number, SequenceNumber::new(u64::MAX - 1));
        assert!(clock.stamp(1).is_err());
    }
}
