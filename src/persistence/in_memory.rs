// Copyright 2025 Cowboy AI, LLC.

//! In-memory bulk persister

use super::BulkPersister;
use crate::errors::PersistError;
use crate::events::{AccessModel, TemporalEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Keeps every persisted batch in memory.
///
/// Useful for tests and for running the buffer without a backing store. A
/// failure can be injected with [`set_failing`](Self::set_failing).
#[derive(Debug)]
pub struct InMemoryBulkPersister<P: AccessModel> {
    batches: Arc<RwLock<Vec<Vec<TemporalEvent<P>>>>>,
    failure: Arc<RwLock<Option<PersistError>>>,
}

impl<P: AccessModel> InMemoryBulkPersister<P> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            batches: Arc::new(RwLock::new(Vec::new())),
            failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Make every following call fail with `error`, or succeed again with `None`
    pub async fn set_failing(&self, error: Option<PersistError>) {
        *self.failure.write().await = error;
    }

    /// Persisted batches in call order
    pub async fn batches(&self) -> Vec<Vec<TemporalEvent<P>>> {
        self.batches.read().await.clone()
    }

    /// All persisted events, flattened in call order
    pub async fn events(&self) -> Vec<TemporalEvent<P>> {
        self.batches.read().await.iter().flatten().cloned().collect()
    }

    /// Number of persisted events
    pub async fn event_count(&self) -> usize {
        self.batches.read().await.iter().map(Vec::len).sum()
    }
}

impl<P: AccessModel> Default for InMemoryBulkPersister<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: AccessModel> Clone for InMemoryBulkPersister<P> {
    fn clone(&self) -> Self {
        Self {
            batches: Arc::clone(&self.batches),
            failure: Arc::clone(&self.failure),
        }
    }
}

#[async_trait]
impl<P: AccessModel> BulkPersister<P> for InMemoryBulkPersister<P> {
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    async fn persist_events(&self, events: Vec<TemporalEvent<P>>) -> Result<(), PersistError> {
        if let Some(error) = self.failure.read().await.clone() {
            return Err(error);
        }
        debug!("Storing batch in memory");
        self.batches.write().await.push(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventAction, EventPayload, StringAccessModel};
    use crate::identifiers::{EventId, SequenceNumber};
    use chrono::Utc;

    fn event(sequence: u64) -> TemporalEvent<StringAccessModel> {
        TemporalEvent {
            event_id: EventId::new(),
            action: EventAction::Add,
            occurred_time: Utc::now(),
            sequence_number: SequenceNumber::new(sequence),
            hash_code: 0,
            payload: EventPayload::User {
                user: format!("user-{sequence}"),
            },
        }
    }

    #[tokio::test]
    async fn test_stores_batches_in_order() {
        let persister = InMemoryBulkPersister::<StringAccessModel>::new();
        persister.persist_events(vec![event(0), event(1)]).await.unwrap();
        persister.persist_events(vec![event(2)]).await.unwrap();

        assert_eq!(persister.batches().await.len(), 2);
        let sequence: Vec<u64> = persister
            .events()
            .await
            .iter()
            .map(|e| e.sequence_number.value())
            .collect();
        assert_eq!(sequence, vec![0, 1, 2]);
        assert_eq!(persister.event_count().await, 3);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let persister = InMemoryBulkPersister::<StringAccessModel>::new();
        persister
            .set_failing(Some(PersistError::StorageError("disk full".to_string())))
            .await;

        let result = persister.persist_events(vec![event(0)]).await;
        assert_eq!(result, Err(PersistError::StorageError("disk full".to_string())));
        assert_eq!(persister.event_count().await, 0);

        persister.set_failing(None).await;
        persister.persist_events(vec![event(1)]).await.unwrap();
        assert_eq!(persister.event_count().await, 1);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let persister = InMemoryBulkPersister::<StringAccessModel>::new();
        let handle = persister.clone();
        persister.persist_events(vec![event(7)]).await.unwrap();
        assert_eq!(handle.event_count().await, 1);
    }
}
