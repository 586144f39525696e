// Copyright 2025 Cowboy AI, LLC.

//! Partition hash codes for shard routing
//!
//! The buffer stamps each event with the hash code of its primary key (user,
//! group or entity type). Shards own ranges of hash codes; the buffer computes
//! the code once at admission and never interprets it.

use crate::errors::PartitionHashError;
use crate::events::{AccessModel, EventPayload, PartitionKey};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

/// Maps a key to the hash code used to pick its shard
pub trait PartitionHasher<K: ?Sized>: Send + Sync {
    /// Hash code of `key`
    fn hash_code(&self, key: &K) -> Result<i32, PartitionHashError>;
}

/// Seeded XXH3 over the key's `Hash` implementation, folded to 32 bits.
///
/// Stable across processes, unlike `std`'s randomly keyed hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3PartitionHasher {
    seed: u64,
}

impl Xxh3PartitionHasher {
    /// Hasher with an explicit seed
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }
}

impl<K: Hash + ?Sized> PartitionHasher<K> for Xxh3PartitionHasher {
    fn hash_code(&self, key: &K) -> Result<i32, PartitionHashError> {
        let mut hasher = Xxh3::with_seed(self.seed);
        key.hash(&mut hasher);
        let wide = hasher.finish();
        Ok((wide ^ (wide >> 32)) as u32 as i32)
    }
}

/// One hasher per primary-key type
pub struct PartitionHashers<P: AccessModel> {
    user: Arc<dyn PartitionHasher<P::User>>,
    group: Arc<dyn PartitionHasher<P::Group>>,
    entity_type: Arc<dyn PartitionHasher<str>>,
}

impl<P: AccessModel> PartitionHashers<P> {
    /// Bundle explicit hashers
    pub fn new(
        user: Arc<dyn PartitionHasher<P::User>>,
        group: Arc<dyn PartitionHasher<P::Group>>,
        entity_type: Arc<dyn PartitionHasher<str>>,
    ) -> Self {
        Self {
            user,
            group,
            entity_type,
        }
    }

    /// Replace the user hasher
    pub fn with_user_hasher(mut self, hasher: Arc<dyn PartitionHasher<P::User>>) -> Self {
        self.user = hasher;
        self
    }

    /// Replace the group hasher
    pub fn with_group_hasher(mut self, hasher: Arc<dyn PartitionHasher<P::Group>>) -> Self {
        self.group = hasher;
        self
    }

    /// Replace the entity type hasher
    pub fn with_entity_type_hasher(mut self, hasher: Arc<dyn PartitionHasher<str>>) -> Self {
        self.entity_type = hasher;
        self
    }

    /// Hash code of the payload's primary key
    pub fn hash_code(&self, payload: &EventPayload<P>) -> Result<i32, PartitionHashError> {
        match payload.partition_key() {
            PartitionKey::User(user) => self.user.hash_code(user),
            PartitionKey::Group(group) => self.group.hash_code(group),
            PartitionKey::EntityType(entity_type) => self.entity_type.hash_code(entity_type),
        }
    }
}

impl<P: AccessModel> Default for PartitionHashers<P> {
    fn default() -> Self {
        let hasher = Xxh3PartitionHasher::default();
        Self::new(Arc::new(hasher), Arc::new(hasher), Arc::new(hasher))
    }
}

impl<P: AccessModel> Clone for PartitionHashers<P> {
    fn clone(&self) -> Self {
        Self {
            user: Arc::clone(&self.user),
            group: Arc::clone(&self.group),
            entity_type: Arc::clone(&self.entity_type),
        }
    }
}

impl<P: AccessModel> fmt::Debug for PartitionHashers<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionHashers").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Mutation, StringAccessModel};

    struct FailingHasher;

    impl PartitionHasher<str> for FailingHasher {
        fn hash_code(&self, _key: &str) -> Result<i32, PartitionHashError> {
            Err(PartitionHashError::new("entity type", "unavailable"))
        }
    }

    #[test]
    fn test_xxh3_hash_is_deterministic() {
        let hasher = Xxh3PartitionHasher::default();
        let first = PartitionHasher::<str>::hash_code(&hasher, "ClientAccount").unwrap();
        let second = PartitionHasher::<str>::hash_code(&hasher, "ClientAccount").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_seed_changes_hash() {
        let a = Xxh3PartitionHasher::with_seed(1);
        let b = Xxh3PartitionHasher::with_seed(2);
        assert_ne!(
            PartitionHasher::<str>::hash_code(&a, "alice").unwrap(),
            PartitionHasher::<str>::hash_code(&b, "alice").unwrap()
        );
    }

    #[test]
    fn test_owned_and_borrowed_strings_agree() {
        let hasher = Xxh3PartitionHasher::default();
        let owned = String::from("alice");
        assert_eq!(
            PartitionHasher::<String>::hash_code(&hasher, &owned).unwrap(),
            PartitionHasher::<str>::hash_code(&hasher, "alice").unwrap()
        );
    }

    #[test]
    fn test_hashers_dispatch_on_primary_key() {
        let hashers = PartitionHashers::<StringAccessModel>::default()
            .with_entity_type_hasher(Arc::new(FailingHasher));

        let user_event = Mutation::<StringAccessModel>::add_user("alice".to_string());
        assert!(hashers.hash_code(&user_event.payload).is_ok());

        let entity_event = Mutation::<StringAccessModel>::add_entity("ClientAccount", "CompanyA");
        let err = hashers.hash_code(&entity_event.payload).unwrap_err();
        assert_eq!(err.key_kind, "entity type");
    }
}
