//! Admission: lock scopes, composite operations and rejection paths

use chrono::{DateTime, TimeZone, Utc};
use cim_access_buffer::{
    AccessEventSink, BufferError, CategorySet, CountTrigger, EventAction, EventBuffer,
    EventCategory, EventClock, EventId, EventPayload, EventValidator, FlushTrigger,
    InMemoryBulkPersister, Mutation, PartitionHashError, PartitionHasher, PartitionHashers,
    SequenceNumber, StringAccessModel, TemporalEvent, ValidationContext, ValidationError,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::{Arc, OnceLock, Weak};
use uuid::Uuid;

type Buffer = EventBuffer<StringAccessModel>;
type M = Mutation<StringAccessModel>;

// Deterministic clock and identity source
#[derive(Debug)]
struct FixedClock {
    id: EventId,
    at: DateTime<Utc>,
}

impl FixedClock {
    fn new() -> Self {
        Self {
            id: EventId::from_uuid(Uuid::from_u128(0x5eed)),
            at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap(),
        }
    }
}

impl EventClock for FixedClock {
    fn next_event_id(&self) -> EventId {
        self.id
    }

    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}

// Hasher returning one code for every key
struct FixedHasher(i32);

impl<K: ?Sized> PartitionHasher<K> for FixedHasher {
    fn hash_code(&self, _key: &K) -> Result<i32, PartitionHashError> {
        Ok(self.0)
    }
}

struct FailingHasher;

impl<K: ?Sized> PartitionHasher<K> for FailingHasher {
    fn hash_code(&self, _key: &K) -> Result<i32, PartitionHashError> {
        Err(PartitionHashError::new("entity type", "hash ring unavailable"))
    }
}

fn fixed_hashers(code: i32) -> PartitionHashers<StringAccessModel> {
    PartitionHashers::new(
        Arc::new(FixedHasher(code)),
        Arc::new(FixedHasher(code)),
        Arc::new(FixedHasher(code)),
    )
}

// Removing an entity type cascades into removing its entities
struct EntityTypeCascade {
    entities: Vec<(&'static str, &'static str)>,
}

impl EventValidator<StringAccessModel> for EntityTypeCascade {
    fn validate(
        &self,
        mutation: &M,
        _context: &ValidationContext<'_, '_, StringAccessModel>,
    ) -> Result<Vec<M>, ValidationError> {
        match (&mutation.action, &mutation.payload) {
            (EventAction::Remove, EventPayload::EntityType { entity_type }) => Ok(self
                .entities
                .iter()
                .filter(|(owner, _)| *owner == entity_type.as_str())
                .map(|(owner, entity)| M::remove_entity(*owner, *entity))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }
}

// Records which queue locks are held whenever the validator runs
#[derive(Default)]
struct LockProbe {
    seen: Mutex<Vec<CategorySet>>,
}

impl EventValidator<StringAccessModel> for LockProbe {
    fn validate(
        &self,
        _mutation: &M,
        context: &ValidationContext<'_, '_, StringAccessModel>,
    ) -> Result<Vec<M>, ValidationError> {
        let locked = EventCategory::ALL
            .iter()
            .copied()
            .filter(|category| context.is_queue_locked(*category))
            .collect();
        self.seen.lock().push(locked);
        Ok(Vec::new())
    }
}

// Records queue and sequence lock state while sequence numbers are taken
#[derive(Debug, Default)]
struct SequenceProbe {
    buffer: OnceLock<Weak<Buffer>>,
    seen: Mutex<Vec<(CategorySet, bool)>>,
}

impl EventClock for SequenceProbe {
    fn next_event_id(&self) -> EventId {
        EventId::new()
    }

    fn now(&self) -> DateTime<Utc> {
        if let Some(buffer) = self.buffer.get().and_then(Weak::upgrade) {
            let locked = EventCategory::ALL
                .iter()
                .copied()
                .filter(|category| buffer.is_queue_locked(*category))
                .collect();
            self.seen.lock().push((locked, buffer.is_sequence_locked()));
        }
        Utc::now()
    }
}

struct RejectUser(&'static str);

impl EventValidator<StringAccessModel> for RejectUser {
    fn validate(
        &self,
        mutation: &M,
        _context: &ValidationContext<'_, '_, StringAccessModel>,
    ) -> Result<Vec<M>, ValidationError> {
        match &mutation.payload {
            EventPayload::User { user } if user == self.0 => Err(ValidationError::AlreadyExists {
                kind: "user".to_string(),
                key: user.clone(),
            }),
            _ => Ok(Vec::new()),
        }
    }
}

// Rejects an entity type that is already waiting in the buffer
struct NoDuplicatePendingEntityType;

impl EventValidator<StringAccessModel> for NoDuplicatePendingEntityType {
    fn validate(
        &self,
        mutation: &M,
        context: &ValidationContext<'_, '_, StringAccessModel>,
    ) -> Result<Vec<M>, ValidationError> {
        let EventPayload::EntityType { entity_type } = &mutation.payload else {
            return Ok(Vec::new());
        };
        let pending = context.pending(EventCategory::EntityType).unwrap_or_default();
        if pending.iter().any(|event| event.payload == mutation.payload) {
            return Err(ValidationError::AlreadyExists {
                kind: "entity type".to_string(),
                key: entity_type.clone(),
            });
        }
        Ok(Vec::new())
    }
}

// Claims an implied group addition the caller never locked
struct ImpliesGroup;

impl EventValidator<StringAccessModel> for ImpliesGroup {
    fn validate(
        &self,
        _mutation: &M,
        _context: &ValidationContext<'_, '_, StringAccessModel>,
    ) -> Result<Vec<M>, ValidationError> {
        Ok(vec![M::add_group("implied".to_string())])
    }
}

fn builder() -> cim_access_buffer::EventBufferBuilder<StringAccessModel> {
    Buffer::builder().persister(Arc::new(InMemoryBulkPersister::<StringAccessModel>::new()))
}

fn count_trigger(buffer: &Buffer) -> &CountTrigger {
    match buffer.flush_trigger() {
        Some(FlushTrigger::Count(trigger)) => trigger,
        other => panic!("expected a count trigger, got {other:?}"),
    }
}

#[test]
fn test_remove_entity_type_client_account() {
    let clock = FixedClock::new();
    let buffer = builder()
        .clock(Arc::new(FixedClock::new()))
        .hashers(fixed_hashers(6))
        .validator(Arc::new(EntityTypeCascade {
            entities: vec![("ClientAccount", "acme"), ("Invoice", "INV-1")],
        }))
        .flush_trigger(CountTrigger::new(1_000).unwrap())
        .build()
        .unwrap();

    buffer.remove_entity_type("ClientAccount").unwrap();

    let entity_types = buffer.pending(EventCategory::EntityType);
    assert_eq!(entity_types.len(), 1);
    let event = &entity_types[0];
    assert_eq!(event.action, EventAction::Remove);
    assert_eq!(event.event_id, clock.id);
    assert_eq!(event.occurred_time, clock.at);
    assert_eq!(event.hash_code, 6);
    assert_eq!(
        event.payload,
        EventPayload::EntityType {
            entity_type: "ClientAccount".to_string()
        }
    );

    let entities = buffer.pending(EventCategory::Entity);
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].mutation(), M::remove_entity("ClientAccount", "acme"));
    // The cascade is numbered ahead of the event that caused it
    assert!(entities[0].sequence_number < event.sequence_number);

    let trigger = count_trigger(&buffer);
    assert_eq!(trigger.tracked_count(EventCategory::Entity), 1);
    assert_eq!(trigger.tracked_count(EventCategory::EntityType), 1);
}

#[test]
fn test_single_category_admission_holds_only_its_lock() {
    let probe = Arc::new(LockProbe::default());
    let buffer = builder().validator(probe.clone()).build().unwrap();

    buffer.add_user("alice".to_string()).unwrap();
    buffer.add_entity_type("Invoice").unwrap();

    assert_eq!(
        *probe.seen.lock(),
        vec![
            CategorySet::of(&[EventCategory::User]),
            CategorySet::of(&[EventCategory::EntityType]),
        ]
    );
    assert!(EventCategory::ALL.iter().all(|c| !buffer.is_queue_locked(*c)));
}

#[test]
fn test_composite_admission_holds_declared_set() {
    let probe = Arc::new(LockProbe::default());
    let buffer = builder().validator(probe.clone()).build().unwrap();

    let mutation = M::add_user_to_entity("alice".to_string(), "Invoice", "INV-1");
    let declared = mutation.lock_set();
    buffer.admit(mutation).unwrap();

    assert_eq!(
        declared,
        CategorySet::of(&[
            EventCategory::User,
            EventCategory::EntityType,
            EventCategory::Entity,
            EventCategory::UserToEntity,
        ])
    );
    assert_eq!(*probe.seen.lock(), vec![declared]);
}

#[test]
fn test_sequence_lock_taken_inside_queue_locks() {
    let clock = Arc::new(SequenceProbe::default());
    let buffer = Arc::new(builder().clock(clock.clone()).build().unwrap());
    clock.buffer.set(Arc::downgrade(&buffer)).unwrap();

    buffer.add_group("ops".to_string()).unwrap();
    buffer.remove_group("ops".to_string()).unwrap();

    let seen = clock.seen.lock().clone();
    assert_eq!(
        seen,
        vec![
            (CategorySet::of(&[EventCategory::Group]), true),
            (M::remove_group("ops".to_string()).lock_set(), true),
        ]
    );
    assert!(!buffer.is_sequence_locked());
}

#[test]
fn test_nested_admission_matches_direct_admission() {
    let make = || {
        builder()
            .clock(Arc::new(FixedClock::new()))
            .hashers(fixed_hashers(11))
            .build()
            .unwrap()
    };

    let direct = make();
    direct.remove_entity("ClientAccount", "acme").unwrap();

    let nested = make();
    let composite = M::remove_entity_type("ClientAccount").lock_set();
    nested
        .with_locks(composite, |scope| {
            // Narrow admission while the composite already holds Entity
            scope.remove_entity("ClientAccount", "acme")
        })
        .unwrap();

    assert_eq!(
        nested.pending(EventCategory::Entity),
        direct.pending(EventCategory::Entity)
    );
}

#[test]
fn test_scope_admits_several_mutations_under_one_lock_set() {
    let buffer = builder().build().unwrap();
    let set = CategorySet::of(&[
        EventCategory::User,
        EventCategory::Group,
        EventCategory::UserToGroup,
    ]);

    let last = buffer
        .with_locks(set, |scope| {
            scope.add_user("alice".to_string())?;
            scope.add_group("admins".to_string())?;
            assert_eq!(scope.item_count(EventCategory::User), Some(1));
            assert_eq!(scope.item_count(EventCategory::Entity), None);
            scope.add_user_to_group("alice".to_string(), "admins".to_string())
        })
        .unwrap();

    assert_eq!(last, SequenceNumber::new(2));
    assert_eq!(buffer.total_item_count(), 3);
}

#[test]
fn test_scope_rejects_mutation_outside_held_locks() {
    let buffer = builder().build().unwrap();

    let result = buffer.with_locks(CategorySet::of(&[EventCategory::User]), |scope| {
        scope.add_user_to_group("alice".to_string(), "admins".to_string())
    });

    assert_eq!(
        result,
        Err(BufferError::LockNotHeld {
            category: EventCategory::Group
        })
    );
    assert_eq!(buffer.next_sequence_number(), SequenceNumber::new(0));
    assert_eq!(buffer.total_item_count(), 0);
}

#[test]
fn test_implied_mutation_outside_lock_set_is_rejected() {
    let buffer = builder().validator(Arc::new(ImpliesGroup)).build().unwrap();

    let err = buffer.add_user("alice".to_string()).unwrap_err();
    assert_eq!(
        err,
        BufferError::LockNotHeld {
            category: EventCategory::Group
        }
    );
    assert!(err.is_usage_error());
    assert_eq!(buffer.total_item_count(), 0);
}

#[test]
fn test_rejection_leaves_no_sequence_gap() {
    let buffer = builder()
        .validator(Arc::new(RejectUser("mallory")))
        .build()
        .unwrap();

    assert_eq!(buffer.add_user("alice".to_string()), Ok(SequenceNumber::new(0)));
    let err = buffer.add_user("mallory".to_string()).unwrap_err();
    assert!(err.is_validation_error());
    assert_eq!(buffer.add_user("bob".to_string()), Ok(SequenceNumber::new(1)));

    let users: Vec<String> = buffer
        .pending(EventCategory::User)
        .into_iter()
        .map(|event| match event.payload {
            EventPayload::User { user } => user,
            other => panic!("unexpected payload {other:?}"),
        })
        .collect();
    assert_eq!(users, vec!["alice".to_string(), "bob".to_string()]);
}

#[test]
fn test_validator_sees_pending_events() {
    let buffer = builder()
        .validator(Arc::new(NoDuplicatePendingEntityType))
        .build()
        .unwrap();

    buffer.add_entity_type("Invoice").unwrap();
    let err = buffer.add_entity_type("Invoice").unwrap_err();
    assert_eq!(
        err,
        BufferError::Validation(ValidationError::AlreadyExists {
            kind: "entity type".to_string(),
            key: "Invoice".to_string()
        })
    );
    assert_eq!(buffer.item_count(EventCategory::EntityType), 1);
}

#[test]
fn test_hasher_failure_aborts_admission() {
    let hashers = PartitionHashers::default().with_entity_type_hasher(Arc::new(FailingHasher));
    let buffer = builder().hashers(hashers).build().unwrap();

    let err = buffer.add_entity("Invoice", "INV-9").unwrap_err();
    assert!(matches!(err, BufferError::PartitionHash(_)));
    assert_eq!(buffer.total_item_count(), 0);
    assert_eq!(buffer.next_sequence_number(), SequenceNumber::new(0));

    // Keys of other types still hash with the default hasher
    buffer.add_user("alice".to_string()).unwrap();
}

#[test]
fn test_every_event_carries_its_payload_hash() {
    let buffer = builder().build().unwrap();
    buffer.add_user("alice".to_string()).unwrap();
    buffer
        .add_user_to_component_access("alice".to_string(), "billing".to_string(), "read".to_string())
        .unwrap();

    let user: Vec<TemporalEvent<StringAccessModel>> = buffer.pending(EventCategory::User);
    let access = buffer.pending(EventCategory::UserToComponentAccess);
    // Both are keyed by the same user
    assert_eq!(user[0].hash_code, access[0].hash_code);
}
