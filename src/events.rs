// Copyright 2025 Cowboy AI, LLC.

//! Permission-mutation events
//!
//! Every change to the permission graph is captured as a [`Mutation`] (an
//! action on one of ten kinds of relationship). Once admitted by the buffer it
//! becomes a [`TemporalEvent`] stamped with an [`EventId`], an occurred time,
//! a global [`SequenceNumber`] and a partition hash code.

use crate::identifiers::{EventId, SequenceNumber};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::hash::Hash;

/// Bounds required of every key carried in an event payload
pub trait EventKey:
    Clone + Debug + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> EventKey for T where
    T: Clone + Debug + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// The key types a deployment uses for users, groups, application components
/// and access levels. Entity types and entities are always strings.
pub trait AccessModel: Clone + Debug + PartialEq + Eq + Send + Sync + 'static {
    /// User identifier
    type User: EventKey;
    /// Group identifier
    type Group: EventKey;
    /// Application component identifier
    type Component: EventKey;
    /// Access level identifier
    type Access: EventKey;
}

/// Access model using plain strings for every key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StringAccessModel;

impl AccessModel for StringAccessModel {
    type User = String;
    type Group = String;
    type Component = String;
    type Access = String;
}

/// Whether an event adds or removes an element of the permission graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventAction {
    /// The element is added
    Add,
    /// The element is removed
    Remove,
}

/// The ten event partitions of the buffer.
///
/// Declaration order is the global lock order: any code acquiring more than
/// one category queue lock acquires them in ascending order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum EventCategory {
    /// Users
    User,
    /// Groups
    Group,
    /// User to group mappings
    UserToGroup,
    /// Group to group mappings
    GroupToGroup,
    /// User to application component and access level mappings
    UserToComponentAccess,
    /// Group to application component and access level mappings
    GroupToComponentAccess,
    /// Entity types
    EntityType,
    /// Entities
    Entity,
    /// User to entity mappings
    UserToEntity,
    /// Group to entity mappings
    GroupToEntity,
}

impl EventCategory {
    /// Number of categories
    pub const COUNT: usize = 10;

    /// All categories in lock order
    pub const ALL: [EventCategory; EventCategory::COUNT] = [
        EventCategory::User,
        EventCategory::Group,
        EventCategory::UserToGroup,
        EventCategory::GroupToGroup,
        EventCategory::UserToComponentAccess,
        EventCategory::GroupToComponentAccess,
        EventCategory::EntityType,
        EventCategory::Entity,
        EventCategory::UserToEntity,
        EventCategory::GroupToEntity,
    ];

    /// Position in the lock order
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable name used in logs and metric keys
    pub const fn name(self) -> &'static str {
        match self {
            EventCategory::User => "User",
            EventCategory::Group => "Group",
            EventCategory::UserToGroup => "UserToGroup",
            EventCategory::GroupToGroup => "GroupToGroup",
            EventCategory::UserToComponentAccess => "UserToComponentAccess",
            EventCategory::GroupToComponentAccess => "GroupToComponentAccess",
            EventCategory::EntityType => "EntityType",
            EventCategory::Entity => "Entity",
            EventCategory::UserToEntity => "UserToEntity",
            EventCategory::GroupToEntity => "GroupToEntity",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of categories, iterated in lock order
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CategorySet(u16);

impl CategorySet {
    /// The empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every category
    pub const fn all() -> Self {
        Self((1 << EventCategory::COUNT) - 1)
    }

    /// Set holding exactly the given categories
    pub fn of(categories: &[EventCategory]) -> Self {
        categories.iter().copied().collect()
    }

    /// This set plus one category
    pub const fn with(self, category: EventCategory) -> Self {
        Self(self.0 | (1 << category.index()))
    }

    /// Whether the category is in the set
    pub const fn contains(self, category: EventCategory) -> bool {
        self.0 & (1 << category.index()) != 0
    }

    /// Whether every category of `self` is in `other`
    pub const fn is_subset(self, other: CategorySet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Number of categories in the set
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Whether the set is empty
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Categories in lock order
    pub fn iter(self) -> impl Iterator<Item = EventCategory> {
        EventCategory::ALL
            .into_iter()
            .filter(move |category| self.contains(*category))
    }
}

impl FromIterator<EventCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = EventCategory>>(iter: I) -> Self {
        iter.into_iter()
            .fold(CategorySet::empty(), |set, category| set.with(category))
    }
}

impl fmt::Debug for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Variant-specific fields of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "", tag = "type", rename_all = "snake_case")]
pub enum EventPayload<P: AccessModel> {
    /// A user
    User {
        /// The user
        user: P::User,
    },
    /// A group
    Group {
        /// The group
        group: P::Group,
    },
    /// Membership of a user in a group
    UserToGroup {
        /// The member user
        user: P::User,
        /// The containing group
        group: P::Group,
    },
    /// Membership of a group in another group
    GroupToGroup {
        /// The member group
        from_group: P::Group,
        /// The containing group
        to_group: P::Group,
    },
    /// Access of a user to an application component at an access level
    UserToComponentAccess {
        /// The user
        user: P::User,
        /// The application component
        component: P::Component,
        /// The access level
        access: P::Access,
    },
    /// Access of a group to an application component at an access level
    GroupToComponentAccess {
        /// The group
        group: P::Group,
        /// The application component
        component: P::Component,
        /// The access level
        access: P::Access,
    },
    /// An entity type
    EntityType {
        /// The entity type
        entity_type: String,
    },
    /// An entity of an entity type
    Entity {
        /// The entity type
        entity_type: String,
        /// The entity
        entity: String,
    },
    /// Access of a user to an entity
    UserToEntity {
        /// The user
        user: P::User,
        /// The entity type
        entity_type: String,
        /// The entity
        entity: String,
    },
    /// Access of a group to an entity
    GroupToEntity {
        /// The group
        group: P::Group,
        /// The entity type
        entity_type: String,
        /// The entity
        entity: String,
    },
}

/// Primary key of a payload, used to compute its partition hash code
#[derive(Debug)]
pub enum PartitionKey<'a, P: AccessModel> {
    /// Keyed by user
    User(&'a P::User),
    /// Keyed by group
    Group(&'a P::Group),
    /// Keyed by entity type
    EntityType(&'a str),
}

impl<P: AccessModel> EventPayload<P> {
    /// Queue this payload is buffered in
    pub fn category(&self) -> EventCategory {
        match self {
            EventPayload::User { .. } => EventCategory::User,
            EventPayload::Group { .. } => EventCategory::Group,
            EventPayload::UserToGroup { .. } => EventCategory::UserToGroup,
            EventPayload::GroupToGroup { .. } => EventCategory::GroupToGroup,
            EventPayload::UserToComponentAccess { .. } => EventCategory::UserToComponentAccess,
            EventPayload::GroupToComponentAccess { .. } => EventCategory::GroupToComponentAccess,
            EventPayload::EntityType { .. } => EventCategory::EntityType,
            EventPayload::Entity { .. } => EventCategory::Entity,
            EventPayload::UserToEntity { .. } => EventCategory::UserToEntity,
            EventPayload::GroupToEntity { .. } => EventCategory::GroupToEntity,
        }
    }

    /// The key that decides which shard owns this event
    pub fn partition_key(&self) -> PartitionKey<'_, P> {
        match self {
            EventPayload::User { user }
            | EventPayload::UserToGroup { user, .. }
            | EventPayload::UserToComponentAccess { user, .. }
            | EventPayload::UserToEntity { user, .. } => PartitionKey::User(user),
            EventPayload::Group { group }
            | EventPayload::GroupToComponentAccess { group, .. }
            | EventPayload::GroupToEntity { group, .. } => PartitionKey::Group(group),
            EventPayload::GroupToGroup { from_group, .. } => PartitionKey::Group(from_group),
            EventPayload::EntityType { entity_type } | EventPayload::Entity { entity_type, .. } => {
                PartitionKey::EntityType(entity_type)
            }
        }
    }
}

/// A proposed change to the permission graph, not yet admitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Mutation<P: AccessModel> {
    /// Add or remove
    pub action: EventAction,
    /// What is added or removed
    pub payload: EventPayload<P>,
}

impl<P: AccessModel> Mutation<P> {
    /// Create a mutation
    pub fn new(action: EventAction, payload: EventPayload<P>) -> Self {
        Self { action, payload }
    }

    /// Queue the admitted event lands in
    pub fn category(&self) -> EventCategory {
        self.payload.category()
    }

    /// Queue locks an admission of this mutation holds.
    ///
    /// Removals of graph elements also lock the queues of the mappings that
    /// reference them; additions of mappings also lock the queues of the
    /// elements they reference.
    pub fn lock_set(&self) -> CategorySet {
        use EventAction::{Add, Remove};
        use EventCategory::*;

        let related: &[EventCategory] = match (self.category(), self.action) {
            (User, Add) | (Group, Add) | (EntityType, Add) => &[],
            (User, Remove) => &[UserToGroup, UserToComponentAccess, UserToEntity],
            (Group, Remove) => &[UserToGroup, GroupToGroup, GroupToComponentAccess, GroupToEntity],
            (UserToGroup, Add) => &[User, Group],
            (GroupToGroup, Add) => &[Group],
            (UserToComponentAccess, Add) => &[User],
            (GroupToComponentAccess, Add) => &[Group],
            (EntityType, Remove) => &[Entity, UserToEntity, GroupToEntity],
            (Entity, Add) => &[EntityType],
            (Entity, Remove) => &[UserToEntity, GroupToEntity],
            (UserToEntity, Add) => &[User, EntityType, Entity],
            (GroupToEntity, Add) => &[Group, EntityType, Entity],
            (UserToGroup, Remove)
            | (GroupToGroup, Remove)
            | (UserToComponentAccess, Remove)
            | (GroupToComponentAccess, Remove)
            | (UserToEntity, Remove)
            | (GroupToEntity, Remove) => &[],
        };

        CategorySet::of(related).with(self.category())
    }

    /// Add a user
    pub fn add_user(user: P::User) -> Self {
        Self::new(EventAction::Add, EventPayload::User { user })
    }

    /// Remove a user
    pub fn remove_user(user: P::User) -> Self {
        Self::new(EventAction::Remove, EventPayload::User { user })
    }

    /// Add a group
    pub fn add_group(group: P::Group) -> Self {
        Self::new(EventAction::Add, EventPayload::Group { group })
    }

    /// Remove a group
    pub fn remove_group(group: P::Group) -> Self {
        Self::new(EventAction::Remove, EventPayload::Group { group })
    }

    /// Add a user to a group
    pub fn add_user_to_group(user: P::User, group: P::Group) -> Self {
        Self::new(EventAction::Add, EventPayload::UserToGroup { user, group })
    }

    /// Remove a user from a group
    pub fn remove_user_to_group(user: P::User, group: P::Group) -> Self {
        Self::new(EventAction::Remove, EventPayload::UserToGroup { user, group })
    }

    /// Add a group to another group
    pub fn add_group_to_group(from_group: P::Group, to_group: P::Group) -> Self {
        Self::new(
            EventAction::Add,
            EventPayload::GroupToGroup {
                from_group,
                to_group,
            },
        )
    }

    /// Remove a group from another group
    pub fn remove_group_to_group(from_group: P::Group, to_group: P::Group) -> Self {
        Self::new(
            EventAction::Remove,
            EventPayload::GroupToGroup {
                from_group,
                to_group,
            },
        )
    }

    /// Grant a user access to a component
    pub fn add_user_to_component_access(
        user: P::User,
        component: P::Component,
        access: P::Access,
    ) -> Self {
        Self::new(
            EventAction::Add,
            EventPayload::UserToComponentAccess {
                user,
                component,
                access,
            },
        )
    }

    /// Revoke a user's access to a component
    pub fn remove_user_to_component_access(
        user: P::User,
        component: P::Component,
        access: P::Access,
    ) -> Self {
        Self::new(
            EventAction::Remove,
            EventPayload::UserToComponentAccess {
                user,
                component,
                access,
            },
        )
    }

    /// Grant a group access to a component
    pub fn add_group_to_component_access(
        group: P::Group,
        component: P::Component,
        access: P::Access,
    ) -> Self {
        Self::new(
            EventAction::Add,
            EventPayload::GroupToComponentAccess {
                group,
                component,
                access,
            },
        )
    }

    /// Revoke a group's access to a component
    pub fn remove_group_to_component_access(
        group: P::Group,
        component: P::Component,
        access: P::Access,
    ) -> Self {
        Self::new(
            EventAction::Remove,
            EventPayload::GroupToComponentAccess {
                group,
                component,
                access,
            },
        )
    }

    /// Add an entity type
    pub fn add_entity_type(entity_type: impl Into<String>) -> Self {
        Self::new(
            EventAction::Add,
            EventPayload::EntityType {
                entity_type: entity_type.into(),
            },
        )
    }

    /// Remove an entity type
    pub fn remove_entity_type(entity_type: impl Into<String>) -> Self {
        Self::new(
            EventAction::Remove,
            EventPayload::EntityType {
                entity_type: entity_type.into(),
            },
        )
    }

    /// Add an entity
    pub fn add_entity(entity_type: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(
            EventAction::Add,
            EventPayload::Entity {
                entity_type: entity_type.into(),
                entity: entity.into(),
            },
        )
    }

    /// Remove an entity
    pub fn remove_entity(entity_type: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(
            EventAction::Remove,
            EventPayload::Entity {
                entity_type: entity_type.into(),
                entity: entity.into(),
            },
        )
    }

    /// Grant a user access to an entity
    pub fn add_user_to_entity(
        user: P::User,
        entity_type: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        Self::new(
            EventAction::Add,
            EventPayload::UserToEntity {
                user,
                entity_type: entity_type.into(),
                entity: entity.into(),
            },
        )
    }

    /// Revoke a user's access to an entity
    pub fn remove_user_to_entity(
        user: P::User,
        entity_type: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        Self::new(
            EventAction::Remove,
            EventPayload::UserToEntity {
                user,
                entity_type: entity_type.into(),
                entity: entity.into(),
            },
        )
    }

    /// Grant a group access to an entity
    pub fn add_group_to_entity(
        group: P::Group,
        entity_type: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        Self::new(
            EventAction::Add,
            EventPayload::GroupToEntity {
                group,
                entity_type: entity_type.into(),
                entity: entity.into(),
            },
        )
    }

    /// Revoke a group's access to an entity
    pub fn remove_group_to_entity(
        group: P::Group,
        entity_type: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        Self::new(
            EventAction::Remove,
            EventPayload::GroupToEntity {
                group,
                entity_type: entity_type.into(),
                entity: entity.into(),
            },
        )
    }
}

/// An admitted mutation, stamped with its place in the global order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TemporalEvent<P: AccessModel> {
    /// Unique event ID
    pub event_id: EventId,
    /// Add or remove
    pub action: EventAction,
    /// When the event was admitted; never decreases along the sequence
    pub occurred_time: DateTime<Utc>,
    /// Position in the buffer-wide total order
    pub sequence_number: SequenceNumber,
    /// Shard routing hash of the payload's primary key
    pub hash_code: i32,
    /// What was added or removed
    pub payload: EventPayload<P>,
}

impl<P: AccessModel> TemporalEvent<P> {
    /// Queue this event is buffered in
    pub fn category(&self) -> EventCategory {
        self.payload.category()
    }

    /// The mutation this event records
    pub fn mutation(&self) -> Mutation<P> {
        Mutation::new(self.action, self.payload.clone())
    }
}
