// Copyright 2025 Cowboy AI, LLC.

//! Typed admission API shared by the buffer and its lock scopes

use crate::errors::BufferResult;
use crate::events::{AccessModel, Mutation};
use crate::identifiers::SequenceNumber;

/// Accepts permission-graph mutations into the buffer.
///
/// Implemented by [`EventBuffer`](super::EventBuffer), which locks per call,
/// and by [`AdmissionScope`](super::AdmissionScope), which admits under locks
/// it already holds. Each method returns the sequence number assigned to the
/// mutation itself; implied events are numbered before it.
pub trait AccessEventSink<P: AccessModel> {
    /// Validate, stamp and enqueue one mutation
    fn admit(&self, mutation: Mutation<P>) -> BufferResult<SequenceNumber>;

    /// Add a user
    fn add_user(&self, user: P::User) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::add_user(user))
    }

    /// Remove a user
    fn remove_user(&self, user: P::User) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::remove_user(user))
    }

    /// Add a group
    fn add_group(&self, group: P::Group) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::add_group(group))
    }

    /// Remove a group
    fn remove_group(&self, group: P::Group) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::remove_group(group))
    }

    /// Add a user to a group
    fn add_user_to_group(&self, user: P::User, group: P::Group) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::add_user_to_group(user, group))
    }

    /// Remove a user from a group
    fn remove_user_to_group(&self, user: P::User, group: P::Group) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::remove_user_to_group(user, group))
    }

    /// Add a group to another group
    fn add_group_to_group(
        &self,
        from_group: P::Group,
        to_group: P::Group,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::add_group_to_group(from_group, to_group))
    }

    /// Remove a group from another group
    fn remove_group_to_group(
        &self,
        from_group: P::Group,
        to_group: P::Group,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::remove_group_to_group(from_group, to_group))
    }

    /// Grant a user access to a component
    fn add_user_to_component_access(
        &self,
        user: P::User,
        component: P::Component,
        access: P::Access,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::add_user_to_component_access(user, component, access))
    }

    /// Revoke a user's access to a component
    fn remove_user_to_component_access(
        &self,
        user: P::User,
        component: P::Component,
        access: P::Access,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::remove_user_to_component_access(user, component, access))
    }

    /// Grant a group access to a component
    fn add_group_to_component_access(
        &self,
        group: P::Group,
        component: P::Component,
        access: P::Access,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::add_group_to_component_access(group, component, access))
    }

    /// Revoke a group's access to a component
    fn remove_group_to_component_access(
        &self,
        group: P::Group,
        component: P::Component,
        access: P::Access,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::remove_group_to_component_access(group, component, access))
    }

    /// Add an entity type
    fn add_entity_type(&self, entity_type: impl Into<String>) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::add_entity_type(entity_type))
    }

    /// Remove an entity type
    fn remove_entity_type(&self, entity_type: impl Into<String>) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::remove_entity_type(entity_type))
    }

    /// Add an entity
    fn add_entity(
        &self,
        entity_type: impl Into<String>,
        entity: impl Into<String>,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::add_entity(entity_type, entity))
    }

    /// Remove an entity
    fn remove_entity(
        &self,
        entity_type: impl Into<String>,
        entity: impl Into<String>,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::remove_entity(entity_type, entity))
    }

    /// Grant a user access to an entity
    fn add_user_to_entity(
        &self,
        user: P::User,
        entity_type: impl Into<String>,
        entity: impl Into<String>,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::add_user_to_entity(user, entity_type, entity))
    }

    /// Revoke a user's access to an entity
    fn remove_user_to_entity(
        &self,
        user: P::User,
        entity_type: impl Into<String>,
        entity: impl Into<String>,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::remove_user_to_entity(user, entity_type, entity))
    }

    /// Grant a group access to an entity
    fn add_group_to_entity(
        &self,
        group: P::Group,
        entity_type: impl Into<String>,
        entity: impl Into<String>,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::add_group_to_entity(group, entity_type, entity))
    }

    /// Revoke a group's access to an entity
    fn remove_group_to_entity(
        &self,
        group: P::Group,
        entity_type: impl Into<String>,
        entity: impl Into<String>,
    ) -> BufferResult<SequenceNumber> {
        self.admit(Mutation::remove_group_to_entity(group, entity_type, entity))
    }
}
