//! Group Service
//!
//! Group membership with presence checks and the embedded message log.

use std::sync::Arc;

use divelog_core::{
    require_id, resources, DiveLogError, DiveLogResult, EntityId, Group, MembershipError, Message,
    Patch, Projection, ResolveId, StorageError, User, ID_FIELD,
};
use divelog_storage::{dedupe_list, stamp_message, DocumentStore, Resource, ResourceStore};
use serde_json::{Map, Value};

use crate::impl_resource_reads;

/// Consistency service for groups.
#[derive(Clone)]
pub struct GroupService {
    store: ResourceStore<Group>,
}

impl_resource_reads!(GroupService, Group);

impl GroupService {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self {
            store: ResourceStore::new(db),
        }
    }

    /// Open a group. Seed messages are stamped with an id and `sent` time.
    pub async fn create(&self, data: &Group) -> DiveLogResult<Group> {
        self.store.create(data).await
    }

    /// A replacement participant list keeps only the first occurrence of
    /// each user.
    pub async fn update(&self, id: impl ResolveId, mut patch: Patch) -> DiveLogResult<Option<Group>> {
        let id = require_id(&id, Group::NAME)?;
        patch.map_set_values(Group::PARTICIPANTS, |value| {
            let mut value = value.clone();
            dedupe_list(&mut value);
            Ok(value)
        })?;
        self.store.update(id, &patch).await
    }

    pub async fn delete(&self, id: impl ResolveId) -> DiveLogResult<Option<Group>> {
        let id = require_id(&id, Group::NAME)?;
        self.store.delete(id).await
    }

    /// # Errors
    /// `NotFound` for a missing group, `AlreadyMember` when the user already
    /// participates.
    pub async fn add_user(
        &self,
        group: impl ResolveId,
        user: impl ResolveId,
    ) -> DiveLogResult<Option<Group>> {
        let group = require_id(&group, Group::NAME)?;
        let user = require_id(&user, User::NAME)?;

        if self.participants(group).await?.has_participant(user) {
            return Err(MembershipError::AlreadyMember.into());
        }
        self.store
            .update(group, &Patch::new().push_id(Group::PARTICIPANTS, user))
            .await
    }

    /// # Errors
    /// `NotFound` for a missing group, `NotAMember` when the user does not
    /// participate.
    pub async fn remove_user(
        &self,
        group: impl ResolveId,
        user: impl ResolveId,
    ) -> DiveLogResult<Option<Group>> {
        let group = require_id(&group, Group::NAME)?;
        let user = require_id(&user, User::NAME)?;

        if !self.participants(group).await?.has_participant(user) {
            return Err(MembershipError::NotAMember.into());
        }
        self.store
            .update(group, &Patch::new().pull_id(Group::PARTICIPANTS, user))
            .await
    }

    /// Append a message, stamped with a fresh id and the current time.
    /// Returns the updated group, `None` when it does not exist.
    pub async fn send_message(
        &self,
        group: impl ResolveId,
        message: &Message,
    ) -> DiveLogResult<Option<Group>> {
        let group = require_id(&group, Group::NAME)?;

        let mut entry = message_entry(message)?;
        entry.remove(ID_FIELD);
        entry.remove("sent");
        stamp_message(&mut entry);

        let updated = self
            .store
            .update(group, &Patch::new().push(Group::MESSAGES, Value::Object(entry)))
            .await?;
        tracing::debug!(group_id = %group, found = updated.is_some(), "Message sent");
        Ok(updated)
    }

    /// The group with only its participants loaded.
    async fn participants(&self, group: EntityId) -> DiveLogResult<Group> {
        let fields = Projection::new([Group::PARTICIPANTS]);
        self.store
            .get(group, Some(&fields), &[])
            .await?
            .ok_or_else(|| DiveLogError::not_found(Group::NAME, group))
    }
}

fn message_entry(message: &Message) -> DiveLogResult<Map<String, Value>> {
    let failed = |reason: String| StorageError::Serialization {
        resource: resources::MESSAGE.to_string(),
        reason,
    };
    match serde_json::to_value(message).map_err(|e| failed(e.to_string()))? {
        Value::Object(entry) => Ok(entry),
        other => Err(failed(format!("expected an object, got {other}")).into()),
    }
}
