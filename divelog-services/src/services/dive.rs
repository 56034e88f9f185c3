//! Dive Service
//!
//! Keeps the owner's `dives` list in step with the dive collection and runs
//! dive time derivation on every write.

use std::sync::Arc;

use async_trait::async_trait;
use divelog_core::{
    process_time, require_id, resources, Dive, DiveLogError, DiveLogResult, Patch, ResolveId, User,
};
use divelog_storage::{DocumentStore, Resource, ResourceHooks, ResourceStore};
use serde_json::json;

use crate::impl_resource_reads;

/// Pushes and pulls the dive id on the owning user.
struct DiveBackReferences {
    users: ResourceStore<User>,
}

#[async_trait]
impl ResourceHooks<Dive> for DiveBackReferences {
    async fn after_create(&self, created: &Dive) -> DiveLogResult<()> {
        if let (Some(owner), Some(id)) = (created.owner_id(), created.id) {
            self.users
                .update(owner, &Patch::new().push_id(User::DIVES, id))
                .await?;
        }
        Ok(())
    }

    async fn after_delete(&self, deleted: &Dive) -> DiveLogResult<()> {
        if let (Some(owner), Some(id)) = (deleted.owner_id(), deleted.id) {
            self.users
                .update(owner, &Patch::new().pull_id(User::DIVES, id))
                .await?;
        }
        Ok(())
    }
}

/// Consistency service for dives.
#[derive(Clone)]
pub struct DiveService {
    store: ResourceStore<Dive>,
}

impl_resource_reads!(DiveService, Dive);

impl DiveService {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        let hooks = DiveBackReferences {
            users: ResourceStore::new(Arc::clone(&db)),
        };
        Self {
            store: ResourceStore::new(db).with_hooks(Arc::new(hooks)),
        }
    }

    /// Log a dive and add it to its owner's `dives`.
    ///
    /// # Errors
    /// `InvalidTimeWindow` / `DiveTimeExceeded` from dive time derivation,
    /// `RequiredFieldMissing("user")` without an owner.
    pub async fn create(&self, data: &Dive) -> DiveLogResult<Dive> {
        let mut dive = data.clone();
        process_time(&mut dive)?;
        self.store.create(&dive).await
    }

    /// Apply a patch, re-deriving the dive time on the merged result.
    ///
    /// The persisted dive is fetched and the patch applied to a copy so the
    /// time invariants are checked against the state the write would produce.
    pub async fn update(&self, id: impl ResolveId, patch: Patch) -> DiveLogResult<Option<Dive>> {
        let id = require_id(&id, Dive::NAME)?;
        let Some(current) = self.store.get(id, None, &[]).await? else {
            return Ok(None);
        };

        let mut merged = current.to_document()?;
        patch.apply(&mut merged)?;
        let mut merged = Dive::from_document(merged)?;
        process_time(&mut merged)?;

        let patch = match merged.dive_time {
            Some(minutes) => patch.set(Dive::DIVE_TIME, json!(minutes)),
            None => patch,
        };
        self.store.update(id, &patch).await
    }

    /// Delete a dive and pull it from its owner's `dives`.
    ///
    /// # Errors
    /// `NotFound` when no dive has that id.
    pub async fn delete(&self, id: impl ResolveId) -> DiveLogResult<Dive> {
        let id = require_id(&id, Dive::NAME)?;
        self.store
            .delete(id)
            .await?
            .ok_or_else(|| DiveLogError::not_found(Dive::NAME, id))
    }

    pub async fn add_gear(
        &self,
        dive: impl ResolveId,
        gear: impl ResolveId,
    ) -> DiveLogResult<Option<Dive>> {
        let (dive, gear) = (require_id(&dive, Dive::NAME)?, require_id(&gear, resources::GEAR)?);
        self.store
            .update(dive, &Patch::new().push_id(Dive::GEAR, gear))
            .await
    }

    pub async fn remove_gear(
        &self,
        dive: impl ResolveId,
        gear: impl ResolveId,
    ) -> DiveLogResult<Option<Dive>> {
        let (dive, gear) = (require_id(&dive, Dive::NAME)?, require_id(&gear, resources::GEAR)?);
        self.store
            .update(dive, &Patch::new().pull_id(Dive::GEAR, gear))
            .await
    }

    pub async fn add_buddy(
        &self,
        dive: impl ResolveId,
        buddy: impl ResolveId,
    ) -> DiveLogResult<Option<Dive>> {
        let (dive, buddy) = (require_id(&dive, Dive::NAME)?, require_id(&buddy, User::NAME)?);
        self.store
            .update(dive, &Patch::new().push_id(Dive::BUDDIES, buddy))
            .await
    }

    pub async fn remove_buddy(
        &self,
        dive: impl ResolveId,
        buddy: impl ResolveId,
    ) -> DiveLogResult<Option<Dive>> {
        let (dive, buddy) = (require_id(&dive, Dive::NAME)?, require_id(&buddy, User::NAME)?);
        self.store
            .update(dive, &Patch::new().pull_id(Dive::BUDDIES, buddy))
            .await
    }
}
