//! Gear Service
//!
//! Keeps the owner's `gear` list in step with the gear collection.

use std::sync::Arc;

use async_trait::async_trait;
use divelog_core::{require_id, DiveLogError, DiveLogResult, Gear, Patch, ResolveId, User};
use divelog_storage::{DocumentStore, Resource, ResourceHooks, ResourceStore};

use crate::impl_resource_reads;

struct GearBackReferences {
    users: ResourceStore<User>,
}

#[async_trait]
impl ResourceHooks<Gear> for GearBackReferences {
    async fn after_create(&self, created: &Gear) -> DiveLogResult<()> {
        if let (Some(owner), Some(id)) = (created.owner_id(), created.id) {
            self.users
                .update(owner, &Patch::new().push_id(User::GEAR, id))
                .await?;
        }
        Ok(())
    }

    async fn after_delete(&self, deleted: &Gear) -> DiveLogResult<()> {
        if let (Some(owner), Some(id)) = (deleted.owner_id(), deleted.id) {
            self.users
                .update(owner, &Patch::new().pull_id(User::GEAR, id))
                .await?;
        }
        Ok(())
    }
}

/// Consistency service for gear.
#[derive(Clone)]
pub struct GearService {
    store: ResourceStore<Gear>,
}

impl_resource_reads!(GearService, Gear);

impl GearService {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        let hooks = GearBackReferences {
            users: ResourceStore::new(Arc::clone(&db)),
        };
        Self {
            store: ResourceStore::new(db).with_hooks(Arc::new(hooks)),
        }
    }

    /// Register gear and add it to its owner's `gear`.
    pub async fn create(&self, data: &Gear) -> DiveLogResult<Gear> {
        self.store.create(data).await
    }

    pub async fn update(&self, id: impl ResolveId, patch: Patch) -> DiveLogResult<Option<Gear>> {
        let id = require_id(&id, Gear::NAME)?;
        self.store.update(id, &patch).await
    }

    /// Delete gear and pull it from its owner's `gear`.
    ///
    /// # Errors
    /// `NotFound` when no gear has that id.
    pub async fn delete(&self, id: impl ResolveId) -> DiveLogResult<Gear> {
        let id = require_id(&id, Gear::NAME)?;
        self.store
            .delete(id)
            .await?
            .ok_or_else(|| DiveLogError::not_found(Gear::NAME, id))
    }
}
