//! Generic CRUD over one entity collection.
//!
//! [`ResourceStore`] is parameterized by a [`Resource`] that describes its
//! collection, required fields, schema defaults and reference fields. Stores
//! are cheap to clone; every clone shares the same [`DocumentStore`].

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use divelog_core::document::{self, ID_FIELD};
use divelog_core::{
    DiveLogResult, Document, EntityId, Filter, Identified, Patch, Projection, Query,
    StorageError, UpdateOp, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::document::DocumentStore;

/// A reference field and the collection its ids point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    /// Dotted path; may cross arrays (`messages.sender`).
    pub field: &'static str,
    pub collection: &'static str,
}

impl Relation {
    pub const fn new(field: &'static str, collection: &'static str) -> Self {
        Self { field, collection }
    }
}

/// Schema description for a persisted entity kind.
pub trait Resource:
    Serialize + DeserializeOwned + Identified + Clone + Send + Sync + 'static
{
    /// Resource name used in errors and logs.
    const NAME: &'static str;

    /// Collection the documents live in.
    const COLLECTION: &'static str;

    /// Fields that must be present and non-empty on create.
    const REQUIRED_FIELDS: &'static [&'static str] = &[];

    /// Reference fields that can be expanded by [`ResourceStore::get`].
    const RELATIONS: &'static [Relation] = &[];

    /// Fill schema defaults on a document about to be inserted.
    fn apply_defaults(_doc: &mut Document) {}

    /// Look up a relation by field path.
    ///
    /// # Errors
    /// `ValidationError::UnknownRelation` for a field that is not a reference.
    fn relation(field: &str) -> DiveLogResult<&'static Relation> {
        Self::RELATIONS
            .iter()
            .find(|relation| relation.field == field)
            .ok_or_else(|| {
                ValidationError::UnknownRelation {
                    resource: Self::NAME,
                    field: field.to_string(),
                }
                .into()
            })
    }

    fn from_document(doc: Document) -> DiveLogResult<Self> {
        serde_json::from_value(Value::Object(doc)).map_err(|e| {
            StorageError::Serialization {
                resource: Self::NAME.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn to_document(&self) -> DiveLogResult<Document> {
        let value = serde_json::to_value(self).map_err(|e| StorageError::Serialization {
            resource: Self::NAME.to_string(),
            reason: e.to_string(),
        })?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Serialization {
                resource: Self::NAME.to_string(),
                reason: "entity must serialize to an object".to_string(),
            }
            .into()),
        }
    }
}

/// Side effects a service attaches to `create` and `delete`.
///
/// Hook failures propagate to the caller. The primary write has already
/// happened (or, for `before_delete`, not yet) and is not undone.
#[async_trait]
pub trait ResourceHooks<T: Resource>: Send + Sync {
    /// Runs after the new document is persisted.
    async fn after_create(&self, _created: &T) -> DiveLogResult<()> {
        Ok(())
    }

    /// Runs before the document is removed, whether or not it exists.
    async fn before_delete(&self, _id: EntityId) -> DiveLogResult<()> {
        Ok(())
    }

    /// Runs after a document was actually removed.
    async fn after_delete(&self, _deleted: &T) -> DiveLogResult<()> {
        Ok(())
    }
}

/// Generic CRUD accessor for one entity collection.
pub struct ResourceStore<T: Resource> {
    db: Arc<dyn DocumentStore>,
    hooks: Option<Arc<dyn ResourceHooks<T>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Resource> Clone for ResourceStore<T> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            hooks: self.hooks.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Resource> ResourceStore<T> {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self {
            db,
            hooks: None,
            _marker: PhantomData,
        }
    }

    /// Attach create/delete side effects.
    pub fn with_hooks(mut self, hooks: Arc<dyn ResourceHooks<T>>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// The shared document store.
    pub fn db(&self) -> &Arc<dyn DocumentStore> {
        &self.db
    }

    /// Rebuild an entity from a plain JSON value without persisting it.
    pub fn construct(&self, value: Value) -> DiveLogResult<T> {
        match value {
            Value::Object(doc) => T::from_document(doc),
            other => Err(StorageError::Serialization {
                resource: T::NAME.to_string(),
                reason: format!("expected an object, got {other}"),
            }
            .into()),
        }
    }

    /// Persist a new entity and return it with its assigned id and defaults.
    ///
    /// # Errors
    /// `ValidationError::RequiredFieldMissing` when a required field is
    /// absent, null or an empty string. Errors from the post-create hook
    /// propagate after the document is stored.
    pub async fn create(&self, data: &T) -> DiveLogResult<T> {
        let mut doc = data.to_document()?;
        for relation in T::RELATIONS {
            document::collapse_refs(&mut doc, relation.field);
        }
        check_required::<T>(&doc)?;
        T::apply_defaults(&mut doc);

        let stored = self.db.insert(T::COLLECTION, doc).await?;
        let created = T::from_document(stored)?;
        tracing::debug!(resource = T::NAME, id = ?created.entity_id(), "Created resource");

        if let Some(hooks) = &self.hooks {
            hooks.after_create(&created).await?;
        }
        Ok(created)
    }

    pub async fn find(&self, query: &Query) -> DiveLogResult<Vec<T>> {
        let docs = self.db.find(T::COLLECTION, query).await?;
        tracing::debug!(resource = T::NAME, count = docs.len(), "Find");
        docs.into_iter().map(T::from_document).collect()
    }

    pub async fn find_one(&self, filter: &Filter) -> DiveLogResult<Option<T>> {
        self.db
            .find_one(T::COLLECTION, filter)
            .await?
            .map(T::from_document)
            .transpose()
    }

    /// Fetch one entity, optionally projected, expanding the named relations
    /// one after another. `None` when no entity has that id.
    ///
    /// # Errors
    /// `ValidationError::UnknownRelation` for a name that is not a reference
    /// field of `T`.
    pub async fn get(
        &self,
        id: EntityId,
        fields: Option<&Projection>,
        relations: &[&str],
    ) -> DiveLogResult<Option<T>> {
        let relations = relations
            .iter()
            .map(|field| T::relation(field))
            .collect::<DiveLogResult<Vec<_>>>()?;

        let Some(mut doc) = self.db.find_by_id(T::COLLECTION, id, fields).await? else {
            tracing::debug!(resource = T::NAME, %id, "Get: not found");
            return Ok(None);
        };

        for relation in relations {
            self.populate(&mut doc, relation).await?;
        }
        T::from_document(doc).map(Some)
    }

    /// Replace ids under `relation.field` with the referenced documents.
    async fn populate(&self, doc: &mut Document, relation: &Relation) -> DiveLogResult<()> {
        let mut ids: Vec<EntityId> = Vec::new();
        for value in document::collect_path(doc, relation.field) {
            if let Some(id) = value.as_str().and_then(|s| s.parse().ok()) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }

        let mut loaded: HashMap<String, Document> = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(target) = self.db.find_by_id(relation.collection, id, None).await? {
                loaded.insert(id.to_string(), target);
            }
        }

        document::visit_path_mut(doc, relation.field, &mut |value: &mut Value| {
            let target = value.as_str().and_then(|id| loaded.get(id)).cloned();
            if let Some(target) = target {
                *value = Value::Object(target);
            }
        });
        Ok(())
    }

    /// Apply a patch and return the post-update entity, or `None` if absent.
    pub async fn update(&self, id: EntityId, patch: &Patch) -> DiveLogResult<Option<T>> {
        let patch = collapse_patch_refs::<T>(patch);
        let updated = self.db.update_by_id(T::COLLECTION, id, &patch).await?;
        tracing::debug!(resource = T::NAME, %id, found = updated.is_some(), "Updated resource");
        updated.map(T::from_document).transpose()
    }

    /// Apply a patch to every matching entity. Returns the match count.
    pub async fn update_many(&self, filter: &Filter, patch: &Patch) -> DiveLogResult<u64> {
        let patch = collapse_patch_refs::<T>(patch);
        let matched = self.db.update_many(T::COLLECTION, filter, &patch).await?;
        tracing::debug!(resource = T::NAME, matched, "Updated many");
        Ok(matched)
    }

    /// Remove an entity and return its last state, or `None` if absent.
    pub async fn delete(&self, id: EntityId) -> DiveLogResult<Option<T>> {
        if let Some(hooks) = &self.hooks {
            hooks.before_delete(id).await?;
        }

        let Some(doc) = self.db.delete_by_id(T::COLLECTION, id).await? else {
            tracing::debug!(resource = T::NAME, %id, "Delete: not found");
            return Ok(None);
        };
        let deleted = T::from_document(doc)?;
        tracing::debug!(resource = T::NAME, %id, "Deleted resource");

        if let Some(hooks) = &self.hooks {
            hooks.after_delete(&deleted).await?;
        }
        Ok(Some(deleted))
    }
}

fn check_required<T: Resource>(doc: &Document) -> DiveLogResult<()> {
    for field in T::REQUIRED_FIELDS {
        let present = match document::get_path(doc, field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(ValidationError::RequiredFieldMissing {
                resource: T::NAME,
                field: field.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Loaded entity to its id; lists map element-wise.
fn collapse_value(value: &Value) -> Value {
    match value {
        Value::Object(obj) => match obj.get(ID_FIELD) {
            Some(id @ Value::String(_)) => id.clone(),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(collapse_value).collect()),
        other => other.clone(),
    }
}

fn collapse_patch_refs<T: Resource>(patch: &Patch) -> Patch {
    let is_relation = |field: &str| T::RELATIONS.iter().any(|r| r.field == field);
    patch.ops().iter().fold(Patch::new(), |out, op| {
        let op = match op {
            UpdateOp::Set { field, value } if is_relation(field) => UpdateOp::Set {
                field: field.clone(),
                value: collapse_value(value),
            },
            UpdateOp::Push { field, value } if is_relation(field) => UpdateOp::Push {
                field: field.clone(),
                value: collapse_value(value),
            },
            UpdateOp::Pull { field, value } if is_relation(field) => UpdateOp::Pull {
                field: field.clone(),
                value: collapse_value(value),
            },
            other => other.clone(),
        };
        out.with(op)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InMemoryDocumentStore;
    use divelog_core::{Club, Dive, DiveLogError, Group, Message, Ref, User};
    use std::sync::Mutex;

    fn db() -> Arc<dyn DocumentStore> {
        Arc::new(InMemoryDocumentStore::new())
    }

    fn user(name: &str) -> User {
        User::new(name, name.to_lowercase(), format!("{}@example.com", name.to_lowercase()), "pw")
    }

    #[tokio::test]
    async fn test_create_fills_defaults_and_id() {
        let users = ResourceStore::<User>::new(db());
        let created = users.create(&user("Ann")).await.unwrap();
        assert!(created.id.is_some());
        assert_eq!(created.friends.as_deref(), Some(&[][..]));
        assert!(created.friend_requests.is_some());
        assert!(created.clubs.is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_missing_required_field() {
        let users = ResourceStore::<User>::new(db());
        let mut incomplete = user("Ann");
        incomplete.email = Some(String::new());
        let err = users.create(&incomplete).await.unwrap_err();
        assert_eq!(
            err,
            DiveLogError::from(ValidationError::RequiredFieldMissing {
                resource: "User",
                field: "email".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_get_projection_leaves_other_fields_absent() {
        let users = ResourceStore::<User>::new(db());
        let created = users.create(&user("Ann")).await.unwrap();
        let id = created.id.unwrap();

        let projected = users
            .get(id, Some(&Projection::new(["email"])), &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(projected.id, Some(id));
        assert_eq!(projected.email.as_deref(), Some("ann@example.com"));
        assert!(projected.name.is_none());
        assert!(projected.friends.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let users = ResourceStore::<User>::new(db());
        assert!(users.get(EntityId::now_v7(), None, &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_expands_relations() {
        let db = db();
        let users = ResourceStore::<User>::new(Arc::clone(&db));
        let dives = ResourceStore::<Dive>::new(Arc::clone(&db));
        let owner = users.create(&user("Ann")).await.unwrap();
        let buddy = users.create(&user("Bob")).await.unwrap();
        let ghost = EntityId::now_v7();

        let mut dive = Dive::owned_by(owner.id.unwrap());
        dive.buddies = Some(vec![Ref::Id(buddy.id.unwrap()), Ref::Id(ghost)]);
        let dive = dives.create(&dive).await.unwrap();

        let loaded = dives
            .get(dive.id.unwrap(), None, &["user", "buddies"])
            .await
            .unwrap()
            .unwrap();
        let owner_doc = loaded.user.as_ref().and_then(Ref::loaded).unwrap();
        assert_eq!(owner_doc.name.as_deref(), Some("Ann"));
        assert!(loaded.buddies()[0].is_loaded());
        // A dangling reference stays an id.
        assert_eq!(loaded.buddies()[1], Ref::Id(ghost));
    }

    #[tokio::test]
    async fn test_get_expands_relations_inside_lists_of_objects() {
        let db = db();
        let users = ResourceStore::<User>::new(Arc::clone(&db));
        let groups = ResourceStore::<Group>::new(Arc::clone(&db));
        let sender = users.create(&user("Ann")).await.unwrap();
        let group = Group {
            name: Some("G".into()),
            messages: Some(vec![Message::new("Hi", sender.id.unwrap())]),
            ..Default::default()
        };
        let group = groups.create(&group).await.unwrap();
        let message = &group.messages()[0];
        assert!(message.id.is_some());
        assert!(message.sent.is_some());

        let loaded = groups
            .get(group.id.unwrap(), None, &["messages.sender"])
            .await
            .unwrap()
            .unwrap();
        assert!(loaded.messages()[0].sender.is_loaded());
    }

    #[tokio::test]
    async fn test_unknown_relation_is_rejected() {
        let clubs = ResourceStore::<Club>::new(db());
        let err = clubs.get(EntityId::now_v7(), None, &["website"]).await.unwrap_err();
        assert!(matches!(
            err,
            DiveLogError::Validation(ValidationError::UnknownRelation { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_collapses_loaded_references() {
        let db = db();
        let users = ResourceStore::<User>::new(Arc::clone(&db));
        let dives = ResourceStore::<Dive>::new(Arc::clone(&db));
        let owner = users.create(&user("Ann")).await.unwrap();

        let dive = Dive {
            user: Some(Ref::Loaded(Box::new(owner.clone()))),
            ..Default::default()
        };
        let created = dives.create(&dive).await.unwrap();
        assert_eq!(created.user, Some(Ref::Id(owner.id.unwrap())));
        assert_eq!(created.public, Some(false));
    }

    #[tokio::test]
    async fn test_update_returns_post_update_state() {
        let users = ResourceStore::<User>::new(db());
        let created = users.create(&user("Ann")).await.unwrap();
        let id = created.id.unwrap();
        let friend = EntityId::now_v7();

        let updated = users
            .update(id, &Patch::new().push_id(User::FRIENDS, friend).set("name", "Anne"))
            .await
            .unwrap()
            .unwrap();
        assert!(updated.is_friend_of(friend));
        assert_eq!(updated.name.as_deref(), Some("Anne"));

        assert!(users
            .update(EntityId::now_v7(), &Patch::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_construct_rebuilds_entity() {
        let users = ResourceStore::<User>::new(db());
        let created = users.create(&user("Ann")).await.unwrap();
        let value = serde_json::to_value(&created).unwrap();
        assert_eq!(users.construct(value).unwrap(), created);
        assert!(users.construct(Value::Bool(true)).is_err());
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ResourceHooks<Club> for Recorder {
        async fn after_create(&self, created: &Club) -> DiveLogResult<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("created {}", created.name.as_deref().unwrap_or("")));
            Ok(())
        }

        async fn before_delete(&self, _id: EntityId) -> DiveLogResult<()> {
            self.events.lock().unwrap().push("before".into());
            Ok(())
        }

        async fn after_delete(&self, deleted: &Club) -> DiveLogResult<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("deleted {}", deleted.name.as_deref().unwrap_or("")));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let recorder = Arc::new(Recorder::default());
        let clubs = ResourceStore::<Club>::new(db()).with_hooks(recorder.clone());
        let club = clubs
            .create(&Club::new("A", "B", EntityId::now_v7()))
            .await
            .unwrap();
        let id = club.id.unwrap();

        let deleted = clubs.delete(id).await.unwrap();
        assert_eq!(deleted.and_then(|c| c.name).as_deref(), Some("A"));
        assert!(clubs.delete(id).await.unwrap().is_none());

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["created A", "before", "deleted A", "before"]);
    }
}
