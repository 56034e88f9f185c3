//! Club Service
//!
//! Club manager and member lists are mirrored on each user's
//! `clubs.manager` / `clubs.member`. Every membership change writes the club
//! first and the user second, without a transaction.

use std::sync::Arc;

use async_trait::async_trait;
use divelog_core::{
    require_id, Club, DiveLogResult, EntityId, Filter, Patch, ResolveId, User, ValidationError,
};
use divelog_storage::{DocumentStore, Resource, ResourceHooks, ResourceStore};

use crate::impl_resource_reads;

/// Links the creating manager and scrubs users when a club goes away.
struct ClubBackReferences {
    users: ResourceStore<User>,
}

#[async_trait]
impl ResourceHooks<Club> for ClubBackReferences {
    async fn after_create(&self, created: &Club) -> DiveLogResult<()> {
        if let (Some(manager), Some(id)) = (created.first_manager(), created.id) {
            self.users
                .update(manager, &Patch::new().push_id(User::CLUBS_MANAGER, id))
                .await?;
        }
        Ok(())
    }

    async fn before_delete(&self, id: EntityId) -> DiveLogResult<()> {
        for path in [User::CLUBS_MANAGER, User::CLUBS_MEMBER] {
            let scrubbed = self
                .users
                .update_many(&Filter::contains(path, id), &Patch::new().pull_id(path, id))
                .await?;
            tracing::debug!(club_id = %id, path, scrubbed, "Scrubbed club from users");
        }
        Ok(())
    }
}

/// Consistency service for clubs.
#[derive(Clone)]
pub struct ClubService {
    store: ResourceStore<Club>,
    users: ResourceStore<User>,
}

impl_resource_reads!(ClubService, Club);

impl ClubService {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        let users = ResourceStore::new(Arc::clone(&db));
        let hooks = ClubBackReferences {
            users: users.clone(),
        };
        Self {
            store: ResourceStore::new(db).with_hooks(Arc::new(hooks)),
            users,
        }
    }

    /// Found a club. Its first manager gets the club in `clubs.manager`.
    ///
    /// # Errors
    /// `ClubDetailsMissing` without a name or location,
    /// `RequiredFieldMissing("managers")` without a manager.
    pub async fn create(&self, data: &Club) -> DiveLogResult<Club> {
        let named = data.name.as_deref().is_some_and(|s| !s.is_empty());
        let located = data.location.as_deref().is_some_and(|s| !s.is_empty());
        if !named || !located {
            return Err(ValidationError::ClubDetailsMissing.into());
        }
        if data.first_manager().is_none() {
            return Err(ValidationError::RequiredFieldMissing {
                resource: Club::NAME,
                field: Club::MANAGERS.to_string(),
            }
            .into());
        }

        let created = self.store.create(data).await?;
        tracing::info!(club_id = ?created.id, "Club created");
        Ok(created)
    }

    pub async fn update(&self, id: impl ResolveId, patch: Patch) -> DiveLogResult<Option<Club>> {
        let id = require_id(&id, Club::NAME)?;
        self.store.update(id, &patch).await
    }

    /// Delete a club after pulling it from every user's club lists.
    /// `None` when no club has that id.
    pub async fn delete(&self, id: impl ResolveId) -> DiveLogResult<Option<Club>> {
        let id = require_id(&id, Club::NAME)?;
        self.store.delete(id).await
    }

    pub async fn add_manager(
        &self,
        club: impl ResolveId,
        user: impl ResolveId,
    ) -> DiveLogResult<Option<Club>> {
        self.link(club, user, Club::MANAGERS, User::CLUBS_MANAGER, true)
            .await
    }

    pub async fn remove_manager(
        &self,
        club: impl ResolveId,
        user: impl ResolveId,
    ) -> DiveLogResult<Option<Club>> {
        self.link(club, user, Club::MANAGERS, User::CLUBS_MANAGER, false)
            .await
    }

    pub async fn add_member(
        &self,
        club: impl ResolveId,
        user: impl ResolveId,
    ) -> DiveLogResult<Option<Club>> {
        self.link(club, user, Club::MEMBERS, User::CLUBS_MEMBER, true)
            .await
    }

    pub async fn remove_member(
        &self,
        club: impl ResolveId,
        user: impl ResolveId,
    ) -> DiveLogResult<Option<Club>> {
        self.link(club, user, Club::MEMBERS, User::CLUBS_MEMBER, false)
            .await
    }

    /// Push (or pull) `user` on the club, then the club on the user.
    async fn link(
        &self,
        club: impl ResolveId,
        user: impl ResolveId,
        club_path: &'static str,
        user_path: &'static str,
        add: bool,
    ) -> DiveLogResult<Option<Club>> {
        let club = require_id(&club, Club::NAME)?;
        let user = require_id(&user, User::NAME)?;

        let (club_patch, user_patch) = if add {
            (
                Patch::new().push_id(club_path, user),
                Patch::new().push_id(user_path, club),
            )
        } else {
            (
                Patch::new().pull_id(club_path, user),
                Patch::new().pull_id(user_path, club),
            )
        };

        let updated = self.store.update(club, &club_patch).await?;
        self.users.update(user, &user_patch).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use divelog_core::{DiveLogError, Ref};
    use divelog_storage::InMemoryDocumentStore;

    async fn setup() -> (ClubService, ResourceStore<User>, EntityId, EntityId) {
        let db: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let users = ResourceStore::<User>::new(Arc::clone(&db));
        let mut ids = Vec::new();
        for name in ["ana", "bo"] {
            let user = User::new(name, name, format!("{name}@example.com"), "hash");
            ids.push(users.create(&user).await.unwrap().id.unwrap());
        }
        (ClubService::new(db), users, ids[0], ids[1])
    }

    #[tokio::test]
    async fn test_create_validates_details() {
        let (clubs, _, u1, _) = setup().await;

        let mut nameless = Club::new("A", "B", u1);
        nameless.name = None;
        let err = clubs.create(&nameless).await.unwrap_err();
        assert!(err.to_string().contains("A new club must have both a name and a location."));

        let mut managerless = Club::new("A", "B", u1);
        managerless.managers = Some(Vec::new());
        let err = clubs.create(&managerless).await.unwrap_err();
        assert_eq!(
            err,
            DiveLogError::Validation(ValidationError::RequiredFieldMissing {
                resource: "Club",
                field: "managers".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_create_links_first_manager() {
        let (clubs, users, u1, _) = setup().await;
        let club = clubs.create(&Club::new("A", "B", u1)).await.unwrap();
        assert_eq!(club.managers(), &[Ref::Id(u1)]);

        let manager = users.get(u1, None, &[]).await.unwrap().unwrap();
        assert_eq!(manager.managed_clubs(), &[Ref::Id(club.id.unwrap())]);
    }

    #[tokio::test]
    async fn test_membership_is_mirrored() {
        let (clubs, users, u1, u2) = setup().await;
        let club = clubs.create(&Club::new("A", "B", u1)).await.unwrap();
        let club_id = club.id.unwrap();

        let updated = clubs.add_member(club_id, u2).await.unwrap().unwrap();
        assert_eq!(updated.members(), &[Ref::Id(u2)]);
        let member = users.get(u2, None, &[]).await.unwrap().unwrap();
        assert_eq!(member.member_clubs(), &[Ref::Id(club_id)]);

        let updated = clubs.remove_member(club_id, u2).await.unwrap().unwrap();
        assert!(updated.members().is_empty());
        let member = users.get(u2, None, &[]).await.unwrap().unwrap();
        assert!(member.member_clubs().is_empty());
    }

    #[tokio::test]
    async fn test_last_manager_can_be_removed() {
        let (clubs, _, u1, _) = setup().await;
        let club = clubs.create(&Club::new("A", "B", u1)).await.unwrap();
        let updated = clubs.remove_manager(&club, u1).await.unwrap().unwrap();
        assert!(updated.managers().is_empty());
    }

    #[tokio::test]
    async fn test_delete_scrubs_users_and_tolerates_missing() {
        let (clubs, users, u1, u2) = setup().await;
        let club = clubs.create(&Club::new("A", "B", u1)).await.unwrap();
        clubs.add_member(&club, u2).await.unwrap();

        let deleted = clubs.delete(&club).await.unwrap();
        assert!(deleted.is_some());
        assert!(clubs.get(&club, None, &[]).await.unwrap().is_none());
        for id in [u1, u2] {
            let user = users.get(id, None, &[]).await.unwrap().unwrap();
            assert!(user.managed_clubs().is_empty());
            assert!(user.member_clubs().is_empty());
        }

        assert!(clubs.delete(&club).await.unwrap().is_none());
    }
}
