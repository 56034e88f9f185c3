//! User Service
//!
//! Account creation with hashed credentials and unique usernames/emails,
//! login, and the friend-request flow. Every friend operation writes the two
//! users one after the other; a failure of the second write leaves the first
//! in place and is returned to the caller. Pushes are add-to-set, so retrying
//! the whole operation converges.

use std::sync::Arc;

use divelog_core::{
    require_id, AuthError, DiveLogResult, EntityId, Filter, MembershipError, Patch, Projection,
    ResolveId, User, ValidationError,
};
use divelog_storage::{DocumentStore, Resource, ResourceStore};
use serde_json::Value;

use crate::auth::{hash_password, issue_token, verify_password, AuthConfig};
use crate::impl_resource_reads;

/// Consistency service for users.
#[derive(Clone)]
pub struct UserService {
    store: ResourceStore<User>,
    auth: Arc<AuthConfig>,
}

impl_resource_reads!(UserService, User);

impl UserService {
    pub fn new(db: Arc<dyn DocumentStore>, auth: Arc<AuthConfig>) -> Self {
        Self {
            store: ResourceStore::new(db),
            auth,
        }
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    /// Create an account.
    ///
    /// The password is stored as a bcrypt hash and a first token is issued
    /// and persisted with the document.
    ///
    /// # Errors
    /// - `RequiredFieldMissing` for a missing name, username, email or password
    /// - `UsernameTaken` / `EmailTaken` when another user already has them
    pub async fn create(&self, data: &User) -> DiveLogResult<User> {
        let mut user = data.clone();

        if let Some(username) = non_empty(&user.username) {
            self.ensure_unique("username", username, None).await?;
        }
        if let Some(email) = non_empty(&user.email) {
            self.ensure_unique("email", email, None).await?;
        }
        let hashed = non_empty(&user.password)
            .map(|password| hash_password(&self.auth, password))
            .transpose()?;
        if hashed.is_some() {
            user.password = hashed;
        }

        let id = *user.id.get_or_insert_with(EntityId::now_v7);
        user.token = Some(issue_token(&self.auth, id)?);

        let created = self.store.create(&user).await?;
        tracing::info!(user_id = %id, "User created");
        Ok(created)
    }

    /// Apply a patch. A new password is hashed; a new username or email is
    /// checked against every other user.
    pub async fn update(&self, id: impl ResolveId, patch: Patch) -> DiveLogResult<Option<User>> {
        let id = require_id(&id, User::NAME)?;
        let mut patch = patch;

        if let Some(username) = patch.set_value("username").and_then(Value::as_str) {
            self.ensure_unique("username", username, Some(id)).await?;
        }
        if let Some(email) = patch.set_value("email").and_then(Value::as_str) {
            self.ensure_unique("email", email, Some(id)).await?;
        }
        if patch.touches("password") {
            let auth = Arc::clone(&self.auth);
            patch.map_set_values("password", |value| {
                let plain = value.as_str().ok_or_else(|| ValidationError::InvalidValue {
                    field: "password".to_string(),
                    reason: "must be a string".to_string(),
                })?;
                Ok(Value::String(hash_password(&auth, plain)?))
            })?;
        }

        self.store.update(id, &patch).await
    }

    pub async fn delete(&self, id: impl ResolveId) -> DiveLogResult<Option<User>> {
        let id = require_id(&id, User::NAME)?;
        self.store.delete(id).await
    }

    /// Check credentials and issue a fresh token.
    ///
    /// The token is persisted before the user is returned.
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown username or a wrong password.
    pub async fn login(&self, username: &str, password: &str) -> DiveLogResult<User> {
        let Some(user) = self.store.find_one(&Filter::eq("username", username)).await? else {
            tracing::debug!(username, "Login: unknown username");
            return Err(AuthError::InvalidCredentials.into());
        };

        let matches = user
            .password
            .as_deref()
            .is_some_and(|hash| verify_password(password, hash));
        let Some(id) = user.id.filter(|_| matches) else {
            tracing::debug!(username, "Login: password mismatch");
            return Err(AuthError::InvalidCredentials.into());
        };

        let token = issue_token(&self.auth, id)?;
        let updated = self
            .store
            .update(id, &Patch::new().set("token", token))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        tracing::info!(user_id = %id, "User logged in");
        Ok(updated)
    }

    /// Send a friend request from `user` to `friend`. Returns the sender.
    ///
    /// # Errors
    /// `CannotAddYourself` when both ids match, `AlreadyFriends` when the
    /// sender already lists the friend.
    pub async fn add(
        &self,
        user: impl ResolveId,
        friend: impl ResolveId,
    ) -> DiveLogResult<Option<User>> {
        let user = require_id(&user, User::NAME)?;
        let friend = require_id(&friend, User::NAME)?;
        if user == friend {
            return Err(MembershipError::CannotAddYourself.into());
        }

        let friends_only = Projection::new([User::FRIENDS]);
        if let Some(me) = self.store.get(user, Some(&friends_only), &[]).await? {
            if me.is_friend_of(friend) {
                return Err(MembershipError::AlreadyFriends.into());
            }
        }

        let updated = self
            .store
            .update(user, &Patch::new().push_id(User::SENT, friend))
            .await?;
        self.store
            .update(friend, &Patch::new().push_id(User::INBOX, user))
            .await?;
        Ok(updated)
    }

    /// Accept the pending request `friend` sent to `user`. Returns `user`.
    pub async fn accept(
        &self,
        user: impl ResolveId,
        friend: impl ResolveId,
    ) -> DiveLogResult<Option<User>> {
        let user = require_id(&user, User::NAME)?;
        let friend = require_id(&friend, User::NAME)?;

        let updated = self
            .store
            .update(
                user,
                &Patch::new()
                    .push_id(User::FRIENDS, friend)
                    .pull_id(User::INBOX, friend),
            )
            .await?;
        self.store
            .update(
                friend,
                &Patch::new()
                    .push_id(User::FRIENDS, user)
                    .pull_id(User::SENT, user),
            )
            .await?;
        Ok(updated)
    }

    /// Remove the friendship from both sides. Returns `user`.
    pub async fn unfriend(
        &self,
        user: impl ResolveId,
        friend: impl ResolveId,
    ) -> DiveLogResult<Option<User>> {
        let user = require_id(&user, User::NAME)?;
        let friend = require_id(&friend, User::NAME)?;

        let updated = self
            .store
            .update(user, &Patch::new().pull_id(User::FRIENDS, friend))
            .await?;
        self.store
            .update(friend, &Patch::new().pull_id(User::FRIENDS, user))
            .await?;
        Ok(updated)
    }

    /// Fail if a user other than `except` already holds `value` in `field`.
    async fn ensure_unique(
        &self,
        field: &'static str,
        value: &str,
        except: Option<EntityId>,
    ) -> DiveLogResult<()> {
        let existing = self.store.find_one(&Filter::eq(field, value)).await?;
        match existing {
            Some(other) if other.id != except => Err(match field {
                "email" => ValidationError::EmailTaken,
                _ => ValidationError::UsernameTaken,
            }
            .into()),
            _ => Ok(()),
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}
