//! Entity structures.
//!
//! Every field is optional so that a projected read can leave unlisted fields
//! absent instead of zero-valued. Schema defaults (empty reference lists,
//! `public = false`) are filled in by the store at creation time, so a
//! persisted, unprojected entity always has its lists present. The slice
//! accessors treat an absent list as empty.

use serde::{Deserialize, Serialize};

use crate::identity::{contains_id, EntityId, Identified, Ref, ResolveId, Timestamp};

// ============================================================================
// USER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// One-way hash once persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Most recently issued bearer token. Advisory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dives: Option<Vec<Ref<Dive>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clubs: Option<ClubRoles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gear: Option<Vec<Ref<Gear>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friends: Option<Vec<Ref<User>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend_requests: Option<FriendRequests>,
}

/// Clubs a user manages or belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClubRoles {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<Vec<Ref<Club>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<Vec<Ref<Club>>>,
}

/// Pending friend requests. `sent` and `inbox` mirror each other across users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FriendRequests {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbox: Option<Vec<Ref<User>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent: Option<Vec<Ref<User>>>,
}

impl User {
    /// Field paths used by patches and relation expansion.
    pub const DIVES: &'static str = "dives";
    pub const CLUBS_MANAGER: &'static str = "clubs.manager";
    pub const CLUBS_MEMBER: &'static str = "clubs.member";
    pub const GEAR: &'static str = "gear";
    pub const FRIENDS: &'static str = "friends";
    pub const INBOX: &'static str = "friendRequests.inbox";
    pub const SENT: &'static str = "friendRequests.sent";

    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            username: Some(username.into()),
            email: Some(email.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    pub fn dives(&self) -> &[Ref<Dive>] {
        self.dives.as_deref().unwrap_or(&[])
    }

    pub fn gear(&self) -> &[Ref<Gear>] {
        self.gear.as_deref().unwrap_or(&[])
    }

    pub fn friends(&self) -> &[Ref<User>] {
        self.friends.as_deref().unwrap_or(&[])
    }

    pub fn managed_clubs(&self) -> &[Ref<Club>] {
        self.clubs.as_ref().and_then(|c| c.manager.as_deref()).unwrap_or(&[])
    }

    pub fn member_clubs(&self) -> &[Ref<Club>] {
        self.clubs.as_ref().and_then(|c| c.member.as_deref()).unwrap_or(&[])
    }

    pub fn inbox(&self) -> &[Ref<User>] {
        self.friend_requests
            .as_ref()
            .and_then(|r| r.inbox.as_deref())
            .unwrap_or(&[])
    }

    pub fn sent_requests(&self) -> &[Ref<User>] {
        self.friend_requests
            .as_ref()
            .and_then(|r| r.sent.as_deref())
            .unwrap_or(&[])
    }

    pub fn is_friend_of(&self, other: EntityId) -> bool {
        contains_id(self.friends(), other)
    }
}

// ============================================================================
// DIVE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Dive {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Owning user. Required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Ref<User>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_out: Option<Timestamp>,
    /// Minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_time: Option<f64>,
    /// Minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_stop_time: Option<f64>,
    /// Derived from `time_in`/`time_out`, in whole minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dive_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub club: Option<Ref<Club>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buddies: Option<Vec<Ref<User>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gear: Option<Vec<Ref<Gear>>>,
}

impl Dive {
    pub const USER: &'static str = "user";
    pub const CLUB: &'static str = "club";
    pub const BUDDIES: &'static str = "buddies";
    pub const GEAR: &'static str = "gear";
    pub const TIME_IN: &'static str = "timeIn";
    pub const TIME_OUT: &'static str = "timeOut";
    pub const DIVE_TIME: &'static str = "diveTime";

    pub fn owned_by(user: EntityId) -> Self {
        Self {
            user: Some(Ref::Id(user)),
            ..Default::default()
        }
    }

    pub fn owner_id(&self) -> Option<EntityId> {
        self.user.as_ref().and_then(ResolveId::resolve_id)
    }

    pub fn buddies(&self) -> &[Ref<User>] {
        self.buddies.as_deref().unwrap_or(&[])
    }

    pub fn gear(&self) -> &[Ref<Gear>] {
        self.gear.as_deref().unwrap_or(&[])
    }

    pub fn is_public(&self) -> bool {
        self.public.unwrap_or(false)
    }
}

// ============================================================================
// CLUB
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Club {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// First entry is the creating manager.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managers: Option<Vec<Ref<User>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<Ref<User>>>,
}

impl Club {
    pub const MANAGERS: &'static str = "managers";
    pub const MEMBERS: &'static str = "members";

    pub fn new(name: impl Into<String>, location: impl Into<String>, manager: EntityId) -> Self {
        Self {
            name: Some(name.into()),
            location: Some(location.into()),
            managers: Some(vec![Ref::Id(manager)]),
            ..Default::default()
        }
    }

    pub fn managers(&self) -> &[Ref<User>] {
        self.managers.as_deref().unwrap_or(&[])
    }

    pub fn members(&self) -> &[Ref<User>] {
        self.members.as_deref().unwrap_or(&[])
    }

    pub fn first_manager(&self) -> Option<EntityId> {
        self.managers().first().and_then(ResolveId::resolve_id)
    }
}

// ============================================================================
// GEAR
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Gear {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub gear_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Ref<User>>,
}

impl Gear {
    pub const OWNER: &'static str = "owner";

    pub fn owner_id(&self) -> Option<EntityId> {
        self.owner.as_ref().and_then(ResolveId::resolve_id)
    }
}

// ============================================================================
// GROUP + MESSAGE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Group {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Set semantics: no duplicates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<Ref<User>>>,
    /// Append-only, in send order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

impl Group {
    pub const PARTICIPANTS: &'static str = "participants";
    pub const MESSAGES: &'static str = "messages";
    pub const MESSAGE_SENDER: &'static str = "messages.sender";

    pub fn participants(&self) -> &[Ref<User>] {
        self.participants.as_deref().unwrap_or(&[])
    }

    pub fn messages(&self) -> &[Message] {
        self.messages.as_deref().unwrap_or(&[])
    }

    pub fn has_participant(&self, user: EntityId) -> bool {
        contains_id(self.participants(), user)
    }
}

/// A message embedded in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Assigned on append so identical texts stay distinct list elements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub text: String,
    pub sender: Ref<User>,
    /// Stamped by the store when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent: Option<Timestamp>,
}

impl Message {
    pub fn new(text: impl Into<String>, sender: EntityId) -> Self {
        Self {
            id: None,
            text: text.into(),
            sender: Ref::Id(sender),
            sent: None,
        }
    }

    pub fn sender_id(&self) -> Option<EntityId> {
        self.sender.resolve_id()
    }
}

// ============================================================================
// IDENTITY IMPLEMENTATIONS
// ============================================================================

macro_rules! impl_identified {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identified for $ty {
                fn entity_id(&self) -> Option<EntityId> {
                    self.id
                }
            }

            impl ResolveId for $ty {
                fn resolve_id(&self) -> Option<EntityId> {
                    self.id
                }
            }
        )*
    };
}

impl_identified!(User, Dive, Club, Gear, Group, Message);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_serializes_camel_case_and_skips_absent() {
        let mut user = User::new("Ann", "ann", "ann@example.com", "pw");
        user.friend_requests = Some(FriendRequests::default());
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["username"], json!("ann"));
        assert!(value.get("friendRequests").is_some());
        assert!(value.get("token").is_none());
        assert!(value.get("dives").is_none());
    }

    #[test]
    fn test_projected_user_leaves_fields_absent() {
        let id = EntityId::now_v7();
        let user: User =
            serde_json::from_value(json!({ "id": id.to_string(), "email": "a@b.c" })).unwrap();
        assert_eq!(user.id, Some(id));
        assert_eq!(user.email.as_deref(), Some("a@b.c"));
        assert!(user.name.is_none());
        assert!(user.friends.is_none());
        assert!(user.friends().is_empty());
    }

    #[test]
    fn test_nested_projection_does_not_invent_sibling_lists() {
        let club = EntityId::now_v7();
        let projected = json!({ "id": EntityId::now_v7().to_string(), "clubs": { "manager": [club] } });
        let user: User = serde_json::from_value(projected.clone()).unwrap();
        assert_eq!(user.managed_clubs(), &[Ref::Id(club)]);
        assert!(user.clubs.as_ref().unwrap().member.is_none());
        assert_eq!(serde_json::to_value(&user).unwrap(), projected);

        let inbox_only = json!({ "friendRequests": { "inbox": [] } });
        let user: User = serde_json::from_value(inbox_only.clone()).unwrap();
        assert_eq!(serde_json::to_value(&user).unwrap(), inbox_only);
    }

    #[test]
    fn test_gear_type_uses_reserved_name() {
        let gear = Gear {
            gear_type: Some("fins".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&gear).unwrap(), json!({ "type": "fins" }));
    }

    #[test]
    fn test_loaded_reference_resolves_to_owner() {
        let owner_id = EntityId::now_v7();
        let dive: Dive = serde_json::from_value(json!({
            "user": { "id": owner_id.to_string(), "name": "Ann" }
        }))
        .unwrap();
        assert_eq!(dive.owner_id(), Some(owner_id));
        assert!(dive.user.as_ref().unwrap().is_loaded());
    }

    #[test]
    fn test_group_membership_by_canonical_id() {
        let member = EntityId::now_v7();
        let group = Group {
            participants: Some(vec![Ref::Id(member)]),
            ..Default::default()
        };
        assert!(group.has_participant(member));
        assert!(!group.has_participant(EntityId::now_v7()));
    }

    #[test]
    fn test_club_first_manager() {
        let manager = EntityId::now_v7();
        let club = Club::new("A", "B", manager);
        assert_eq!(club.first_manager(), Some(manager));
        assert!(club.members().is_empty());
    }
}
