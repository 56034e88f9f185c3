//! Collections, required fields, defaults and reference fields for each
//! entity kind.

use chrono::Utc;
use divelog_core::document::{self, ID_FIELD};
use divelog_core::{resources, Club, Dive, Document, EntityId, Gear, Group, User};
use serde_json::{json, Map, Value};

use crate::resource::{Relation, Resource};

/// Collection names.
pub mod collections {
    pub const USERS: &str = "users";
    pub const DIVES: &str = "dives";
    pub const CLUBS: &str = "clubs";
    pub const GEAR: &str = "gear";
    pub const GROUPS: &str = "groups";
}

/// Insert `default` at `path` when the slot is absent or null.
fn default_at(doc: &mut Document, path: &str, default: Value) {
    if let Some(slot) = document::get_path_mut_or_insert(doc, path) {
        if slot.is_null() {
            *slot = default;
        }
    }
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}

impl Resource for User {
    const NAME: &'static str = resources::USER;
    const COLLECTION: &'static str = collections::USERS;
    const REQUIRED_FIELDS: &'static [&'static str] = &["name", "username", "email", "password"];
    const RELATIONS: &'static [Relation] = &[
        Relation::new(User::DIVES, collections::DIVES),
        Relation::new(User::CLUBS_MANAGER, collections::CLUBS),
        Relation::new(User::CLUBS_MEMBER, collections::CLUBS),
        Relation::new(User::GEAR, collections::GEAR),
        Relation::new(User::FRIENDS, collections::USERS),
        Relation::new(User::INBOX, collections::USERS),
        Relation::new(User::SENT, collections::USERS),
    ];

    fn apply_defaults(doc: &mut Document) {
        for path in [
            User::DIVES,
            User::CLUBS_MANAGER,
            User::CLUBS_MEMBER,
            User::GEAR,
            User::FRIENDS,
            User::INBOX,
            User::SENT,
        ] {
            default_at(doc, path, empty_list());
        }
    }
}

impl Resource for Dive {
    const NAME: &'static str = resources::DIVE;
    const COLLECTION: &'static str = collections::DIVES;
    const REQUIRED_FIELDS: &'static [&'static str] = &[Dive::USER];
    const RELATIONS: &'static [Relation] = &[
        Relation::new(Dive::USER, collections::USERS),
        Relation::new(Dive::CLUB, collections::CLUBS),
        Relation::new(Dive::BUDDIES, collections::USERS),
        Relation::new(Dive::GEAR, collections::GEAR),
    ];

    fn apply_defaults(doc: &mut Document) {
        default_at(doc, "public", Value::Bool(false));
        default_at(doc, Dive::BUDDIES, empty_list());
        default_at(doc, Dive::GEAR, empty_list());
    }
}

impl Resource for Club {
    const NAME: &'static str = resources::CLUB;
    const COLLECTION: &'static str = collections::CLUBS;
    const REQUIRED_FIELDS: &'static [&'static str] = &["name", "location"];
    const RELATIONS: &'static [Relation] = &[
        Relation::new(Club::MANAGERS, collections::USERS),
        Relation::new(Club::MEMBERS, collections::USERS),
    ];

    fn apply_defaults(doc: &mut Document) {
        default_at(doc, Club::MANAGERS, empty_list());
        default_at(doc, Club::MEMBERS, empty_list());
    }
}

impl Resource for Gear {
    const NAME: &'static str = resources::GEAR;
    const COLLECTION: &'static str = collections::GEAR;
    const RELATIONS: &'static [Relation] = &[Relation::new(Gear::OWNER, collections::USERS)];
}

impl Resource for Group {
    const NAME: &'static str = resources::GROUP;
    const COLLECTION: &'static str = collections::GROUPS;
    const RELATIONS: &'static [Relation] = &[
        Relation::new(Group::PARTICIPANTS, collections::USERS),
        Relation::new(Group::MESSAGE_SENDER, collections::USERS),
    ];

    fn apply_defaults(doc: &mut Document) {
        default_at(doc, Group::PARTICIPANTS, empty_list());
        default_at(doc, Group::MESSAGES, empty_list());
        if let Some(participants) = doc.get_mut(Group::PARTICIPANTS) {
            dedupe_list(participants);
        }
        if let Some(Value::Array(messages)) = doc.get_mut(Group::MESSAGES) {
            for message in messages.iter_mut().filter_map(Value::as_object_mut) {
                stamp_message(message);
            }
        }
    }
}

/// Drop repeated entries from an array, keeping each first occurrence.
/// Non-array values are left alone.
pub fn dedupe_list(value: &mut Value) {
    if let Value::Array(items) = value {
        let mut seen: Vec<Value> = Vec::with_capacity(items.len());
        items.retain(|item| {
            if seen.contains(item) {
                false
            } else {
                seen.push(item.clone());
                true
            }
        });
    }
}

/// Give an embedded message its id and `sent` time when missing.
pub fn stamp_message(message: &mut Map<String, Value>) {
    if message.get(ID_FIELD).map_or(true, Value::is_null) {
        message.insert(ID_FIELD.to_string(), EntityId::now_v7().into());
    }
    if message.get("sent").map_or(true, Value::is_null) {
        message.insert("sent".to_string(), json!(Utc::now()));
    }
}
