//! Fixed strings shared across the workspace.
//!
//! Error messages are part of the public contract: callers and tests match on
//! them, so they must not be reworded.

use crate::EntityId;

/// Resource names, one per persisted entity kind.
pub mod resources {
    pub const USER: &str = "User";
    pub const DIVE: &str = "Dive";
    pub const CLUB: &str = "Club";
    pub const GEAR: &str = "Gear";
    pub const GROUP: &str = "Group";
    pub const MESSAGE: &str = "Message";

    /// All resource names in declaration order.
    pub const ALL: [&str; 6] = [USER, DIVE, CLUB, GEAR, GROUP, MESSAGE];
}

/// Human-readable error messages.
pub mod error_codes {
    pub const CANNOT_ADD_YOURSELF: &str = "You cannot send a friend request to yourself.";
    pub const FRIEND_REQUEST_ALREADY_SENT: &str =
        "You have already sent a friend request to this person.";
    pub const ALREADY_FRIENDS: &str = "You are already friends with this person.";
    pub const CLUB_DETAILS_MISSING: &str = "A new club must have both a name and a location.";
    pub const INVALID_AUTH: &str = "Your username and/or password were incorrect.";
    pub const FORBIDDEN: &str = "You do not have access to this resource.";
    pub const NOT_FOUND: &str = "Resource not found.";
    pub const USERNAME_EXISTS: &str = "A user with that username already exists.";
    pub const EMAIL_EXISTS: &str = "A user with that email address already exists.";
    pub const USER_ALREADY_IN_GROUP: &str = "That user is already present in the group.";
    pub const USER_NOT_IN_GROUP: &str = "That user is not a member.";
    pub const INVALID_ARGUMENT_TIME_IN_LATER_THAN_OUT: &str =
        "Time in cannot be later than time out.";
    pub const INVALID_ARGUMENT_DIVE_TIME_EXCEEDED: &str =
        "Bottom and safety stop time cannot exceed dive time (The difference between time in and time out).";
    // Exported for callers; no operation in this workspace raises these.
    pub const INVALID_ARGUMENT_ONLY_MANAGER: &str = "You cannot remove the only manager of the club.";
    pub const ALREADY_A_MEMBER: &str = "Already a member.";
    pub const NOT_A_MEMBER: &str = "Not a member.";
    pub const ALREADY_A_MANAGER: &str = "Already a manager.";
    pub const NOT_A_MANAGER: &str = "Not a manager.";
}

/// Publish/subscribe topic names.
pub mod subscription_keys {
    use super::EntityId;

    pub const NEW_MESSAGE: &str = "NEW_MESSAGE";

    /// Topic carrying new messages for one group.
    pub fn new_message(group_id: EntityId) -> String {
        format!("{}_{}", NEW_MESSAGE, group_id)
    }
}
