//! Error types for divelog operations

use crate::constants::error_codes;
use crate::EntityId;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{msg} {resource} with id {id}", msg = error_codes::NOT_FOUND)]
    NotFound { resource: &'static str, id: EntityId },

    #[error("Insert failed for {resource}: {reason}")]
    InsertFailed { resource: String, reason: String },

    #[error("Update failed for {resource} with id {id}: {reason}")]
    UpdateFailed {
        resource: String,
        id: EntityId,
        reason: String,
    },

    #[error("Serialization failed for {resource}: {reason}")]
    Serialization { resource: String, reason: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Cache error: {reason}")]
    Cache { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors raised before a write reaches the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing on {resource}: {field}")]
    RequiredFieldMissing { resource: &'static str, field: String },

    #[error("{}", error_codes::USERNAME_EXISTS)]
    UsernameTaken,

    #[error("{}", error_codes::EMAIL_EXISTS)]
    EmailTaken,

    #[error("{}", error_codes::CLUB_DETAILS_MISSING)]
    ClubDetailsMissing,

    #[error("Unknown relation {field} on {resource}")]
    UnknownRelation { resource: &'static str, field: String },

    #[error("Invalid patch on {field}: {reason}")]
    InvalidPatch { field: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Dive time window violations.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TimeWindowError {
    #[error("{}", error_codes::INVALID_ARGUMENT_TIME_IN_LATER_THAN_OUT)]
    InvalidTimeWindow,

    #[error("{}", error_codes::INVALID_ARGUMENT_DIVE_TIME_EXCEEDED)]
    DiveTimeExceeded,
}

/// Membership and relationship precondition violations.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum MembershipError {
    #[error("{}", error_codes::USER_ALREADY_IN_GROUP)]
    AlreadyMember,

    #[error("{}", error_codes::USER_NOT_IN_GROUP)]
    NotAMember,

    #[error("{}", error_codes::CANNOT_ADD_YOURSELF)]
    CannotAddYourself,

    #[error("{}", error_codes::ALREADY_FRIENDS)]
    AlreadyFriends,
}

/// Credential and token errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{}", error_codes::INVALID_AUTH)]
    InvalidCredentials,

    #[error("Password hashing failed: {reason}")]
    Hashing { reason: String },

    #[error("Failed to issue token: {reason}")]
    TokenIssue { reason: String },

    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },

    #[error("Token expired")]
    TokenExpired,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all divelog errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiveLogError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Validation error: {0}")]
    TimeWindow(#[from] TimeWindowError),

    #[error("Membership error: {0}")]
    Membership(#[from] MembershipError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DiveLogError {
    /// Shorthand for a `StorageError::NotFound`.
    pub fn not_found(resource: &'static str, id: EntityId) -> Self {
        StorageError::NotFound { resource, id }.into()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DiveLogError::Storage(StorageError::NotFound { .. }))
    }
}

/// Result type alias for divelog operations.
pub type DiveLogResult<T> = Result<T, DiveLogError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_carries_contract_message() {
        let err = DiveLogError::not_found("Dive", EntityId::nil());
        let msg = err.to_string();
        assert!(msg.contains("Resource not found."));
        assert!(msg.contains("Dive"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_validation_messages_are_verbatim() {
        let err = DiveLogError::from(ValidationError::UsernameTaken);
        assert!(err
            .to_string()
            .contains("A user with that username already exists."));

        let err = DiveLogError::from(ValidationError::EmailTaken);
        assert!(err
            .to_string()
            .contains("A user with that email address already exists."));

        let err = DiveLogError::from(ValidationError::ClubDetailsMissing);
        assert!(err
            .to_string()
            .contains("A new club must have both a name and a location."));
    }

    #[test]
    fn test_time_window_messages() {
        assert_eq!(
            TimeWindowError::InvalidTimeWindow.to_string(),
            "Time in cannot be later than time out."
        );
        assert!(TimeWindowError::DiveTimeExceeded
            .to_string()
            .starts_with("Bottom and safety stop time cannot exceed dive time"));
    }

    #[test]
    fn test_membership_messages() {
        assert_eq!(
            MembershipError::AlreadyMember.to_string(),
            "That user is already present in the group."
        );
        assert_eq!(
            MembershipError::NotAMember.to_string(),
            "That user is not a member."
        );
    }

    #[test]
    fn test_invalid_credentials_message() {
        let err = DiveLogError::from(AuthError::InvalidCredentials);
        assert!(err
            .to_string()
            .contains("Your username and/or password were incorrect."));
    }

    #[test]
    fn test_divelog_error_from_variants() {
        let storage = DiveLogError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, DiveLogError::Storage(_)));

        let validation = DiveLogError::from(ValidationError::RequiredFieldMissing {
            resource: "User",
            field: "name".to_string(),
        });
        assert!(matches!(validation, DiveLogError::Validation(_)));

        let window = DiveLogError::from(TimeWindowError::DiveTimeExceeded);
        assert!(matches!(window, DiveLogError::TimeWindow(_)));

        let config = DiveLogError::from(ConfigError::MissingRequired {
            field: "jwt_secret".to_string(),
        });
        assert!(matches!(config, DiveLogError::Config(_)));
    }
}
