//! divelog Core - Entity Types
//!
//! Pure data structures shared by every other crate: identifiers and
//! references, the five entity kinds, the tagged patch type, filters and the
//! error taxonomy. Dive time derivation lives here because it is a pure
//! function of a dive's fields. No I/O.

pub mod constants;
pub mod dive_time;
pub mod document;
pub mod entities;
pub mod error;
pub mod filter;
pub mod identity;
pub mod update;

pub use constants::{error_codes, resources, subscription_keys};
pub use dive_time::{minutes_between, process_time};
pub use document::{Document, ID_FIELD};
pub use entities::{Club, ClubRoles, Dive, FriendRequests, Gear, Group, Message, User};
pub use error::{
    AuthError, ConfigError, DiveLogError, DiveLogResult, MembershipError, StorageError,
    TimeWindowError, ValidationError,
};
pub use filter::{
    Filter, FilterExpr, FilterOperator, Projection, Query, QueryOptions, SortKey, SortOrder,
};
pub use identity::{
    contains_id, require_id, resolve_id, EntityId, Identified, Ref, ResolveId, Timestamp,
};
pub use update::{Patch, UpdateOp};
