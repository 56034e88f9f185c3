//! Entity consistency services.
//!
//! Each service wraps the [`ResourceStore`](divelog_storage::ResourceStore)
//! of one entity kind and adds the operations that keep back-references on
//! related entities in step. Multi-document operations write one document at
//! a time in a fixed order; a failed later write is returned to the caller
//! and earlier writes stay applied.

pub mod club;
pub mod dive;
pub mod gear;
pub mod group;
pub mod user;

pub use club::ClubService;
pub use dive::DiveService;
pub use gear::GearService;
pub use group::GroupService;
pub use user::UserService;
