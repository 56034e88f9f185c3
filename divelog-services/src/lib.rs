//! divelog Services - Consistency Services and Lifecycle
//!
//! The per-entity services ([`UserService`], [`DiveService`], [`ClubService`],
//! [`GearService`], [`GroupService`]) compose a resource store with the
//! cross-entity writes that keep back-references consistent. [`Services`]
//! bundles them over one shared document store and cache client.
//!
//! ```ignore
//! let services = Services::launch(DiveLogConfig::from_env()?).await?;
//! let user = services.users.login("user1", "aafghd7675").await?;
//! services.close().await?;
//! ```

pub mod auth;
pub mod config;
pub mod macros;
pub mod services;
pub mod state;
pub mod telemetry;

pub use auth::{
    hash_password, issue_token, user_id_from_bearer, verify_password, verify_token, AuthConfig,
    Claims, FixedClock, JwtClock, JwtSecret, SystemClock,
};
pub use config::{DbBackendKind, DiveLogConfig};
pub use services::{ClubService, DiveService, GearService, GroupService, UserService};
pub use state::Services;
pub use telemetry::init_tracing;
