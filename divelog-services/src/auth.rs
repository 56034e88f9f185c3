//! Credentials
//!
//! Password hashing with bcrypt and bearer token issuance with HS256 JWTs.
//! Tokens carry `{ id, iat, exp }` and expire after the configured lifetime
//! (three hours unless overridden).

use divelog_core::{AuthError, ConfigError, DiveLogError, DiveLogResult, EntityId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Secret used when `JWT_KEY` is unset.
pub const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// Default token lifetime: three hours.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3 * 60 * 60;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock used to stamp and check token times.
///
/// Expiry is checked here rather than inside `jsonwebtoken` so tests can pin
/// the current time.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

/// Test clock helpers for common scenarios.
#[cfg(test)]
pub mod test_clocks {
    use super::FixedClock;

    /// 2024-01-01 00:00:00 UTC
    pub fn valid() -> FixedClock {
        FixedClock(1704067200)
    }

    /// 2020-01-01 00:00:00 UTC
    pub fn expired() -> FixedClock {
        FixedClock(1577836800)
    }

    /// 2030-01-01 00:00:00 UTC
    pub fn future() -> FixedClock {
        FixedClock(1893456000)
    }
}

// ============================================================================
// JWT SECRET
// ============================================================================

/// Token signing secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// # Errors
    /// `ConfigError::MissingRequired` if the secret is empty.
    pub fn new(secret: String) -> Result<Self, DiveLogError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "jwt_secret".to_string(),
            }
            .into());
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value. Only for signing and verification.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl Default for JwtSecret {
    fn default() -> Self {
        Self(SecretString::new(INSECURE_DEFAULT_SECRET.into()))
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Hashing and token settings shared by the user service.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: JwtSecret,
    /// Token lifetime in seconds.
    pub token_ttl_secs: i64,
    pub bcrypt_cost: u32,
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: JwtSecret::default(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Read `JWT_KEY`, `DIVELOG_TOKEN_TTL_SECS` and `DIVELOG_BCRYPT_COST`.
    ///
    /// A missing or blank `JWT_KEY` falls back to the insecure default with a
    /// warning.
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("JWT_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| JwtSecret::new(s).ok())
            .unwrap_or_default();
        if jwt_secret.is_insecure_default() {
            tracing::warn!(
                "Using insecure default token secret. Set JWT_KEY to a secure random value."
            );
        }

        Self {
            jwt_secret,
            token_ttl_secs: std::env::var("DIVELOG_TOKEN_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|ttl: &i64| *ttl > 0)
                .unwrap_or(DEFAULT_TOKEN_TTL_SECS),
            bcrypt_cost: std::env::var("DIVELOG_BCRYPT_COST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BCRYPT_COST),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_secret(mut self, secret: JwtSecret) -> Self {
        self.jwt_secret = secret;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn JwtClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }
}

// ============================================================================
// PASSWORDS
// ============================================================================

/// Hash a password with bcrypt at the configured cost.
pub fn hash_password(config: &AuthConfig, password: &str) -> DiveLogResult<String> {
    bcrypt::hash(password, config.bcrypt_cost).map_err(|e| {
        AuthError::Hashing {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Check a password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

// ============================================================================
// TOKENS
// ============================================================================

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub id: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Claims issued now and expiring `ttl_secs` later. The expiry
    /// saturates at the end of the `i64` range.
    pub fn new(user_id: EntityId, ttl_secs: i64, clock: &dyn JwtClock) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            id: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
        }
    }

    pub fn is_expired(&self, clock: &dyn JwtClock) -> bool {
        self.exp < clock.now_epoch_secs()
    }

    /// # Errors
    /// `AuthError::InvalidToken` when the id claim is not an entity id.
    pub fn user_id(&self) -> DiveLogResult<EntityId> {
        self.id.parse().map_err(|_| {
            AuthError::InvalidToken {
                reason: "id claim is not a valid id".to_string(),
            }
            .into()
        })
    }
}

/// Sign a fresh token for `user_id`.
pub fn issue_token(config: &AuthConfig, user_id: EntityId) -> DiveLogResult<String> {
    let claims = Claims::new(user_id, config.token_ttl_secs, &*config.clock);
    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    encode(&Header::new(Algorithm::HS256), &claims, &encoding_key).map_err(|e| {
        AuthError::TokenIssue {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Check a token's signature and expiry and return its claims.
///
/// # Errors
/// `AuthError::InvalidToken` for a malformed or wrongly signed token,
/// `AuthError::TokenExpired` once `exp` has passed.
pub fn verify_token(config: &AuthConfig, token: &str) -> DiveLogResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = HashSet::from(["exp".to_string()]);

    let claims = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidToken {
                reason: "signature is invalid".to_string(),
            },
            _ => AuthError::InvalidToken {
                reason: e.to_string(),
            },
        })?
        .claims;

    if claims.is_expired(&*config.clock) {
        return Err(AuthError::TokenExpired.into());
    }
    Ok(claims)
}

/// Recover the user id from an `Authorization: Bearer <token>` value.
pub fn user_id_from_bearer(config: &AuthConfig, header: &str) -> DiveLogResult<EntityId> {
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidToken {
            reason: "expected a Bearer token".to_string(),
        })?;
    verify_token(config, token)?.user_id()
}
