//! Tracing subscriber setup.

use divelog_core::{ConfigError, DiveLogResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "divelog_services=debug,divelog_storage=debug,info";

/// Install the global tracing subscriber.
///
/// Call once at startup. A second call fails with `ConfigError` instead of
/// replacing the installed subscriber.
pub fn init_tracing(json: bool) -> DiveLogResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| ConfigError::InvalidValue {
        field: "tracing_subscriber".to_string(),
        value: if json { "json" } else { "text" }.to_string(),
        reason: e.to_string(),
    })?;

    tracing::info!(json, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails_without_panicking() {
        let _ = init_tracing(false);
        assert!(init_tracing(true).is_err());
    }
}
