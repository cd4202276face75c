//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [session]                # TTL and reclaimer settings
//! [logging]                # log level and file output
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Commented config file written by `lapse config init`.
pub const CONFIG_TEMPLATE: &str = r#"# Lapse Configuration

# Session store
[session]
# Seconds a session survives without being updated
ttl_secs = 5
# Milliseconds between reclaimer sweeps
sweep_interval_ms = 1000
# Sessions this close to expiring count as expired
boundary_tolerance_ms = 10

# Logging (uncomment dir for rotating JSON log files)
[logging]
level = "info"
# dir = "/var/log/lapse"
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LapseConfig {
    /// Session store configuration.
    pub session: Option<SessionConfig>,

    /// Logging configuration.
    pub logging: Option<LoggingConfig>,
}

impl LapseConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: LapseConfig) {
        if other.session.is_some() {
            self.session = other.session;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Session section, or its defaults when absent.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Logging section, or its defaults when absent.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session store configuration.
///
/// ```toml
/// [session]
/// ttl_secs = 5
/// sweep_interval_ms = 1000
/// boundary_tolerance_ms = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds a session survives without being updated.
    pub ttl_secs: u64,
    /// Milliseconds between reclaimer sweeps.
    pub sweep_interval_ms: u64,
    /// Milliseconds before its expiration at which a session already counts as due.
    pub boundary_tolerance_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 5,
            sweep_interval_ms: 1000,
            boundary_tolerance_ms: 10,
        }
    }
}

impl SessionConfig {
    /// Session TTL.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Interval between sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Boundary tolerance.
    pub fn boundary_tolerance(&self) -> Duration {
        Duration::from_millis(self.boundary_tolerance_ms)
    }

    /// Reject values no store could run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.ttl_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.sweep_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.boundary_tolerance() >= self.ttl() {
            return Err(ConfigError::InvalidValue {
                field: "session.boundary_tolerance_ms".to_string(),
                reason: "must be shorter than the TTL".to_string(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration.
///
/// ```toml
/// [logging]
/// level = "info"
/// dir = "/var/log/lapse"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default console level for lapse crates.
    pub level: String,
    /// Directory for rolling JSON log files. Console only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}
