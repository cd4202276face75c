//! Configuration for the session store.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default time a session survives without being updated.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Default interval between reclaimer sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Default backward tolerance applied when comparing an expiration to "now".
pub const DEFAULT_BOUNDARY_TOLERANCE: Duration = Duration::from_millis(10);

/// Width of an expiration bucket.
pub const BUCKET_WIDTH: Duration = Duration::from_secs(1);

/// Default number of attempts at drawing a non-colliding identifier.
pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 4;

/// Configuration for the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Minimum time a session survives without being updated.
    pub ttl: Duration,

    /// Interval between reclaimer sweeps.
    /// Together with the one-second bucket width this bounds how long a stale
    /// session stays observable past its TTL, see [`StoreConfig::deletion_deadline`].
    pub sweep_interval: Duration,

    /// Sessions whose expiration lies within this tolerance after "now" are
    /// already treated as due.
    pub boundary_tolerance: Duration,

    /// Whether to spawn the background reclaimer at construction.
    /// If false, expired sessions are only removed by explicit `sweep` calls.
    pub reclaimer_enabled: bool,

    /// How many times `create` redraws an identifier that collides with a
    /// live session before giving up.
    pub max_id_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            boundary_tolerance: DEFAULT_BOUNDARY_TOLERANCE,
            reclaimer_enabled: true,
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the boundary tolerance.
    pub fn with_boundary_tolerance(mut self, tolerance: Duration) -> Self {
        self.boundary_tolerance = tolerance;
        self
    }

    /// Enable or disable the background reclaimer.
    pub fn with_reclaimer(mut self, enabled: bool) -> Self {
        self.reclaimer_enabled = enabled;
        self
    }

    /// Set the identifier regeneration budget.
    pub fn with_max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = attempts;
        self
    }

    /// Worst-case time between a session's last update and its removal.
    ///
    /// A due session waits at most one bucket width for its bucket to close
    /// and one more sweep interval for the next tick. With sweep intervals of
    /// a second or more this is `ttl + 2 * sweep_interval`. Saturates at
    /// `Duration::MAX`.
    pub fn deletion_deadline(&self) -> Duration {
        self.ttl
            .checked_add(self.sweep_interval.max(BUCKET_WIDTH))
            .and_then(|d| d.checked_add(self.sweep_interval))
            .unwrap_or(Duration::MAX)
    }

    /// Check that the configuration describes a usable store.
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(Error::InvalidConfig("ttl must be greater than zero".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "sweep_interval must be greater than zero".into(),
            ));
        }
        if self.boundary_tolerance >= self.ttl {
            return Err(Error::InvalidConfig(format!(
                "boundary_tolerance ({:?}) must be shorter than ttl ({:?})",
                self.boundary_tolerance, self.ttl
            )));
        }
        if self.max_id_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_id_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
