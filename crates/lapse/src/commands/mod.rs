//! CLI command handlers.

use std::path::PathBuf;

use lapse_config::LapseConfig;
use lapse_session::StoreConfig;

pub mod config;
pub mod demo;
pub mod soak;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Resolved configuration with CLI overrides applied.
    pub config: LapseConfig,
    /// Config files the configuration was loaded from.
    pub sources: Vec<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Store configuration derived from the `[session]` section.
    pub fn store_config(&self) -> StoreConfig {
        let session = self.config.session();
        StoreConfig::new()
            .with_ttl(session.ttl())
            .with_sweep_interval(session.sweep_interval())
            .with_boundary_tolerance(session.boundary_tolerance())
    }
}
