//! Configuration system for the Lapse session store.
//!
//! Provides TOML-based configuration with:
//! - `[session]` TTL and sweep settings
//! - `[logging]` level and optional log directory
//! - Config file layering (user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, Layer, LoadedConfig, load_config, load_config_file,
    load_config_with_options, save_config, save_config_template, xdg_config_dir,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
