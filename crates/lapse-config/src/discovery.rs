//! Config file discovery and layered merging.
//!
//! Layers, lowest precedence first:
//! 1. User config: `$LAPSE_CONFIG_DIR/config.toml`, else the platform
//!    config dir (`~/.config/lapse/config.toml` on Linux)
//! 2. Project config: `lapse.toml` in the working or given directory
//!
//! CLI flags are applied on top by the binary.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{CONFIG_TEMPLATE, ConfigError, LapseConfig, Result};

const PROJECT_CONFIG_FILE: &str = "lapse.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const APP_NAME: &str = "lapse";

/// Environment variable overriding the user config directory.
pub const CONFIG_DIR_ENV: &str = "LAPSE_CONFIG_DIR";

/// Which layer a config file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    User,
    Project,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::User => f.write_str("user"),
            Layer::Project => f.write_str("project"),
        }
    }
}

/// A config file that discovery looked at.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub layer: Layer,
    pub path: PathBuf,
    /// Whether the file existed and parsed.
    pub loaded: bool,
}

/// Merged configuration plus what it was built from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LapseConfig,
    /// Every candidate file, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Files that existed but could not be read or parsed.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of the files that actually contributed.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover and merge the user and project layers.
///
/// `project_dir` defaults to the working directory.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with `config_dir` replacing the user config
/// directory lookup entirely.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user = config_dir
        .map(|dir| dir.join(USER_CONFIG_FILE))
        .or_else(xdg_config_path);
    let project = match project_dir {
        Some(dir) => dir.join(PROJECT_CONFIG_FILE),
        None => PathBuf::from(PROJECT_CONFIG_FILE),
    };

    let candidates = user
        .map(|path| (Layer::User, path))
        .into_iter()
        .chain(std::iter::once((Layer::Project, project)));

    let mut loaded = LoadedConfig {
        config: LapseConfig::new(),
        sources: Vec::new(),
        warnings: Vec::new(),
    };
    for (layer, path) in candidates {
        let ok = path.is_file() && merge_file(&mut loaded, &path);
        loaded.sources.push(ConfigSource {
            layer,
            path,
            loaded: ok,
        });
    }

    Ok(loaded)
}

/// Parse a single config file, without discovery.
pub fn load_config_file(path: &Path) -> Result<LapseConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    LapseConfig::from_toml(&contents)
}

/// Write `config` as TOML, creating parent directories as needed.
pub fn save_config(config: &LapseConfig, path: &Path) -> Result<()> {
    write_file(path, &config.to_toml()?)
}

/// Write the commented default config to `path`, creating parent
/// directories as needed.
pub fn save_config_template(path: &Path) -> Result<()> {
    write_file(path, CONFIG_TEMPLATE)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    let write_err = |at: &Path, source| ConfigError::WriteFile {
        path: at.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| write_err(path, e))
}

/// User config file path.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// User config directory: `LAPSE_CONFIG_DIR` if set and non-empty, else the
/// platform config dir.
pub fn xdg_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join(APP_NAME)),
    }
}

/// Merge one file into `loaded`. A broken file becomes a warning.
fn merge_file(loaded: &mut LoadedConfig, path: &Path) -> bool {
    match load_config_file(path) {
        Ok(layer) => {
            loaded.config.merge(layer);
            true
        }
        Err(e) => {
            loaded
                .warnings
                .push(format!("Skipping {}: {}", path.display(), e));
            false
        }
    }
}
