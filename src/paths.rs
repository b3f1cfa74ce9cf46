//! Centralized path resolution for steward
//!
//! # Environment Variables
//!
//! - `STEWARD_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/steward`)
//! - `STEWARD_STATE_DIR` - Override state directory (the download cache lives here)
//! - `STEWARD_ENV_FILE` - Override the file persistent environment variables go to
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `STEWARD_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/steward` (if set)
//! 3. `~/.config/steward`
//!
//! For state_dir():
//! 1. `STEWARD_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/steward` (if set)
//! 3. `~/.local/state/steward`
//!
//! For env_file():
//! 1. `STEWARD_ENV_FILE` environment variable
//! 2. `XDG_CONFIG_HOME/environment.d/60-steward.conf` (if set)
//! 3. `~/.config/environment.d/60-steward.conf`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STEWARD_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "STEWARD_STATE_DIR";

/// Environment variable for the persistent environment file
pub const ENV_ENV_FILE: &str = "STEWARD_ENV_FILE";

/// Manifest file name inside the config directory
pub const MANIFEST_FILE: &str = "steward.toml";

const APP_DIR: &str = "steward";
const ENV_FILE_NAME: &str = "60-steward.conf";

/// Where a directory lookup reads its inputs from
struct Lookup<V> {
    var: V,
    home: Option<PathBuf>,
}

impl Lookup<fn(&str) -> Option<String>> {
    fn system() -> Self {
        Self {
            var: |name| std::env::var(name).ok().filter(|v| !v.is_empty()),
            home: dirs::home_dir(),
        }
    }
}

impl<V: Fn(&str) -> Option<String>> Lookup<V> {
    fn home(&self) -> Result<PathBuf> {
        self.home
            .clone()
            .context("Could not determine home directory")
    }

    fn config_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = (self.var)(ENV_CONFIG_DIR) {
            let path = expand(&dir);
            log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
            return Ok(path);
        }

        if let Some(xdg_config) = (self.var)("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config).join(APP_DIR);
            log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
            return Ok(path);
        }

        let path = self.home()?.join(".config").join(APP_DIR);
        log::debug!("Using default config dir: {}", path.display());
        Ok(path)
    }

    fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = (self.var)(ENV_STATE_DIR) {
            let path = expand(&dir);
            log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
            return Ok(path);
        }

        if let Some(xdg_state) = (self.var)("XDG_STATE_HOME") {
            let path = PathBuf::from(xdg_state).join(APP_DIR);
            log::debug!("Using XDG_STATE_HOME: {}", path.display());
            return Ok(path);
        }

        let path = self.home()?.join(".local").join("state").join(APP_DIR);
        log::debug!("Using default state dir: {}", path.display());
        Ok(path)
    }

    fn env_file(&self) -> Result<PathBuf> {
        if let Some(file) = (self.var)(ENV_ENV_FILE) {
            return Ok(expand(&file));
        }

        let config_home = match (self.var)("XDG_CONFIG_HOME") {
            Some(xdg_config) => PathBuf::from(xdg_config),
            None => self.home()?.join(".config"),
        };
        Ok(config_home.join("environment.d").join(ENV_FILE_NAME))
    }
}

/// Get the steward config directory path
pub fn config_dir() -> Result<PathBuf> {
    Lookup::system().config_dir()
}

/// Get the steward state directory path
pub fn state_dir() -> Result<PathBuf> {
    Lookup::system().state_dir()
}

/// Directory holding the cache-control store
pub fn cache_dir() -> Result<PathBuf> {
    Ok(state_dir()?.join("cache"))
}

/// Default manifest location
pub fn manifest_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(MANIFEST_FILE))
}

/// File persistent environment variables are written to
pub fn env_file() -> Result<PathBuf> {
    Lookup::system().env_file()
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
