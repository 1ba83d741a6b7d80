//! Centralized path resolution for nimbus
//!
//! # Environment Variables
//!
//! - `NIMBUS_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/nimbus`)
//! - `NIMBUS_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `NIMBUS_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/nimbus` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\nimbus`
//!    - macOS/Linux: `~/.config/nimbus`
//!
//! For state_dir():
//! 1. `NIMBUS_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/nimbus` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\nimbus`
//!    - macOS/Linux: `~/.local/state/nimbus`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "NIMBUS_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "NIMBUS_STATE_DIR";

/// Get the nimbus config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {ENV_CONFIG_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("nimbus");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("nimbus"));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("nimbus");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the nimbus state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {ENV_STATE_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("nimbus");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            return Ok(local_app_data.join("nimbus"));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("nimbus");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Reconciliation records for a stack
pub fn state_file(stack: &str) -> Result<PathBuf> {
    Ok(state_dir()?.join(format!("{stack}.state.json")))
}

/// Resources held by the simulated cloud for a stack
pub fn cloud_file(stack: &str) -> Result<PathBuf> {
    Ok(state_dir()?.join(format!("{stack}.cloud.json")))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set to `value`, restoring the original afterwards.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: each test touches its own variable
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: as above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/nimbus/config", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/nimbus/config"));
        });
    }

    #[test]
    fn test_state_files_live_in_state_dir() {
        with_env_var(ENV_STATE_DIR, "/custom/nimbus/state", || {
            assert_eq!(
                state_file("playground").unwrap(),
                PathBuf::from("/custom/nimbus/state/playground.state.json")
            );
            assert_eq!(
                cloud_file("playground").unwrap(),
                PathBuf::from("/custom/nimbus/state/playground.cloud.json")
            );
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/.ssh/id_rsa.pub"), home.join(".ssh").join("id_rsa.pub"));
    }

    #[test]
    fn test_expand_with_env_var() {
        with_env_var("NIMBUS_TEST_VAR", "keys", || {
            assert_eq!(expand("/path/$NIMBUS_TEST_VAR/id.pub"), PathBuf::from("/path/keys/id.pub"));
        });
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
