//! Configuration file loading and root folder resolution
//!
//! Resolution priority for both the root folder and the config file:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory
//! 4. OS-dependent compiled default (fallback)

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the root folder (holds `fancat.db`)
pub const ROOT_FOLDER_ENV: &str = "FANCAT_ROOT_FOLDER";

/// Environment variable naming the TOML config file
pub const CONFIG_FILE_ENV: &str = "FANCAT_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "fancat.db";

const CONFIG_FILE_NAME: &str = "fancat.toml";

/// Resolve the root folder holding the catalog database
pub fn resolve_root_folder(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    default_root_folder()
}

/// Resolve the config file path; `None` means "use compiled defaults"
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("fancat").join(CONFIG_FILE_NAME));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/fancat").join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML config file into `T`.
///
/// A missing file is not fatal: a warning is logged and `T::default()` is used.
/// A file that exists but does not parse is a `Config` error.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file missing, using compiled defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    let value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded config file");
    Ok(value)
}

/// Path of the catalog database inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("fancat"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/fancat"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("fancat"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/fancat"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("fancat"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\fancat"))
    } else {
        PathBuf::from("./fancat_data")
    }
}
