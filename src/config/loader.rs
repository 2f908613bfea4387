//! Configuration loading from file, environment, and CLI arguments.

use std::path::{Path, PathBuf};

use super::EngineConfig;
use crate::types::{MemxError, MemxResult};

/// Environment variable overriding the root directory.
pub const ROOT_ENV_VAR: &str = "MEMX_HOME";

/// Name of the config file looked up inside the root directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> MemxResult<EngineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: EngineConfig = toml::from_str(&content).map_err(|e| {
        MemxError::Validation(format!("failed to parse config {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Resolve the root directory using priority order:
/// 1. Explicit path (CLI arg)
/// 2. MEMX_HOME environment variable
/// 3. ~/.memx (global default)
pub fn resolve_root_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(env_path) = std::env::var(ROOT_ENV_VAR) {
        if !env_path.trim().is_empty() {
            return PathBuf::from(env_path);
        }
    }
    default_root_dir()
}

/// Resolve the full configuration:
/// explicit config file, else `<root>/config.toml` if present, else defaults.
/// An explicit root always wins over the file's `root_dir`.
pub fn resolve_config(
    explicit_root: Option<&Path>,
    explicit_config: Option<&Path>,
) -> MemxResult<EngineConfig> {
    let root = resolve_root_dir(explicit_root);
    let mut config = match explicit_config {
        Some(path) => load_config(path)?,
        None => {
            let candidate = root.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                load_config(&candidate)?
            } else {
                EngineConfig::for_root(&root)
            }
        }
    };
    if explicit_root.is_some() || explicit_config.is_none() {
        config.root_dir = root;
    }
    log::debug!("resolved memx root {}", config.root_dir.display());
    Ok(config)
}

pub(crate) fn default_root_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memx")
}
