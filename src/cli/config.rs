// Client configuration loading: file discovery plus env and flag overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::config::ClientConfig;

pub const CONFIG_DIR_ENV: &str = "EJOBS_CONFIG_DIR";
pub const API_URL_ENV: &str = "EJOBS_API_URL";
pub const API_KEY_ENV: &str = "EJOBS_API_KEY";

fn read_config(path: &Path) -> Result<ClientConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ClientConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    tracing::debug!("Loaded config from: {}", path.display());
    Ok(config)
}

/// Find and parse the config file.
///
/// Order: explicit path (must exist), `$EJOBS_CONFIG_DIR/config.json`, the
/// platform config dir, then built-in defaults.
pub fn load_config(config_path: Option<&Path>) -> Result<ClientConfig> {
    if let Some(path) = config_path {
        if path.exists() {
            return read_config(path);
        }
        return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
    }

    if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
        let path = PathBuf::from(&config_dir).join("config.json");
        if path.exists() {
            return read_config(&path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("embedding-jobs").join("config.json");
        if path.exists() {
            return read_config(&path);
        }
    }

    tracing::debug!("No config file found, using defaults");
    Ok(ClientConfig::default())
}

/// Apply environment and command-line overrides. Blank values are ignored.
pub fn apply_overrides(
    mut config: ClientConfig,
    env_api_url: Option<String>,
    env_api_key: Option<String>,
    cli_api_url: Option<&str>,
) -> ClientConfig {
    let present = |v: &String| !v.trim().is_empty();
    if let Some(url) = env_api_url.filter(present) {
        config.api_url = url;
    }
    if let Some(key) = env_api_key.filter(present) {
        config.api_key = Some(key);
    }
    if let Some(url) = cli_api_url.filter(|u| !u.trim().is_empty()) {
        config.api_url = url.to_string();
    }
    config
}

/// Load the config and apply overrides from the process environment.
pub fn resolve_config(config_path: Option<&Path>, cli_api_url: Option<&str>) -> Result<ClientConfig> {
    let config = load_config(config_path)?;
    Ok(apply_overrides(
        config,
        std::env::var(API_URL_ENV).ok(),
        std::env::var(API_KEY_ENV).ok(),
        cli_api_url,
    ))
}
