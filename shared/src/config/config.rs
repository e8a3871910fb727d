use std::fs;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError};

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: AppConfig = toml::from_str(&contents)?;

    info!("Configuration loaded successfully");

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.database.path.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "database.path cannot be empty".into(),
        ));
    }

    if config.reaper.interval_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "reaper.interval_secs must be greater than 0".into(),
        ));
    }

    // The pepper must be resolvable (env var or config field) and long
    // enough.  Checked here so a bad config is rejected at startup instead
    // of failing at the first registration — and so a missing pepper can
    // never silently degrade to unpeppered hashes.
    match config.auth.resolved_pepper() {
        None => {
            return Err(ConfigError::InvalidConfig(
                "pepper must be set via the AUTH_PEPPER env var or auth.pepper config field"
                    .into(),
            ));
        }
        Some(pepper) if pepper.len() < 16 => {
            return Err(ConfigError::InvalidConfig(
                "pepper must be at least 16 characters long".into(),
            ));
        }
        _ => {}
    }

    for (platform, provider) in &config.oauth {
        if provider.client_id.is_empty() {
            return Err(ConfigError::InvalidConfig(format!(
                "oauth.{platform}.client_id cannot be empty"
            )));
        }
        if provider.redirect_uri.is_empty() {
            return Err(ConfigError::InvalidConfig(format!(
                "oauth.{platform}.redirect_uri cannot be empty"
            )));
        }
        if provider.resolved_client_secret(*platform).is_none() {
            return Err(ConfigError::InvalidConfig(format!(
                "oauth.{platform}.client_secret must be set via env var or config"
            )));
        }
    }

    Ok(())
}
