// src/config/mod.rs
mod models;

pub use models::*;

use crate::error::ConfigError;
use std::path::Path;

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await?;

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => parse_yaml(&contents)?,
        _ => parse_json(&contents)?,
    };

    config.validate()?;
    Ok(config)
}

pub fn parse_yaml(contents: &str) -> Result<Config, ConfigError> {
    Ok(serde_yaml::from_str(contents)?)
}

pub fn parse_json(contents: &str) -> Result<Config, ConfigError> {
    Ok(serde_json::from_str(contents)?)
}
