//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    println!("# config.toml ({})", path.display());
    println!("{}", render(config)?);
    Ok(())
}

fn render(config: &ClientConfig) -> ClientResult<String> {
    let mut shown = config.clone();
    if shown.auth.token.as_deref().is_some_and(is_literal_secret) {
        shown.auth.token = Some("<redacted>".to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))
}

/// Secret references are safe to print; literal tokens are not.
fn is_literal_secret(value: &str) -> bool {
    !value.starts_with("pass::") && !value.starts_with("env::")
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    config.validate().map_err(ClientError::Config)?;

    if config.auth.token.is_some() {
        config
            .resolve_token(None)
            .map_err(|e| ClientError::Config(format!("invalid auth token: {}", e)))?;
        println!("Auth token resolves.");
    }

    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: &Path) -> ClientResult<()> {
    println!("config: {}", path.display());
    Ok(())
}
