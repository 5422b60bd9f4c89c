use std::{io::Read, path::Path};

use config::{Config, File, FileFormat};
use eyre::{Result, WrapErr};

use crate::config::{models::AppConfig, validation::AppConfigValidator};

/// Load and validate configuration.
///
/// With a path the format follows the file extension; without one the document is read
/// from stdin as TOML.
pub async fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => load_config_sync(path)?,
        None => {
            let raw = tokio::task::spawn_blocking(read_stdin)
                .await
                .wrap_err("stdin reader task failed")??;
            load_config_from_str(&raw, FileFormat::Toml)?
        }
    };

    AppConfigValidator::validate(&config).wrap_err("invalid configuration")?;
    Ok(config)
}

/// Load configuration synchronously, without validation.
pub fn load_config_sync(config_path: &str) -> Result<AppConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .build()
        .wrap_err_with(|| format!("Failed to build config from {}", config_path.display()))?;

    settings.try_deserialize().wrap_err_with(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })
}

/// Parse an in-memory configuration document, without validation.
pub fn load_config_from_str(raw: &str, format: FileFormat) -> Result<AppConfig> {
    if raw.trim().is_empty() {
        eyre::bail!("empty configuration document");
    }

    Config::builder()
        .add_source(File::from_str(raw, format))
        .build()
        .wrap_err("Failed to build config from document")?
        .try_deserialize()
        .wrap_err("Failed to deserialize config from document")
}

fn read_stdin() -> Result<String> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .wrap_err("failed to read config from stdin")?;
    if raw.trim().is_empty() {
        eyre::bail!("empty stdin");
    }
    Ok(raw)
}
