//! Configuration Loader
//!
//! Reads the declared document from disk or any reader, parses it with
//! `serde_yaml`, strips self-dependencies and validates the result.

use super::error::{ConfigResult, ConfigurationError};
use super::{ContainerConfig, TestdriveConfig};
use std::io::Read;
use std::path::Path;
use tracing::debug;

const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Load, normalize and validate the document at `path`
pub fn load_config_file(path: &Path) -> ConfigResult<TestdriveConfig> {
    let text = read_config_file(path)?;
    debug!(path = %path.display(), "Loading configuration");
    load_config_str(&text)
}

/// Load, normalize and validate a document from any reader
pub fn load_config_reader<R: Read>(mut reader: R) -> ConfigResult<TestdriveConfig> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| ConfigurationError::file_read_error("<reader>", e))?;
    load_config_str(&text)
}

/// Load, normalize and validate a YAML or JSON document
pub fn load_config_str(text: &str) -> ConfigResult<TestdriveConfig> {
    let mut config: TestdriveConfig = if text.trim().is_empty() {
        TestdriveConfig::default()
    } else {
        serde_yaml::from_str(text)?
    };

    normalize(&mut config);
    config.validate()?;

    debug!(
        version = %config.version,
        services = config.services.len(),
        tasks = config.tasks.len(),
        "Configuration loaded"
    );

    Ok(config)
}

/// Drop self-dependencies and repeated dependency entries
pub fn normalize(config: &mut TestdriveConfig) {
    for (name, container) in config.services.iter_mut().chain(config.tasks.iter_mut()) {
        normalize_container(name, container);
    }
}

fn normalize_container(name: &str, container: &mut ContainerConfig) {
    let mut cleaned: Vec<String> = Vec::with_capacity(container.dependencies.len());
    for dependency in container.dependencies.drain(..) {
        if dependency == name {
            debug!(container = %name, "Removed self dependency");
        } else if !cleaned.contains(&dependency) {
            cleaned.push(dependency);
        }
    }
    container.dependencies = cleaned;
}

fn read_config_file(path: &Path) -> ConfigResult<String> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

    if !metadata.is_file() {
        return Err(ConfigurationError::invalid_value(
            "config_file",
            path.display().to_string(),
            "must point to a regular file",
        ));
    }

    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigurationError::invalid_value(
            "config_file",
            path.display().to_string(),
            format!("file exceeds {MAX_CONFIG_FILE_SIZE} bytes"),
        ));
    }

    std::fs::read_to_string(path)
        .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
}
