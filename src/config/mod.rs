//! # Testdrive Configuration
//!
//! Two kinds of configuration feed a session:
//!
//! - **The declared document** (`testdrive.yaml`): services, tasks and their
//!   dependencies. JSON documents are accepted too, since they are valid YAML.
//! - **Session settings**: resync interval and timeouts, layered from
//!   defaults, an optional settings file and `TESTDRIVE_*` environment
//!   variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use testdrive::config::{loader, SessionSettings};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = loader::load_config_file(Path::new("testdrive.yaml"))?;
//! let settings = SessionSettings::load(Some(Path::new(".")))?;
//!
//! println!("{} services, resync every {:?}", document.services.len(), settings.resync_interval());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::constants;

pub use error::{ConfigResult, ConfigurationError};

/// Accepts either `command: ["sh", "-c", "..."]` or `command: "sleep 5"`.
///
/// A single string is split on whitespace; no shell quoting is interpreted.
fn deserialize_command<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CommandForm {
        Line(String),
        Args(Vec<String>),
    }

    Ok(match Option::<CommandForm>::deserialize(deserializer)? {
        Some(CommandForm::Line(line)) => line.split_whitespace().map(str::to_string).collect(),
        Some(CommandForm::Args(args)) => args,
        None => Vec::new(),
    })
}

/// Root of the declared document
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TestdriveConfig {
    #[serde(default)]
    pub version: String,

    /// Long-running containers, expected to become ready
    #[serde(default)]
    pub services: BTreeMap<String, ContainerConfig>,

    /// One-shot containers, expected to exit with code 0
    #[serde(default)]
    pub tasks: BTreeMap<String, ContainerConfig>,
}

/// Declaration of a single service or task
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContainerConfig {
    pub image: String,

    #[serde(default, deserialize_with = "deserialize_command")]
    pub command: Vec<String>,

    #[serde(default, rename = "depends_on")]
    pub dependencies: Vec<String>,

    /// Presence marks the container as requiring a healthy report before it is ready
    #[serde(default)]
    pub healthcheck: Option<HealthcheckConfig>,
}

impl ContainerConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_healthcheck(mut self, healthcheck: HealthcheckConfig) -> Self {
        self.healthcheck = Some(healthcheck);
        self
    }

    pub fn has_healthcheck(&self) -> bool {
        self.healthcheck.is_some()
    }
}

/// Healthcheck handed to the runtime at create time
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HealthcheckConfig {
    #[serde(default, deserialize_with = "deserialize_command")]
    pub test: Vec<String>,
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub start_period_ms: Option<u64>,
}

impl TestdriveConfig {
    /// Validate container declarations.
    ///
    /// Run after [`loader::normalize`], so self-dependencies are already gone.
    pub fn validate(&self) -> ConfigResult<()> {
        for name in self.services.keys() {
            if self.tasks.contains_key(name) {
                return Err(ConfigurationError::duplicate_name(name));
            }
        }

        for (name, container) in self.services.iter().chain(self.tasks.iter()) {
            if container.image.trim().is_empty() {
                return Err(ConfigurationError::empty_image(name));
            }

            for dependency in &container.dependencies {
                if !self.services.contains_key(dependency) && !self.tasks.contains_key(dependency)
                {
                    return Err(ConfigurationError::unknown_dependency(name, dependency));
                }
            }
        }

        for (name, service) in &self.services {
            for dependency in &service.dependencies {
                if self.tasks.contains_key(dependency) {
                    warn!(
                        service = %name,
                        task = %dependency,
                        "Service depends on a task and will never become startable"
                    );
                }
            }
        }

        Ok(())
    }
}

/// Timing and naming knobs for a session
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionSettings {
    pub resync_interval_ms: u64,
    pub event_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    pub name_prefix: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            resync_interval_ms: constants::DEFAULT_RESYNC_INTERVAL.as_millis() as u64,
            event_timeout_ms: constants::DEFAULT_EVENT_TIMEOUT.as_millis() as u64,
            stop_timeout_ms: constants::DEFAULT_STOP_TIMEOUT.as_millis() as u64,
            name_prefix: constants::DEFAULT_NAME_PREFIX.to_string(),
        }
    }
}

impl SessionSettings {
    /// Layer defaults, `testdrive.settings.*` in `directory` and `TESTDRIVE_*` variables
    pub fn load(directory: Option<&Path>) -> ConfigResult<Self> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .set_default("resync_interval_ms", defaults.resync_interval_ms as i64)?
            .set_default("event_timeout_ms", defaults.event_timeout_ms as i64)?
            .set_default("stop_timeout_ms", defaults.stop_timeout_ms as i64)?
            .set_default("name_prefix", defaults.name_prefix)?;

        if let Some(directory) = directory {
            let stem = directory.join(constants::SETTINGS_FILE_STEM);
            builder = builder
                .add_source(config::File::with_name(&stem.to_string_lossy()).required(false));
        }

        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(constants::SETTINGS_ENV_PREFIX).try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("resync_interval_ms", self.resync_interval_ms),
            ("event_timeout_ms", self.event_timeout_ms),
            ("stop_timeout_ms", self.stop_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value.to_string(),
                    "must be greater than zero",
                ));
            }
        }

        if self.name_prefix.is_empty()
            || !self
                .name_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ConfigurationError::invalid_value(
                "name_prefix",
                self.name_prefix.clone(),
                "must be non-empty and contain only [a-zA-Z0-9_.-]",
            ));
        }

        Ok(())
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
