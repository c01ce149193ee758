//! Configuration error types

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// Errors raised while reading, parsing or validating configuration.
///
/// All of these are fatal and are reported before the session loop starts.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration document: {message}")]
    Parse { message: String },

    #[error("Invalid session settings: {message}")]
    Settings { message: String },

    #[error("Container {name} declares no image")]
    EmptyImage { name: String },

    #[error("Container name {name} is declared more than once")]
    DuplicateName { name: String },

    #[error("Container {name} depends on undeclared container {dependency}")]
    UnknownDependency { name: String, dependency: String },

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn file_read_error(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn empty_image(name: impl Into<String>) -> Self {
        Self::EmptyImage { name: name.into() }
    }

    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    pub fn unknown_dependency(name: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::UnknownDependency {
            name: name.into(),
            dependency: dependency.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigurationError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::parse(err.to_string())
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        Self::Settings {
            message: err.to_string(),
        }
    }
}
