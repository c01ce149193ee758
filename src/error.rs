use thiserror::Error;

use crate::config::ConfigurationError;
use crate::runtime::RuntimeError;

#[derive(Error, Debug)]
pub enum TestdriveError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Orchestration error: {message}")]
    Orchestration { message: String },
}

impl TestdriveError {
    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::Orchestration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TestdriveError>;
