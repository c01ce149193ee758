use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

use super::status::ContainerStatus;
use crate::config::ContainerConfig;

/// Whether a container is long-running or one-shot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    Service,
    Task,
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Task => write!(f, "task"),
        }
    }
}

/// Instants at which each transitional status was entered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub create_started_at: Option<Instant>,
    pub start_started_at: Option<Instant>,
    pub stop_started_at: Option<Instant>,
    pub destroy_started_at: Option<Instant>,
    pub failed_at: Option<Instant>,
}

/// One declared service or task and what the orchestrator believes about it
#[derive(Debug, Clone)]
pub struct Container {
    pub name: String,
    pub container_type: ContainerType,
    pub status: ContainerStatus,
    pub config: ContainerConfig,
    pub runtime_id: Option<String>,
    pub timestamps: Timestamps,
    /// Destroy commands issued so far
    pub destroy_attempts: u32,
}

impl Container {
    pub fn new(
        name: impl Into<String>,
        container_type: ContainerType,
        config: ContainerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            container_type,
            status: ContainerStatus::New,
            config,
            runtime_id: None,
            timestamps: Timestamps::default(),
            destroy_attempts: 0,
        }
    }

    pub fn service(name: impl Into<String>, config: ContainerConfig) -> Self {
        Self::new(name, ContainerType::Service, config)
    }

    pub fn task(name: impl Into<String>, config: ContainerConfig) -> Self {
        Self::new(name, ContainerType::Task, config)
    }

    pub fn is_service(&self) -> bool {
        self.container_type == ContainerType::Service
    }

    pub fn is_task(&self) -> bool {
        self.container_type == ContainerType::Task
    }

    pub fn dependencies(&self) -> &[String] {
        &self.config.dependencies
    }

    /// Runtime id or an empty string, for log fields
    pub fn runtime_id_str(&self) -> &str {
        self.runtime_id.as_deref().unwrap_or("")
    }
}
