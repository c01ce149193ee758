//! # Container Runtime Contract
//!
//! The orchestrator drives containers exclusively through
//! [`ContainerRuntime`]. Two implementations ship with the crate:
//!
//! - [`docker::DockerRuntime`] talks to a Docker daemon (feature `docker`)
//! - [`fake::FakeRuntime`] is a deterministic in-memory stand-in for tests

#[cfg(feature = "docker")]
pub mod docker;
pub mod fake;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::HealthcheckConfig;
use crate::events::RuntimeEvent;

/// Label carrying the declared container name
pub const LABEL_CONTAINER: &str = "testdrive.container";
/// Label carrying the session id
pub const LABEL_SESSION: &str = "testdrive.session";

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Callback receiving one output line
pub type LineCallback<'a> = &'a (dyn Fn(String) + Send + Sync);
/// Callback receiving one lifecycle event
pub type EventCallback<'a> = &'a (dyn Fn(RuntimeEvent) + Send + Sync);

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Container {id} not found")]
    NotFound { id: String },

    #[error("Runtime command {operation} failed for {target}: {message}")]
    Command {
        operation: String,
        target: String,
        message: String,
    },

    #[error("Cannot connect to container runtime: {message}")]
    Connection { message: String },

    #[error("Runtime stream failed: {message}")]
    Stream { message: String },
}

impl RuntimeError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn command(
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Command {
            operation: operation.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Everything the runtime needs to allocate a container object
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateRequest {
    /// Name of the container object in the runtime
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub healthcheck: Option<HealthcheckConfig>,
    pub labels: BTreeMap<String, String>,
}

impl CreateRequest {
    /// Declared name, if the request carries the container label
    pub fn declared_name(&self) -> Option<&str> {
        self.labels.get(LABEL_CONTAINER).map(String::as_str)
    }
}

/// Capability the orchestrator depends on
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull the image if needed and allocate a container; returns the runtime id
    async fn create_container(&self, request: &CreateRequest) -> RuntimeResult<String>;

    async fn start_container(&self, runtime_id: &str) -> RuntimeResult<()>;

    async fn stop_container(&self, runtime_id: &str, timeout: Duration) -> RuntimeResult<()>;

    /// Remove the container, killing it if still running
    async fn destroy_container(&self, runtime_id: &str) -> RuntimeResult<()>;

    async fn exit_code(&self, runtime_id: &str) -> RuntimeResult<i64>;

    /// Observed state string per runtime id (`created`, `running`, `exited`, ...)
    /// for the containers labelled with `session_id`
    async fn list_containers(&self, session_id: &str) -> RuntimeResult<HashMap<String, String>>;

    /// Follow the container's output until end of stream, error or cancellation
    async fn read_logs(
        &self,
        runtime_id: &str,
        cancel: CancellationToken,
        on_line: LineCallback<'_>,
    ) -> RuntimeResult<()>;

    /// Deliver lifecycle events until the stream ends or is cancelled.
    ///
    /// A stream failure is reported through `on_event` as a
    /// [`RuntimeEvent::stream_error`] before returning the error.
    async fn subscribe_events(
        &self,
        cancel: CancellationToken,
        on_event: EventCallback<'_>,
    ) -> RuntimeResult<()>;
}
