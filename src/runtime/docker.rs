//! Docker daemon adapter built on bollard.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::HealthConfig;
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    ContainerRuntime, CreateRequest, EventCallback, LineCallback, RuntimeError, RuntimeResult,
    LABEL_SESSION,
};
use crate::config::HealthcheckConfig;
use crate::events::{RuntimeEvent, RuntimeEventKind};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// [`ContainerRuntime`] backed by the local Docker daemon
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect through `DOCKER_HOST` or the platform default socket
    pub fn connect() -> RuntimeResult<Self> {
        let client = Docker::connect_with_local_defaults().map_err(|e| RuntimeError::Connection {
            message: e.to_string(),
        })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Docker) -> Self {
        Self { client }
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(progress) = stream.next().await {
            let info = progress.map_err(|e| map_error("pull", image, e))?;
            if let Some(status) = info.status {
                debug!(image = %image, status = %status, "Image pull progress");
            }
        }
        Ok(())
    }
}

/// Reassembles lines that the daemon split across frames.
///
/// Frames are buffered as raw bytes and only complete lines are decoded, so a
/// multi-byte character cut by a frame boundary survives intact.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a frame; returns every line it completed
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let Some(end) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(end + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete[..end]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// The trailing line without a newline, if any
    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let line = decode_line(&rest);
        (!line.is_empty()).then_some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn map_error(operation: &str, target: &str, error: BollardError) -> RuntimeError {
    match error {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::not_found(target),
        other => RuntimeError::command(operation, target, other.to_string()),
    }
}

fn millis_to_nanos(millis: Option<u64>) -> Option<i64> {
    millis.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX).saturating_mul(NANOS_PER_MILLI))
}

/// Docker expects the test to start with `CMD`, `CMD-SHELL` or `NONE`
fn health_config(healthcheck: &HealthcheckConfig) -> HealthConfig {
    let test = match healthcheck.test.first().map(String::as_str) {
        Some("CMD" | "CMD-SHELL" | "NONE") => healthcheck.test.clone(),
        Some(_) => std::iter::once("CMD".to_string())
            .chain(healthcheck.test.iter().cloned())
            .collect(),
        None => Vec::new(),
    };

    HealthConfig {
        test: (!test.is_empty()).then_some(test),
        interval: millis_to_nanos(healthcheck.interval_ms),
        timeout: millis_to_nanos(healthcheck.timeout_ms),
        retries: healthcheck.retries.map(i64::from),
        start_period: millis_to_nanos(healthcheck.start_period_ms),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, request: &CreateRequest) -> RuntimeResult<String> {
        self.pull_image(&request.image).await?;

        let config = Config {
            image: Some(request.image.clone()),
            cmd: (!request.command.is_empty()).then(|| request.command.clone()),
            labels: Some(request.labels.clone().into_iter().collect()),
            healthcheck: request.healthcheck.as_ref().map(health_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: request.name.clone(),
            ..Default::default()
        });

        let response = self
            .client
            .create_container(options, config)
            .await
            .map_err(|e| map_error("create", &request.name, e))?;

        for warning in &response.warnings {
            debug!(container = %request.name, warning = %warning, "Create warning");
        }
        Ok(response.id)
    }

    async fn start_container(&self, runtime_id: &str) -> RuntimeResult<()> {
        self.client
            .start_container(runtime_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error("start", runtime_id, e))
    }

    async fn stop_container(&self, runtime_id: &str, timeout: Duration) -> RuntimeResult<()> {
        let options = StopContainerOptions {
            t: timeout.as_secs().max(1) as i64,
        };
        self.client
            .stop_container(runtime_id, Some(options))
            .await
            .map_err(|e| map_error("stop", runtime_id, e))
    }

    async fn destroy_container(&self, runtime_id: &str) -> RuntimeResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.client
            .remove_container(runtime_id, Some(options))
            .await
            .map_err(|e| map_error("destroy", runtime_id, e))
    }

    async fn exit_code(&self, runtime_id: &str) -> RuntimeResult<i64> {
        let inspected = self
            .client
            .inspect_container(runtime_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error("inspect", runtime_id, e))?;

        inspected
            .state
            .and_then(|state| state.exit_code)
            .ok_or_else(|| RuntimeError::command("inspect", runtime_id, "no exit code reported"))
    }

    async fn list_containers(&self, session_id: &str) -> RuntimeResult<HashMap<String, String>> {
        let filters = HashMap::from([(
            "label".to_string(),
            vec![format!("{LABEL_SESSION}={session_id}")],
        )]);
        let summaries = self
            .client
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| map_error("list", "containers", e))?;

        Ok(summaries
            .into_iter()
            .filter_map(|summary| Some((summary.id?, summary.state.unwrap_or_default())))
            .collect())
    }

    async fn read_logs(
        &self,
        runtime_id: &str,
        cancel: CancellationToken,
        on_line: LineCallback<'_>,
    ) -> RuntimeResult<()> {
        let mut stream = self.client.logs(
            runtime_id,
            Some(LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        // stdout and stderr frames interleave, so each keeps its own partial line
        let mut stdout = LineBuffer::default();
        let mut stderr = LineBuffer::default();

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                chunk = stream.next() => match chunk {
                    Some(Ok(output)) => {
                        let buffer = if matches!(output, LogOutput::StdErr { .. }) {
                            &mut stderr
                        } else {
                            &mut stdout
                        };
                        let bytes = output.into_bytes();
                        for line in buffer.push(&bytes) {
                            on_line(line);
                        }
                    }
                    Some(Err(e)) => break Err(RuntimeError::Stream { message: e.to_string() }),
                    None => break Ok(()),
                },
            }
        };

        for line in stdout.finish().into_iter().chain(stderr.finish()) {
            on_line(line);
        }
        result
    }

    async fn subscribe_events(
        &self,
        cancel: CancellationToken,
        on_event: EventCallback<'_>,
    ) -> RuntimeResult<()> {
        let mut stream = self.client.events(None::<EventsOptions<String>>);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                message = stream.next() => match message {
                    Some(Ok(message)) => {
                        let event_type = format!(
                            "{}.{}",
                            message.typ.map(|typ| typ.to_string()).unwrap_or_default(),
                            message.action.unwrap_or_default()
                        );
                        let runtime_id = message
                            .actor
                            .and_then(|actor| actor.id)
                            .unwrap_or_default();
                        on_event(RuntimeEvent::new(
                            RuntimeEventKind::from_type_str(&event_type),
                            runtime_id,
                        ));
                    }
                    Some(Err(e)) => {
                        let message = e.to_string();
                        on_event(RuntimeEvent::stream_error(message.clone()));
                        return Err(RuntimeError::Stream { message });
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}
