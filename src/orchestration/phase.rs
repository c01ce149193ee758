//! # Phase State Machine
//!
//! A session moves through `Startup → Running → Shutdown → Cleanup →
//! Terminated`. Each phase exposes one [`Phase::advance`] operation that
//! inspects the model, issues the runtime commands the phase calls for and
//! returns the phase to continue with.
//!
//! Phases are ordered, so escalations (interrupts, failing containers) can
//! only ever move a session forward.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::SessionSettings;
use crate::constants::MAX_DESTROY_ATTEMPTS;
use crate::error::Result;
use crate::logging::{log_container_operation, log_error};
use crate::model::{Container, ContainerStatus, ContainerType, Model};
use crate::runtime::{ContainerRuntime, CreateRequest, LABEL_CONTAINER, LABEL_SESSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Create and start services
    Startup,
    /// Create and start tasks
    Running,
    /// Stop everything still running
    Shutdown,
    /// Destroy everything the runtime knows about
    Cleanup,
    Terminated,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Condition that completes this phase
    pub fn completion_reason(&self) -> &'static str {
        match self {
            Self::Startup => "all services ready",
            Self::Running => "all tasks finished",
            Self::Shutdown => "no container running",
            Self::Cleanup => "all containers destroyed",
            Self::Terminated => "terminated",
        }
    }

    /// Issue this phase's commands and compute the next phase.
    ///
    /// Create and start failures abort the run. A container that fails to
    /// stop is marked failed and left to cleanup; destroy is retried a few
    /// times before cleanup gives up on the container.
    pub async fn advance(self, context: &mut PhaseContext<'_>) -> Result<Phase> {
        match self {
            Self::Startup => {
                context.create_all(ContainerType::Service).await?;
                let startable = names(context.model.startable_services());
                context.start_all(startable).await?;

                Ok(if context.model.all_services_ready() {
                    Self::Running
                } else {
                    self
                })
            }
            Self::Running => {
                context.create_all(ContainerType::Task).await?;
                let startable = names(context.model.startable_tasks());
                context.start_all(startable).await?;

                Ok(if context.model.all_tasks_finished() {
                    Self::Shutdown
                } else {
                    self
                })
            }
            Self::Shutdown => {
                context.stop_running().await;

                Ok(if context.model.none_running() {
                    Self::Cleanup
                } else {
                    self
                })
            }
            Self::Cleanup => {
                context.destroy_remaining().await;

                if context.model.all_destroyed() {
                    Ok(Self::Terminated)
                } else if context.cleanup_exhausted() {
                    context.abandon_leftovers();
                    Ok(Self::Terminated)
                } else {
                    Ok(self)
                }
            }
            Self::Terminated => Ok(self),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Startup => "Startup",
            Self::Running => "Running",
            Self::Shutdown => "Shutdown",
            Self::Cleanup => "Cleanup",
            Self::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "startup" => Ok(Self::Startup),
            "running" => Ok(Self::Running),
            "shutdown" => Ok(Self::Shutdown),
            "cleanup" => Ok(Self::Cleanup),
            "terminated" => Ok(Self::Terminated),
            _ => Err(format!("Unknown phase: {s}")),
        }
    }
}

fn names(containers: Vec<&Container>) -> Vec<String> {
    containers.into_iter().map(|c| c.name.clone()).collect()
}

/// Everything a phase needs from the session for one advance
pub struct PhaseContext<'a> {
    pub model: &'a mut Model,
    pub runtime: &'a dyn ContainerRuntime,
    pub settings: &'a SessionSettings,
    /// Full session id, attached as a label
    pub session_id: &'a str,
    /// Short session id used in container names
    pub session_tag: &'a str,
}

impl PhaseContext<'_> {
    /// Name of the container object in the runtime
    pub fn runtime_name(&self, name: &str) -> String {
        format!("{}_{}_{}", self.settings.name_prefix, self.session_tag, name)
    }

    async fn create_all(&mut self, container_type: ContainerType) -> Result<()> {
        for name in names(self.model.creatable(container_type)) {
            self.create(&name).await?;
        }
        Ok(())
    }

    async fn create(&mut self, name: &str) -> Result<()> {
        let Some(container) = self.model.get(name) else {
            return Ok(());
        };

        let request = CreateRequest {
            name: self.runtime_name(name),
            image: container.config.image.clone(),
            command: container.config.command.clone(),
            healthcheck: container.config.healthcheck.clone(),
            labels: BTreeMap::from([
                (LABEL_CONTAINER.to_string(), name.to_string()),
                (LABEL_SESSION.to_string(), self.session_id.to_string()),
            ]),
        };

        self.model.mark_creating(name);
        match self.runtime.create_container(&request).await {
            Ok(runtime_id) => {
                log_container_operation("create", name, Some(&runtime_id), "issued", None);
                self.model.set_runtime_id(name, runtime_id);
                Ok(())
            }
            Err(e) => {
                self.model.mark_failed(name);
                log_error("phase", "create", &e.to_string(), Some(name));
                Err(e.into())
            }
        }
    }

    async fn start_all(&mut self, startable: Vec<String>) -> Result<()> {
        for name in startable {
            self.start(&name).await?;
        }
        Ok(())
    }

    async fn start(&mut self, name: &str) -> Result<()> {
        let Some(runtime_id) = self.model.get(name).and_then(|c| c.runtime_id.clone()) else {
            warn!(container = %name, "Cannot start container without runtime id");
            return Ok(());
        };

        self.model.mark_starting(name);
        match self.runtime.start_container(&runtime_id).await {
            Ok(()) => {
                log_container_operation("start", name, Some(&runtime_id), "issued", None);
                Ok(())
            }
            Err(e) => {
                self.model.mark_failed(name);
                log_error("phase", "start", &e.to_string(), Some(name));
                Err(e.into())
            }
        }
    }

    async fn stop_running(&mut self) {
        let running: Vec<(String, String)> = self
            .model
            .containers()
            .filter(|c| matches!(c.status, ContainerStatus::Ready | ContainerStatus::Started))
            .filter_map(|c| Some((c.name.clone(), c.runtime_id.clone()?)))
            .collect();

        for (name, runtime_id) in running {
            self.model.mark_stopping(&name);
            match self
                .runtime
                .stop_container(&runtime_id, self.settings.stop_timeout())
                .await
            {
                Ok(()) => log_container_operation("stop", &name, Some(&runtime_id), "issued", None),
                Err(e) if e.is_not_found() => {
                    debug!(
                        container = %name,
                        runtime_id = %runtime_id,
                        "Container already gone while stopping"
                    );
                    self.model.mark_stopped(&name);
                }
                Err(e) => {
                    // cleanup force-removes failed containers
                    log_error("phase", "stop", &e.to_string(), Some(&name));
                    self.model.mark_failed(&name);
                }
            }
        }
    }

    async fn destroy_remaining(&mut self) {
        let now = Instant::now();
        let retry_after = self.settings.event_timeout();
        let remaining: Vec<(String, Option<String>)> = self
            .model
            .containers()
            .filter(|c| match c.status {
                ContainerStatus::New | ContainerStatus::Destroyed => false,
                ContainerStatus::Destroying => {
                    c.destroy_attempts < MAX_DESTROY_ATTEMPTS
                        && destroy_overdue(c, now, retry_after)
                }
                _ => true,
            })
            .map(|c| (c.name.clone(), c.runtime_id.clone()))
            .collect();

        for (name, runtime_id) in remaining {
            let Some(runtime_id) = runtime_id else {
                debug!(container = %name, "Container never reached the runtime");
                self.model.mark_destroyed(&name);
                continue;
            };

            self.model.mark_destroying(&name);
            let attempt = self.model.record_destroy_attempt(&name);
            match self.runtime.destroy_container(&runtime_id).await {
                Ok(()) => {
                    log_container_operation("destroy", &name, Some(&runtime_id), "issued", None)
                }
                Err(e) if e.is_not_found() => {
                    debug!(
                        container = %name,
                        runtime_id = %runtime_id,
                        "Container already removed"
                    );
                    self.model.mark_destroyed(&name);
                }
                Err(e) => {
                    warn!(
                        container = %name,
                        runtime_id = %runtime_id,
                        attempt,
                        error = %e,
                        "Failed to destroy container"
                    );
                }
            }
        }
    }

    /// Every unsettled container has used up its destroy attempts without
    /// a confirmation arriving in time
    fn cleanup_exhausted(&self) -> bool {
        let now = Instant::now();
        let retry_after = self.settings.event_timeout();
        let mut leftovers = self
            .model
            .containers()
            .filter(|c| !c.status.is_settled())
            .peekable();
        if leftovers.peek().is_none() {
            return false;
        }

        leftovers.all(|c| {
            c.status == ContainerStatus::Destroying
                && c.destroy_attempts >= MAX_DESTROY_ATTEMPTS
                && destroy_overdue(c, now, retry_after)
        })
    }

    fn abandon_leftovers(&self) {
        for container in self.model.containers().filter(|c| !c.status.is_settled()) {
            warn!(
                container = %container.name,
                runtime_id = %container.runtime_id_str(),
                attempts = container.destroy_attempts,
                "Giving up on destroying container, it may still exist in the runtime"
            );
        }
    }
}

/// No confirmation arrived within one event timeout per destroy issued
fn destroy_overdue(container: &Container, now: Instant, retry_after: Duration) -> bool {
    let Some(since) = container.timestamps.destroy_started_at else {
        return true;
    };
    now.saturating_duration_since(since) > retry_after * container.destroy_attempts.max(1)
}
