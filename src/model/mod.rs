//! # Entity Model
//!
//! Registry of declared containers keyed by name, with pure readiness
//! queries and status mutations.
//!
//! The model performs no I/O. Every mutation is a `mark_*` call that sets the
//! status, stamps the matching timestamp the first time the status is
//! entered, and logs a warning when the prior status was not an expected
//! predecessor. Mutations never refuse, and requesting the current status
//! again is a no-op.

pub mod container;
pub mod status;

pub use container::{Container, ContainerType, Timestamps};
pub use status::ContainerStatus;

use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ConfigResult, ConfigurationError, TestdriveConfig};

/// All containers of one session, keyed by name
#[derive(Debug, Clone, Default)]
pub struct Model {
    containers: BTreeMap<String, Container>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a model with one `New` container per declared service and task
    pub fn from_config(config: &TestdriveConfig) -> ConfigResult<Self> {
        let mut model = Self::new();
        for (name, service) in &config.services {
            model.add_container(Container::service(name, service.clone()))?;
        }
        for (name, task) in &config.tasks {
            model.add_container(Container::task(name, task.clone()))?;
        }
        Ok(model)
    }

    /// Insert a container under its name; duplicate names are rejected
    pub fn add_container(&mut self, mut container: Container) -> ConfigResult<()> {
        if self.containers.contains_key(&container.name) {
            return Err(ConfigurationError::duplicate_name(&container.name));
        }

        let name = container.name.clone();
        container.config.dependencies.retain(|dependency| dependency != &name);
        self.containers.insert(name, container);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Container> {
        self.containers.get(name)
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn status_of(&self, name: &str) -> Option<ContainerStatus> {
        self.containers.get(name).map(|c| c.status)
    }

    pub fn find_by_runtime_id(&self, runtime_id: &str) -> Option<&Container> {
        self.containers
            .values()
            .find(|c| c.runtime_id.as_deref() == Some(runtime_id))
    }

    /// Containers of `container_type` still waiting to be created.
    ///
    /// Creation does not wait for dependencies.
    pub fn creatable(&self, container_type: ContainerType) -> Vec<&Container> {
        self.containers
            .values()
            .filter(|c| c.status == ContainerStatus::New && c.container_type == container_type)
            .collect()
    }

    /// Created services whose dependencies are all ready
    pub fn startable_services(&self) -> Vec<&Container> {
        self.containers
            .values()
            .filter(|c| {
                c.status == ContainerStatus::Created
                    && c.is_service()
                    && self.all_dependencies_ready(c)
            })
            .collect()
    }

    /// Created tasks whose service dependencies are ready and task dependencies stopped
    pub fn startable_tasks(&self) -> Vec<&Container> {
        self.containers
            .values()
            .filter(|c| {
                c.status == ContainerStatus::Created
                    && c.is_task()
                    && self.service_dependencies_ready_and_task_dependencies_stopped(c)
            })
            .collect()
    }

    pub fn all_dependencies_ready(&self, container: &Container) -> bool {
        container.dependencies().iter().all(|dependency| {
            let ready = self.status_of(dependency) == Some(ContainerStatus::Ready);
            if !ready {
                debug!(
                    container = %container.name,
                    dependency = %dependency,
                    "Dependency not ready"
                );
            }
            ready
        })
    }

    pub fn service_dependencies_ready_and_task_dependencies_stopped(
        &self,
        container: &Container,
    ) -> bool {
        container
            .dependencies()
            .iter()
            .all(|dependency| match self.containers.get(dependency) {
                Some(d) if d.is_service() => d.status == ContainerStatus::Ready,
                Some(d) => d.status == ContainerStatus::Stopped,
                None => false,
            })
    }

    pub fn all_services_ready(&self) -> bool {
        self.containers
            .values()
            .filter(|c| c.is_service())
            .all(|c| c.status == ContainerStatus::Ready)
    }

    pub fn all_tasks_finished(&self) -> bool {
        self.containers.values().filter(|c| c.is_task()).all(|c| {
            matches!(
                c.status,
                ContainerStatus::Stopped | ContainerStatus::Destroyed
            )
        })
    }

    pub fn none_running(&self) -> bool {
        !self.containers.values().any(|c| c.status.is_running_ish())
    }

    pub fn all_destroyed(&self) -> bool {
        self.containers.values().all(|c| {
            let settled = c.status.is_settled();
            if !settled {
                debug!(
                    container = %c.name,
                    runtime_id = %c.runtime_id_str(),
                    status = %c.status,
                    "Container not yet destroyed"
                );
            }
            settled
        })
    }

    /// Record the runtime id handed out by a create call; never reassigned
    pub fn set_runtime_id(&mut self, name: &str, runtime_id: impl Into<String>) -> bool {
        let runtime_id = runtime_id.into();
        let Some(container) = self.containers.get_mut(name) else {
            warn!(container = %name, "Runtime id for unknown container");
            return false;
        };

        match &container.runtime_id {
            Some(existing) if existing != &runtime_id => {
                warn!(
                    container = %name,
                    runtime_id = %existing,
                    rejected = %runtime_id,
                    "Container already has a runtime id"
                );
                false
            }
            Some(_) => false,
            None => {
                container.runtime_id = Some(runtime_id);
                true
            }
        }
    }

    pub fn mark_creating(&mut self, name: &str) -> bool {
        self.transition(name, ContainerStatus::Creating)
    }

    pub fn mark_created(&mut self, name: &str) -> bool {
        self.transition(name, ContainerStatus::Created)
    }

    pub fn mark_starting(&mut self, name: &str) -> bool {
        self.transition(name, ContainerStatus::Starting)
    }

    pub fn mark_started(&mut self, name: &str) -> bool {
        self.transition(name, ContainerStatus::Started)
    }

    pub fn mark_ready(&mut self, name: &str) -> bool {
        self.transition(name, ContainerStatus::Ready)
    }

    pub fn mark_stopping(&mut self, name: &str) -> bool {
        self.transition(name, ContainerStatus::Stopping)
    }

    pub fn mark_stopped(&mut self, name: &str) -> bool {
        self.transition(name, ContainerStatus::Stopped)
    }

    pub fn mark_failed(&mut self, name: &str) -> bool {
        self.transition(name, ContainerStatus::Failed)
    }

    pub fn mark_destroying(&mut self, name: &str) -> bool {
        self.transition(name, ContainerStatus::Destroying)
    }

    pub fn mark_destroyed(&mut self, name: &str) -> bool {
        self.transition(name, ContainerStatus::Destroyed)
    }

    /// Count a destroy command issued for `name`, returning the new total
    pub fn record_destroy_attempt(&mut self, name: &str) -> u32 {
        match self.containers.get_mut(name) {
            Some(container) => {
                container.destroy_attempts += 1;
                container.destroy_attempts
            }
            None => 0,
        }
    }

    /// Returns whether the status changed
    fn transition(&mut self, name: &str, target: ContainerStatus) -> bool {
        let Some(container) = self.containers.get_mut(name) else {
            warn!(container = %name, status = %target, "Status change for unknown container");
            return false;
        };

        let from = container.status;
        if from == target {
            return false;
        }

        if !target.is_expected_after(from) {
            warn!(
                container = %name,
                from = %from,
                to = %target,
                "Marking container as {target}, but it is {from}"
            );
        }

        let timestamps = &mut container.timestamps;
        let slot = match target {
            ContainerStatus::Creating => Some(&mut timestamps.create_started_at),
            ContainerStatus::Starting => Some(&mut timestamps.start_started_at),
            ContainerStatus::Stopping => Some(&mut timestamps.stop_started_at),
            ContainerStatus::Destroying => Some(&mut timestamps.destroy_started_at),
            ContainerStatus::Failed => Some(&mut timestamps.failed_at),
            _ => None,
        };
        if let Some(slot) = slot {
            slot.get_or_insert_with(Instant::now);
        }

        container.status = target;

        let runtime_id = container.runtime_id_str();
        match target {
            ContainerStatus::Started | ContainerStatus::Ready | ContainerStatus::Stopped => {
                info!(
                    container = %name,
                    runtime_id = %runtime_id,
                    status = %target,
                    "Container is {target}"
                );
            }
            ContainerStatus::Failed => {
                warn!(container = %name, runtime_id = %runtime_id, "Container has failed");
            }
            _ => {
                debug!(
                    container = %name,
                    runtime_id = %runtime_id,
                    status = %target,
                    "Container marked as {target}"
                );
            }
        }

        true
    }
}
