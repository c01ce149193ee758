//! # State Resynchronization
//!
//! On every tick the believed status of each container is compared with
//! the state the runtime reports for its runtime id. Confirmation events
//! that arrived late or never arrived are made up for once the matching
//! timestamp is older than the event timeout.
//!
//! [`decide`] is pure so the decision table can be tested exhaustively;
//! [`resync`] lists the runtime once and applies the decisions.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::constants::observed_states;
use crate::model::{Container, ContainerStatus, Model};
use crate::runtime::{ContainerRuntime, RuntimeResult};

/// Outcome of comparing one container against the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Belief matches observation
    Consistent,
    /// Belief lags behind; move the container to this status
    Promote(ContainerStatus),
    /// Belief and observation disagree but nothing can be corrected yet
    Mismatch,
}

/// An unset timestamp counts as long ago
fn is_stale(since: Option<Instant>, now: Instant, timeout: Duration) -> bool {
    since.map_or(true, |since| now.saturating_duration_since(since) > timeout)
}

/// Apply the resync decision table to one container; first match wins
pub fn decide(
    container: &Container,
    observed: Option<&str>,
    now: Instant,
    timeout: Duration,
) -> Decision {
    use ContainerStatus::*;

    let observed = observed.filter(|state| !state.is_empty());
    let timestamps = &container.timestamps;

    match (observed, container.status) {
        (Some(observed_states::RUNNING), Ready | Started) => Decision::Consistent,
        (None, Destroyed) => Decision::Consistent,
        (None, New | Creating) => Decision::Consistent,
        (Some(observed_states::CREATED), Creating)
            if is_stale(timestamps.create_started_at, now, timeout) =>
        {
            Decision::Promote(Created)
        }
        (Some(observed_states::RUNNING), New | Creating | Created | Starting)
            if is_stale(timestamps.start_started_at, now, timeout) =>
        {
            Decision::Promote(if container.config.has_healthcheck() {
                Started
            } else {
                Ready
            })
        }
        (None, Stopping) if is_stale(timestamps.stop_started_at, now, timeout) => {
            Decision::Promote(Destroyed)
        }
        (None, Destroying) if is_stale(timestamps.destroy_started_at, now, timeout) => {
            Decision::Promote(Destroyed)
        }
        (None, Ready | Started | Starting | Stopped) => Decision::Promote(Destroyed),
        // the die event for a requested stop never arrived
        (Some(observed_states::EXITED), Stopping)
            if is_stale(timestamps.stop_started_at, now, timeout) =>
        {
            Decision::Promote(Stopped)
        }
        _ => Decision::Mismatch,
    }
}

/// Decide for every container against one listing; returns what to promote
pub fn plan(
    model: &Model,
    observed: &HashMap<String, String>,
    now: Instant,
    timeout: Duration,
) -> Vec<(String, ContainerStatus)> {
    model
        .containers()
        .filter_map(|container| {
            let state = container
                .runtime_id
                .as_deref()
                .and_then(|id| observed.get(id))
                .map(String::as_str);

            match decide(container, state, now, timeout) {
                Decision::Consistent => None,
                Decision::Promote(status) => {
                    debug!(
                        container = %container.name,
                        runtime_id = %container.runtime_id_str(),
                        believed = %container.status,
                        observed = state.unwrap_or(""),
                        promoted = %status,
                        "State sync: promoting container"
                    );
                    Some((container.name.clone(), status))
                }
                Decision::Mismatch => {
                    debug!(
                        container = %container.name,
                        runtime_id = %container.runtime_id_str(),
                        believed = %container.status,
                        observed = state.unwrap_or(""),
                        "State sync: runtime disagrees"
                    );
                    None
                }
            }
        })
        .collect()
}

fn promote(model: &mut Model, name: &str, status: ContainerStatus) -> bool {
    match status {
        ContainerStatus::Created => model.mark_created(name),
        ContainerStatus::Started => model.mark_started(name),
        ContainerStatus::Ready => model.mark_ready(name),
        ContainerStatus::Stopped => model.mark_stopped(name),
        ContainerStatus::Destroyed => model.mark_destroyed(name),
        other => {
            debug!(container = %name, status = %other, "No resync promotion to this status");
            false
        }
    }
}

/// List the session's containers and correct stale beliefs; returns the number of changes
pub async fn resync(
    model: &mut Model,
    runtime: &dyn ContainerRuntime,
    session_id: &str,
    timeout: Duration,
) -> RuntimeResult<usize> {
    debug!("Resynchronizing container states");
    let observed = runtime.list_containers(session_id).await?;
    let promotions = plan(model, &observed, Instant::now(), timeout);
    Ok(apply(model, promotions))
}

/// Apply planned promotions; returns how many changed a status
pub fn apply(model: &mut Model, promotions: Vec<(String, ContainerStatus)>) -> usize {
    promotions
        .into_iter()
        .filter(|(name, status)| promote(model, name, *status))
        .count()
}
