//! Serializable summary of a finished session.
//!
//! Containers stay in the model after teardown, so the report doubles as
//! the final audit of what the runtime was asked to do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::phase::Phase;
use super::session::RunOutcome;
use crate::model::{ContainerStatus, ContainerType, Model};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReport {
    pub name: String,
    pub container_type: ContainerType,
    pub status: ContainerStatus,
    pub runtime_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<Phase>,
    pub containers: Vec<ContainerReport>,
    pub failed: Vec<String>,
    pub aborted: bool,
    pub exit_code: i32,
}

impl SessionReport {
    pub fn new(
        session_id: Uuid,
        started_at: DateTime<Utc>,
        phases: &[Phase],
        model: &Model,
        outcome: &RunOutcome,
    ) -> Self {
        Self {
            session_id,
            started_at,
            finished_at: Utc::now(),
            phases: phases.to_vec(),
            containers: model
                .containers()
                .map(|c| ContainerReport {
                    name: c.name.clone(),
                    container_type: c.container_type,
                    status: c.status,
                    runtime_id: c.runtime_id.clone(),
                })
                .collect(),
            failed: outcome.failed.clone(),
            aborted: outcome.aborted,
            exit_code: outcome.exit_code(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
