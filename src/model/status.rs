use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a declared container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerStatus {
    /// Declared, not yet known to the runtime
    New,
    /// Create command issued, awaiting confirmation
    Creating,
    /// Runtime confirmed the container object exists
    Created,
    /// Start command issued, awaiting confirmation
    Starting,
    /// Running, awaiting a healthy report
    Started,
    /// Running and usable by dependents
    Ready,
    /// Stop command issued
    Stopping,
    /// Exited with code 0
    Stopped,
    /// Destroy command issued
    Destroying,
    /// Removed from the runtime
    Destroyed,
    /// A command failed or the container exited non-zero
    Failed,
}

impl ContainerStatus {
    pub const ALL: [ContainerStatus; 11] = [
        Self::New,
        Self::Creating,
        Self::Created,
        Self::Starting,
        Self::Started,
        Self::Ready,
        Self::Stopping,
        Self::Stopped,
        Self::Destroying,
        Self::Destroyed,
        Self::Failed,
    ];

    /// Statuses a container is normally in right before entering `self`.
    ///
    /// `None` means any prior status is acceptable.
    pub fn expected_predecessors(&self) -> Option<&'static [ContainerStatus]> {
        use ContainerStatus::*;
        match self {
            New => Some(&[]),
            Creating => Some(&[New]),
            Created => Some(&[Creating]),
            Starting => Some(&[Created]),
            Started => Some(&[Starting]),
            Ready => Some(&[Starting, Started]),
            Stopping => Some(&[Started, Ready]),
            // A task exiting on its own goes straight from running to stopped
            Stopped => Some(&[Started, Ready, Stopping]),
            Destroying => Some(&[Created, Stopped, Failed]),
            Destroyed => Some(&[Destroying]),
            Failed => None,
        }
    }

    /// Check whether moving from `from` to `self` follows the transition graph
    pub fn is_expected_after(&self, from: ContainerStatus) -> bool {
        match self.expected_predecessors() {
            Some(predecessors) => predecessors.contains(&from),
            None => true,
        }
    }

    /// A command was issued and its confirmation is outstanding
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            Self::Creating | Self::Starting | Self::Stopping | Self::Destroying
        )
    }

    /// The container may still be executing in the runtime
    pub fn is_running_ish(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Started | Self::Ready | Self::Stopping
        )
    }

    /// The container needs no further teardown
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::New | Self::Destroyed)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "New",
            Self::Creating => "Creating",
            Self::Created => "Created",
            Self::Starting => "Starting",
            Self::Started => "Started",
            Self::Ready => "Ready",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Destroying => "Destroying",
            Self::Destroyed => "Destroyed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ContainerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid container status: {s}"))
    }
}

impl Default for ContainerStatus {
    fn default() -> Self {
        Self::New
    }
}
