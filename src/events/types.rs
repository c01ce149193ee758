use std::fmt;

use crate::constants::runtime_events;

/// Lifecycle event kinds reported by the container runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeEventKind {
    ContainerCreate,
    ContainerStart,
    ContainerStop,
    ContainerKill,
    ContainerDie,
    ContainerDestroy,
    ContainerHealthy,
    ContainerUnhealthy,
    ImagePull,
    NetworkConnect,
    /// The event stream itself failed; no further runtime events follow
    StreamError,
    /// Anything else the runtime reports, kept verbatim
    Other(String),
}

impl RuntimeEventKind {
    /// Map a `<type>.<action>` string to a kind
    pub fn from_type_str(event_type: &str) -> Self {
        match event_type {
            runtime_events::CONTAINER_CREATE => Self::ContainerCreate,
            runtime_events::CONTAINER_START => Self::ContainerStart,
            runtime_events::CONTAINER_STOP => Self::ContainerStop,
            runtime_events::CONTAINER_KILL => Self::ContainerKill,
            runtime_events::CONTAINER_DIE => Self::ContainerDie,
            runtime_events::CONTAINER_DESTROY => Self::ContainerDestroy,
            runtime_events::CONTAINER_HEALTHY => Self::ContainerHealthy,
            runtime_events::CONTAINER_UNHEALTHY => Self::ContainerUnhealthy,
            runtime_events::IMAGE_PULL => Self::ImagePull,
            runtime_events::NETWORK_CONNECT => Self::NetworkConnect,
            "error" => Self::StreamError,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ContainerCreate => runtime_events::CONTAINER_CREATE,
            Self::ContainerStart => runtime_events::CONTAINER_START,
            Self::ContainerStop => runtime_events::CONTAINER_STOP,
            Self::ContainerKill => runtime_events::CONTAINER_KILL,
            Self::ContainerDie => runtime_events::CONTAINER_DIE,
            Self::ContainerDestroy => runtime_events::CONTAINER_DESTROY,
            Self::ContainerHealthy => runtime_events::CONTAINER_HEALTHY,
            Self::ContainerUnhealthy => runtime_events::CONTAINER_UNHEALTHY,
            Self::ImagePull => runtime_events::IMAGE_PULL,
            Self::NetworkConnect => runtime_events::NETWORK_CONNECT,
            Self::StreamError => "error",
            Self::Other(event_type) => event_type,
        }
    }
}

/// A lifecycle event as delivered by the runtime subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    pub kind: RuntimeEventKind,
    pub runtime_id: String,
    pub message: Option<String>,
}

impl RuntimeEvent {
    pub fn new(kind: RuntimeEventKind, runtime_id: impl Into<String>) -> Self {
        Self {
            kind,
            runtime_id: runtime_id.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn stream_error(message: impl Into<String>) -> Self {
        Self::new(RuntimeEventKind::StreamError, "").with_message(message)
    }
}

/// Everything the session loop consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Runtime(RuntimeEvent),
    /// One output line of a container, tagged with its declared name
    Log { container: String, line: String },
    Tick,
    Interrupt,
}

impl Event {
    pub fn event_type(&self) -> &str {
        match self {
            Self::Runtime(event) => event.kind.as_str(),
            Self::Log { .. } => "log",
            Self::Tick => "tick",
            Self::Interrupt => "sigint",
        }
    }

    /// Runtime container id the event refers to, if any
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Runtime(event) if !event.runtime_id.is_empty() => Some(&event.runtime_id),
            _ => None,
        }
    }
}

impl From<RuntimeEvent> for Event {
    fn from(event: RuntimeEvent) -> Self {
        Self::Runtime(event)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime(event) => write!(
                f,
                "Event{{type:{}, id:{}, message:{}}}",
                event.kind.as_str(),
                event.runtime_id,
                event.message.as_deref().unwrap_or("")
            ),
            Self::Log { container, line } => write!(f, "{container}: {line}"),
            Self::Tick | Self::Interrupt => f.write_str(self.event_type()),
        }
    }
}
