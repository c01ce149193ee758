//! # System Constants
//!
//! Defaults and fixed names that define the operational boundaries of a
//! testdrive session.

use std::time::Duration;

/// Config document looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "testdrive.yaml";

/// Base name of the optional session settings file (extension picked by `config`)
pub const SETTINGS_FILE_STEM: &str = "testdrive.settings";

/// Prefix for environment variable overrides of session settings
pub const SETTINGS_ENV_PREFIX: &str = "TESTDRIVE";

/// Prefix used when naming containers in the runtime
pub const DEFAULT_NAME_PREFIX: &str = "testdrive";

/// Interval between resync ticks
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_millis(1000);

/// How long a transitional status may go unconfirmed before resync corrects it
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Grace period handed to the runtime when stopping a container
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(5000);

/// Destroy commands issued per container before cleanup gives up on it
pub const MAX_DESTROY_ATTEMPTS: u32 = 3;

/// Process exit codes reported by the `testdrive` binary
pub mod exit_codes {
    /// Every container ran to completion without failure
    pub const SUCCESS: i32 = 0;
    /// Aborted by a third interrupt
    pub const ABORTED: i32 = 1;
    /// Configuration or orchestration error
    pub const ERROR: i32 = 2;
    /// Terminated cleanly, but at least one container failed
    pub const CONTAINER_FAILED: i32 = 3;
}

/// Runtime event type strings, `<type>.<action>` as delivered by the runtime
pub mod runtime_events {
    pub const CONTAINER_CREATE: &str = "container.create";
    pub const CONTAINER_START: &str = "container.start";
    pub const CONTAINER_STOP: &str = "container.stop";
    pub const CONTAINER_KILL: &str = "container.kill";
    pub const CONTAINER_DIE: &str = "container.die";
    pub const CONTAINER_DESTROY: &str = "container.destroy";
    pub const CONTAINER_HEALTHY: &str = "container.health_status: healthy";
    pub const CONTAINER_UNHEALTHY: &str = "container.health_status: unhealthy";
    pub const IMAGE_PULL: &str = "image.pull";
    pub const NETWORK_CONNECT: &str = "network.connect";
}

/// Observed state strings reported by `ContainerRuntime::list_containers`
pub mod observed_states {
    pub const CREATED: &str = "created";
    pub const RUNNING: &str = "running";
    pub const EXITED: &str = "exited";
}
