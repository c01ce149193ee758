//! Shared helpers for session-level tests

use std::sync::Arc;
use std::time::Duration;
use testdrive::config::loader;
use testdrive::output::MemoryOutput;
use testdrive::runtime::fake::{FakeRuntime, RuntimeCommand};
use testdrive::{RunOutcome, Session, SessionSettings, TestdriveConfig};

/// Three-container document: `db`, `app` depending on `db`, task `itest` depending on `db`
pub const DB_APP_ITEST: &str = r#"
version: "1"
services:
  db:
    image: postgres:16
  app:
    image: app:latest
    depends_on: [db]
tasks:
  itest:
    image: itest:latest
    command: "run --all"
    depends_on: [db]
"#;

pub fn document(yaml: &str) -> TestdriveConfig {
    loader::load_config_str(yaml).expect("test document should load")
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        resync_interval_ms: 1000,
        event_timeout_ms: 1000,
        stop_timeout_ms: 1000,
        ..Default::default()
    }
}

pub struct Harness {
    pub runtime: FakeRuntime,
    pub output: Arc<MemoryOutput>,
    pub session: Session,
}

impl Harness {
    pub fn new(yaml: &str, runtime: FakeRuntime) -> Self {
        let output = Arc::new(MemoryOutput::new());
        let session = Session::new(
            &document(yaml),
            settings(),
            Arc::new(runtime.clone()),
            output.clone(),
        )
        .expect("session should build");

        Self {
            runtime,
            output,
            session,
        }
    }

    pub async fn run(&mut self) -> RunOutcome {
        self.session.run().await.expect("run should not error")
    }

    /// Index of a command in issue order, panicking when it was never issued
    pub fn position(&self, command: RuntimeCommand) -> usize {
        self.runtime
            .position(&command)
            .unwrap_or_else(|| panic!("{command:?} was never issued"))
    }
}

pub fn create(name: &str) -> RuntimeCommand {
    RuntimeCommand::Create(name.to_string())
}

pub fn start(name: &str) -> RuntimeCommand {
    RuntimeCommand::Start(name.to_string())
}

pub fn stop(name: &str) -> RuntimeCommand {
    RuntimeCommand::Stop(name.to_string())
}

pub fn destroy(name: &str) -> RuntimeCommand {
    RuntimeCommand::Destroy(name.to_string())
}

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
