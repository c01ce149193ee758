//! Deterministic in-memory runtime.
//!
//! Behaviour is scripted per declared container name (the
//! [`LABEL_CONTAINER`](super::LABEL_CONTAINER) label of the create request).
//! Every command is recorded in issue order so tests can assert on
//! ordering, and lifecycle events flow through the same subscription
//! contract the Docker adapter honours.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    ContainerRuntime, CreateRequest, EventCallback, LineCallback, RuntimeError, RuntimeResult,
    LABEL_SESSION,
};
use crate::constants::observed_states;
use crate::events::{RuntimeEvent, RuntimeEventKind};

/// Exit code reported for containers stopped through the runtime
pub const STOPPED_EXIT_CODE: i64 = 143;

/// A command issued against the fake, by declared name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCommand {
    Create(String),
    Start(String),
    Stop(String),
    Destroy(String),
}

impl RuntimeCommand {
    pub fn container(&self) -> &str {
        match self {
            Self::Create(name) | Self::Start(name) | Self::Stop(name) | Self::Destroy(name) => {
                name
            }
        }
    }
}

/// Scripted behaviour of one declared container
#[derive(Debug, Clone, Default)]
pub struct FakeBehavior {
    /// Exit with this code after running for the given duration
    pub exit_after: Option<(i64, Duration)>,
    /// Report healthy after running for the given duration
    pub healthy_after: Option<Duration>,
    pub fail_create: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub fail_destroy: bool,
    /// Emit no lifecycle events for this container
    pub silent: bool,
    /// Lines produced on the log stream
    pub logs: Vec<String>,
}

impl FakeBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exits_with(mut self, code: i64, after: Duration) -> Self {
        self.exit_after = Some((code, after));
        self
    }

    pub fn healthy_after(mut self, after: Duration) -> Self {
        self.healthy_after = Some(after);
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_logs<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.logs = lines.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone)]
struct FakeContainer {
    name: String,
    session: Option<String>,
    state: String,
    exit_code: i64,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    containers: HashMap<String, FakeContainer>,
    behaviors: HashMap<String, FakeBehavior>,
    commands: Vec<RuntimeCommand>,
    fail_listing: bool,
}

enum Signal {
    Event(RuntimeEvent),
    Fail(String),
}

/// In-memory [`ContainerRuntime`]; clones share the same state
#[derive(Clone)]
pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
    signals: mpsc::UnboundedSender<Signal>,
    subscription: Arc<Mutex<Option<mpsc::UnboundedReceiver<Signal>>>>,
}

impl std::fmt::Debug for FakeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeRuntime")
            .field("containers", &self.state.lock().containers.len())
            .finish()
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        let (signals, receiver) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            signals,
            subscription: Arc::new(Mutex::new(Some(receiver))),
        }
    }

    /// Script the behaviour of a declared container
    pub fn with_behavior(self, name: impl Into<String>, behavior: FakeBehavior) -> Self {
        self.set_behavior(name, behavior);
        self
    }

    pub fn set_behavior(&self, name: impl Into<String>, behavior: FakeBehavior) {
        self.state.lock().behaviors.insert(name.into(), behavior);
    }

    /// Make `list_containers` fail until reset
    pub fn set_listing_fails(&self, fails: bool) {
        self.state.lock().fail_listing = fails;
    }

    /// Commands issued so far, in order
    pub fn commands(&self) -> Vec<RuntimeCommand> {
        self.state.lock().commands.clone()
    }

    /// Position of the first matching command
    pub fn position(&self, command: &RuntimeCommand) -> Option<usize> {
        self.state.lock().commands.iter().position(|c| c == command)
    }

    pub fn runtime_id_of(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|(_, container)| container.name == name)
            .map(|(id, _)| id.clone())
    }

    /// Observed state of a declared container, `None` once removed
    pub fn observed_state(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .containers
            .values()
            .find(|container| container.name == name)
            .map(|container| container.state.clone())
    }

    /// Let a running container exit with `code` right now
    pub fn exit(&self, name: &str, code: i64) {
        let Some(runtime_id) = self.runtime_id_of(name) else {
            return;
        };
        self.exit_by_id(&runtime_id, code);
    }

    /// Emit an event without touching container state
    pub fn inject(&self, event: RuntimeEvent) {
        let _ = self.signals.send(Signal::Event(event));
    }

    /// Break the event stream; the subscription reports the failure and ends
    pub fn fail_stream(&self, message: impl Into<String>) {
        let _ = self.signals.send(Signal::Fail(message.into()));
    }

    fn behavior_for_id(&self, runtime_id: &str) -> FakeBehavior {
        let state = self.state.lock();
        state
            .containers
            .get(runtime_id)
            .and_then(|container| state.behaviors.get(&container.name))
            .cloned()
            .unwrap_or_default()
    }

    fn emit(&self, kind: RuntimeEventKind, runtime_id: &str) {
        if self.behavior_for_id(runtime_id).silent {
            return;
        }
        let _ = self
            .signals
            .send(Signal::Event(RuntimeEvent::new(kind, runtime_id)));
    }

    fn exit_by_id(&self, runtime_id: &str, code: i64) {
        {
            let mut state = self.state.lock();
            let Some(container) = state.containers.get_mut(runtime_id) else {
                return;
            };
            if container.state != observed_states::RUNNING {
                return;
            }
            container.state = observed_states::EXITED.to_string();
            container.exit_code = code;
        }
        self.emit(RuntimeEventKind::ContainerDie, runtime_id);
    }

    fn record(&self, command: RuntimeCommand) {
        self.state.lock().commands.push(command);
    }

    fn name_of(&self, runtime_id: &str) -> RuntimeResult<String> {
        self.state
            .lock()
            .containers
            .get(runtime_id)
            .map(|container| container.name.clone())
            .ok_or_else(|| RuntimeError::not_found(runtime_id))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_container(&self, request: &CreateRequest) -> RuntimeResult<String> {
        let name = request.declared_name().unwrap_or(request.name.as_str()).to_string();
        self.record(RuntimeCommand::Create(name.clone()));

        let runtime_id = {
            let mut state = self.state.lock();
            if state
                .behaviors
                .get(&name)
                .is_some_and(|behavior| behavior.fail_create)
            {
                return Err(RuntimeError::command("create", &name, "scripted failure"));
            }
            state.next_id += 1;
            let runtime_id = format!("fake-{}", state.next_id);
            state.containers.insert(
                runtime_id.clone(),
                FakeContainer {
                    name,
                    session: request.labels.get(LABEL_SESSION).cloned(),
                    state: observed_states::CREATED.to_string(),
                    exit_code: 0,
                },
            );
            runtime_id
        };

        self.emit(RuntimeEventKind::ContainerCreate, &runtime_id);
        Ok(runtime_id)
    }

    async fn start_container(&self, runtime_id: &str) -> RuntimeResult<()> {
        let name = self.name_of(runtime_id)?;
        self.record(RuntimeCommand::Start(name.clone()));

        let behavior = self.behavior_for_id(runtime_id);
        if behavior.fail_start {
            return Err(RuntimeError::command("start", &name, "scripted failure"));
        }

        if let Some(container) = self.state.lock().containers.get_mut(runtime_id) {
            container.state = observed_states::RUNNING.to_string();
        }
        self.emit(RuntimeEventKind::ContainerStart, runtime_id);

        if let Some(after) = behavior.healthy_after {
            let runtime = self.clone();
            let runtime_id = runtime_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                if runtime.observed_state_by_id(&runtime_id).as_deref()
                    == Some(observed_states::RUNNING)
                {
                    runtime.emit(RuntimeEventKind::ContainerHealthy, &runtime_id);
                }
            });
        }

        if let Some((code, after)) = behavior.exit_after {
            let runtime = self.clone();
            let runtime_id = runtime_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                runtime.exit_by_id(&runtime_id, code);
            });
        }

        Ok(())
    }

    async fn stop_container(&self, runtime_id: &str, _timeout: Duration) -> RuntimeResult<()> {
        let name = self.name_of(runtime_id)?;
        self.record(RuntimeCommand::Stop(name.clone()));

        if self.behavior_for_id(runtime_id).fail_stop {
            return Err(RuntimeError::command("stop", &name, "scripted failure"));
        }

        let was_running = self.observed_state_by_id(runtime_id).as_deref()
            == Some(observed_states::RUNNING);
        if was_running {
            self.emit(RuntimeEventKind::ContainerKill, runtime_id);
            self.exit_by_id(runtime_id, STOPPED_EXIT_CODE);
        }
        self.emit(RuntimeEventKind::ContainerStop, runtime_id);
        Ok(())
    }

    async fn destroy_container(&self, runtime_id: &str) -> RuntimeResult<()> {
        let name = self.name_of(runtime_id)?;
        self.record(RuntimeCommand::Destroy(name.clone()));

        if self.behavior_for_id(runtime_id).fail_destroy {
            return Err(RuntimeError::command("destroy", &name, "scripted failure"));
        }

        if self.observed_state_by_id(runtime_id).as_deref() == Some(observed_states::RUNNING) {
            self.emit(RuntimeEventKind::ContainerKill, runtime_id);
            self.exit_by_id(runtime_id, STOPPED_EXIT_CODE);
        }
        // emitted before removal so the silent lookup still resolves
        self.emit(RuntimeEventKind::ContainerDestroy, runtime_id);
        self.state.lock().containers.remove(runtime_id);
        Ok(())
    }

    async fn exit_code(&self, runtime_id: &str) -> RuntimeResult<i64> {
        self.state
            .lock()
            .containers
            .get(runtime_id)
            .map(|container| container.exit_code)
            .ok_or_else(|| RuntimeError::not_found(runtime_id))
    }

    async fn list_containers(&self, session_id: &str) -> RuntimeResult<HashMap<String, String>> {
        let state = self.state.lock();
        if state.fail_listing {
            return Err(RuntimeError::Connection {
                message: "scripted listing failure".to_string(),
            });
        }
        Ok(state
            .containers
            .iter()
            .filter(|(_, container)| container.session.as_deref() == Some(session_id))
            .map(|(id, container)| (id.clone(), container.state.clone()))
            .collect())
    }

    async fn read_logs(
        &self,
        runtime_id: &str,
        cancel: CancellationToken,
        on_line: LineCallback<'_>,
    ) -> RuntimeResult<()> {
        self.name_of(runtime_id)?;
        for line in self.behavior_for_id(runtime_id).logs {
            on_line(line);
        }
        cancel.cancelled().await;
        Ok(())
    }

    async fn subscribe_events(
        &self,
        cancel: CancellationToken,
        on_event: EventCallback<'_>,
    ) -> RuntimeResult<()> {
        let Some(mut receiver) = self.subscription.lock().take() else {
            return Err(RuntimeError::Stream {
                message: "event stream already subscribed".to_string(),
            });
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                signal = receiver.recv() => match signal {
                    Some(Signal::Event(event)) => on_event(event),
                    Some(Signal::Fail(message)) => {
                        on_event(RuntimeEvent::stream_error(message.clone()));
                        return Err(RuntimeError::Stream { message });
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

impl FakeRuntime {
    fn observed_state_by_id(&self, runtime_id: &str) -> Option<String> {
        self.state
            .lock()
            .containers
            .get(runtime_id)
            .map(|container| container.state.clone())
    }
}
