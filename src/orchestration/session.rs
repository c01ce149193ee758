//! # Session
//!
//! The session owns the model, the event queue, the current phase and the
//! runtime handle. Its loop is the only place where the model is mutated:
//! dequeue one event, apply it, then let the current phase advance until it
//! settles.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::phase::{Phase, PhaseContext};
use super::report::SessionReport;
use super::{producers, reconcile};
use crate::config::{SessionSettings, TestdriveConfig};
use crate::constants::exit_codes;
use crate::error::{Result, TestdriveError};
use crate::events::{
    event_queue, Event, EventReceiver, EventSender, RuntimeEvent, RuntimeEventKind,
    WeakEventSender,
};
use crate::logging::log_phase_transition;
use crate::model::{ContainerStatus, Model};
use crate::output::OutputSink;
use crate::runtime::ContainerRuntime;

/// Number of interrupts after which the session gives up without cleanup
const ABORT_AFTER_INTERRUPTS: u32 = 3;

/// How a completed run ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Containers that failed or exited non-zero, in order of failure
    pub failed: Vec<String>,
    /// The run was abandoned after repeated interrupts
    pub aborted: bool,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !self.aborted && self.failed.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.aborted {
            exit_codes::ABORTED
        } else if !self.failed.is_empty() {
            exit_codes::CONTAINER_FAILED
        } else {
            exit_codes::SUCCESS
        }
    }
}

enum Flow {
    Continue,
    Abort,
}

/// Background task forwarding one container's output
struct LogFollower {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Session {
    id: Uuid,
    /// First block of the session id, used in runtime container names
    tag: String,
    model: Model,
    phase: Phase,
    transitions: Vec<Phase>,
    runtime: Arc<dyn ContainerRuntime>,
    settings: SessionSettings,
    output: Arc<dyn OutputSink>,
    /// Held until `run` hands it to the producers
    sender: Option<EventSender>,
    weak_sender: WeakEventSender,
    receiver: EventReceiver,
    cancel: CancellationToken,
    producers: Vec<JoinHandle<()>>,
    log_followers: HashMap<String, LogFollower>,
    interrupts: u32,
    failed: Vec<String>,
    queue_closed: bool,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("containers", &self.model.len())
            .field("interrupts", &self.interrupts)
            .finish()
    }
}

impl Session {
    /// Seed a session with one `New` container per declared service and task
    pub fn new(
        config: &TestdriveConfig,
        settings: SessionSettings,
        runtime: Arc<dyn ContainerRuntime>,
        output: Arc<dyn OutputSink>,
    ) -> Result<Self> {
        settings.validate()?;
        let model = Model::from_config(config)?;
        let id = Uuid::new_v4();
        let tag = id.simple().to_string()[..8].to_string();
        let (sender, receiver) = event_queue();

        info!(
            session_id = %id,
            containers = model.len(),
            "🏗️ SESSION: Created session"
        );

        Ok(Self {
            id,
            tag,
            model,
            phase: Phase::Startup,
            transitions: vec![Phase::Startup],
            runtime,
            settings,
            output,
            weak_sender: sender.downgrade(),
            sender: Some(sender),
            receiver,
            cancel: CancellationToken::new(),
            producers: Vec::new(),
            log_followers: HashMap::new(),
            interrupts: 0,
            failed: Vec::new(),
            queue_closed: false,
            started_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase the session has been in, in order
    pub fn transitions(&self) -> &[Phase] {
        &self.transitions
    }

    /// Summary of the session so far, for auditing after a run
    pub fn report(&self, outcome: &RunOutcome) -> SessionReport {
        SessionReport::new(
            self.id,
            self.started_at,
            &self.transitions,
            &self.model,
            outcome,
        )
    }

    /// Handle for enqueueing events from outside the session; `None` once
    /// the queue has closed
    pub fn sender(&self) -> Option<EventSender> {
        self.sender.clone().or_else(|| self.weak_sender.upgrade())
    }

    /// Drive the session until it terminates, aborts or hits a command error.
    ///
    /// Once running, the queue stays open only while some producer or
    /// external handle holds a sender. Producers are cancelled and joined on
    /// every exit path.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let Some(sender) = self.sender.take() else {
            return Err(TestdriveError::orchestration("session has already run"));
        };
        info!("🚀 SESSION: Starting");
        self.started_at = Utc::now();
        self.start_producers(sender).await;

        let result = self.drive().await;

        self.stop_producers().await;
        match &result {
            Ok(outcome) if outcome.aborted => warn!("Session aborted before cleanup completed"),
            Ok(outcome) => info!(failed = ?outcome.failed, "✅ SESSION: Finished"),
            Err(e) => warn!(error = %e, "Session ended with an error"),
        }
        result
    }

    async fn start_producers(&mut self, sender: EventSender) {
        self.producers.push(producers::spawn_event_subscriber(
            Arc::clone(&self.runtime),
            sender.clone(),
            self.cancel.child_token(),
        ));
        self.producers.push(producers::spawn_ticker(
            sender.clone(),
            self.settings.resync_interval(),
            self.cancel.child_token(),
        ));
        self.producers.push(producers::spawn_interrupt_listener(
            sender,
            self.cancel.child_token(),
        ));
        // give the subscription a chance to attach before the first create
        tokio::task::yield_now().await;
    }

    async fn stop_producers(&mut self) {
        self.cancel.cancel();
        let followers = self.log_followers.drain().map(|(_, follower)| follower.handle);
        let handles: Vec<JoinHandle<()>> = self.producers.drain(..).chain(followers).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Producer task did not finish cleanly");
            }
        }
        debug!("Producers stopped");
    }

    async fn drive(&mut self) -> Result<RunOutcome> {
        self.advance().await?;

        while !self.phase.is_terminal() {
            let event = self.receiver.recv().await;
            debug!(phase = %self.phase, event = ?event, "Dequeued event");

            if let Flow::Abort = self.handle_event(event).await? {
                return Ok(self.outcome(true));
            }
            self.advance().await?;
            self.reap_log_followers();
        }

        Ok(self.outcome(false))
    }

    fn outcome(&self, aborted: bool) -> RunOutcome {
        RunOutcome {
            failed: self.failed.clone(),
            aborted,
        }
    }

    /// Advance the current phase until it stops changing
    async fn advance(&mut self) -> Result<()> {
        let session_id = self.id.to_string();
        loop {
            let current = self.phase;
            let mut context = PhaseContext {
                model: &mut self.model,
                runtime: self.runtime.as_ref(),
                settings: &self.settings,
                session_id: &session_id,
                session_tag: &self.tag,
            };
            let next = current.advance(&mut context).await?;
            if next == current {
                return Ok(());
            }
            self.enter(next, current.completion_reason());
        }
    }

    fn enter(&mut self, next: Phase, reason: &str) {
        log_phase_transition(&self.phase.to_string(), &next.to_string(), reason);
        self.phase = next;
        self.transitions.push(next);
    }

    /// Jump forward to `target`; never moves the session backwards
    fn escalate(&mut self, target: Phase, reason: &str) {
        if target > self.phase {
            self.enter(target, reason);
        } else {
            debug!(phase = %self.phase, requested = %target, "Already past requested phase");
        }
    }

    async fn handle_event(&mut self, event: Option<Event>) -> Result<Flow> {
        let Some(event) = event else {
            if self.queue_closed {
                return Err(TestdriveError::orchestration(
                    "event queue closed before the session terminated",
                ));
            }
            warn!("Event queue closed");
            self.queue_closed = true;
            self.escalate(Phase::Shutdown, "event queue closed");
            return Ok(Flow::Continue);
        };

        match event {
            Event::Tick => self.resync().await,
            Event::Interrupt => return Ok(self.interrupt()),
            Event::Log { container, line } => self.output.container_output(&container, &line),
            Event::Runtime(event) => self.handle_runtime_event(event).await,
        }
        Ok(Flow::Continue)
    }

    fn interrupt(&mut self) -> Flow {
        self.interrupts += 1;
        match self.interrupts {
            1 => {
                info!("Interrupted, stopping containers");
                self.escalate(Phase::Shutdown, "interrupt");
                Flow::Continue
            }
            2 => {
                info!("Interrupted again, destroying containers");
                self.escalate(Phase::Cleanup, "second interrupt");
                Flow::Continue
            }
            n if n >= ABORT_AFTER_INTERRUPTS => {
                warn!(interrupts = n, "Interrupted repeatedly, aborting");
                Flow::Abort
            }
            _ => Flow::Continue,
        }
    }

    async fn resync(&mut self) {
        let session_id = self.id.to_string();
        match reconcile::resync(
            &mut self.model,
            self.runtime.as_ref(),
            &session_id,
            self.settings.event_timeout(),
        )
        .await
        {
            Ok(0) => {}
            Ok(changes) => {
                debug!(changes, "State sync corrected containers");
                self.follow_running_containers();
            }
            Err(e) => warn!(error = %e, "State sync failed, will retry on next tick"),
        }
    }

    async fn handle_runtime_event(&mut self, event: RuntimeEvent) {
        match &event.kind {
            RuntimeEventKind::StreamError => {
                warn!(
                    message = event.message.as_deref().unwrap_or(""),
                    "Runtime event stream failed, relying on state sync"
                );
                return;
            }
            RuntimeEventKind::ImagePull | RuntimeEventKind::NetworkConnect => {
                debug!(event = %Event::Runtime(event.clone()), "Runtime notice");
                return;
            }
            // die is the single source of truth for termination
            RuntimeEventKind::ContainerStop | RuntimeEventKind::ContainerKill => return,
            RuntimeEventKind::Other(event_type) => {
                debug!(
                    event_type = %event_type,
                    runtime_id = %event.runtime_id,
                    "Ignoring unrecognized runtime event"
                );
                return;
            }
            _ => {}
        }

        let Some(container) = self.model.find_by_runtime_id(&event.runtime_id) else {
            warn!(
                runtime_id = %event.runtime_id,
                event_type = event.kind.as_str(),
                "Event for unknown container"
            );
            return;
        };
        let name = container.name.clone();
        let status = container.status;
        let has_healthcheck = container.config.has_healthcheck();

        match event.kind {
            RuntimeEventKind::ContainerCreate => {
                if matches!(status, ContainerStatus::New | ContainerStatus::Creating) {
                    self.model.mark_created(&name);
                } else {
                    debug!(container = %name, status = %status, "Stale create event");
                }
            }
            RuntimeEventKind::ContainerStart => {
                // state sync may have promoted the container before this arrived
                let promoted = matches!(status, ContainerStatus::Started | ContainerStatus::Ready);
                let starting = matches!(
                    status,
                    ContainerStatus::New
                        | ContainerStatus::Creating
                        | ContainerStatus::Created
                        | ContainerStatus::Starting
                );
                if promoted || starting {
                    self.follow_logs(&name, &event.runtime_id);
                }
                if !starting {
                    debug!(container = %name, status = %status, "Stale start event");
                    return;
                }
                if has_healthcheck {
                    self.model.mark_started(&name);
                } else {
                    self.model.mark_ready(&name);
                }
            }
            RuntimeEventKind::ContainerHealthy => {
                if status == ContainerStatus::Started {
                    self.model.mark_ready(&name);
                }
            }
            RuntimeEventKind::ContainerUnhealthy => {
                warn!(container = %name, "Container reported unhealthy");
            }
            RuntimeEventKind::ContainerDie => {
                self.container_died(&name, &event.runtime_id, status).await
            }
            RuntimeEventKind::ContainerDestroy => {
                self.model.mark_destroyed(&name);
                self.reap_log_followers();
            }
            _ => {}
        }
    }

    async fn container_died(&mut self, name: &str, runtime_id: &str, status: ContainerStatus) {
        match status {
            ContainerStatus::Stopping => {
                self.model.mark_stopped(name);
                return;
            }
            ContainerStatus::Destroying
            | ContainerStatus::Destroyed
            | ContainerStatus::Stopped
            | ContainerStatus::Failed => {
                debug!(container = %name, status = %status, "Ignoring die event");
                return;
            }
            _ => {}
        }

        let exit_code = match self.runtime.exit_code(runtime_id).await {
            Ok(code) => Some(code),
            Err(e) => {
                warn!(container = %name, error = %e, "Cannot read exit code");
                None
            }
        };

        if exit_code == Some(0) {
            self.model.mark_stopped(name);
            return;
        }

        warn!(container = %name, exit_code = ?exit_code, "Container exited unexpectedly");
        self.model.mark_failed(name);
        if !self.failed.iter().any(|failed| failed == name) {
            self.failed.push(name.to_string());
        }
        if self.phase < Phase::Shutdown {
            self.escalate(Phase::Shutdown, "container failed");
        }
    }

    fn follow_logs(&mut self, name: &str, runtime_id: &str) {
        if self.log_followers.contains_key(name) {
            return;
        }
        let Some(sender) = self.weak_sender.upgrade() else {
            debug!(container = %name, "Event queue closed, not following logs");
            return;
        };
        let cancel = self.cancel.child_token();
        let handle = producers::spawn_log_follower(
            Arc::clone(&self.runtime),
            runtime_id.to_string(),
            name.to_string(),
            sender,
            cancel.clone(),
        );
        self.log_followers
            .insert(name.to_string(), LogFollower { cancel, handle });
    }

    /// Follow containers that state sync found running without a start event
    fn follow_running_containers(&mut self) {
        let running: Vec<(String, String)> = self
            .model
            .containers()
            .filter(|c| matches!(c.status, ContainerStatus::Started | ContainerStatus::Ready))
            .filter(|c| !self.log_followers.contains_key(&c.name))
            .filter_map(|c| Some((c.name.clone(), c.runtime_id.clone()?)))
            .collect();

        for (name, runtime_id) in running {
            self.follow_logs(&name, &runtime_id);
        }
    }

    /// Stop following the output of destroyed containers
    fn reap_log_followers(&mut self) {
        let model = &self.model;
        self.log_followers.retain(|name, follower| {
            let destroyed = model.status_of(name) == Some(ContainerStatus::Destroyed);
            if destroyed {
                follower.cancel.cancel();
            }
            !destroyed
        });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
