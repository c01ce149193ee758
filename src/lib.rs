#![allow(clippy::doc_markdown)] // Allow technical terms like YAML, SIGINT in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Testdrive
//!
//! Orchestrates a small graph of containerized services and one-shot tasks
//! for integration test runs.
//!
//! ## Overview
//!
//! Services are created and started in dependency order until every one of
//! them is ready. Tasks then run once each, waiting for their service
//! dependencies to be ready and their task dependencies to have exited
//! cleanly. When every task has finished, or a container exits non-zero, or
//! the user interrupts, everything is stopped and destroyed.
//!
//! ## Architecture
//!
//! All state changes happen in one consumer loop. Background producers only
//! enqueue events: runtime lifecycle events, container output lines, resync
//! ticks and interrupts. Each dequeued event is applied to the model, then
//! the current [`orchestration::Phase`] advances and issues runtime commands.
//! A periodic resync compares the model against the runtime and makes up for
//! confirmation events that arrived late or not at all.
//!
//! ## Module Organization
//!
//! - [`config`] - Declared document and session settings
//! - [`model`] - Containers, statuses and readiness queries
//! - [`events`] - Event types and the event queue
//! - [`runtime`] - Container runtime contract, Docker adapter and in-memory fake
//! - [`orchestration`] - Phases, session loop, resync and producers
//! - [`output`] - Destinations for container output
//! - [`error`] - Structured error handling
//! - [`logging`] - Subscriber setup for the binary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use testdrive::config::{loader, SessionSettings};
//! use testdrive::output::ConsoleOutput;
//! use testdrive::runtime::docker::DockerRuntime;
//! use testdrive::Session;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let document = loader::load_config_file(Path::new("testdrive.yaml"))?;
//! let runtime = Arc::new(DockerRuntime::connect()?);
//!
//! let mut session = Session::new(
//!     &document,
//!     SessionSettings::default(),
//!     runtime,
//!     Arc::new(ConsoleOutput::new()),
//! )?;
//! let outcome = session.run().await?;
//! println!("exit code {}", outcome.exit_code());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! [`runtime::fake::FakeRuntime`] scripts runtime behaviour per container so
//! whole sessions can run under paused tokio time:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod orchestration;
pub mod output;
pub mod runtime;

pub use config::{ContainerConfig, HealthcheckConfig, SessionSettings, TestdriveConfig};
pub use error::{Result, TestdriveError};
pub use events::{Event, RuntimeEvent, RuntimeEventKind};
pub use model::{Container, ContainerStatus, ContainerType, Model};
pub use orchestration::{Phase, RunOutcome, Session};
pub use runtime::{ContainerRuntime, RuntimeError};
