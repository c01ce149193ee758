//! # Orchestration Engine
//!
//! Drives a declared group of services and tasks from creation to teardown.
//!
//! ## Core Components
//!
//! - [`Session`] - owns the model and the event queue and runs the single consumer loop
//! - [`Phase`] - the `Startup → Running → Shutdown → Cleanup → Terminated` state machine
//! - [`reconcile`] - tick-triggered comparison of believed and observed container state
//! - [`producers`] - ticker, interrupt listener, runtime event subscriber and log followers
//! - [`report`] - serializable audit of a finished session

pub mod phase;
pub mod producers;
pub mod reconcile;
pub mod report;
pub mod session;

pub use phase::{Phase, PhaseContext};
pub use reconcile::Decision;
pub use report::{ContainerReport, SessionReport};
pub use session::{RunOutcome, Session};
