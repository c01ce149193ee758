//! Whole-session scenarios against the in-memory runtime

mod end_to_end;
mod healthchecks;
mod interrupts;
mod resync;
