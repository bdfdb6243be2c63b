//! Reconciliation scheduler for floe.
//!
//! The [`Scheduler`] accepts desired-state pushes, serializes execution
//! per CID through a work ring, drives the hot and cold executors
//! according to the reconciliation policy, runs the renew and repair
//! control loops, and exposes watchable job and log event streams.
//!
//! Durability: every job transition is persisted before it is published;
//! on startup any non-terminal job is requeued and re-executed, so
//! workers must tolerate side effects that are already partly present
//! (reconciliation is idempotent).

mod error;
mod ring;
mod scheduler;

pub use error::SchedError;
pub use scheduler::{Scheduler, SchedulerConfig};
