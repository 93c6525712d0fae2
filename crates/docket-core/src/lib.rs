//! docket-core: optimistic work-queue synchronization for review dashboards.
//!
//! The crate is sans-I/O. [`engine::Engine`] owns all synchronization state
//! and communicates with the outside world through returned
//! [`engine::Effect`]s and `handle_*` completions; hosts (the TUI, the
//! simulation harness, tests) supply the clock and perform the I/O.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` at the API surface; stable [`error::ErrorCode`]s
//!   for anything shown to an operator.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`); no direct
//!   stderr writes from library code.
//! - **Time**: virtual milliseconds ([`model::Millis`]) passed in by the
//!   host. Library code never reads the wall clock.

pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod model;
pub mod push;
pub mod queue;
pub mod reconcile;
pub mod undo;

pub use engine::{Effect, Engine, PushEvent};
pub use model::Millis;
