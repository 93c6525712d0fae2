//! Command handlers for the `dk` binary.

pub mod completions;
pub mod monitor;
pub mod queue;
pub mod simulate;
