//! Terminal user interface for docket.
//!
//! ## Entry points
//!
//! - [`monitor::run_monitor_tui`]: the live review queue dashboard.

pub mod monitor;
