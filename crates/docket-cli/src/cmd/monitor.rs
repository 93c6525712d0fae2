//! `dk monitor`: the live review queue dashboard.

use anyhow::Result;
use clap::Args;

use docket_core::config::UserConfig;

use crate::http::Client;
use crate::tui::monitor::run_monitor_tui;

/// Arguments for `dk monitor`.
#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Jump to this case on startup (deep link).
    #[arg(long)]
    pub case: Option<u64>,
}

/// Execute `dk monitor`: run the full-screen dashboard until quit.
///
/// # Errors
///
/// Returns an error on invalid config or terminal failure.
pub fn run_monitor(args: &MonitorArgs, base_url: &str, config: &UserConfig) -> Result<()> {
    let client = Client::new(base_url);
    run_monitor_tui(client, config.engine, args.case)
}
