//! `dk queue`: one-shot snapshot of the review queue.

use std::io::Write;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use clap::Args;
use serde::Serialize;

use docket_core::model::{ItemKind, WorkItem};
use docket_core::queue::{self, ExclusionSet};

use crate::http::Client;
use crate::output::{OutputMode, pretty_section};

/// Arguments for `dk queue`.
#[derive(Args, Debug)]
pub struct QueueArgs {
    /// Restrict to one item kind (`proposal` or `review`).
    #[arg(long)]
    pub kind: Option<String>,
}

/// JSON output for `dk queue`.
#[derive(Debug, Serialize)]
struct QueueOutput {
    open_requests: u32,
    pending_reviews: u32,
    items: Vec<WorkItem>,
}

/// Execute `dk queue`: fetch one snapshot and print the projected queue.
///
/// # Errors
///
/// Returns an error on a failed fetch or an unknown kind filter.
pub fn run_queue(args: &QueueArgs, output: OutputMode, client: &Client) -> Result<()> {
    let kind_filter = args
        .kind
        .as_deref()
        .map(ItemKind::from_str)
        .transpose()
        .map_err(|e| anyhow!("{e}"))?;

    let snapshot = client
        .fetch_snapshot()
        .map_err(|e| anyhow!("snapshot fetch failed: {e}"))?;
    let items = queue::project(&snapshot, &ExclusionSet::default(), kind_filter);

    if output.is_json() {
        let out = QueueOutput {
            open_requests: snapshot.open_requests,
            pending_reviews: snapshot.pending_reviews,
            items,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    pretty_section(
        &mut stdout,
        &format!(
            "Queue ({} open, {} pending review)",
            snapshot.open_requests, snapshot.pending_reviews
        ),
    )?;
    for item in &items {
        writeln!(
            stdout,
            "{:<10} case {:<6} {}",
            item.kind().to_string(),
            item.case_id(),
            item.case_name()
        )?;
    }
    if items.is_empty() {
        writeln!(stdout, "(queue is empty)")?;
    }
    Ok(())
}
