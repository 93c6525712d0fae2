#![forbid(unsafe_code)]

mod cmd;
mod http;
mod output;
mod tui;

use std::env;

use anyhow::{Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use docket_core::config::{load_user_config, resolve_base_url};
use output::OutputMode;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "docket: records-request review dashboard",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Backend base URL (overrides DOCKET_URL and the config file).
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Open the live review queue dashboard",
        long_about = "Full-screen dashboard that keeps the review queue synchronized: \
                      recurring polls, push invalidation, optimistic actions with a \
                      5-second undo window.",
        after_help = "EXAMPLES:\n    # Open the dashboard\n    dk monitor\n\n    # Jump straight to a case\n    dk monitor --case 42"
    )]
    Monitor(cmd::monitor::MonitorArgs),

    #[command(
        about = "Print the current review queue",
        long_about = "Fetch one snapshot and print the projected queue, without opening \
                      the dashboard.",
        after_help = "EXAMPLES:\n    # Print the queue\n    dk queue\n\n    # Only proposals, as JSON\n    dk queue --kind proposal --json"
    )]
    Queue(cmd::queue::QueueArgs),

    #[command(
        about = "Run deterministic simulation campaigns",
        long_about = "Execute seeded fault-injection sessions against the synchronization \
                      engine and report invariant verdicts. Works offline; no backend is \
                      contacted.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    dk simulate\n\n    # Replay a failing seed\n    dk simulate --seed 42\n\n    # Machine-readable output\n    dk simulate --seeds 200 --faults 0.4 --json"
    )]
    Simulate(cmd::simulate::SimulateArgs),

    #[command(
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    # Bash completions\n    dk completions bash > /etc/bash_completion.d/dk"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DOCKET_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "docket=debug,info"
        } else {
            "docket=info,warn"
        })
    });

    let format = env::var("DOCKET_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry.with(fmt::layer().json().with_ansi(false)).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let config = load_user_config()?;
    let output = cli.output_mode();

    match cli.command {
        Commands::Monitor(ref args) => {
            let base_url = require_base_url(&cli, &config)?;
            cmd::monitor::run_monitor(args, &base_url, &config)
        }
        Commands::Queue(ref args) => {
            let base_url = require_base_url(&cli, &config)?;
            let client = http::Client::new(&base_url);
            cmd::queue::run_queue(args, output, &client)
        }
        Commands::Simulate(ref args) => cmd::simulate::run_simulate(args, output),
        Commands::Completions(args) => {
            cmd::completions::run_completions(args.shell, &mut Cli::command())
        }
    }
}

fn require_base_url(cli: &Cli, config: &docket_core::config::UserConfig) -> Result<String> {
    let env_url = env::var("DOCKET_URL").ok();
    resolve_base_url(cli.base_url.as_deref(), env_url.as_deref(), config)
        .ok_or_else(|| anyhow!("no backend configured; pass --base-url or set DOCKET_URL"))
}
