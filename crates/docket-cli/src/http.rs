//! HTTP host for the engine: snapshot polls, action mutations, and the
//! server-sent-events push channel.
//!
//! Every request runs on a spawned thread and reports back over an mpsc
//! channel as a [`HostEvent`], so the render loop never blocks on the
//! network. Errors cross the channel as strings; the engine decides what
//! is fatal and what is a notice.

use std::io::{BufRead, BufReader};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use docket_core::engine::PushEvent;
use docket_core::model::{ActionRef, SignalKind, Snapshot};
use docket_core::undo::UndoToken;

/// A completed request or push event, delivered to the render loop.
#[derive(Debug)]
pub enum HostEvent {
    Poll {
        generation: u64,
        result: Result<Snapshot, String>,
    },
    Commit {
        token: UndoToken,
        result: Result<(), String>,
    },
    Mutate {
        seq: u64,
        result: Result<(), String>,
    },
    Push(PushEvent),
}

/// Blocking HTTP client for the review service.
#[derive(Debug, Clone)]
pub struct Client {
    agent: ureq::Agent,
    base_url: String,
}

impl Client {
    /// Build a client for `base_url` (no trailing slash).
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(10))
                .build(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Fetch a full snapshot synchronously.
    ///
    /// # Errors
    ///
    /// Returns the transport or decode error as a display string.
    pub fn fetch_snapshot(&self) -> Result<Snapshot, String> {
        self.agent
            .get(&self.url("/api/snapshot"))
            .call()
            .map_err(|e| e.to_string())?
            .into_json::<Snapshot>()
            .map_err(|e| e.to_string())
    }

    /// Apply a decision synchronously.
    ///
    /// # Errors
    ///
    /// Returns the transport error as a display string.
    pub fn apply_action(&self, action: &ActionRef) -> Result<(), String> {
        self.agent
            .post(&self.url("/api/actions"))
            .send_json(action)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Poll on a worker thread; the result lands on `tx`.
    pub fn spawn_poll(&self, generation: u64, tx: Sender<HostEvent>) {
        let client = self.clone();
        thread::spawn(move || {
            let result = client.fetch_snapshot();
            let _ = tx.send(HostEvent::Poll { generation, result });
        });
    }

    /// Run a committed destructive action on a worker thread.
    pub fn spawn_commit(&self, token: UndoToken, action: ActionRef, tx: Sender<HostEvent>) {
        let client = self.clone();
        thread::spawn(move || {
            let result = client.apply_action(&action);
            let _ = tx.send(HostEvent::Commit { token, result });
        });
    }

    /// Run an immediate mutation on a worker thread.
    pub fn spawn_mutate(&self, seq: u64, action: ActionRef, tx: Sender<HostEvent>) {
        let client = self.clone();
        thread::spawn(move || {
            let result = client.apply_action(&action);
            let _ = tx.send(HostEvent::Mutate { seq, result });
        });
    }

    /// Open the push subscription on a worker thread.
    ///
    /// Sends `Opened` once the stream is established, one `Signal` per
    /// recognized event, and a final `Closed` when the stream ends for any
    /// reason. The engine owns the reconnect schedule; this function never
    /// retries on its own.
    pub fn spawn_subscribe(&self, tx: Sender<HostEvent>) {
        let client = self.clone();
        thread::spawn(move || {
            let response = match client.agent.get(&client.url("/api/events")).call() {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(error = %err, "push subscription failed to open");
                    let _ = tx.send(HostEvent::Push(PushEvent::Closed));
                    return;
                }
            };
            let _ = tx.send(HostEvent::Push(PushEvent::Opened));

            let reader = BufReader::new(response.into_reader());
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if let Some(kind) = parse_sse_event(&line)
                    && tx.send(HostEvent::Push(PushEvent::Signal(kind))).is_err()
                {
                    return;
                }
            }
            let _ = tx.send(HostEvent::Push(PushEvent::Closed));
        });
    }
}

/// Parse one server-sent-events line into a signal category.
///
/// Only `event:` lines matter; payload and comment lines are ignored, and
/// unrecognized categories are dropped rather than failing the stream.
fn parse_sse_event(line: &str) -> Option<SignalKind> {
    let name = line.strip_prefix("event:")?.trim();
    name.parse().ok()
}
