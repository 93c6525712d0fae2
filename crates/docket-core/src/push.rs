//! Push-channel connection state machine.
//!
//! The channel is a long-lived, self-healing subscription that only ever
//! delivers invalidation categories; payloads are untrusted by contract.
//! Connection lifecycle:
//!
//! ```text
//! Connecting -> Open -> (Error -> wait fixed delay -> Connecting) ...
//! ```
//!
//! Exactly one underlying connection may be live at a time and at most one
//! reconnect may be pending. The delay is fixed (no backoff): the channel is
//! best-effort and the periodic poll covers any gap. The machine owns no
//! sockets: it tells the engine *when* to emit a `Connect` effect, and the
//! host reports open/close back.

use crate::model::{ConnectionState, Millis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Not yet started.
    Idle,
    /// A `Connect` effect is outstanding; the host has not reported back.
    Connecting,
    /// The host reported the subscription open.
    Open,
    /// Closed or errored; a reconnect is scheduled.
    Waiting { reconnect_at: Millis },
    /// Torn down; every transition is a no-op from here.
    Disposed,
}

/// Reconnecting channel supervisor.
#[derive(Debug)]
pub struct PushChannel {
    phase: Phase,
    reconnect_delay: Millis,
}

impl PushChannel {
    /// Create an idle channel with the configured fixed reconnect delay.
    #[must_use]
    pub const fn new(reconnect_delay: Millis) -> Self {
        Self {
            phase: Phase::Idle,
            reconnect_delay,
        }
    }

    /// Begin connecting. Returns true when the caller must emit a `Connect`
    /// effect. No-op unless the channel is idle.
    pub fn start(&mut self) -> bool {
        if self.phase == Phase::Idle {
            self.phase = Phase::Connecting;
            true
        } else {
            false
        }
    }

    /// Host reports the subscription is open. Ignored unless a connect is
    /// actually outstanding; a late open from an already-replaced
    /// connection must not flip state.
    pub fn on_opened(&mut self) {
        if self.phase == Phase::Connecting {
            self.phase = Phase::Open;
        }
    }

    /// Host reports the connection failed or closed. Schedules exactly one
    /// reconnect attempt after the fixed delay; a reconnect already pending
    /// is left alone so errors cannot stack attempts.
    pub fn on_closed(&mut self, now: Millis) {
        match self.phase {
            Phase::Connecting | Phase::Open => {
                self.phase = Phase::Waiting {
                    reconnect_at: now + self.reconnect_delay,
                };
                tracing::debug!(delay_millis = self.reconnect_delay, "push channel closed");
            }
            Phase::Idle | Phase::Waiting { .. } | Phase::Disposed => {}
        }
    }

    /// Fire the reconnect timer if due. Returns true when the caller must
    /// emit a `Connect` effect.
    pub fn tick(&mut self, now: Millis) -> bool {
        if let Phase::Waiting { reconnect_at } = self.phase
            && reconnect_at <= now
        {
            self.phase = Phase::Connecting;
            return true;
        }
        false
    }

    /// Tear down: cancels any pending reconnect and pins the machine so no
    /// further callbacks can transition it.
    pub fn dispose(&mut self) {
        self.phase = Phase::Disposed;
    }

    /// Whether the subscription is currently open.
    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        ConnectionState {
            connected: self.phase == Phase::Open,
        }
    }

    /// Pending reconnect deadline, for the engine's timer bookkeeping.
    #[must_use]
    pub const fn reconnect_at(&self) -> Option<Millis> {
        match self.phase {
            Phase::Waiting { reconnect_at } => Some(reconnect_at),
            _ => None,
        }
    }
}
