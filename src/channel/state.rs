// src/channel/state.rs
//! Channel state machine. `transition` is a pure function of
//! (state, event) -> (next state, effects); the runtime in `channel::mod`
//! only executes effects and feeds events back.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use super::backoff::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionStatus {
    /// Numeric form for the `channel_state` gauge.
    pub fn as_gauge(&self) -> f64 {
        match self {
            ConnectionStatus::Connecting => 0.0,
            ConnectionStatus::Connected => 1.0,
            ConnectionStatus::Disconnected => 2.0,
            ConnectionStatus::Failed => 3.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Failed => "FAILED",
        }
    }

    /// A manual re-trigger only does something once the link is down.
    pub fn accepts_retrigger(&self) -> bool {
        matches!(self, ConnectionStatus::Failed | ConnectionStatus::Disconnected)
    }
}

/// Timing and retry limits the machine needs.
#[derive(Debug, Clone, Copy)]
pub struct ChannelPolicy {
    pub liveness_timeout: Duration,
    pub backoff: Backoff,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub status: ConnectionStatus,
    pub retry_count: u32,
    pub last_ack: Option<Instant>,
    /// Time of the oldest probe not yet acknowledged.
    pub awaiting_ack_since: Option<Instant>,
}

impl ChannelState {
    /// Process start: the first connection attempt is already under way.
    pub fn initial() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            retry_count: 0,
            last_ack: None,
            awaiting_ack_since: None,
        }
    }

    /// When the liveness timeout fires for the outstanding probe, if any.
    /// A deadline past the clock's range means there is none.
    pub fn liveness_deadline(&self, timeout: Duration) -> Option<Instant> {
        match self.status {
            ConnectionStatus::Connected => self.awaiting_ack_since.and_then(|t| t.checked_add(timeout)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened { at: Instant },
    ConnectFailed,
    Closed,
    ProbeDue { at: Instant },
    AckReceived { at: Instant },
    LivenessCheck { at: Instant },
    ReconnectDue,
    /// Manual re-trigger; the only way out of FAILED.
    Retrigger,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenConnection,
    StartHeartbeat,
    StopHeartbeat,
    SendProbe,
    /// Drop the socket without waiting for the peer.
    ForceClose,
    /// Jitter is added by the runtime on top of `base_delay`.
    ScheduleReconnect { retry: u32, base_delay: Duration },
    CancelReconnect,
    ReportFailed { retries: u32 },
}

pub fn transition(state: &ChannelState, event: &ChannelEvent, policy: &ChannelPolicy) -> (ChannelState, Vec<Effect>) {
    use ConnectionStatus::*;

    let mut next = state.clone();
    let mut effects = Vec::new();

    match (state.status, event) {
        (_, ChannelEvent::Shutdown) => {
            next.status = Disconnected;
            next.awaiting_ack_since = None;
            effects.extend([Effect::CancelReconnect, Effect::StopHeartbeat, Effect::ForceClose]);
        }

        (Connecting, ChannelEvent::Opened { at }) => {
            next.status = Connected;
            next.retry_count = 0;
            next.last_ack = Some(*at);
            next.awaiting_ack_since = None;
            effects.push(Effect::StartHeartbeat);
        }

        (Connecting, ChannelEvent::ConnectFailed) | (Connected, ChannelEvent::Closed) => {
            next.awaiting_ack_since = None;
            effects.push(Effect::StopHeartbeat);
            let exhausted = policy.max_retries.is_some_and(|max| state.retry_count >= max);
            if exhausted {
                next.status = Failed;
                effects.push(Effect::ReportFailed {
                    retries: state.retry_count,
                });
            } else {
                next.status = Disconnected;
                effects.push(Effect::ScheduleReconnect {
                    retry: state.retry_count,
                    base_delay: policy.backoff.base_delay(state.retry_count),
                });
                next.retry_count = state.retry_count.saturating_add(1);
            }
        }

        (Connected, ChannelEvent::ProbeDue { at }) => {
            if liveness_expired(state, *at, policy) {
                effects.push(Effect::ForceClose);
            } else {
                next.awaiting_ack_since = Some(state.awaiting_ack_since.unwrap_or(*at));
                effects.push(Effect::SendProbe);
            }
        }

        (Connected, ChannelEvent::LivenessCheck { at }) => {
            if liveness_expired(state, *at, policy) {
                effects.push(Effect::ForceClose);
            }
        }

        (Connected, ChannelEvent::AckReceived { at }) => {
            next.last_ack = Some(*at);
            next.awaiting_ack_since = None;
        }

        (Disconnected, ChannelEvent::ReconnectDue) => {
            next.status = Connecting;
            effects.push(Effect::OpenConnection);
        }

        (Failed, ChannelEvent::Retrigger) | (Disconnected, ChannelEvent::Retrigger) => {
            next.status = Connecting;
            next.retry_count = 0;
            effects.extend([Effect::CancelReconnect, Effect::OpenConnection]);
        }

        // Anything else is stale (e.g. an ack racing a close) and ignored.
        _ => {}
    }

    (next, effects)
}

fn liveness_expired(state: &ChannelState, now: Instant, policy: &ChannelPolicy) -> bool {
    state
        .awaiting_ack_since
        .is_some_and(|since| now.saturating_duration_since(since) >= policy.liveness_timeout)
}
