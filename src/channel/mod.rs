// src/channel/mod.rs
//! Channel manager: keeps the live classification feed connected.
//!
//! One spawned task owns the connection, the heartbeat interval and the
//! reconnect timer. Decisions come from `state::transition`; this module only
//! executes the effects it returns and turns I/O into events. Frames are
//! handled in arrival order, one at a time.

pub mod backoff;
pub mod protocol;
pub mod state;
pub mod transport;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::ChannelConfig;
use crate::ingest::{IngestPath, Ingestor};
use backoff::Backoff;
use protocol::InboundFrame;
use state::{transition, ChannelEvent, ChannelPolicy, ChannelState, ConnectionStatus, Effect};
use transport::{Connector, Transport};

/// What consumers (the API, logs) see of the channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub endpoint: String,
    pub status: ConnectionStatus,
    pub retry_count: u32,
    pub last_ack_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub frames_received: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reconnect,
    Shutdown,
}

/// Cloneable control surface: status watch + command sender.
#[derive(Clone)]
pub struct ChannelControl {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ChannelSnapshot>,
}

impl ChannelControl {
    pub fn snapshot(&self) -> ChannelSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelSnapshot> {
        self.status.clone()
    }

    /// Manual re-trigger. Returns false if the manager is gone.
    pub async fn reconnect(&self) -> bool {
        self.commands.send(Command::Reconnect).await.is_ok()
    }
}

/// Owner handle; `shutdown` stops the task and waits for it.
pub struct ChannelHandle {
    control: ChannelControl,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    pub fn control(&self) -> ChannelControl {
        self.control.clone()
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        self.control.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelSnapshot> {
        self.control.subscribe()
    }

    pub async fn reconnect(&self) -> bool {
        self.control.reconnect().await
    }

    pub async fn shutdown(self) {
        let _ = self.control.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(target: "channel", error = %e, "channel task ended abnormally");
        }
    }
}

pub struct ChannelManager {
    connector: Arc<dyn Connector>,
    ingestor: Arc<Ingestor>,
    policy: ChannelPolicy,
    heartbeat_interval: Duration,
}

impl ChannelManager {
    pub fn new(connector: Arc<dyn Connector>, ingestor: Arc<Ingestor>, cfg: &ChannelConfig) -> Self {
        Self {
            connector,
            ingestor,
            policy: ChannelPolicy {
                liveness_timeout: cfg.liveness_timeout(),
                backoff: Backoff::from_config(cfg),
                max_retries: cfg.max_retries,
            },
            heartbeat_interval: cfg.heartbeat_interval(),
        }
    }

    pub fn spawn(self) -> ChannelHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let snapshot = ChannelSnapshot {
            endpoint: self.connector.describe(),
            status: ConnectionStatus::Connecting,
            retry_count: 0,
            last_ack_at: None,
            next_retry_at: None,
            last_error: None,
            frames_received: 0,
        };
        let (status_tx, status_rx) = watch::channel(snapshot.clone());

        let runner = Runner {
            mgr: self,
            state: ChannelState::initial(),
            transport: None,
            heartbeat: None,
            reconnect_at: None,
            commands: cmd_rx,
            status_tx,
            snapshot,
            queue: VecDeque::new(),
            stopping: false,
        };
        let task = tokio::spawn(runner.run());

        ChannelHandle {
            control: ChannelControl {
                commands: cmd_tx,
                status: status_rx,
            },
            task,
        }
    }
}

/// Why the idle loop woke up.
enum Wake {
    Command(Option<Command>),
    Frame(Option<Result<String, crate::error::TransportError>>),
    Probe,
    Liveness,
    ReconnectDue,
}

struct Runner {
    mgr: ChannelManager,
    state: ChannelState,
    transport: Option<Box<dyn Transport>>,
    heartbeat: Option<Interval>,
    reconnect_at: Option<Instant>,
    commands: mpsc::Receiver<Command>,
    status_tx: watch::Sender<ChannelSnapshot>,
    snapshot: ChannelSnapshot,
    queue: VecDeque<ChannelEvent>,
    stopping: bool,
}

impl Runner {
    async fn run(mut self) {
        tracing::info!(target: "channel", endpoint = %self.snapshot.endpoint, "channel manager started");
        self.publish();
        // Initial state is CONNECTING; kick off the first attempt.
        self.execute(vec![Effect::OpenConnection]).await;

        loop {
            while let Some(ev) = self.queue.pop_front() {
                self.dispatch(ev).await;
            }
            if self.stopping {
                break;
            }

            let deadline = self.state.liveness_deadline(self.mgr.policy.liveness_timeout);
            let wake = tokio::select! {
                cmd = self.commands.recv() => Wake::Command(cmd),
                frame = recv_frame(&mut self.transport), if self.transport.is_some() => Wake::Frame(frame),
                _ = tick(&mut self.heartbeat), if self.heartbeat.is_some() => Wake::Probe,
                _ = sleep_until_opt(deadline), if deadline.is_some() => Wake::Liveness,
                _ = sleep_until_opt(self.reconnect_at), if self.reconnect_at.is_some() => Wake::ReconnectDue,
            };
            self.on_wake(wake);
        }

        tracing::info!(target: "channel", "channel manager stopped");
    }

    fn on_wake(&mut self, wake: Wake) {
        match wake {
            Wake::Command(Some(Command::Reconnect)) => self.queue.push_back(ChannelEvent::Retrigger),
            Wake::Command(Some(Command::Shutdown)) | Wake::Command(None) => {
                self.queue.push_back(ChannelEvent::Shutdown)
            }
            Wake::Frame(Some(Ok(text))) => {
                if let Some(ev) = self.on_frame(&text) {
                    self.queue.push_back(ev);
                }
            }
            Wake::Frame(Some(Err(e))) => {
                tracing::warn!(target: "channel", error = %e, "live feed error");
                self.snapshot.last_error = Some(e.to_string());
                self.transport = None;
                self.queue.push_back(ChannelEvent::Closed);
            }
            Wake::Frame(None) => {
                tracing::info!(target: "channel", "live feed closed by peer");
                self.transport = None;
                self.queue.push_back(ChannelEvent::Closed);
            }
            Wake::Probe => self.queue.push_back(ChannelEvent::ProbeDue { at: Instant::now() }),
            Wake::Liveness => self.queue.push_back(ChannelEvent::LivenessCheck { at: Instant::now() }),
            Wake::ReconnectDue => {
                self.reconnect_at = None;
                self.snapshot.next_retry_at = None;
                self.queue.push_back(ChannelEvent::ReconnectDue);
            }
        }
    }

    /// Decode one frame. Parsing problems are reported and swallowed.
    fn on_frame(&mut self, text: &str) -> Option<ChannelEvent> {
        self.snapshot.frames_received += 1;
        match protocol::decode_frame(text) {
            Ok(InboundFrame::Classification(env)) => {
                self.mgr.ingestor.ingest_envelope(&env, IngestPath::Stream);
                None
            }
            Ok(InboundFrame::LivenessAck) => {
                self.snapshot.last_ack_at = Some(Utc::now());
                Some(ChannelEvent::AckReceived { at: Instant::now() })
            }
            Ok(InboundFrame::Ignored(tag)) => {
                tracing::debug!(target: "channel", %tag, "ignoring frame with unrecognized type");
                None
            }
            Err(e) => {
                counter!("channel_frame_errors_total").increment(1);
                tracing::warn!(target: "channel", error = %e, "undecodable live feed frame");
                None
            }
        }
    }

    async fn dispatch(&mut self, event: ChannelEvent) {
        if matches!(event, ChannelEvent::Shutdown) {
            self.stopping = true;
        }
        let (next, effects) = transition(&self.state, &event, &self.mgr.policy);
        if next.status != self.state.status {
            tracing::info!(
                target: "channel",
                from = ?self.state.status,
                to = ?next.status,
                retry = next.retry_count,
                "channel state changed"
            );
        }
        self.state = next;
        self.execute(effects).await;
        self.publish();
    }

    async fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenConnection => self.open().await,
                Effect::StartHeartbeat => {
                    let period = self.mgr.heartbeat_interval;
                    self.heartbeat = Instant::now().checked_add(period).map(|start| {
                        let mut iv = interval_at(start, period);
                        iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        iv
                    });
                    if self.heartbeat.is_none() {
                        tracing::warn!(target: "channel", "heartbeat interval out of range; probes disabled");
                    }
                }
                Effect::StopHeartbeat => self.heartbeat = None,
                Effect::SendProbe => {
                    if let Some(t) = self.transport.as_mut() {
                        if let Err(e) = t.send(protocol::probe_message()).await {
                            tracing::warn!(target: "channel", error = %e, "liveness probe send failed");
                            self.snapshot.last_error = Some(e.to_string());
                            self.transport = None;
                            self.queue.push_back(ChannelEvent::Closed);
                        }
                    }
                }
                Effect::ForceClose => {
                    if let Some(mut t) = self.transport.take() {
                        t.close().await;
                        if !self.stopping {
                            counter!("channel_liveness_timeouts_total").increment(1);
                            tracing::warn!(target: "channel", "no liveness ack within timeout; forcing reconnect");
                            self.snapshot.last_error = Some("liveness timeout".to_string());
                            self.queue.push_back(ChannelEvent::Closed);
                        }
                    }
                }
                Effect::ScheduleReconnect { retry, base_delay } => {
                    let delay = self.mgr.policy.backoff.delay(retry);
                    self.reconnect_at = Instant::now().checked_add(delay);
                    self.snapshot.next_retry_at = chrono::Duration::from_std(delay)
                        .ok()
                        .and_then(|d| Utc::now().checked_add_signed(d));
                    counter!("channel_reconnects_total").increment(1);
                    tracing::info!(
                        target: "channel",
                        retry,
                        base_ms = base_delay.as_millis() as u64,
                        delay_ms = delay.as_millis() as u64,
                        "reconnect scheduled"
                    );
                }
                Effect::CancelReconnect => {
                    self.reconnect_at = None;
                    self.snapshot.next_retry_at = None;
                }
                Effect::ReportFailed { retries } => {
                    tracing::error!(
                        target: "channel",
                        retries,
                        "live feed unreachable; giving up until manually re-triggered"
                    );
                }
            }
        }
    }

    /// Connect, but stay responsive to shutdown while the attempt is pending.
    async fn open(&mut self) {
        let connector = Arc::clone(&self.mgr.connector);
        // A connect that hangs is as dead as one that fails.
        let attempt = tokio::time::timeout(self.mgr.policy.liveness_timeout, connector.connect());
        tokio::pin!(attempt);

        let result = loop {
            tokio::select! {
                r = &mut attempt => break Some(r),
                cmd = self.commands.recv() => match cmd {
                    // Already connecting.
                    Some(Command::Reconnect) => continue,
                    Some(Command::Shutdown) | None => break None,
                },
            }
        };

        match result {
            None => self.queue.push_back(ChannelEvent::Shutdown),
            Some(Ok(Ok(transport))) => {
                self.transport = Some(transport);
                self.snapshot.last_error = None;
                self.queue.push_back(ChannelEvent::Opened { at: Instant::now() });
            }
            Some(Ok(Err(e))) => {
                tracing::warn!(target: "channel", error = %e, "live feed connect failed");
                self.snapshot.last_error = Some(e.to_string());
                self.queue.push_back(ChannelEvent::ConnectFailed);
            }
            Some(Err(_elapsed)) => {
                tracing::warn!(target: "channel", "live feed connect timed out");
                self.snapshot.last_error = Some("connect timed out".to_string());
                self.queue.push_back(ChannelEvent::ConnectFailed);
            }
        }
    }

    fn publish(&mut self) {
        self.snapshot.status = self.state.status;
        self.snapshot.retry_count = self.state.retry_count;
        gauge!("channel_state").set(self.state.status.as_gauge());
        self.status_tx.send_replace(self.snapshot.clone());
    }
}

async fn recv_frame(t: &mut Option<Box<dyn Transport>>) -> Option<Result<String, crate::error::TransportError>> {
    match t {
        Some(t) => t.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick(iv: &mut Option<Interval>) {
    match iv {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
