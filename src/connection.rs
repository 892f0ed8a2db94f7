//! Live connection lifecycle
//!
//! [`ConnectionManager`] is a pure state machine. It never touches a socket:
//! it emits [`TransportCommand`]s for the runtime to execute and consumes
//! transport events tagged with the generation they belong to. Every connect
//! attempt gets a new generation, so events from an earlier socket are
//! recognized as stale and ignored.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ProtocolError;
use crate::model::GraphSnapshot;
use crate::protocol::{LiveMessage, parse_message};
use crate::scheduler::{Scheduler, TimerId, TimerTask};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Work for the runtime's transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Open a socket for `generation`
    Open { generation: u64, url: String },
    /// Tear down the socket of `generation`
    Close { generation: u64 },
}

/// Why a message was dropped
#[derive(Debug)]
pub enum DiscardReason {
    /// Belongs to a socket that is no longer current
    Stale,
    /// Arrived before the handshake completed
    NotConnected,
    /// Could not be decoded
    Protocol(ProtocolError),
}

/// Result of handling one inbound message
#[derive(Debug)]
pub enum MessageOutcome {
    /// A graph snapshot to dispatch to the mode arbitrator
    Snapshot(GraphSnapshot),
    /// Diagnostic only
    Heartbeat { clients: u64 },
    /// Logged and dropped; connection state is untouched
    Discarded(DiscardReason),
}

/// Owns the live transport lifecycle and its reconnect timer
#[derive(Debug)]
pub struct ConnectionManager {
    url: String,
    reconnect_delay: Duration,
    state: ConnectionState,
    generation: u64,
    /// Generation of the socket currently owned, if any
    handle: Option<u64>,
    reconnect_timer: Option<TimerId>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            state: ConnectionState::Disconnected,
            generation: 0,
            handle: None,
            reconnect_timer: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of the live socket handle, `None` when disconnected
    pub fn handle(&self) -> Option<u64> {
        self.handle
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    /// True while connecting or connected
    pub fn is_active(&self) -> bool {
        self.state != ConnectionState::Disconnected
    }

    /// Start a connection attempt. No-op while connecting or connected.
    pub fn connect(&mut self, scheduler: &mut Scheduler<TimerTask>) -> Option<TransportCommand> {
        if self.is_active() {
            debug!(state = ?self.state, "connect ignored, already active");
            return None;
        }

        if let Some(timer) = self.reconnect_timer.take() {
            scheduler.cancel(timer);
        }

        self.generation += 1;
        self.handle = Some(self.generation);
        self.state = ConnectionState::Connecting;
        info!(url = %self.url, generation = self.generation, "connecting to live source");

        Some(TransportCommand::Open {
            generation: self.generation,
            url: self.url.clone(),
        })
    }

    /// The socket for `generation` finished its handshake
    pub fn on_open(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            debug!(generation, "ignoring open from stale socket");
            return false;
        }
        self.state = ConnectionState::Connected;
        info!(generation, "live source connected");
        true
    }

    /// Decode a text frame. Never fails and never changes connection state.
    pub fn on_message(&self, generation: u64, text: &str) -> MessageOutcome {
        if !self.is_current(generation) {
            return MessageOutcome::Discarded(DiscardReason::Stale);
        }
        if self.state != ConnectionState::Connected {
            return MessageOutcome::Discarded(DiscardReason::NotConnected);
        }

        match parse_message(text) {
            Ok(LiveMessage::State(snapshot)) => MessageOutcome::Snapshot(snapshot),
            Ok(LiveMessage::Heartbeat { clients }) => {
                debug!(clients, "heartbeat");
                MessageOutcome::Heartbeat { clients }
            }
            Err(e) => {
                warn!(error = %e, "discarding live message");
                MessageOutcome::Discarded(DiscardReason::Protocol(e))
            }
        }
    }

    /// The socket for `generation` closed or failed.
    ///
    /// Returns true when the current connection was lost; the caller must
    /// then revert authority to local simulation. Exactly one reconnect is
    /// scheduled.
    pub fn on_close(
        &mut self,
        generation: u64,
        now: Duration,
        scheduler: &mut Scheduler<TimerTask>,
    ) -> bool {
        if !self.is_current(generation) {
            debug!(generation, "ignoring close from stale socket");
            return false;
        }

        self.state = ConnectionState::Disconnected;
        self.handle = None;
        info!(generation, "live source disconnected");

        if self.reconnect_timer.is_none() {
            let timer = scheduler.schedule_after(now, self.reconnect_delay, TimerTask::Reconnect);
            self.reconnect_timer = Some(timer);
            debug!(delay_ms = self.reconnect_delay.as_millis() as u64, "reconnect scheduled");
        }
        true
    }

    /// The reconnect timer fired
    pub fn on_reconnect_due(
        &mut self,
        timer: TimerId,
        scheduler: &mut Scheduler<TimerTask>,
    ) -> Option<TransportCommand> {
        if self.reconnect_timer != Some(timer) {
            return None;
        }
        self.reconnect_timer = None;
        self.connect(scheduler)
    }

    /// Deliberately close. Cancels any pending reconnect; schedules none.
    pub fn close(&mut self, scheduler: &mut Scheduler<TimerTask>) -> Option<TransportCommand> {
        if let Some(timer) = self.reconnect_timer.take() {
            scheduler.cancel(timer);
            debug!("pending reconnect cancelled");
        }

        let command = self
            .handle
            .take()
            .map(|generation| TransportCommand::Close { generation });

        self.state = ConnectionState::Disconnected;
        // The trailing close event of the old socket becomes stale
        self.generation += 1;
        if command.is_some() {
            info!("live connection closed");
        }
        command
    }

    fn is_current(&self, generation: u64) -> bool {
        self.handle == Some(generation)
    }
}
