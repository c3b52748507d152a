//! Connection state machine for the execution channel
//!
//! ```text
//! Disconnected/Error ──connect()──> Connecting ──opened──> Connected
//!        ▲                              │                     │
//!        │                         open failed          channel closed
//!        │                              ▼                     ▼
//!        └── attempts ≥ max ─── Disconnected (schedule retry if attempts < max)
//!
//! any ──disconnect()──> Disconnecting ──closed──> Disconnected
//! ```
//!
//! [`ConnectionMachine`] is pure: each transition returns the [`Command`]s
//! the driver must carry out (open or close the channel, start or cancel
//! the single reconnect timer). It never touches a socket or a clock.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ReconnectConfig;

/// Connection state to the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// Reconnect attempts exhausted
    Error,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting...",
            Self::Error => "Error",
        }
    }
}

/// State plus the number of scheduled attempts since the last success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub attempts: u32,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open a new channel
    Open,
    /// Close the active channel, if any
    Close,
    /// Start the reconnect timer; fires `connect()` after the delay
    ScheduleReconnect(Duration),
    /// Cancel the pending reconnect timer, if any
    CancelReconnect,
}

/// Reconnect policy, fixed interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub auto_reconnect: bool,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            auto_reconnect: config.auto_reconnect,
            interval: config.interval(),
            max_attempts: config.max_attempts,
        }
    }
}

/// Pure connection lifecycle
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            attempts: self.attempts,
        }
    }

    /// Begin connecting; only valid from `Disconnected` or `Error`
    pub fn connect(&mut self) -> Vec<Command> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.state = ConnectionState::Connecting;
                vec![Command::Open]
            }
            other => {
                log::debug!("connect() ignored while {:?}", other);
                Vec::new()
            }
        }
    }

    /// The channel opened
    pub fn opened(&mut self) -> Vec<Command> {
        if self.state != ConnectionState::Connecting {
            // Nobody is waiting for this channel any more
            return vec![Command::Close];
        }
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        vec![Command::CancelReconnect]
    }

    /// The channel failed to open or was closed
    pub fn closed(&mut self) -> Vec<Command> {
        match self.state {
            ConnectionState::Disconnecting => {
                self.state = ConnectionState::Disconnected;
                Vec::new()
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.state = ConnectionState::Disconnected;
                self.schedule_retry()
            }
            ConnectionState::Disconnected | ConnectionState::Error => Vec::new(),
        }
    }

    fn schedule_retry(&mut self) -> Vec<Command> {
        if !self.policy.auto_reconnect {
            return Vec::new();
        }
        if self.attempts >= self.policy.max_attempts {
            log::warn!(
                "Giving up after {} reconnect attempts",
                self.attempts
            );
            self.state = ConnectionState::Error;
            return vec![Command::CancelReconnect];
        }
        self.attempts += 1;
        log::info!(
            "Reconnect attempt {}/{} in {:?}",
            self.attempts,
            self.policy.max_attempts,
            self.policy.interval
        );
        vec![
            Command::CancelReconnect,
            Command::ScheduleReconnect(self.policy.interval),
        ]
    }

    /// Manual disconnect; never auto-retried
    pub fn disconnect(&mut self) -> Vec<Command> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.state = ConnectionState::Disconnecting;
                vec![Command::CancelReconnect, Command::Close]
            }
            ConnectionState::Disconnecting => Vec::new(),
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.state = ConnectionState::Disconnected;
                vec![Command::CancelReconnect]
            }
        }
    }

    /// Disconnect, reset the attempt counter and connect again
    pub fn reconnect(&mut self) -> Vec<Command> {
        let mut commands = self.disconnect();
        commands.extend(self.closed());
        self.attempts = 0;
        commands.extend(self.connect());
        commands
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
