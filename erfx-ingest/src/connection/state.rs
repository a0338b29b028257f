//! Connection lifecycle state machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> ...
//!       \______________\____________\_____> ShuttingDown (terminal)
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectRequested,
    ConnectSucceeded,
    /// Connect attempt failed or an established session dropped
    ConnectionLost,
    StopRequested,
}

impl ConnectionState {
    /// Next state for `event`; events that do not apply leave the state unchanged
    pub fn transition(self, event: ConnectionEvent) -> ConnectionState {
        use ConnectionEvent::*;
        use ConnectionState::*;

        match (self, event) {
            (ShuttingDown, _) => ShuttingDown,
            (_, StopRequested) => ShuttingDown,
            (Disconnected, ConnectRequested) => Connecting,
            (Connecting, ConnectSucceeded) => Connected,
            (Connecting, ConnectionLost) | (Connected, ConnectionLost) => Disconnected,
            (state, _) => state,
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::ShuttingDown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::ShuttingDown => "ShuttingDown",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
