use std::fmt;

/// Connection state of the transport session
/// Domain concept representing the reconnect state machine
///
/// ```text
/// Disconnected ─start─▶ Connecting ─ok─▶ Connected
///                          ▲   │fail         │lost
///                          │   ▼             ▼
///                          └─ Reconnecting ◀─┘
/// ```
///
/// `stop()` moves any state to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No identity, or explicitly stopped
    #[default]
    Disconnected,
    /// Handshake in flight
    Connecting,
    /// Handshake complete, frames flowing
    Connected,
    /// Lost or failed, waiting out the reconnect delay
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// True while the session is trying to hold a connection open
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Read-only snapshot of the session's connection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    /// Consecutive failed or lost connections since the last success
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl ConnectionInfo {
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

/// Identifies one successfully established connection.
///
/// Every transition into `Connected` gets a fresh id, so "subscribed on the
/// current connection" can be checked without trusting stale flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Authenticated identity supplied by the login collaborator.
///
/// The token is passed through to the handshake untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub token: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Identity {
            user_id: user_id.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

// Keep tokens out of logs
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}
