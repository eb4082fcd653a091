//! In-Process Transport
//!
//! `Connector` implementation backed by tokio channels. The paired
//! `MemoryServer` plays the remote end: it records every control frame,
//! pushes inbound frames, drops the live connection and refuses connects.
//! Used for tests, demos and local development without a backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::{
    ConnectError, Connector, ControlFrame, FrameSink, Identity, InboundFrame, Link, LinkEvent,
    SendError,
};

const EVENT_CAPACITY: usize = 1024;

struct MemoryState {
    /// Every control frame accepted, tagged with its connection
    sent: Vec<(u64, ControlFrame)>,
    /// Connections closed by the client side
    closed: Vec<u64>,
    attempts: u64,
    connects: u64,
    refuse: u32,
    identities: Vec<Identity>,
    /// Current connection: id and inbound sender
    live: Option<(u64, mpsc::Sender<LinkEvent>)>,
}

/// Client side of the in-process transport
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<MemoryState>>,
}

/// Remote side of the in-process transport
#[derive(Clone)]
pub struct MemoryServer {
    shared: Arc<Mutex<MemoryState>>,
}

/// Create a connector/server pair
pub fn memory_pair() -> (MemoryConnector, MemoryServer) {
    let shared = Arc::new(Mutex::new(MemoryState {
        sent: Vec::new(),
        closed: Vec::new(),
        attempts: 0,
        connects: 0,
        refuse: 0,
        identities: Vec::new(),
        live: None,
    }));

    (
        MemoryConnector {
            shared: Arc::clone(&shared),
        },
        MemoryServer { shared },
    )
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, identity: &Identity) -> Result<Link, ConnectError> {
        let mut state = self.shared.lock();
        state.attempts += 1;
        state.identities.push(identity.clone());

        if state.refuse > 0 {
            state.refuse -= 1;
            return Err(ConnectError::Refused("memory server refused".to_string()));
        }

        state.connects += 1;
        let connection = state.connects;
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        state.live = Some((connection, tx));

        Ok(Link {
            sink: Arc::new(MemorySink {
                shared: Arc::clone(&self.shared),
                connection,
            }),
            events: rx,
        })
    }
}

struct MemorySink {
    shared: Arc<Mutex<MemoryState>>,
    connection: u64,
}

impl MemorySink {
    fn is_live(state: &MemoryState, connection: u64) -> bool {
        state.live.as_ref().is_some_and(|(id, _)| *id == connection)
    }
}

impl FrameSink for MemorySink {
    fn send(&self, frame: ControlFrame) -> Result<(), SendError> {
        let mut state = self.shared.lock();
        if !Self::is_live(&state, self.connection) {
            return Err(SendError::ChannelClosed);
        }
        state.sent.push((self.connection, frame));
        Ok(())
    }

    fn close(&self) {
        let mut state = self.shared.lock();
        if Self::is_live(&state, self.connection) {
            state.live = None;
        }
        if !state.closed.contains(&self.connection) {
            state.closed.push(self.connection);
        }
    }
}

impl MemoryServer {
    /// Deliver a frame on the current connection. False if none is live.
    pub fn push(&self, destination: &str, body: &str) -> bool {
        let state = self.shared.lock();
        match &state.live {
            Some((_, tx)) => tx
                .try_send(LinkEvent::Frame(InboundFrame::new(destination, body)))
                .is_ok(),
            None => false,
        }
    }

    /// Simulate the remote closing the connection
    pub fn drop_connection(&self) -> bool {
        let live = self.shared.lock().live.take();
        match live {
            Some((_, tx)) => tx.try_send(LinkEvent::Closed).is_ok(),
            None => false,
        }
    }

    /// Simulate a transport error on the current connection
    pub fn fail_connection(&self, error: &str) -> bool {
        let live = self.shared.lock().live.take();
        match live {
            Some((_, tx)) => tx.try_send(LinkEvent::Error(error.to_string())).is_ok(),
            None => false,
        }
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_next(&self, n: u32) {
        self.shared.lock().refuse = n;
    }

    pub fn is_live(&self) -> bool {
        self.shared.lock().live.is_some()
    }

    /// Successful connections
    pub fn connect_count(&self) -> u64 {
        self.shared.lock().connects
    }

    /// All connection attempts, refused ones included
    pub fn connect_attempts(&self) -> u64 {
        self.shared.lock().attempts
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.shared.lock().identities.clone()
    }

    /// Outbound log, oldest first
    pub fn sent(&self) -> Vec<ControlFrame> {
        self.shared
            .lock()
            .sent
            .iter()
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// Frames accepted on one connection (numbered from 1 in connect order)
    pub fn sent_on(&self, connection: u64) -> Vec<ControlFrame> {
        self.shared
            .lock()
            .sent
            .iter()
            .filter(|(id, _)| *id == connection)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// Connections whose sink was closed by the client, in close order
    pub fn closed_connections(&self) -> Vec<u64> {
        self.shared.lock().closed.clone()
    }

    pub fn clear_sent(&self) {
        self.shared.lock().sent.clear();
    }

    /// Number of logged frames equal to `frame`
    pub fn count_sent(&self, frame: &ControlFrame) -> usize {
        self.shared
            .lock()
            .sent
            .iter()
            .filter(|(_, sent)| sent == frame)
            .count()
    }
}
