use async_trait::async_trait;
use order_core::{Channel, Timestamp};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use super::connection::{Identity, LinkId};
use super::events::{ControlFrame, InboundFrame, LinkEvent, NormalizedUpdate};

/// Failure to hand a control frame to the transport.
///
/// Not an error condition for callers: the registry re-issues everything on
/// the next connect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("not connected")]
    NotConnected,
    #[error("link closed")]
    ChannelClosed,
}

/// Domain error for connection attempts
///
/// Infrastructure implementations convert their specific errors to this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("network error: {0}")]
    Network(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
}

/// Why the normalizer dropped a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("destination {0} does not map to a channel")]
    UnroutableDestination(String),
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("missing or empty orderId")]
    MissingOrderId,
    #[error("missing status")]
    MissingStatus,
    #[error("unknown status {0:?}")]
    UnknownStatus(String),
}

/// Outbound half of an established connection
pub trait FrameSink: Send + Sync {
    /// Best-effort send; never blocks
    fn send(&self, frame: ControlFrame) -> Result<(), SendError>;

    /// Graceful teardown. Default does nothing.
    fn close(&self) {}
}

/// An established connection: outbound sink plus inbound event stream
pub struct Link {
    pub sink: Arc<dyn FrameSink>,
    pub events: mpsc::Receiver<LinkEvent>,
}

/// Opens connections to the event endpoint
///
/// Resolves only once the handshake is complete, so a returned `Link` is
/// ready for subscribe frames.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, identity: &Identity) -> Result<Link, ConnectError>;
}

/// Subscribe/unsubscribe over the current connection
///
/// Implemented by the session; the registry depends on this abstraction.
/// Success returns the link the frame went out on.
pub trait ControlSender: Send + Sync {
    fn send_subscribe(&self, channel: &Channel) -> Result<LinkId, SendError>;
    fn send_unsubscribe(&self, channel: &Channel) -> Result<LinkId, SendError>;
}

/// Lifecycle hooks invoked by the session
pub trait ConnectionObserver: Send + Sync {
    /// Called on entering `Connected`, before any inbound frame of that
    /// link is dispatched
    fn on_connected(&self, link: LinkId);

    /// Called when the link is lost or the session is stopped
    fn on_disconnected(&self);
}

/// Pure transformation from raw frame to canonical update
///
/// Implements Open/Closed - alternative payload formats plug in here.
pub trait FrameNormalizer: Send + Sync {
    fn normalize(
        &self,
        frame: &InboundFrame,
        received_at: Timestamp,
    ) -> Result<NormalizedUpdate, RejectReason>;
}
