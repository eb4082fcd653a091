use order_core::{Channel, OrderUpdate};

/// Raw frame received from the server, addressed to a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub destination: String,
    pub body: String,
}

impl InboundFrame {
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        InboundFrame {
            destination: destination.into(),
            body: body.into(),
        }
    }
}

/// Events delivered by an established link
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Message addressed to a subscribed destination
    Frame(InboundFrame),
    /// Transport or protocol error; the link is unusable afterwards
    Error(String),
    /// Remote closed the connection
    Closed,
}

/// Outbound control messages
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlFrame {
    Subscribe(Channel),
    Unsubscribe(Channel),
}

impl ControlFrame {
    pub fn channel(&self) -> &Channel {
        match self {
            ControlFrame::Subscribe(channel) | ControlFrame::Unsubscribe(channel) => channel,
        }
    }
}

/// Normalizer output: one canonical update plus the channel it arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUpdate {
    pub channel: Channel,
    pub update: OrderUpdate,
}
