pub mod connection;
pub mod events;
pub mod reconnect;
pub mod traits;

pub use connection::{ConnectionInfo, ConnectionState, Identity, LinkId};
pub use events::{ControlFrame, InboundFrame, LinkEvent, NormalizedUpdate};
pub use reconnect::ReconnectPolicy;
pub use traits::{
    ConnectError, ConnectionObserver, Connector, ControlSender, FrameNormalizer, FrameSink, Link,
    RejectReason, SendError,
};
