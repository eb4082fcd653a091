//! Live Gateway Crate
//!
//! Real-time order status core: keeps one reconnecting connection to the
//! server's push endpoint, multiplexes per-user and per-order channels over
//! it, and fans normalized updates out to local consumers.
//!
//! # Architecture
//!
//! ```text
//!   Server (STOMP over WebSocket)
//!          │ MESSAGE /topic/order/{id}, /topic/orders/{user}
//!          ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                   LiveUpdates                         │
//! │  ┌─────────────┐  on_connected  ┌─────────────────┐  │
//! │  │   Session   │ ─────────────▶ │ SubscriptionReg │  │
//! │  │ (reconnect) │ ◀───────────── │  (ref counts)   │  │
//! │  └──────┬──────┘   SUBSCRIBE    └─────────────────┘  │
//! │         │ InboundFrame                               │
//! │         ▼                                            │
//! │  ┌─────────────┐    OrderUpdate  ┌────────────────┐  │
//! │  │ Normalizer  │ ──────────────▶ │   UpdateBus    │  │
//! │  └─────────────┘                 │ (history, fan) │  │
//! │                                  └───────┬────────┘  │
//! └──────────────────────────────────────────┼───────────┘
//!                                            ▼
//!                                      UI listeners
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// Re-export key types
pub use domain::{
    ConnectError, ConnectionInfo, ConnectionState, Connector, ControlFrame, Identity,
    InboundFrame, LinkId, ReconnectPolicy, RejectReason, SendError,
};

pub use application::{
    ApplyOutcome, InvalidOrderId, LiveUpdates, OrderStatusBoard, Session, SubscriptionHandle,
    SubscriptionRegistry,
};
pub use config::{LiveConfigFile, load_config, load_default_config};
pub use infrastructure::{MemoryConnector, MemoryServer, OrderUpdateNormalizer, StompConnector, memory_pair};
pub use presentation::{Delivery, ListenerFilter, ListenerId, UpdateBus};

pub use order_core::{Channel, OrderStatus, OrderUpdate, Timestamp};
