//! Presentation Layer - Outbound interfaces to UI consumers
//!
//! - UpdateBus: history buffer and listener fan-out for normalized updates
//!
//! Follows Hexagonal Architecture:
//! - Infrastructure = inbound (server → gateway)
//! - Presentation = outbound (gateway → UI)

mod bus;

pub use bus::{Callback, Delivery, ListenerFilter, ListenerId, UpdateBus};
