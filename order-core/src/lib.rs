//! Order Core
//!
//! Shared domain kernel for the live order updates core: order lifecycle
//! statuses, channel names, and the normalized `OrderUpdate` event.

pub mod events;
pub mod value_objects;

// Re-export value objects at crate root for convenience
pub use value_objects::{Channel, OrderStatus, Timestamp};

// Re-export events at crate root
pub use events::OrderUpdate;
