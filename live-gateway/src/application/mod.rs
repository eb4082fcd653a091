pub mod live_updates;
pub mod registry;
pub mod session;
pub mod status_board;

pub use live_updates::{InvalidOrderId, LiveUpdates};
pub use registry::{SubscriptionHandle, SubscriptionRegistry};
pub use session::{FrameHandler, Session};
pub use status_board::{ApplyOutcome, OrderStatusBoard};
