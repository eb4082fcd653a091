mod channel;
mod order_status;

pub use channel::Channel;
pub use order_status::OrderStatus;

pub type Timestamp = chrono::DateTime<chrono::Utc>;
