mod order_update;

pub use order_update::OrderUpdate;
