pub mod memory;
pub mod normalizer;
pub mod stomp;
pub mod ws_client;

pub use memory::{MemoryConnector, MemoryServer, memory_pair};
pub use normalizer::OrderUpdateNormalizer;
pub use stomp::{StompCommand, StompError, StompFrame};
pub use ws_client::StompConnector;
