pub mod gateway;
pub mod hub;
pub mod relay;
pub mod server;
pub mod subscriber;

pub use gateway::GatewayState;
pub use hub::EventHub;
pub use server::{start, ServerConfig, ServerHandle};
pub use subscriber::SubscriberRegistry;
