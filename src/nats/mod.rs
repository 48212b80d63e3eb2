pub mod client;
pub mod messages;
mod transport;

pub use client::NatsClient;
pub use messages::{RequestMessage, ResultMessage};
pub use transport::NatsTransport;
