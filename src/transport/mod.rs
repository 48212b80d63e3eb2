//! Streaming recognition transport
//!
//! The session manager talks to the remote service through two ordered
//! channels:
//! - requests: `Config`, then `AudioChunk`s, then `EndOfStream`
//! - events: `Transcript`s followed by one terminal `Completed` or `Error`
//!
//! A [`Transport`] adapter connects those channels to a concrete wire
//! protocol (see [`crate::nats`]).

mod channel;
mod message;

pub use channel::RequestChannel;
pub use message::{AudioEncoding, RecognitionConfig, ResultEvent, StreamMessage, Transcript};

use thiserror::Error;
use tokio::sync::mpsc;

/// Transport failures, both during setup and mid-session
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Stream closed")]
    Closed,

    #[error("Out-of-order message: {0}")]
    OutOfOrder(&'static str),
}

/// Adapter between the session manager and a streaming recognition service.
///
/// Contract:
/// - messages read from `requests` are delivered to the service in order;
///   reading stops after `EndOfStream` or when the channel closes
/// - events are pushed to `events` in the order the service emits them,
///   from a task other than the capture thread, ending with at most one
///   terminal event
/// - a send failure after `open` returns is reported as `ResultEvent::Error`
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Open a stream for `session_id`. Connection and subscription failures
    /// are returned here; nothing is left running when this fails.
    async fn open(
        &self,
        session_id: &str,
        requests: mpsc::Receiver<StreamMessage>,
        events: mpsc::Sender<ResultEvent>,
    ) -> Result<(), TransportError>;

    /// Transport name for logging
    fn name(&self) -> &str;
}
