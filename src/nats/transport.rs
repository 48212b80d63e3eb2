use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::client::NatsClient;
use super::messages::{RequestMessage, ResultMessage};
use crate::transport::{ResultEvent, StreamMessage, Transport, TransportError};

/// Recognition stream carried over NATS subjects
pub struct NatsTransport {
    url: String,
    subject_prefix: String,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: subject_prefix.into(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for NatsTransport {
    async fn open(
        &self,
        session_id: &str,
        requests: mpsc::Receiver<StreamMessage>,
        events: mpsc::Sender<ResultEvent>,
    ) -> Result<(), TransportError> {
        let client = NatsClient::connect(&self.url, &self.subject_prefix, session_id.to_string())
            .await
            .map_err(|e| TransportError::Connect(format!("{:#}", e)))?;

        // Subscribe before any request goes out so no result can be missed
        let subscriber = client
            .subscribe_results()
            .await
            .map_err(|e| TransportError::Subscribe(format!("{:#}", e)))?;

        // Dropping the subscriber unsubscribes
        let results = subscriber.map(|msg| msg.payload);

        tokio::spawn(publish_requests(Arc::new(client), requests, events.clone()));
        tokio::spawn(forward_results(session_id.to_string(), results, events));

        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// Where the outbound pump publishes request messages
#[async_trait::async_trait]
trait RequestPublisher: Send + Sync {
    fn session_id(&self) -> &str;

    async fn publish(&self, message: &RequestMessage) -> anyhow::Result<()>;

    async fn flush(&self) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl RequestPublisher for NatsClient {
    fn session_id(&self) -> &str {
        NatsClient::session_id(self)
    }

    async fn publish(&self, message: &RequestMessage) -> anyhow::Result<()> {
        self.publish_request(message).await
    }

    async fn flush(&self) -> anyhow::Result<()> {
        NatsClient::flush(self).await
    }
}

/// Outbound pump: publishes stream messages in order until end-of-stream
async fn publish_requests<P: RequestPublisher>(
    publisher: Arc<P>,
    mut requests: mpsc::Receiver<StreamMessage>,
    events: mpsc::Sender<ResultEvent>,
) {
    let mut sequence: u32 = 0;

    while let Some(msg) = requests.recv().await {
        let wire = RequestMessage::from_stream(publisher.session_id(), sequence, &msg);

        if let Err(e) = publisher.publish(&wire).await {
            error!("Failed to publish {} message: {:#}", msg.kind(), e);
            let _ = events
                .send(ResultEvent::Error(TransportError::Send(format!("{:#}", e))))
                .await;
            return;
        }

        match msg {
            StreamMessage::AudioChunk(_) => sequence += 1,
            StreamMessage::EndOfStream => {
                if let Err(e) = publisher.flush().await {
                    warn!("Failed to flush after end-of-stream: {:#}", e);
                }
                info!(
                    "Request stream for {} ended after {} audio chunks",
                    publisher.session_id(),
                    sequence
                );
                return;
            }
            StreamMessage::Config(_) => {}
        }
    }

    debug!("Request channel for {} closed", publisher.session_id());
}

/// Inbound pump: forwards results in arrival order until the terminal event
/// or until the session stops listening
async fn forward_results<S>(session_id: String, mut results: S, events: mpsc::Sender<ResultEvent>)
where
    S: Stream + Unpin,
    S::Item: AsRef<[u8]>,
{
    loop {
        let payload = tokio::select! {
            payload = results.next() => payload,
            _ = events.closed() => {
                debug!("Result consumer for {} gone", session_id);
                break;
            }
        };

        let Some(payload) = payload else {
            let _ = events.send(ResultEvent::Error(TransportError::Closed)).await;
            break;
        };

        let result = match serde_json::from_slice::<ResultMessage>(payload.as_ref()) {
            Ok(result) => result,
            Err(e) => {
                warn!("Failed to parse result message: {}", e);
                continue;
            }
        };

        if result.session_id() != session_id {
            continue;
        }

        let event = ResultEvent::from(result);
        let terminal = event.is_terminal();
        if events.send(event).await.is_err() || terminal {
            break;
        }
    }
}
