use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{debug, info};

use super::messages::RequestMessage;

/// NATS connection scoped to one recognition session
pub struct NatsClient {
    client: Client,
    session_id: String,
    subject_prefix: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject_prefix: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            session_id,
            subject_prefix: subject_prefix.to_string(),
        })
    }

    pub fn request_subject(&self) -> String {
        request_subject(&self.subject_prefix, &self.session_id)
    }

    pub fn result_subject(&self) -> String {
        result_subject(&self.subject_prefix, &self.session_id)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Publish one request message
    pub async fn publish_request(&self, message: &RequestMessage) -> Result<()> {
        let subject = self.request_subject();
        let payload = serde_json::to_vec(message)?;
        let bytes = payload.len();

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish request")?;

        debug!("Published request to {} ({} bytes)", subject, bytes);

        Ok(())
    }

    /// Subscribe to this session's result messages
    pub async fn subscribe_results(&self) -> Result<async_nats::Subscriber> {
        let subject = self.result_subject();

        info!("Subscribing to results on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to results")?;

        Ok(subscriber)
    }

    /// Wait until published messages have reached the server
    pub async fn flush(&self) -> Result<()> {
        self.client.flush().await.context("Failed to flush NATS connection")?;
        Ok(())
    }
}

pub fn request_subject(prefix: &str, session_id: &str) -> String {
    format!("{}.{}.request", prefix, session_id)
}

pub fn result_subject(prefix: &str, session_id: &str) -> String {
    format!("{}.{}.result", prefix, session_id)
}
