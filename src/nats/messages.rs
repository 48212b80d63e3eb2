use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::transport::{AudioEncoding, ResultEvent, StreamMessage, Transcript, TransportError};

/// Request message published on `{prefix}.{session_id}.request`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestMessage {
    Config {
        session_id: String,
        encoding: AudioEncoding,
        sample_rate_hertz: u32,
        language_code: String,
    },
    Audio {
        session_id: String,
        sequence: u32,
        pcm: String, // Base64-encoded PCM bytes
        timestamp: String, // RFC3339 timestamp
    },
    End {
        session_id: String,
        /// Number of audio messages that preceded this one
        sequence: u32,
    },
}

impl RequestMessage {
    /// Wire form of a stream message. `sequence` is the index of the next
    /// audio chunk.
    pub fn from_stream(session_id: &str, sequence: u32, msg: &StreamMessage) -> Self {
        match msg {
            StreamMessage::Config(config) => RequestMessage::Config {
                session_id: session_id.to_string(),
                encoding: config.encoding,
                sample_rate_hertz: config.sample_rate_hertz,
                language_code: config.language_code.clone(),
            },
            StreamMessage::AudioChunk(bytes) => RequestMessage::Audio {
                session_id: session_id.to_string(),
                sequence,
                pcm: base64::engine::general_purpose::STANDARD.encode(bytes),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
            StreamMessage::EndOfStream => RequestMessage::End {
                session_id: session_id.to_string(),
                sequence,
            },
        }
    }
}

/// Result message received on `{prefix}.{session_id}.result`
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultMessage {
    Transcript {
        session_id: String,
        text: String,
        #[serde(default)]
        partial: bool,
        timestamp: String,
        #[serde(default)]
        confidence: Option<f32>,
    },
    Completed {
        session_id: String,
    },
    Error {
        session_id: String,
        message: String,
    },
}

impl ResultMessage {
    pub fn session_id(&self) -> &str {
        match self {
            ResultMessage::Transcript { session_id, .. }
            | ResultMessage::Completed { session_id }
            | ResultMessage::Error { session_id, .. } => session_id,
        }
    }
}

impl From<ResultMessage> for ResultEvent {
    fn from(msg: ResultMessage) -> Self {
        match msg {
            ResultMessage::Transcript {
                text,
                partial,
                confidence,
                ..
            } => ResultEvent::Transcript(Transcript {
                text,
                partial,
                confidence,
            }),
            ResultMessage::Completed { .. } => ResultEvent::Completed,
            ResultMessage::Error { message, .. } => {
                ResultEvent::Error(TransportError::Remote(message))
            }
        }
    }
}
