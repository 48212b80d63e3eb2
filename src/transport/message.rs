use serde::{Deserialize, Serialize};

use super::TransportError;

/// Audio encoding announced in the configuration message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    /// Signed 16-bit little-endian PCM
    Linear16,
}

/// Recognition parameters sent once at the start of every stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub encoding: AudioEncoding,
    pub sample_rate_hertz: u32,
    pub language_code: String,
}

/// One outbound message on the request stream.
///
/// A stream carries exactly `Config, AudioChunk*, EndOfStream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    Config(RecognitionConfig),
    /// Little-endian PCM bytes of one captured block
    AudioChunk(Vec<u8>),
    EndOfStream,
}

impl StreamMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Config(_) => "config",
            StreamMessage::AudioChunk(_) => "audio",
            StreamMessage::EndOfStream => "end",
        }
    }
}

/// Recognized text for a portion of the stream (best alternative)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Interim hypothesis that later results may refine
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            partial: false,
            confidence: None,
        }
    }
}

/// One inbound event from the recognition service.
///
/// Any number of `Transcript` events precede exactly one terminal
/// `Error` or `Completed`.
#[derive(Debug)]
pub enum ResultEvent {
    Transcript(Transcript),
    Error(TransportError),
    Completed,
}

impl ResultEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultEvent::Transcript(_))
    }
}
