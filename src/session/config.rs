use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::{AudioFormat, DEFAULT_SAMPLE_RATE};
use crate::transport::{AudioEncoding, RecognitionConfig};

/// Static configuration for recognition sessions.
///
/// Fixed for the lifetime of a `SessionManager`; nothing is renegotiated
/// mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// BCP-47 language code sent in the configuration message
    pub language_code: String,

    /// Sample rate for capture and the stream (the service expects 16kHz).
    /// Audio is always mono.
    pub sample_rate: u32,

    /// Outbound messages queued before the capture loop waits
    pub outbound_queue: usize,

    /// Inbound events queued between the transport and the result consumer
    pub inbound_queue: usize,

    /// How long `stop()` waits for the end-of-stream send, and again for the
    /// capture loop to acknowledge
    pub stop_timeout_ms: u64,

    /// How long results are still accepted after a stop before the session
    /// stops listening for the terminal event
    pub drain_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language_code: "ko-KR".to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            outbound_queue: 32,
            inbound_queue: 64,
            stop_timeout_ms: 2000,
            drain_timeout_ms: 5000,
        }
    }
}

impl SessionConfig {
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
        }
    }

    pub fn recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig {
            encoding: AudioEncoding::Linear16,
            sample_rate_hertz: self.sample_rate,
            language_code: self.language_code.clone(),
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
