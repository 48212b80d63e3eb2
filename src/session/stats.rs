use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Whether capture is currently active
    pub is_running: bool,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Audio chunks sent on the stream
    pub chunks_sent: u64,

    /// Transcript events received
    pub transcripts_received: u64,
}

/// A single transcript segment from the recognition service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Transcribed text
    pub text: String,

    /// When this segment was received
    pub timestamp: DateTime<Utc>,

    /// Confidence score (0.0 to 1.0), if available
    pub confidence: Option<f32>,

    /// Whether this is a partial (interim) result
    pub partial: bool,
}
