use chrono::Utc;
use parking_lot::Mutex;
use std::io::Write;

use super::stats::TranscriptSegment;
use crate::transport::Transcript;

/// Caller-side output for recognized text.
///
/// Called once per transcript event, in arrival order, from the session's
/// result consumer task.
pub trait TranscriptSink: Send + Sync {
    fn append(&self, transcript: &Transcript);
}

/// Append-only transcript store
#[derive(Default)]
pub struct TranscriptLog {
    segments: Mutex<Vec<TranscriptSegment>>,
    /// Also print transcripts to stdout as they arrive
    echo: bool,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_echo() -> Self {
        Self {
            segments: Mutex::new(Vec::new()),
            echo: true,
        }
    }

    pub fn segments(&self) -> Vec<TranscriptSegment> {
        self.segments.lock().clone()
    }

    /// Every segment's text, one per line, in arrival order
    pub fn text(&self) -> String {
        self.segments
            .lock()
            .iter()
            .map(|s| format!("{}\n", s.text))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.segments.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.lock().is_empty()
    }
}

impl TranscriptSink for TranscriptLog {
    fn append(&self, transcript: &Transcript) {
        self.segments.lock().push(TranscriptSegment {
            text: transcript.text.clone(),
            timestamp: Utc::now(),
            confidence: transcript.confidence,
            partial: transcript.partial,
        });

        if self.echo {
            if transcript.partial {
                print!("\r{}", transcript.text);
                std::io::stdout().flush().ok();
            } else {
                println!("\r{}", transcript.text);
            }
        }
    }
}
