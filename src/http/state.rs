use crate::session::{SessionManager, TranscriptLog};
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single session slot
    pub manager: SessionManager,

    /// Transcripts the manager appends to
    pub transcripts: Arc<TranscriptLog>,
}

impl AppState {
    pub fn new(manager: SessionManager, transcripts: Arc<TranscriptLog>) -> Self {
        Self {
            manager,
            transcripts,
        }
    }
}
