use thiserror::Error;

use crate::transport::TransportError;

/// Why `SessionManager::start` did not start a session.
///
/// None of these leave anything running: no open stream, no open device.
#[derive(Error, Debug)]
pub enum StartError {
    /// A session is already active; it is left untouched
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Capture device failed to initialize: {0}")]
    CaptureInit(String),

    #[error("Stream setup failed: {0}")]
    Setup(#[from] TransportError),
}
