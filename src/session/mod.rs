//! Streaming recognition session management
//!
//! This module provides the `SessionManager` that owns one session at a time:
//! - Capture thread reading the audio device and streaming encoded chunks
//! - Ordered outbound stream (config, audio, end-of-stream)
//! - Result consumer forwarding transcripts to the caller's sink
//! - Start/stop state and shutdown from either side of the stream

mod capture;
mod config;
mod error;
mod flag;
mod manager;
mod sink;
mod stats;

pub use capture::CaptureReport;
pub use config::SessionConfig;
pub use error::StartError;
pub use flag::RunFlag;
pub use manager::SessionManager;
pub use sink::{TranscriptLog, TranscriptSink};
pub use stats::{SessionStats, TranscriptSegment};
