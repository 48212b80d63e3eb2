use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::capture::{self, CaptureExit, CaptureParams, CaptureReport};
use super::config::SessionConfig;
use super::error::StartError;
use super::flag::RunFlag;
use super::sink::TranscriptSink;
use super::stats::SessionStats;
use crate::audio::CaptureDevice;
use crate::transport::{RequestChannel, ResultEvent, Transport, TransportError};

/// How a session is being shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    /// Caller stop, remote error or capture failure: send `EndOfStream`
    EndOfStream,
    /// The remote side already completed the stream
    Completed,
}

/// One active recognition session, owned by the manager while it runs
struct Session {
    id: String,
    flag: RunFlag,
    requests: RequestChannel,
    started_at: DateTime<Utc>,
    transcripts: Arc<AtomicU64>,
    /// Signalled on halt so the result consumer can start its drain timer
    halted: Arc<Notify>,
    capture_done: Option<oneshot::Receiver<CaptureReport>>,
}

impl Session {
    fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        SessionStats {
            session_id: self.id.clone(),
            is_running: self.flag.is_running(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_sent: self.requests.chunks_sent(),
            transcripts_received: self.transcripts.load(Ordering::SeqCst),
        }
    }
}

struct Inner {
    config: SessionConfig,
    device: Arc<dyn CaptureDevice>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn TranscriptSink>,
    active: Mutex<Option<Session>>,
}

/// Runs at most one streaming recognition session at a time.
///
/// `start` opens the capture device and the transport, sends the
/// configuration message and launches the capture thread. Transcripts are
/// appended to the sink by a per-session consumer task, which also turns
/// remote errors, remote completion and capture failures into a stop.
///
/// Cloning is cheap; clones share the same session slot.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        device: Arc<dyn CaptureDevice>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn TranscriptSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                device,
                transport,
                sink,
                active: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Start a session and return its id
    pub async fn start(&self) -> Result<String, StartError> {
        let mut active = self.inner.active.lock().await;
        if let Some(session) = active.as_ref() {
            warn!("Session {} already running", session.id);
            return Err(StartError::AlreadyRunning);
        }

        let config = &self.inner.config;
        let session_id = format!("session-{}", uuid::Uuid::new_v4());
        info!(
            "Starting session {} ({} via {})",
            session_id,
            self.inner.device.name(),
            self.inner.transport.name()
        );

        let format = config.audio_format();
        let buffer_size = self.inner.device.min_buffer_size(&format);
        if buffer_size.is_none() {
            warn!(
                "{} did not report a buffer size; using {} sample blocks",
                self.inner.device.name(),
                format.fallback_block_samples()
            );
        }
        let block_samples = format.block_samples(buffer_size);

        let flag = RunFlag::new();
        let (requests, request_rx) = RequestChannel::new(config.outbound_queue);
        let (exit_tx, exit_rx) = mpsc::channel(1);

        // Open the device first so a dead microphone never reaches the wire
        let mut capture = capture::spawn(CaptureParams {
            session_id: session_id.clone(),
            device: Arc::clone(&self.inner.device),
            format,
            block_samples,
            flag: flag.clone(),
            requests: requests.clone(),
            exit_tx,
        })
        .map_err(|e| StartError::CaptureInit(format!("failed to spawn capture thread: {}", e)))?;

        capture.ready().await.map_err(StartError::CaptureInit)?;

        let (event_tx, event_rx) = mpsc::channel(config.inbound_queue.max(1));
        self.inner
            .transport
            .open(&session_id, request_rx, event_tx)
            .await
            .map_err(|e| {
                error!("Failed to open stream for {}: {}", session_id, e);
                StartError::Setup(e)
            })?;

        if let Err(e) = requests.send_config(config.recognition_config()).await {
            error!("Failed to send configuration for {}: {}", session_id, e);
            requests.abandon().await;
            return Err(StartError::Setup(e));
        }

        flag.raise();
        capture.go();

        let session = Session {
            id: session_id.clone(),
            flag,
            requests,
            started_at: Utc::now(),
            transcripts: Arc::new(AtomicU64::new(0)),
            halted: Arc::new(Notify::new()),
            capture_done: Some(capture.done),
        };

        tokio::spawn(self.clone().consume(
            session_id.clone(),
            event_rx,
            exit_rx,
            Arc::clone(&session.transcripts),
            Arc::clone(&session.halted),
        ));

        *active = Some(session);
        info!("Session {} started", session_id);

        Ok(session_id)
    }

    /// Stop the active session, if any.
    ///
    /// Halts capture, sends `EndOfStream`, then waits up to the configured
    /// stop timeout for the capture loop to release the device. Returns the
    /// stopped session's stats. Idempotent; safe to call concurrently.
    ///
    /// The shutdown runs on its own task, so dropping this future does not
    /// abandon a half-stopped session.
    pub async fn stop(&self) -> Option<SessionStats> {
        let Some(shutdown) = self.halt(None, Halt::EndOfStream).await else {
            debug!("Stop requested with no active session");
            return None;
        };

        match shutdown.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!("Session shutdown task failed: {}", e);
                None
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.flag.is_running())
    }

    /// Stats for the active session
    pub async fn stats(&self) -> Option<SessionStats> {
        self.inner.active.lock().await.as_ref().map(Session::stats)
    }

    /// Take the session out of the slot and start shutting its stream down.
    ///
    /// With `expected` set, only that session is halted, so a late event
    /// from an old stream cannot stop a newer one. The slot lock is released
    /// before any transport I/O.
    async fn halt(&self, expected: Option<&str>, mode: Halt) -> Option<JoinHandle<SessionStats>> {
        let session = {
            let mut active = self.inner.active.lock().await;
            if let (Some(expected), Some(current)) = (expected, active.as_ref()) {
                if current.id != expected {
                    return None;
                }
            }
            active.take()?
        };

        if session.flag.lower() {
            info!("Halting session {}", session.id);
        }
        session.halted.notify_one();

        Some(tokio::spawn(shutdown(
            session,
            mode,
            self.inner.config.stop_timeout(),
        )))
    }

    /// Result consumer: applies inbound events to the sink and session state
    /// in arrival order.
    async fn consume(
        self,
        session_id: String,
        mut events: mpsc::Receiver<ResultEvent>,
        mut capture_exit: mpsc::Receiver<CaptureExit>,
        transcripts: Arc<AtomicU64>,
        halted: Arc<Notify>,
    ) {
        let drain_timeout = self.inner.config.drain_timeout();
        let mut capture_running = true;
        let mut drain_deadline: Option<Instant> = None;

        loop {
            let deadline = drain_deadline.unwrap_or_else(|| Instant::now() + drain_timeout);

            tokio::select! {
                event = events.recv() => match event {
                    Some(ResultEvent::Transcript(transcript)) => {
                        transcripts.fetch_add(1, Ordering::SeqCst);
                        debug!(
                            "Transcript for {} (partial={}): {}",
                            session_id, transcript.partial, transcript.text
                        );
                        self.inner.sink.append(&transcript);
                    }
                    Some(ResultEvent::Error(e)) => {
                        error!("Recognition stream {} failed: {}", session_id, e);
                        self.halt(Some(&session_id), Halt::EndOfStream).await;
                        break;
                    }
                    Some(ResultEvent::Completed) => {
                        info!("Recognition stream {} completed", session_id);
                        self.halt(Some(&session_id), Halt::Completed).await;
                        break;
                    }
                    None => {
                        warn!(
                            "Transport for {} closed its events without a terminal event: {}",
                            session_id,
                            TransportError::Closed
                        );
                        self.halt(Some(&session_id), Halt::EndOfStream).await;
                        break;
                    }
                },

                exit = capture_exit.recv(), if capture_running => {
                    capture_running = false;
                    match exit {
                        Some(CaptureExit::Halted) => {}
                        Some(CaptureExit::Exhausted) => {
                            info!("Audio source for {} exhausted; ending stream", session_id);
                            self.halt(Some(&session_id), Halt::EndOfStream).await;
                        }
                        Some(CaptureExit::Failed(cause)) => {
                            error!("Capture for {} failed: {}", session_id, cause);
                            self.halt(Some(&session_id), Halt::EndOfStream).await;
                        }
                        None => {
                            error!("Capture thread for {} ended unexpectedly", session_id);
                            self.halt(Some(&session_id), Halt::EndOfStream).await;
                        }
                    }
                }

                _ = halted.notified(), if drain_deadline.is_none() => {
                    drain_deadline = Some(Instant::now() + drain_timeout);
                }

                _ = tokio::time::sleep_until(deadline), if drain_deadline.is_some() => {
                    warn!(
                        "No terminal event for {} within {:?} of stop; closing results",
                        session_id, drain_timeout
                    );
                    break;
                }
            }
        }

        debug!("Result consumer for {} finished", session_id);
    }
}

/// Close the request stream, then wait for the capture loop to release the
/// device. Each wait is bounded by `timeout`.
async fn shutdown(mut session: Session, mode: Halt, timeout: Duration) -> SessionStats {
    match mode {
        Halt::EndOfStream => {
            if session.requests.finish(timeout).await {
                debug!("End-of-stream sent for {}", session.id);
            }
        }
        Halt::Completed => {
            session.requests.abandon().await;
        }
    }

    if let Some(done) = session.capture_done.take() {
        match tokio::time::timeout(timeout, done).await {
            Ok(Ok(report)) => debug!("Capture acknowledged stop: {:?}", report),
            Ok(Err(_)) => warn!("Capture thread for {} ended without a report", session.id),
            Err(_) => warn!(
                "Capture loop for {} did not acknowledge stop within {:?}",
                session.id, timeout
            ),
        }
    }

    let stats = session.stats();
    info!(
        "Session {} stopped ({} chunks sent, {} transcripts)",
        stats.session_id, stats.chunks_sent, stats.transcripts_received
    );
    stats
}
