use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use super::message::{RecognitionConfig, StreamMessage};
use super::TransportError;
use crate::session::RunFlag;

/// How often a capture thread retries a chunk while the queue is full
const FULL_QUEUE_RETRY: Duration = Duration::from_millis(5);

struct ChannelState {
    /// `None` once the stream has been finished or abandoned
    sender: Option<mpsc::Sender<StreamMessage>>,
    configured: bool,
}

/// Outbound half of a recognition stream.
///
/// Shared between the session manager (config, end-of-stream) and the
/// capture thread (audio chunks). Audio is only enqueued under the state
/// lock and closing takes the sender under the same lock, so nothing can
/// follow `EndOfStream` and no audio can precede `Config`. The lock is never
/// held while waiting for queue space.
#[derive(Clone)]
pub struct RequestChannel {
    state: Arc<Mutex<ChannelState>>,
    chunks_sent: Arc<AtomicU64>,
}

impl RequestChannel {
    /// Create a channel holding at most `capacity` unsent messages. The
    /// receiver goes to the transport adapter.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StreamMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let channel = Self {
            state: Arc::new(Mutex::new(ChannelState {
                sender: Some(tx),
                configured: false,
            })),
            chunks_sent: Arc::new(AtomicU64::new(0)),
        };
        (channel, rx)
    }

    /// Send the configuration message. Only valid once, before any audio.
    pub async fn send_config(&self, config: RecognitionConfig) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if state.configured {
            return Err(TransportError::OutOfOrder("config already sent"));
        }
        let sender = state.sender.as_ref().ok_or(TransportError::Closed)?;
        sender
            .send(StreamMessage::Config(config))
            .await
            .map_err(|_| TransportError::Closed)?;
        state.configured = true;
        Ok(())
    }

    /// Send one audio chunk from a blocking context, waiting while the queue
    /// is full.
    ///
    /// `running` is checked before every attempt, so a stop ends the wait
    /// within one retry interval. Returns `Ok(false)` when the chunk was
    /// discarded because the session stopped or the stream was already
    /// closed.
    ///
    /// Must not be called from inside the async runtime.
    pub fn blocking_send_audio(
        &self,
        bytes: Vec<u8>,
        running: &RunFlag,
    ) -> Result<bool, TransportError> {
        let mut message = StreamMessage::AudioChunk(bytes);

        loop {
            {
                let state = self.state.blocking_lock();
                if !state.configured {
                    return Err(TransportError::OutOfOrder("audio before config"));
                }
                let Some(sender) = state.sender.as_ref() else {
                    return Ok(false);
                };
                if !running.is_running() {
                    return Ok(false);
                }

                match sender.try_send(message) {
                    Ok(()) => {
                        self.chunks_sent.fetch_add(1, Ordering::SeqCst);
                        return Ok(true);
                    }
                    Err(TrySendError::Full(returned)) => message = returned,
                    Err(TrySendError::Closed(_)) => return Err(TransportError::Closed),
                }
            }

            thread::sleep(FULL_QUEUE_RETRY);
            if !running.is_running() {
                return Ok(false);
            }
        }
    }

    /// Close the channel with `EndOfStream`, waiting at most `timeout` for
    /// queue space. When the transport does not drain in time the channel
    /// is closed without it.
    ///
    /// Returns `true` only for the call that actually sent it.
    pub async fn finish(&self, timeout: Duration) -> bool {
        let Some(sender) = self.state.lock().await.sender.take() else {
            return false;
        };
        match tokio::time::timeout(timeout, sender.send(StreamMessage::EndOfStream)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                debug!("Transport gone before end-of-stream");
                false
            }
            Err(_) => {
                warn!("Transport did not accept end-of-stream within {:?}; closing", timeout);
                false
            }
        }
    }

    /// Close the channel without `EndOfStream`, for streams the remote side
    /// has already completed.
    pub async fn abandon(&self) -> bool {
        self.state.lock().await.sender.take().is_some()
    }

    /// Audio chunks accepted so far
    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::SeqCst)
    }
}
