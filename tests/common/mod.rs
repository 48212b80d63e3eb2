// Test doubles for session tests: a scripted capture device and an
// in-memory transport that records the outbound stream.

#![allow(dead_code)]

use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stt_stream::{
    AudioFormat, AudioSource, CaptureDevice, ResultEvent, SessionConfig, SessionManager,
    StreamMessage, TranscriptLog, Transport, TransportError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What a scripted source does once its blocks run out
#[derive(Clone, Copy)]
pub enum AfterScript {
    /// Report end of audio
    Exhaust,
    /// Keep producing short silent blocks, one per interval
    Silence(Duration),
}

/// Capture device that replays fixed blocks
pub struct ScriptedDevice {
    blocks: Vec<Vec<i16>>,
    after: AfterScript,
    pauses: Vec<(usize, Duration)>,
    fail_read_at: Option<usize>,
    fail_open: bool,
    buffer_size: Option<usize>,
    on_read: Option<mpsc::UnboundedSender<usize>>,
    pub opens: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
    pub requested_block_sizes: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedDevice {
    pub fn new(blocks: Vec<Vec<i16>>, after: AfterScript) -> Self {
        Self {
            blocks,
            after,
            pauses: Vec::new(),
            fail_read_at: None,
            fail_open: false,
            buffer_size: Some(320),
            on_read: None,
            opens: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
            requested_block_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Endless silence
    pub fn silent() -> Self {
        Self::new(Vec::new(), AfterScript::Silence(Duration::from_millis(5)))
    }

    /// Sleep before returning read number `index`
    pub fn pause_at(mut self, index: usize, pause: Duration) -> Self {
        self.pauses.push((index, pause));
        self
    }

    pub fn fail_read_at(mut self, index: usize) -> Self {
        self.fail_read_at = Some(index);
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn buffer_size(mut self, bytes: Option<usize>) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Report each read index as the read starts
    pub fn notify_reads(mut self) -> (Self, mpsc::UnboundedReceiver<usize>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_read = Some(tx);
        (self, rx)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl CaptureDevice for ScriptedDevice {
    fn min_buffer_size(&self, _format: &AudioFormat) -> Option<usize> {
        self.buffer_size
    }

    fn open(&self, _format: &AudioFormat, block_samples: usize) -> Result<Box<dyn AudioSource>> {
        self.requested_block_sizes.lock().push(block_samples);
        if self.fail_open {
            bail!("device busy");
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedSource {
            blocks: self.blocks.clone(),
            after: self.after,
            pauses: self.pauses.clone(),
            fail_read_at: self.fail_read_at,
            on_read: self.on_read.clone(),
            reads: 0,
            releases: Arc::clone(&self.releases),
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSource {
    blocks: Vec<Vec<i16>>,
    after: AfterScript,
    pauses: Vec<(usize, Duration)>,
    fail_read_at: Option<usize>,
    on_read: Option<mpsc::UnboundedSender<usize>>,
    reads: usize,
    releases: Arc<AtomicUsize>,
}

impl AudioSource for ScriptedSource {
    fn read_block(&mut self, buf: &mut [i16]) -> Result<usize> {
        let index = self.reads;
        self.reads += 1;

        if let Some(tx) = &self.on_read {
            let _ = tx.send(index);
        }
        if self.fail_read_at == Some(index) {
            bail!("device unplugged");
        }
        for (at, pause) in &self.pauses {
            if *at == index {
                std::thread::sleep(*pause);
            }
        }

        if let Some(block) = self.blocks.get(index) {
            let count = block.len().min(buf.len());
            buf[..count].copy_from_slice(&block[..count]);
            return Ok(count);
        }

        match self.after {
            AfterScript::Exhaust => Ok(0),
            AfterScript::Silence(interval) => {
                std::thread::sleep(interval);
                let count = buf.len().min(160);
                buf[..count].fill(0);
                Ok(count)
            }
        }
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// In-memory transport: records outbound messages, lets tests inject events
#[derive(Default)]
pub struct RecordingTransport {
    fail_open: bool,
    opens: AtomicUsize,
    messages: Arc<Mutex<Vec<StreamMessage>>>,
    events: Mutex<Option<mpsc::Sender<ResultEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            fail_open: true,
            ..Self::default()
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<StreamMessage> {
        self.messages.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.messages.lock().iter().map(StreamMessage::kind).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    /// Push an event as if the service had emitted it
    pub async fn emit(&self, event: ResultEvent) {
        let tx = self.events.lock().clone().expect("stream not open");
        tx.send(event).await.expect("result consumer gone");
    }

    /// Wait for the latest stream's request channel to end
    pub async fn wait_closed(&self) {
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            tokio::time::timeout(Duration::from_secs(5), pump)
                .await
                .expect("request stream did not close")
                .expect("pump panicked");
        }
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn open(
        &self,
        _session_id: &str,
        mut requests: mpsc::Receiver<StreamMessage>,
        events: mpsc::Sender<ResultEvent>,
    ) -> Result<(), TransportError> {
        if self.fail_open {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let messages = Arc::clone(&self.messages);
        let pump = tokio::spawn(async move {
            while let Some(msg) = requests.recv().await {
                let end = msg == StreamMessage::EndOfStream;
                messages.lock().push(msg);
                if end {
                    break;
                }
            }
        });

        *self.events.lock() = Some(events);
        *self.pump.lock() = Some(pump);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Transport that accepts the stream but never reads it, so the outbound
/// queue fills up
#[derive(Default)]
pub struct StalledTransport {
    requests: Mutex<Option<mpsc::Receiver<StreamMessage>>>,
    events: Mutex<Option<mpsc::Sender<ResultEvent>>>,
}

impl StalledTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything that was queued, once every sender is gone
    pub async fn drain(&self) -> Vec<StreamMessage> {
        let mut requests = self.requests.lock().take().expect("stream not open");
        let mut messages = Vec::new();
        while let Some(msg) = requests.recv().await {
            messages.push(msg);
        }
        messages
    }
}

#[async_trait::async_trait]
impl Transport for StalledTransport {
    async fn open(
        &self,
        _session_id: &str,
        requests: mpsc::Receiver<StreamMessage>,
        events: mpsc::Sender<ResultEvent>,
    ) -> Result<(), TransportError> {
        *self.requests.lock() = Some(requests);
        *self.events.lock() = Some(events);
        Ok(())
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        stop_timeout_ms: 2000,
        drain_timeout_ms: 500,
        ..SessionConfig::default()
    }
}

pub fn manager(
    device: Arc<ScriptedDevice>,
    transport: Arc<RecordingTransport>,
    log: Arc<TranscriptLog>,
) -> SessionManager {
    SessionManager::new(test_config(), device, transport, log)
}

/// Poll `condition` until it holds or five seconds pass
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub fn block(start: i16, len: usize) -> Vec<i16> {
    (0..len as i16).map(|i| start.wrapping_add(i)).collect()
}
