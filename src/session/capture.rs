// Capture thread: one per session
//
// The device is opened on the capture thread itself (cpal streams cannot
// move between threads), then the thread reports readiness and waits for
// the manager to finish transport setup before reading audio. Dropping the
// go signal instead releases the device without sending anything.

use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::flag::RunFlag;
use crate::audio::{encoder, AudioFormat, CaptureDevice, DeviceGuard};
use crate::transport::RequestChannel;

/// Why the capture loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CaptureExit {
    /// The run flag was lowered
    Halted,
    /// The source reported end of audio
    Exhausted,
    /// Reading or sending failed
    Failed(String),
}

/// Per-session capture counters, delivered when the thread finishes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub blocks_read: u64,
    pub chunks_sent: u64,
    /// Blocks read but not sent because a stop landed during the read
    pub blocks_discarded: u64,
}

pub(crate) struct CaptureParams {
    pub session_id: String,
    pub device: Arc<dyn CaptureDevice>,
    pub format: AudioFormat,
    pub block_samples: usize,
    pub flag: RunFlag,
    pub requests: RequestChannel,
    pub exit_tx: mpsc::Sender<CaptureExit>,
}

pub(crate) struct CaptureHandle {
    ready: oneshot::Receiver<Result<(), String>>,
    go: Option<oneshot::Sender<()>>,
    pub done: oneshot::Receiver<CaptureReport>,
}

impl CaptureHandle {
    /// Wait for the device to open
    pub async fn ready(&mut self) -> Result<(), String> {
        match (&mut self.ready).await {
            Ok(result) => result,
            Err(_) => Err("capture thread exited during initialization".to_string()),
        }
    }

    /// Let the capture loop start reading
    pub fn go(&mut self) {
        if let Some(go) = self.go.take() {
            let _ = go.send(());
        }
    }
}

pub(crate) fn spawn(params: CaptureParams) -> std::io::Result<CaptureHandle> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (go_tx, go_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();

    thread::Builder::new()
        .name(format!("capture-{}", params.session_id))
        .spawn(move || run(params, ready_tx, go_rx, done_tx))?;

    Ok(CaptureHandle {
        ready: ready_rx,
        go: Some(go_tx),
        done: done_rx,
    })
}

fn run(
    params: CaptureParams,
    ready_tx: oneshot::Sender<Result<(), String>>,
    go_rx: oneshot::Receiver<()>,
    done_tx: oneshot::Sender<CaptureReport>,
) {
    let source = match params.device.open(&params.format, params.block_samples) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open {}: {:#}", params.device.name(), e);
            let _ = ready_tx.send(Err(format!("{:#}", e)));
            return;
        }
    };
    let mut device = DeviceGuard::new(source);

    if ready_tx.send(Ok(())).is_err() || go_rx.blocking_recv().is_err() {
        info!("Session {} setup abandoned; releasing device", params.session_id);
        return;
    }

    info!(
        "Capture loop started: {} ({} samples/block)",
        device.name(),
        params.block_samples
    );

    let (report, exit) = capture_loop(&mut device, &params);
    drop(device);

    info!(
        "Capture loop stopped ({:?}): {} blocks read, {} sent, {} discarded",
        exit, report.blocks_read, report.chunks_sent, report.blocks_discarded
    );

    // Capacity 1 and a single send: never blocks
    if params.exit_tx.try_send(exit).is_err() {
        debug!("Result consumer already gone");
    }
    let _ = done_tx.send(report);
}

fn capture_loop(device: &mut DeviceGuard, params: &CaptureParams) -> (CaptureReport, CaptureExit) {
    let mut buf = vec![0i16; params.block_samples.max(1)];
    let mut report = CaptureReport::default();

    let exit = loop {
        if !params.flag.is_running() {
            break CaptureExit::Halted;
        }

        let count = match device.read_block(&mut buf) {
            Ok(0) => break CaptureExit::Exhausted,
            Ok(n) => n.min(buf.len()),
            Err(e) => break CaptureExit::Failed(format!("{:#}", e)),
        };
        report.blocks_read += 1;

        let bytes = encoder::encode(&buf[..count]);

        // The read can take a full buffer of real time; a stop may have landed
        if !params.flag.is_running() {
            report.blocks_discarded += 1;
            break CaptureExit::Halted;
        }

        match params.requests.blocking_send_audio(bytes, &params.flag) {
            Ok(true) => report.chunks_sent += 1,
            Ok(false) => {
                report.blocks_discarded += 1;
                break CaptureExit::Halted;
            }
            Err(e) => break CaptureExit::Failed(e.to_string()),
        }
    };

    (report, exit)
}
