// Microphone capture through cpal
//
// cpal delivers audio on its own callback thread in the device's native
// format. The callback converts each buffer to 16-bit mono at the session
// rate and hands it to the capture thread over a bounded channel, where
// `read_block` assembles fixed-size blocks.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::convert::{self, Resampler};
use super::source::{AudioFormat, AudioSource, CaptureDevice};

/// Callback buffers queued between cpal and the capture thread
const CALLBACK_QUEUE_DEPTH: usize = 256;

/// Smallest block handed to the capture loop. Host periods reported by cpal
/// are often a few milliseconds, far below a useful recognition chunk.
const MIN_BLOCK_MS: usize = 100;

/// How long `read_block` waits on a silent device before failing
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// cpal-backed input device
pub struct MicrophoneDevice {
    /// Input device name, `None` for the host default
    device_name: Option<String>,
    name: String,
}

impl MicrophoneDevice {
    pub fn new(device_name: Option<String>) -> Self {
        let name = match &device_name {
            Some(n) => format!("microphone:{}", n),
            None => "microphone:default".to_string(),
        };
        Self { device_name, name }
    }

    fn find_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(wanted) => host
                .input_devices()
                .context("Failed to enumerate input devices")?
                .find(|d| d.name().ok().as_deref() == Some(wanted.as_str()))
                .ok_or_else(|| anyhow!("Input device not found: {}", wanted)),
            None => host
                .default_input_device()
                .ok_or_else(|| anyhow!("No default input device")),
        }
    }
}

impl CaptureDevice for MicrophoneDevice {
    fn min_buffer_size(&self, format: &AudioFormat) -> Option<usize> {
        let device = self.find_device().ok()?;
        let config = device.default_input_config().ok()?;

        let device_frames = match config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, .. } => *min as usize,
            cpal::SupportedBufferSize::Unknown => return None,
        };

        // Device frames are at the native rate; express them at the session rate
        let native_rate = config.sample_rate().0.max(1) as usize;
        let frames = device_frames * format.sample_rate as usize / native_rate;
        let floor = format.sample_rate as usize * MIN_BLOCK_MS / 1000;

        Some(frames.max(floor) * 2)
    }

    fn open(&self, format: &AudioFormat, block_samples: usize) -> Result<Box<dyn AudioSource>> {
        let device = self.find_device()?;
        let supported = device
            .default_input_config()
            .context("Failed to query input config")?;

        let native_channels = supported.channels();
        let native_rate = supported.sample_rate().0;
        let stream_config: cpal::StreamConfig = supported.config();

        let (tx, rx) = bounded::<Vec<i16>>(CALLBACK_QUEUE_DEPTH);
        let overruns = Arc::new(AtomicU64::new(0));
        let conversion = Conversion {
            channels: native_channels,
            resampler: Resampler::new(native_rate, format.sample_rate),
        };

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, tx, conversion, Arc::clone(&overruns))
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, tx, conversion, Arc::clone(&overruns))
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, tx, conversion, Arc::clone(&overruns))
            }
            other => bail!("Unsupported input sample format: {:?}", other),
        }?;

        stream.play().context("Failed to start input stream")?;

        info!(
            "Microphone capture started: {} ({}Hz, {} ch → {}Hz mono, {} samples/block)",
            self.name, native_rate, native_channels, format.sample_rate, block_samples
        );

        Ok(Box::new(MicrophoneSource {
            name: self.name.clone(),
            stream: Some(stream),
            rx,
            pending: VecDeque::with_capacity(block_samples * 2),
            overruns,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Per-stream conversion state, owned by the cpal callback
struct Conversion {
    channels: u16,
    resampler: Resampler,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: Sender<Vec<i16>>,
    mut conversion: Conversion,
    overruns: Arc<AtomicU64>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    i16: cpal::FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let native: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
                let mono = convert::to_mono(&native, conversion.channels);
                let samples = conversion.resampler.process(&mono);
                if samples.is_empty() {
                    return;
                }
                if tx.try_send(samples).is_err() {
                    overruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            move |err| {
                error!("Input stream error: {}", err);
            },
            None,
        )
        .context("Failed to build input stream")?;

    Ok(stream)
}

struct MicrophoneSource {
    name: String,
    stream: Option<cpal::Stream>,
    rx: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
    overruns: Arc<AtomicU64>,
}

impl AudioSource for MicrophoneSource {
    fn read_block(&mut self, buf: &mut [i16]) -> Result<usize> {
        while self.pending.len() < buf.len() {
            match self.rx.recv_timeout(STALL_TIMEOUT) {
                Ok(samples) => self.pending.extend(samples),
                Err(RecvTimeoutError::Timeout) => {
                    bail!("No audio from {} for {:?}", self.name, STALL_TIMEOUT)
                }
                // Stream gone: hand back whatever is buffered, then report exhaustion
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let overruns = self.overruns.swap(0, Ordering::Relaxed);
        if overruns > 0 {
            warn!("{} dropped {} callback buffers (capture loop behind)", self.name, overruns);
        }

        let count = self.pending.len().min(buf.len());
        for (slot, sample) in buf.iter_mut().zip(self.pending.drain(..count)) {
            *slot = sample;
        }
        Ok(count)
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause input stream: {}", e);
            }
            info!("Microphone released: {}", self.name);
        }
        self.pending.clear();
    }

    fn name(&self) -> &str {
        &self.name
    }
}
