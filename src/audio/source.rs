use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// Sample rate the recognition service expects
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// PCM format of captured audio: signed 16-bit mono. Sources downmix
/// whatever the device delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl AudioFormat {
    /// Block size used when the device cannot report its buffer size:
    /// two seconds of audio.
    pub fn fallback_block_samples(&self) -> usize {
        2 * self.sample_rate as usize
    }

    /// Samples per block for a device buffer of `buffer_bytes` bytes.
    ///
    /// `None` (query failed) or a buffer too small to hold one sample falls
    /// back to [`AudioFormat::fallback_block_samples`].
    pub fn block_samples(&self, buffer_bytes: Option<usize>) -> usize {
        match buffer_bytes {
            Some(bytes) if bytes >= 2 => bytes / 2,
            _ => self.fallback_block_samples(),
        }
    }

    /// Duration of `samples` samples in milliseconds
    pub fn duration_ms(&self, samples: usize) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        samples as u64 * 1000 / self.sample_rate as u64
    }
}

/// An opened capture device.
///
/// Lives entirely on the capture thread, so implementations may hold
/// handles that are not `Send` (cpal streams, for example).
pub trait AudioSource {
    /// Read up to `buf.len()` samples, blocking for roughly one buffer of
    /// real time.
    ///
    /// Returns the number of samples written. `Ok(0)` means the source is
    /// exhausted and will produce nothing further.
    fn read_block(&mut self, buf: &mut [i16]) -> Result<usize>;

    /// Stop capturing and release the underlying device.
    fn release(&mut self);

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Factory for capture sources.
///
/// Platform-specific implementations:
/// - Microphone: cpal default or named input device
/// - File: WAV file served block by block (testing/batch processing)
pub trait CaptureDevice: Send + Sync {
    /// Minimum device buffer size in bytes for `format`, or `None` when the
    /// device cannot answer.
    fn min_buffer_size(&self, format: &AudioFormat) -> Option<usize>;

    /// Open and start the device. Called on the capture thread.
    fn open(&self, format: &AudioFormat, block_samples: usize) -> Result<Box<dyn AudioSource>>;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Owns an opened [`AudioSource`] and releases it exactly once when dropped,
/// including when the capture loop unwinds.
pub struct DeviceGuard {
    source: Box<dyn AudioSource>,
}

impl DeviceGuard {
    pub fn new(source: Box<dyn AudioSource>) -> Self {
        Self { source }
    }
}

impl Deref for DeviceGuard {
    type Target = dyn AudioSource;

    fn deref(&self) -> &Self::Target {
        self.source.as_ref()
    }
}

impl DerefMut for DeviceGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.source.as_mut()
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        debug!("Releasing capture device: {}", self.source.name());
        self.source.release();
    }
}
