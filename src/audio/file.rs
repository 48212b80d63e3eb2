use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::info;

use super::convert;
use super::source::{AudioFormat, AudioSource, CaptureDevice};

/// A decoded WAV file
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            anyhow::bail!(
                "Unsupported WAV encoding: {:?} {} bits (expected 16-bit PCM)",
                spec.sample_format,
                spec.bits_per_sample
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Samples converted to mono at `sample_rate`
    pub fn to_mono_at(&self, sample_rate: u32) -> Vec<i16> {
        convert::to_mono_at(&self.samples, self.channels, self.sample_rate, sample_rate)
    }
}

/// Capture device that replays a WAV file
pub struct FileDevice {
    path: PathBuf,
    name: String,
    /// Sleep for each block's duration so the file streams like a live device
    realtime: bool,
}

impl FileDevice {
    pub fn new(path: impl Into<PathBuf>, realtime: bool) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self {
            path,
            name,
            realtime,
        }
    }
}

impl CaptureDevice for FileDevice {
    fn min_buffer_size(&self, format: &AudioFormat) -> Option<usize> {
        // 100ms blocks
        Some(format.sample_rate as usize / 10 * 2)
    }

    fn open(&self, format: &AudioFormat, _block_samples: usize) -> Result<Box<dyn AudioSource>> {
        let file = AudioFile::open(&self.path)?;
        let samples = file.to_mono_at(format.sample_rate);

        Ok(Box::new(FileSource {
            name: self.name.clone(),
            samples,
            position: 0,
            format: *format,
            realtime: self.realtime,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct FileSource {
    name: String,
    samples: Vec<i16>,
    position: usize,
    format: AudioFormat,
    realtime: bool,
}

impl AudioSource for FileSource {
    fn read_block(&mut self, buf: &mut [i16]) -> Result<usize> {
        let remaining = &self.samples[self.position..];
        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.position += count;

        if self.realtime && count > 0 {
            thread::sleep(Duration::from_millis(self.format.duration_ms(count)));
        }

        Ok(count)
    }

    fn release(&mut self) {
        info!(
            "File source released after {} of {} samples",
            self.position,
            self.samples.len()
        );
        self.samples.clear();
        self.position = 0;
    }

    fn name(&self) -> &str {
        &self.name
    }
}
