use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::audio::{CaptureDevice, FileDevice, MicrophoneDevice};
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub transport: TransportConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct TransportConfig {
    pub nats_url: String,
    /// Subjects are `{subject_prefix}.{session_id}.request|result`
    pub subject_prefix: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Microphone,
    File,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub source: SourceKind,
    /// Input device name; the host default when unset
    pub device: Option<String>,
    /// WAV file for `source = "file"`
    pub file_path: Option<PathBuf>,
    /// Pace file playback to real time
    pub realtime: bool,
}

impl AudioConfig {
    /// Build the capture device this config describes
    pub fn capture_device(&self) -> Result<Arc<dyn CaptureDevice>> {
        match self.source {
            SourceKind::Microphone => Ok(Arc::new(MicrophoneDevice::new(self.device.clone()))),
            SourceKind::File => {
                let path = self
                    .file_path
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("audio.file_path is required for file source"))?;
                Ok(Arc::new(FileDevice::new(path, self.realtime)))
            }
        }
    }
}

impl Config {
    /// Load `path` (any format the config crate understands), then apply
    /// `STT_STREAM__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("STT_STREAM").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
