pub mod convert;
pub mod encoder;
pub mod file;
pub mod microphone;
pub mod source;

pub use file::{AudioFile, FileDevice};
pub use microphone::MicrophoneDevice;
pub use source::{AudioFormat, AudioSource, CaptureDevice, DeviceGuard, DEFAULT_SAMPLE_RATE};
