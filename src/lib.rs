pub mod audio;
pub mod config;
pub mod http;
pub mod nats;
pub mod session;
pub mod transport;

pub use audio::{AudioFormat, AudioSource, CaptureDevice, FileDevice, MicrophoneDevice};
pub use config::Config;
pub use http::{create_router, AppState};
pub use nats::{NatsClient, NatsTransport};
pub use session::{
    RunFlag, SessionConfig, SessionManager, SessionStats, StartError, TranscriptLog,
    TranscriptSegment, TranscriptSink,
};
pub use transport::{
    RecognitionConfig, RequestChannel, ResultEvent, StreamMessage, Transcript, Transport,
    TransportError,
};
