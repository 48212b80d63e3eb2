// Integration tests for the session manager
//
// These tests drive full sessions against a scripted capture device and an
// in-memory transport, checking the outbound stream order, start/stop
// races and how inbound events end a session.

mod common;

use common::{
    block, manager, test_config, wait_until, AfterScript, RecordingTransport, ScriptedDevice,
    StalledTransport,
};
use std::sync::Arc;
use std::time::Duration;
use stt_stream::audio::encoder;
use stt_stream::{
    ResultEvent, SessionConfig, SessionManager, StartError, StreamMessage, Transcript,
    TranscriptLog, TransportError,
};

fn audio(samples: &[i16]) -> StreamMessage {
    StreamMessage::AudioChunk(encoder::encode(samples))
}

fn config_message() -> StreamMessage {
    StreamMessage::Config(SessionConfig::default().recognition_config())
}

#[tokio::test]
async fn test_stream_order_is_config_audio_end() {
    let blocks = vec![block(0, 160), block(1000, 160), block(2000, 160)];
    let device = Arc::new(ScriptedDevice::new(blocks.clone(), AfterScript::Exhaust));
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    manager.start().await.unwrap();

    // Exhausting the source ends the stream gracefully
    transport.wait_closed().await;

    assert_eq!(
        transport.messages(),
        vec![
            config_message(),
            audio(&blocks[0]),
            audio(&blocks[1]),
            audio(&blocks[2]),
            StreamMessage::EndOfStream,
        ]
    );
    assert!(wait_until(|| device.releases() == 1).await);
    assert!(!manager.is_running().await);
    assert!(manager.stop().await.is_none(), "session already ended");
}

#[tokio::test]
async fn test_stop_during_read_discards_that_block() {
    let blocks = vec![block(0, 160), block(1000, 160), block(2000, 160)];
    let (device, mut reads) = ScriptedDevice::new(blocks.clone(), AfterScript::Exhaust)
        .pause_at(1, Duration::from_millis(150))
        .notify_reads();
    let device = Arc::new(device);
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    manager.start().await.unwrap();

    // Stop while the second block is being read
    while let Some(index) = reads.recv().await {
        if index == 1 {
            break;
        }
    }
    let stats = manager.stop().await.expect("session was active");
    transport.wait_closed().await;

    assert_eq!(
        transport.messages(),
        vec![config_message(), audio(&blocks[0]), StreamMessage::EndOfStream]
    );
    assert_eq!(stats.chunks_sent, 1);
    assert!(!stats.is_running);
    // stop() waits for the capture loop, so the device is already released
    assert_eq!(device.releases(), 1);
    assert_eq!(device.opens(), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let device = Arc::new(ScriptedDevice::silent());
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    assert!(manager.stop().await.is_none(), "nothing to stop yet");

    manager.start().await.unwrap();
    assert!(wait_until(|| transport.count("audio") >= 3).await);

    let (first, second) = tokio::join!(manager.stop(), manager.stop());
    assert!(first.is_some() ^ second.is_some(), "exactly one stop owns the session");
    assert!(manager.stop().await.is_none());

    transport.wait_closed().await;
    assert_eq!(transport.count("end"), 1);
    assert_eq!(transport.kinds().last(), Some(&"end"));
    assert!(!manager.is_running().await);
    assert_eq!(device.releases(), 1);
}

#[tokio::test]
async fn test_start_while_running_is_rejected() {
    let device = Arc::new(ScriptedDevice::silent());
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    let session_id = manager.start().await.unwrap();
    assert!(wait_until(|| transport.count("audio") >= 1).await);

    assert!(matches!(manager.start().await, Err(StartError::AlreadyRunning)));

    assert!(manager.is_running().await);
    assert_eq!(manager.stats().await.unwrap().session_id, session_id);
    assert_eq!(transport.opens(), 1);
    assert_eq!(device.opens(), 1);
    assert_eq!(transport.count("config"), 1);
    assert_eq!(transport.kinds()[0], "config");

    manager.stop().await;
}

#[tokio::test]
async fn test_transcripts_are_appended_in_arrival_order() {
    let device = Arc::new(ScriptedDevice::silent());
    let transport = RecordingTransport::new();
    let log = Arc::new(TranscriptLog::new());
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::clone(&log));

    manager.start().await.unwrap();

    transport.emit(ResultEvent::Transcript(Transcript::new("안녕하세요"))).await;
    transport
        .emit(ResultEvent::Transcript(Transcript {
            text: "반갑".to_string(),
            partial: true,
            confidence: Some(0.5),
        }))
        .await;
    transport.emit(ResultEvent::Transcript(Transcript::new("반갑습니다"))).await;

    assert!(wait_until(|| log.len() == 3).await);
    assert_eq!(log.text(), "안녕하세요\n반갑\n반갑습니다\n");
    assert!(log.segments()[1].partial);
    assert_eq!(manager.stats().await.unwrap().transcripts_received, 3);
    assert!(manager.is_running().await, "transcripts do not end the session");

    manager.stop().await;
}

#[tokio::test]
async fn test_remote_error_halts_capture_and_ends_stream() {
    let device = Arc::new(ScriptedDevice::silent());
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    manager.start().await.unwrap();
    assert!(wait_until(|| transport.count("audio") >= 2).await);

    transport
        .emit(ResultEvent::Error(TransportError::Remote("quota exceeded".to_string())))
        .await;

    transport.wait_closed().await;
    assert!(!manager.is_running().await);
    assert!(wait_until(|| device.releases() == 1).await);

    let kinds = transport.kinds();
    assert_eq!(kinds.first(), Some(&"config"));
    assert_eq!(kinds.last(), Some(&"end"));
    assert_eq!(transport.count("end"), 1);

    // Nothing more is captured or sent once the device is released
    let sent = transport.messages().len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.messages().len(), sent);
    assert!(manager.stop().await.is_none());
}

#[tokio::test]
async fn test_remote_completion_does_not_resend_end_of_stream() {
    let device = Arc::new(ScriptedDevice::silent());
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    manager.start().await.unwrap();
    assert!(wait_until(|| transport.count("audio") >= 1).await);

    transport.emit(ResultEvent::Completed).await;

    transport.wait_closed().await;
    assert!(!manager.is_running().await);
    assert!(wait_until(|| device.releases() == 1).await);
    assert_eq!(transport.count("end"), 0);
    assert!(manager.stop().await.is_none());
}

#[tokio::test]
async fn test_transport_failure_rolls_back_start() {
    let device = Arc::new(ScriptedDevice::silent());
    let transport = RecordingTransport::refusing();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    let result = manager.start().await;
    assert!(matches!(result, Err(StartError::Setup(TransportError::Connect(_)))));

    assert!(!manager.is_running().await);
    assert!(manager.stats().await.is_none());
    // The device was opened for the attempt and must be handed back
    assert!(wait_until(|| device.releases() == 1).await);
    assert_eq!(device.opens(), 1);
    assert!(transport.messages().is_empty());
}

#[tokio::test]
async fn test_capture_init_failure_fails_start() {
    let device = Arc::new(ScriptedDevice::silent().fail_open());
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    let result = manager.start().await;
    assert!(matches!(result, Err(StartError::CaptureInit(_))));

    assert!(!manager.is_running().await);
    assert_eq!(transport.opens(), 0, "no stream without a device");
    assert_eq!(device.releases(), 0);
}

#[tokio::test]
async fn test_read_failure_ends_stream() {
    let blocks = vec![block(0, 160), block(500, 160)];
    let device = Arc::new(ScriptedDevice::new(blocks.clone(), AfterScript::Exhaust).fail_read_at(1));
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    manager.start().await.unwrap();
    transport.wait_closed().await;

    assert_eq!(
        transport.messages(),
        vec![config_message(), audio(&blocks[0]), StreamMessage::EndOfStream]
    );
    assert!(wait_until(|| device.releases() == 1).await);
    assert!(!manager.is_running().await);
}

#[tokio::test]
async fn test_session_can_restart_after_stop() {
    let device = Arc::new(ScriptedDevice::silent());
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    let first = manager.start().await.unwrap();
    manager.stop().await;
    transport.wait_closed().await;

    let second = manager.start().await.unwrap();
    assert_ne!(first, second);
    assert!(manager.is_running().await);

    manager.stop().await;
    transport.wait_closed().await;

    assert_eq!(device.opens(), 2);
    assert_eq!(device.releases(), 2);
    assert_eq!(transport.count("config"), 2);
    assert_eq!(transport.count("end"), 2);
}

#[tokio::test]
async fn test_block_size_falls_back_when_device_cannot_report() {
    let device = Arc::new(
        ScriptedDevice::new(vec![block(0, 10)], AfterScript::Exhaust).buffer_size(None),
    );
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    manager.start().await.unwrap();
    transport.wait_closed().await;

    // Two seconds at 16kHz
    assert_eq!(device.requested_block_sizes.lock().as_slice(), &[32_000]);
}

#[tokio::test]
async fn test_block_size_follows_device_buffer() {
    let device = Arc::new(
        ScriptedDevice::new(vec![block(0, 10)], AfterScript::Exhaust).buffer_size(Some(1280)),
    );
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    manager.start().await.unwrap();
    transport.wait_closed().await;

    assert_eq!(device.requested_block_sizes.lock().as_slice(), &[640]);
    assert_eq!(transport.messages()[1], audio(&block(0, 10)));
}

#[tokio::test]
async fn test_stop_returns_when_transport_stops_reading() {
    let device = Arc::new(ScriptedDevice::silent());
    let transport = StalledTransport::new();
    let config = SessionConfig {
        outbound_queue: 2,
        stop_timeout_ms: 300,
        ..test_config()
    };
    let manager = SessionManager::new(
        config,
        Arc::clone(&device) as _,
        Arc::clone(&transport) as _,
        Arc::new(TranscriptLog::new()),
    );

    manager.start().await.unwrap();

    // Config plus one chunk fill the queue; the capture loop is now waiting
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = tokio::time::timeout(Duration::from_secs(3), manager.stop())
        .await
        .expect("stop must not hang on a full queue")
        .expect("session was active");
    assert!(!stats.is_running);
    assert_eq!(stats.chunks_sent, 1);
    assert_eq!(device.releases(), 1);
    assert!(!manager.is_running().await);

    // No room for end-of-stream: the stream is closed instead
    let kinds: Vec<_> = transport.drain().await.iter().map(StreamMessage::kind).collect();
    assert_eq!(kinds, vec!["config", "audio"]);

    // The slot is free again
    assert!(manager.start().await.is_ok());
    manager.stop().await;
}

#[tokio::test]
async fn test_abandoned_stop_still_shuts_down() {
    let device = Arc::new(ScriptedDevice::silent());
    let transport = RecordingTransport::new();
    let manager = manager(Arc::clone(&device), Arc::clone(&transport), Arc::new(TranscriptLog::new()));

    manager.start().await.unwrap();

    // The caller gives up on stop() before the shutdown finishes
    let _ = tokio::time::timeout(Duration::from_millis(1), manager.stop()).await;
    assert!(!manager.is_running().await);

    transport.wait_closed().await;
    assert_eq!(transport.count("end"), 1);
    assert!(wait_until(|| device.releases() == 1).await);

    assert!(manager.start().await.is_ok());
    manager.stop().await;
}
