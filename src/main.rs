use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stt_stream::audio::{CaptureDevice, FileDevice};
use stt_stream::config::SourceKind;
use stt_stream::{create_router, AppState, Config, NatsTransport, SessionManager, TranscriptLog};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stt-stream", version, about = "Stream live audio to a speech recognition service")]
struct Cli {
    /// Config file path (extension optional)
    #[arg(short, long, default_value = "config/stt-stream")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one session and print transcripts until Ctrl-C
    Listen(ListenArgs),
    /// Serve the HTTP control API
    Serve,
}

#[derive(Args, Default)]
struct ListenArgs {
    /// Stream a WAV file instead of the microphone
    #[arg(long)]
    file: Option<PathBuf>,

    /// Input device name
    #[arg(long)]
    device: Option<String>,

    /// Language code override
    #[arg(long)]
    language: Option<String>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Command::Listen(ListenArgs::default())) {
        Command::Listen(args) => {
            if let Some(language) = args.language {
                cfg.session.language_code = language;
            }
            if args.device.is_some() {
                cfg.audio.device = args.device;
            }
            listen(cfg, args.file, args.duration).await
        }
        Command::Serve => serve(cfg).await,
    }
}

fn build_manager(cfg: &Config, file: Option<PathBuf>, transcripts: Arc<TranscriptLog>) -> Result<SessionManager> {
    let device: Arc<dyn CaptureDevice> = match file {
        Some(path) => Arc::new(FileDevice::new(path, true)),
        None => cfg.audio.capture_device()?,
    };
    let transport = Arc::new(NatsTransport::new(
        cfg.transport.nats_url.clone(),
        cfg.transport.subject_prefix.clone(),
    ));

    Ok(SessionManager::new(cfg.session.clone(), device, transport, transcripts))
}

async fn listen(cfg: Config, file: Option<PathBuf>, duration: Option<u64>) -> Result<()> {
    let source = if file.is_some() { SourceKind::File } else { cfg.audio.source };
    info!("Listening ({:?} source, language {})", source, cfg.session.language_code);

    let transcripts = Arc::new(TranscriptLog::with_echo());
    let manager = build_manager(&cfg, file, Arc::clone(&transcripts))?;

    if let Err(e) = manager.start().await {
        error!("Failed to start, check logs: {}", e);
        return Err(e.into());
    }

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    let ended = async {
        while manager.is_running().await {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = deadline => info!("Duration reached"),
        _ = ended => info!("Session ended"),
    }

    if let Some(stats) = manager.stop().await {
        info!(
            "Session {}: {:.1}s, {} chunks sent, {} transcripts",
            stats.session_id, stats.duration_secs, stats.chunks_sent, stats.transcripts_received
        );
    }

    // Results for the tail of the audio may still be in flight
    tokio::time::sleep(Duration::from_millis(cfg.session.drain_timeout_ms.min(1000))).await;
    info!("{} transcript segments received", transcripts.len());

    Ok(())
}

async fn serve(cfg: Config) -> Result<()> {
    let transcripts = Arc::new(TranscriptLog::new());
    let manager = build_manager(&cfg, None, Arc::clone(&transcripts))?;
    let app = create_router(AppState::new(manager.clone(), transcripts));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    manager.stop().await;
    Ok(())
}
