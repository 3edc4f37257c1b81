use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camrtc::config::AppConfig;
use camrtc::session::{SessionManager, SessionManagerConfig, SessionRegistry};
use camrtc::video::{CaptureSourceFactory, DeviceClaims, RecoveryPolicy, SourceKind};
use camrtc::webrtc::{RtcTransportFactory, SessionDescription};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Recovery behaviour after a failed reopen
#[derive(Debug, Clone, Copy, ValueEnum)]
enum RecoveryArg {
    Propagate,
    BlankFrame,
}

impl From<RecoveryArg> for RecoveryPolicy {
    fn from(arg: RecoveryArg) -> Self {
        match arg {
            RecoveryArg::Propagate => RecoveryPolicy::Propagate,
            RecoveryArg::BlankFrame => RecoveryPolicy::BlankFrame,
        }
    }
}

/// camrtc command line arguments
#[derive(Parser, Debug)]
#[command(name = "camrtc")]
#[command(version, about = "Stream a local camera to a WebRTC peer", long_about = None)]
struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source kind (generic, stereo, test-pattern)
    #[arg(short = 's', long, value_name = "KIND")]
    source: Option<SourceKind>,

    /// Capture device index or path
    #[arg(short = 'd', long, value_name = "DEVICE")]
    device: Option<String>,

    /// Capture width
    #[arg(long, value_name = "PIXELS", requires = "height")]
    width: Option<u32>,

    /// Capture height
    #[arg(long, value_name = "PIXELS", requires = "width")]
    height: Option<u32>,

    /// Capture frame rate
    #[arg(long, value_name = "FPS")]
    fps: Option<u32>,

    /// Behaviour when a read fails after one reopen
    #[arg(long, value_name = "POLICY")]
    recovery: Option<RecoveryArg>,

    /// File holding the offer JSON ({"type":"offer","sdp":...}); stdin if omitted
    #[arg(short = 'o', long, value_name = "FILE")]
    offer: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting camrtc v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    let offer = read_offer(args.offer.as_ref()).await?;

    let sources = Arc::new(CaptureSourceFactory::new(
        config.capture.clone(),
        DeviceClaims::new(),
    ));
    let transports = Arc::new(RtcTransportFactory::new(config.webrtc.clone()));
    let registry = Arc::new(
        SessionRegistry::new(config.session.close_timeout())
            .with_max_sessions(config.session.max_sessions),
    );
    let manager = SessionManager::new(
        SessionManagerConfig::from(&config),
        sources,
        transports,
        registry,
    );

    let answer = manager.create_session(offer).await?;
    println!("{}", serde_json::to_string(&answer)?);

    let session_id = manager
        .list_sessions()
        .await
        .first()
        .map(|info| info.session_id.clone());

    match session_id {
        Some(id) => {
            tracing::info!("Streaming, press Ctrl-C to stop");
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl-C")?;
                    tracing::info!("Shutdown signal received");
                }
                _ = manager.wait_closed(&id) => {
                    tracing::warn!("Session {} closed, nothing left to stream", id);
                }
            }
        }
        None => tracing::warn!("Session ended before streaming started"),
    }

    let closed = manager.close_all().await;
    tracing::info!("Closed {} sessions, shutdown complete", closed);
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(source) = args.source {
        config.capture.source = source;
    }
    if let Some(device) = &args.device {
        config.capture.device = device.clone();
    }
    if let (Some(width), Some(height)) = (args.width, args.height) {
        config.capture.resolution = camrtc::video::Resolution::new(width, height);
    }
    if let Some(fps) = args.fps {
        config.capture.fps = fps;
    }
    if let Some(recovery) = args.recovery {
        config.capture.recovery = recovery.into();
    }
}

async fn read_offer(path: Option<&PathBuf>) -> anyhow::Result<SessionDescription> {
    let content = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read offer from {}", path.display()))?,
        None => {
            tracing::info!("Reading offer from stdin");
            let mut content = String::new();
            tokio::io::stdin()
                .read_to_string(&mut content)
                .await
                .context("Failed to read offer from stdin")?;
            content
        }
    };
    serde_json::from_str(&content).context("Offer is not a valid session description")
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "camrtc=error,webrtc=error",
        LogLevel::Warn => "camrtc=warn,webrtc=warn",
        LogLevel::Info => "camrtc=info,webrtc=warn",
        LogLevel::Verbose => "camrtc=debug,webrtc=warn",
        LogLevel::Debug => "camrtc=debug,webrtc=info",
        LogLevel::Trace => "camrtc=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
