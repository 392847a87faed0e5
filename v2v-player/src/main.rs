//! Chunked audio player (v2v-player) - Main entry point
//!
//! Plays a sequence of voice response segments back to back, the way the
//! voice-to-voice client renders streamed replies: the first segment waits
//! out a short buffering delay, then every queued segment plays in order.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use v2v_common::events::{EventBus, PlayerEvent, PlayerState};
use v2v_player::audio::CpalSink;
use v2v_player::config::{ConfigOverrides, TomlConfig};
use v2v_player::input::load_input;
use v2v_player::playback::{ChunkedAudioPlayer, NullSink};

/// Command-line arguments for v2v-player
#[derive(Parser, Debug)]
#[command(name = "v2v-player")]
#[command(about = "Chunked audio player for voice-to-voice responses")]
#[command(version)]
struct Args {
    /// Segment files to play, in order (.b64/.txt base64, .json voice response, or raw audio)
    #[arg(required_unless_present = "list_devices")]
    files: Vec<PathBuf>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Buffering delay before the first segment plays, in milliseconds
    #[arg(long)]
    buffer_delay_ms: Option<u64>,

    /// Output device name
    #[arg(long, env = "V2V_DEVICE")]
    device: Option<String>,

    /// Output volume (0.0 - 1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// MIME type for every input, overriding extension detection
    #[arg(long)]
    mime_type: Option<String>,

    /// Delay between feeding successive files, simulating streamed arrival
    #[arg(long, default_value = "0")]
    interval_ms: u64,

    /// Consume segments without opening an audio device
    #[arg(long)]
    dry_run: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) =
        TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(ConfigOverrides {
        buffer_delay_ms: args.buffer_delay_ms,
        device: args.device.clone(),
        volume: args.volume,
        mime_type: args.mime_type.clone(),
        log_level: args.verbose.then(|| "debug".to_string()),
    })
    .context("Invalid command-line options")?;

    // Initialize tracing
    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("v2v_player={0},v2v_common={0}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    debug!("Configuration source: {:?}", source);

    if args.list_devices {
        for name in CpalSink::list_devices().context("Failed to list audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    info!(
        "Starting v2v-player: {} file(s), buffer delay {}ms",
        args.files.len(),
        config.player.buffer_delay_ms
    );

    let events = EventBus::new(config.player.event_capacity);
    let buffer_delay = config.player.buffer_delay();

    let player = if args.dry_run {
        info!("Dry run: segments are consumed without audio output");
        ChunkedAudioPlayer::spawn(NullSink::new(), buffer_delay, events)
    } else {
        let sink = CpalSink::open(config.output.device.clone(), config.output.effective_volume())
            .context("Failed to open audio output")?;
        ChunkedAudioPlayer::spawn(sink, buffer_delay, events)
    };

    let mut rx = player.subscribe();
    let feeder = spawn_feeder(
        player.clone(),
        args.files,
        args.mime_type,
        config.player.default_mime_type.clone(),
        Duration::from_millis(args.interval_ms),
    );

    tokio::select! {
        result = run_until_complete(&player, &mut rx, feeder) => {
            result?;
        }
        _ = shutdown_signal() => {
            player.reset().context("Failed to reset player")?;
        }
    }

    player.shutdown().await.context("Failed to stop player")?;
    info!("Player shutdown complete");
    Ok(())
}

/// Load and enqueue every file in order; returns how many were accepted
fn spawn_feeder(
    player: ChunkedAudioPlayer,
    files: Vec<PathBuf>,
    mime_override: Option<String>,
    default_mime: String,
    interval: Duration,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut queued = 0;

        for (index, path) in files.iter().enumerate() {
            if index > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }

            let loaded = match load_input(path, mime_override.as_deref(), &default_mime) {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            if let Some(text) = &loaded.transcription {
                info!("{}: transcription: {}", loaded.path.display(), text);
            }
            if let Some(text) = &loaded.llm_response {
                info!("{}: response: {}", loaded.path.display(), text);
            }

            match player.enqueue(loaded.payload) {
                Ok(()) => {
                    queued += 1;
                    debug!("Queued {} (input {})", loaded.path.display(), index + 1);
                }
                Err(e) => warn!("Rejected {}: {}", loaded.path.display(), e),
            }
        }

        queued
    })
}

/// Follow player events until every fed segment has played out
async fn run_until_complete(
    player: &ChunkedAudioPlayer,
    rx: &mut tokio::sync::broadcast::Receiver<PlayerEvent>,
    mut feeder: JoinHandle<usize>,
) -> Result<()> {
    let mut feeding_done = false;

    loop {
        tokio::select! {
            queued = &mut feeder, if !feeding_done => {
                let queued = queued.context("Feeder task failed")?;
                feeding_done = true;
                info!("All input fed ({} segment(s) queued)", queued);
                if queued == 0 || is_drained(player).await? {
                    return Ok(());
                }
            }
            event = rx.recv() => match event {
                Ok(PlayerEvent::PlaybackComplete { .. }) if feeding_done => {
                    if is_drained(player).await? {
                        return Ok(());
                    }
                }
                Ok(PlayerEvent::Error { kind, sequence, message, .. }) => {
                    warn!("Player error ({}, segment {:?}): {}", kind, sequence, message);
                }
                Ok(event) => {
                    debug!("Event: {}", event.event_type());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event receiver lagged, {} event(s) skipped", skipped);
                    if feeding_done && is_drained(player).await? {
                        return Ok(());
                    }
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}

async fn is_drained(player: &ChunkedAudioPlayer) -> Result<bool> {
    let snapshot = player.snapshot().await.context("Player stopped unexpectedly")?;
    Ok(snapshot.state == PlayerState::Idle && snapshot.queued == 0)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping playback");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping playback");
        },
    }
}
