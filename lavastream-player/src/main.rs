//! Lavastream command line player
//!
//! Detects containers, plays tracks into raw chunk files and reports on the
//! native codec library setup. Mostly useful for checking how a given file
//! would be handled by an embedding player.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lavastream_common::config::load_config;
use lavastream_common::params::PARAMS;
use lavastream_common::{ContainerDescriptor, FriendlyError, OutputFormat, ResamplingQuality};
use lavastream_player::container::{ContainerDetection, DetectionResult, ProbeRegistry};
use lavastream_player::format::ChunkCodec;
use lavastream_player::io::{FileSource, SavedHeadInput, TrackSource};
use lavastream_player::natives::{opus_loader, SystemType};
use lavastream_player::playback::{
    ConsumeMode, PlayerOptions, StallWatchdog, TrackEvent, TrackExecutor,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lavastream")]
#[command(about = "Audio track detection and chunk encoding")]
#[command(version)]
struct Args {
    /// Config file (overrides LAVASTREAM_CONFIG and the platform default)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect the container of a file and print the result as JSON
    Probe {
        path: PathBuf,
    },

    /// Play a file, writing produced chunks to a file or stdout
    Play {
        path: PathBuf,

        /// Output file; `-` or absent writes to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output chunk format
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Resampling quality
        #[arg(long)]
        quality: Option<ResamplingQuality>,

        /// Volume percentage (0-1000)
        #[arg(long)]
        volume: Option<u16>,

        /// Start position in milliseconds
        #[arg(long)]
        seek: Option<i64>,

        /// Encoded container descriptor from an earlier probe; skips detection
        #[arg(long)]
        descriptor: Option<String>,
    },

    /// Show where the Opus library is looked up and whether it loads
    Natives,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lavastream=info,lavastream_player=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    load_config(args.config.as_deref(), &PARAMS).context("Failed to load configuration")?;

    match args.command {
        Command::Probe { path } => probe(&path),
        Command::Play {
            path,
            output,
            format,
            quality,
            volume,
            seek,
            descriptor,
        } => {
            let options = Arc::new(PlayerOptions::from_params(&PARAMS));
            if let Some(format) = format {
                options.set_output_format(format);
            }
            if let Some(quality) = quality {
                options.set_resampling_quality(quality);
            }
            if let Some(volume) = volume {
                options.set_volume(volume);
            }
            let descriptor = descriptor.map(|d| ContainerDescriptor::parse(&d));
            play(&path, output.as_deref(), options, seek, descriptor).await
        }
        Command::Natives => natives(),
    }
}

fn probe(path: &Path) -> Result<()> {
    let source = FileSource::new(path);
    let registry = ProbeRegistry::default();
    let hints = source.hints();
    let mut input = SavedHeadInput::new(
        source
            .open()
            .with_context(|| format!("Failed to open {}", path.display()))?,
    );

    let result = ContainerDetection::new(&registry, source.identifier(), &hints)
        .detect(&mut input)
        .context("Detection failed")?;

    if let DetectionResult::Supported { descriptor, .. } = &result {
        info!("Descriptor: {}", descriptor.to_encoded_string());
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn play(
    path: &Path,
    output: Option<&Path>,
    options: Arc<PlayerOptions>,
    seek: Option<i64>,
    descriptor: Option<ContainerDescriptor>,
) -> Result<()> {
    let writer: Box<dyn Write + Send> = match output {
        Some(p) if p != Path::new("-") => Box::new(
            File::create(p).with_context(|| format!("Failed to create {}", p.display()))?,
        ),
        _ => Box::new(io::stdout()),
    };

    info!(
        "Playing {} as {} (volume {}%, {} resampling)",
        path.display(),
        options.output_format(),
        options.volume(),
        options.resampling_quality()
    );

    let watch_interval = Duration::from_millis((options.stall_threshold_ms() / 2).max(100));
    let source: Arc<dyn TrackSource> = Arc::new(FileSource::new(path));
    let executor = Arc::new(TrackExecutor::new(
        source,
        descriptor,
        Arc::new(ProbeRegistry::default()),
        options,
    ));

    let events = tokio::spawn(log_events(executor.subscribe()));
    let _watchdog = StallWatchdog::spawn(executor.clone(), watch_interval);

    if let Some(position) = seek {
        executor.seek(position)?;
    }
    executor.start()?;

    {
        let executor = executor.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping track");
                executor.stop();
            }
        });
    }

    let frames = {
        let executor = executor.clone();
        tokio::task::spawn_blocking(move || write_frames(&executor, writer))
            .await
            .context("Writer task failed")??
    };
    executor.join();

    let failure = events.await.context("Event task failed")?;
    info!("Wrote {} frames, ended at {} ms", frames, executor.position());

    match failure {
        Some(error) => bail!("Playback failed: {}", error),
        None => Ok(()),
    }
}

/// Drains the executor's frames into `writer`
///
/// PCM chunks are written back to back; Opus packets are each prefixed with
/// their length as a big-endian u16.
fn write_frames(executor: &TrackExecutor, writer: Box<dyn Write + Send>) -> Result<u64> {
    let mut writer = BufWriter::new(writer);
    let mut frames = 0u64;

    loop {
        match executor.provide(ConsumeMode::Timeout(Duration::from_millis(100))) {
            Some(frame) => {
                if frame.format.codec == ChunkCodec::Opus {
                    writer.write_all(&(frame.data.len() as u16).to_be_bytes())?;
                }
                writer.write_all(&frame.data)?;
                frames += 1;
            }
            None if executor.frame_buffer().is_done() => break,
            None => {}
        }
    }

    writer.flush()?;
    Ok(frames)
}

/// Logs track events until the track ends; returns the failure, if any
async fn log_events(
    mut events: tokio::sync::broadcast::Receiver<TrackEvent>,
) -> Option<FriendlyError> {
    let mut failure = None;
    loop {
        match events.recv().await {
            Ok(TrackEvent::Started { executor_id }) => info!(%executor_id, "Track started"),
            Ok(TrackEvent::Stuck {
                threshold_ms,
                snapshot,
                ..
            }) => warn!("Track stuck for over {} ms: {}", threshold_ms, snapshot),
            Ok(TrackEvent::Exception { error, .. }) => {
                error!("Track exception: {}", error);
                failure = Some(error);
            }
            Ok(TrackEvent::Ended { reason, .. }) => {
                info!("Track ended: {:?}", reason);
                break;
            }
            Err(RecvError::Lagged(skipped)) => warn!("Missed {} track events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
    failure
}

fn natives() -> Result<()> {
    let system = SystemType::detect()?;
    let loader = opus_loader();
    println!("System: {}", system.system_name());
    println!("Library: {}", loader.library_name());
    for candidate in loader.candidate_paths(&system) {
        println!("  candidate: {}", candidate.display());
    }

    if !loader.is_configured() {
        println!("No path or directory configured; libopus is resolved by the system linker");
        return Ok(());
    }
    match loader.load()? {
        Some(loaded) => {
            println!("Loaded from {}", loaded.path.display());
            println!("Resolved: {}", loaded.symbols.join(", "));
        }
        None => println!("Not applicable on this system"),
    }
    Ok(())
}
