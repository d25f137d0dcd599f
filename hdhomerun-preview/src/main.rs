//! hdhomerun-preview: scan, tune and preview an HDHomeRun tuner from the
//! command line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use hdhomerun_model::ChannelMap;
use hdhomerun_preview::device::LibHdhomerun;
use hdhomerun_preview::logging;
use hdhomerun_preview::media::{LibVlc, MediaBackend, NullMedia, VideoSurface};
use hdhomerun_preview::scan::ScanPhase;
use hdhomerun_preview::{PreviewConfig, SessionError, TunerSession};
use log::{info, warn};
use tokio::runtime::Handle;

mod console;

use console::ConsoleObservers;

/// hdhomerun-preview - HDHomeRun tuner preview and channel scan
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device id, 8 hexadecimal digits (e.g. 103FD2C1)
    device_id: String,

    /// Tuner index on the device
    #[arg(short, long, default_value = "0")]
    tuner: u32,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Path to libhdhomerun
    #[arg(long)]
    libhdhomerun: Option<PathBuf>,

    /// Path to libvlc
    #[arg(long)]
    libvlc: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a channel map and list the channels found
    Scan {
        /// Channel map (us-bcast, us-cable, eu-bcast, eu-cable, au-bcast, au-cable)
        #[arg(short, long)]
        map: Option<ChannelMap>,
    },
    /// Tune to a channel or frequency
    Tune {
        /// Channel (e.g. 5.1) or frequency in Hz
        spec: String,
    },
    /// Preview the live stream
    Play {
        /// Tune to this channel first
        #[arg(short, long)]
        channel: Option<String>,

        /// Stop after this many seconds
        #[arg(short, long, default_value = "30")]
        seconds: u64,

        /// X11 window to render into
        #[arg(long)]
        xwindow: Option<u32>,

        /// Relay the stream without loading the media library
        #[arg(long)]
        headless: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Explicit path > auto-detect > defaults
    let mut config = match PreviewConfig::discover(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return Err(e.into());
        }
    };

    // Command line takes precedence
    if let Some(dir) = &args.log_dir {
        config.logging.log_dir = Some(dir.clone());
    }
    if let Some(path) = &args.libhdhomerun {
        config.backend.libhdhomerun_path = Some(path.clone());
    }
    if let Some(path) = &args.libvlc {
        config.backend.libvlc_path = Some(path.clone());
    }

    let _log_guard = logging::init_logging(&config.logging_options(args.verbose))?;

    let tuners = LibHdhomerun::load(config.backend.libhdhomerun_path.as_deref())?;
    let media: Arc<dyn MediaBackend> = match &args.command {
        Command::Play { headless: false, .. } => Arc::new(LibVlc::load(
            config.backend.libvlc_path.as_deref(),
            &config.backend.vlc_args,
        )?),
        _ => Arc::new(NullMedia),
    };

    let mut session = TunerSession::new(Handle::current(), Arc::new(tuners), media, Arc::new(ConsoleObservers))
        .with_settings(config.session_settings());
    if let Command::Play {
        xwindow: Some(window),
        ..
    } = &args.command
    {
        session = session.with_surface(VideoSurface::XWindow(*window));
    }

    session.select(&args.device_id, args.tuner)?;

    match args.command {
        Command::Scan { map } => {
            scan(&mut session, map.unwrap_or(config.scan.default_channel_map)).await?;
        }
        Command::Tune { spec } => session.tune(&spec)?,
        Command::Play { channel, seconds, .. } => {
            if let Some(channel) = channel {
                session.tune(&channel)?;
            }
            play(&mut session, Duration::from_secs(seconds)).await?;
        }
    }

    session.teardown();
    Ok(())
}

/// Run a scan to completion (or Ctrl-C) and print the channels found.
async fn scan(session: &mut TunerSession, map: ChannelMap) -> Result<(), SessionError> {
    let mut phase = session.scan_phase();
    session.scan(map)?;

    tokio::select! {
        _ = phase.wait_for(|p| matches!(p, ScanPhase::Completed | ScanPhase::Cancelled)) => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("[Main] Interrupted, cancelling scan");
            session.cancel_scan();
            return Ok(());
        }
    }

    let channels = session.saved_channels();
    println!();
    for (index, (channel, label)) in channels.iter().zip(session.channel_labels()).enumerate() {
        println!(
            "{:>3}  {:<24} {:>7.1} MHz",
            index,
            label,
            f64::from(channel.frequency) / 1_000_000.0
        );
    }
    if channels.is_empty() {
        println!("No channels found");
    }
    Ok(())
}

/// Play for `duration`, logging buffer statistics once a second.
async fn play(session: &mut TunerSession, duration: Duration) -> Result<(), SessionError> {
    session.play()?;

    let deadline = tokio::time::sleep(duration);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupted);
    let mut report = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut interrupted => {
                warn!("[Main] Interrupted");
                break;
            }
            _ = report.tick() => {
                info!(
                    "[Main] Buffered {} bytes, dropped {} bytes",
                    session.buffered_bytes(),
                    session.dropped_bytes()
                );
            }
        }
    }

    session.stop()
}
