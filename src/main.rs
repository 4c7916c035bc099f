//! Binary entrypoint for the touch kiosk.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use touch_kiosk::catalog::{MediaFilter, scan_media_dir};
use touch_kiosk::config::Configuration;
use touch_kiosk::events::AdvanceToken;
use touch_kiosk::tasks::controller::{PlaybackController, PlaybackTiming};
use touch_kiosk::tasks::supervisor::{ProcessSupervisor, SupervisorOptions, SystemSpawner};
use touch_kiosk::tasks::unifier::EventUnifier;
use touch_kiosk::tasks::viewer::{self, ViewerOptions};
use touch_kiosk::tasks::touch;

#[derive(Debug, Parser)]
#[command(name = "touch-kiosk", about = "Fullscreen image and video kiosk driven by taps")]
struct Args {
    /// Path to YAML config file; built-in defaults when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the media directory
    #[arg(long, value_name = "DIR")]
    media_dir: Option<PathBuf>,

    /// Override the minimum time an item stays on screen (e.g. "1s", "750ms")
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    min_dwell: Option<Duration>,

    /// Run in a window instead of fullscreen
    #[arg(long)]
    windowed: bool,

    /// Do not start the hardware touch listener
    #[arg(long)]
    no_touch: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = match verbosity {
                0 => Level::INFO,
                1 => Level::DEBUG,
                _ => Level::TRACE,
            };
            EnvFilter::new(format!("{level}"))
                .add_directive("wgpu=warn".parse().context("invalid wgpu directive")?)
                .add_directive("winit=warn".parse().context("invalid winit directive")?)
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

fn load_config(args: &Args) -> Result<Configuration> {
    let mut cfg = match &args.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(dir) = &args.media_dir {
        cfg.media_dir = dir.clone();
    }
    if let Some(dwell) = args.min_dwell {
        cfg.min_dwell = dwell;
    }
    if args.windowed {
        cfg.fullscreen = false;
    }
    if args.no_touch {
        cfg.touch.enabled = false;
    }
    cfg.validated().context("invalid configuration values")
}

fn spawn_signal_watchers(cancel: &CancellationToken) {
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        received = sigterm.recv() => {
                            if received.is_some() {
                                info!("SIGTERM received; initiating shutdown");
                                cancel.cancel();
                            }
                        }
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }
}

async fn run(args: Args) -> Result<()> {
    let cfg = load_config(&args)?;
    tracing::debug!("effective configuration:\n{cfg:#?}");

    let filter = MediaFilter::from_config(&cfg);
    let catalog = scan_media_dir(&cfg.media_dir, &filter)
        .with_context(|| format!("failed to load media from {}", cfg.media_dir.display()))?;
    info!(count = catalog.len(), dir = %cfg.media_dir.display(), "media catalog loaded");
    for (index, item) in catalog.items().iter().enumerate() {
        info!(index, kind = ?item.kind, path = %item.path.display(), "catalog item");
    }

    let cancel = CancellationToken::new();
    spawn_signal_watchers(&cancel);

    let (touch_tx, touch_rx) = crossbeam_channel::unbounded::<AdvanceToken>();
    if cfg.touch.enabled {
        touch::start(&cfg.touch, touch_tx);
    } else {
        info!("hardware touch listener disabled by configuration");
        drop(touch_tx);
    }

    let supervisor = ProcessSupervisor::new(
        SystemSpawner::new(cfg.players.clone()),
        SupervisorOptions::from_config(&cfg),
    );
    let controller = PlaybackController::new(
        catalog,
        supervisor,
        PlaybackTiming::from_config(&cfg),
        Instant::now(),
    );
    let unifier = EventUnifier::new(touch_rx, cfg.min_dwell);

    viewer::run_windowed(controller, unifier, ViewerOptions::from_config(&cfg), cancel)?;
    info!("kiosk exited");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_tracing(args.verbose) {
        eprintln!("failed to initialise logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
