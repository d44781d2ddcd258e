use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ggwatch_app::{ListenerConfig, MatchListener};
use ggwatch_audio::{LoopbackBackend, ReferenceLibrary, SysinfoLocator};
use ggwatch_foundation::real_clock;

/// Watches a game process for match-outcome announcements by matching its
/// audio against reference clips.
#[derive(Parser, Debug)]
#[command(name = "ggwatch", version, about)]
struct Args {
    /// Directory holding reference clips (victory.wav, defeat.wav, ...).
    #[arg(long, default_value = "refs", env = "GGWATCH_REFS_DIR")]
    refs_dir: PathBuf,

    /// Executable name of the target process.
    #[arg(long, default_value = "overwatch.exe", env = "GGWATCH_EXE")]
    exe: String,

    /// Peak NCC a label must reach to be accepted.
    #[arg(long)]
    match_threshold: Option<f32>,

    /// Minimum seconds between two detections.
    #[arg(long)]
    cooldown_secs: Option<f32>,

    /// Consecutive accepted hops required before firing.
    #[arg(long)]
    confirm_hops: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = ListenerConfig {
        refs_dir: args.refs_dir,
        exe_name: args.exe,
        ..ListenerConfig::default()
    };
    if let Some(threshold) = args.match_threshold {
        cfg.detector.match_threshold = threshold;
    }
    if let Some(cooldown) = args.cooldown_secs {
        cfg.detector.cooldown_secs = cooldown;
    }
    if let Some(hops) = args.confirm_hops {
        cfg.detector.confirm_hops = hops;
    }

    let library =
        ReferenceLibrary::load(&cfg.refs_dir, &cfg.labels, cfg.detector.sample_rate_hz);

    let (mut listener, events) = MatchListener::new(
        cfg,
        Box::new(LoopbackBackend::new()),
        Box::new(SysinfoLocator::new()),
        library,
        real_clock(),
    )?;
    listener.start();

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("failed to install ctrl-c handler")?;

    loop {
        crossbeam_channel::select! {
            recv(events) -> event => match event {
                Ok(event) => println!("{} (score {:.2})", event.label, event.score),
                // Worker exited (e.g. capture backend unavailable).
                Err(_) => break,
            },
            recv(stop_rx) -> _ => break,
        }
    }

    listener.stop();
    Ok(())
}
