//! A terminal-resident music player: engineering core entry point.
//!
//! The renderer, audio-format decoding internals, and terminal I/O are
//! external collaborators with narrow contracts (§1); this binary wires
//! together the pieces this crate owns: config, the snapshot publisher,
//! the library and playback collectors, and the event bus, then hands
//! control to the CLI or blocks until shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ouroboros::artwork::ArtworkCache;
use ouroboros::cli::{self, Cli};
use ouroboros::collectors::{LibraryCollector, PlaybackCollector};
use ouroboros::config;
use ouroboros::events::EventBus;
use ouroboros::snapshot::SnapshotPublisher;

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("ouroboros=info".parse().unwrap()))
        .init();

    if cli::run_command(&args)? {
        return Ok(());
    }

    run_player()
}

/// Launch the engine: config load, caches, collectors, event bus, then
/// block until a shutdown signal arrives. No rendering happens here —
/// that loop lives outside this crate's scope (§1).
fn run_player() -> anyhow::Result<()> {
    let config = config::load();
    let roots = config.paths.all_roots();
    if roots.is_empty() {
        tracing::warn!(
            "no music directory configured; library will stay empty until config is fixed"
        );
    }

    let library_cache_path = config.cache.library_cache_path();
    let artwork_cache_path = config.cache.artwork_cache_path();

    let artwork_cache = Arc::new(ArtworkCache::new());
    if artwork_cache_path.exists() {
        if let Err(e) = artwork_cache.load(&artwork_cache_path) {
            tracing::warn!(error = %e, "failed to load artwork cache, starting empty");
        }
    }

    let publisher = Arc::new(SnapshotPublisher::new());
    let _ = publisher.update(|snap| {
        snap.player.volume_percent = config.playback.default_volume;
        snap.player.shuffle = config.playback.shuffle;
        snap.player.repeat_mode = config.playback.repeat;
    });

    let event_bus = Arc::new(EventBus::new());

    let _library_collector = LibraryCollector::spawn(
        roots,
        library_cache_path,
        Arc::clone(&artwork_cache),
        artwork_cache_path,
        Arc::clone(&publisher),
    );
    let playback_collector = PlaybackCollector::spawn(Arc::clone(&publisher));
    wire_event_bus(&event_bus, &playback_collector);

    tracing::info!("engine started, press Ctrl+C to exit");

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_for_handler = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        shutdown_for_handler.store(true, Ordering::SeqCst);
    })?;

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    tracing::info!("shutdown requested, stopping collectors");
    Ok(())
}

/// Translate event-bus commands into playback-collector commands. The
/// renderer (out of scope) is the real publisher of these events; this
/// wiring exists so the collectors are exercised end-to-end even before
/// a renderer is attached.
fn wire_event_bus(bus: &Arc<EventBus>, playback: &PlaybackCollector) {
    use ouroboros::collectors::PlaybackCommand;
    use ouroboros::events::EventTag;

    macro_rules! forward {
        ($tag:expr, $command:expr) => {{
            let tx = playback.command_sender();
            bus.subscribe($tag, move |_event| {
                let _ = tx.send($command);
            });
        }};
    }

    forward!(EventTag::PlayPause, PlaybackCommand::TogglePlayPause);
    forward!(EventTag::Next, PlaybackCommand::Next);
    forward!(EventTag::Prev, PlaybackCommand::Previous);
    forward!(EventTag::ClearQueue, PlaybackCommand::ClearQueue);
    forward!(EventTag::RepeatToggle, PlaybackCommand::ToggleRepeat);
    forward!(EventTag::ShuffleToggle, PlaybackCommand::ToggleShuffle);
}
