//! Chunk streaming fly-through
//!
//! Flies an observer in a straight line through a headless world and reports
//! what the streamer did. Exits non-zero if any subsystem handle outlives
//! shutdown.
//!
//! Run with: cargo run -p void_streaming --bin stream_flythrough [config.toml]

use glam::DVec3;

use void_streaming::prelude::*;

/// Observer speed in world units per second
const FLIGHT_SPEED: f64 = 2500.0;

/// Simulated seconds of flight
const FLIGHT_DURATION: f64 = 60.0;

const FRAME_DT: f32 = 1.0 / 60.0;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => match StreamerConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load {}: {}", path, e);
                std::process::exit(2);
            }
        },
        None => StreamerConfig::default(),
    };

    let headless = HeadlessSubsystems::new();
    match fly(config, &headless) {
        Ok(stats) => print_summary(&stats, &headless),
        Err(e) => {
            log::error!("Fly-through aborted: {}", e);
            std::process::exit(1);
        }
    }

    if headless.live_handles() != 0 || headless.invalid_destroys() != 0 {
        log::error!(
            "Handle leak: {} live, {} invalid destroys",
            headless.live_handles(),
            headless.invalid_destroys()
        );
        std::process::exit(1);
    }
}

fn fly(config: StreamerConfig, headless: &HeadlessSubsystems) -> Result<StreamingStats> {
    let mut streamer = WorldStreamer::with_subsystems(config, headless.subsystems())?;
    streamer.initialize()?;

    let start = DVec3::new(-1.0e9, 2.5e5, 7.0e8);
    let heading = DVec3::new(1.0, 0.0, 0.25).normalize();
    let frames = (FLIGHT_DURATION / FRAME_DT as f64) as usize;

    for frame in 0..frames {
        let elapsed = frame as f64 * FRAME_DT as f64;
        streamer.set_observer_position(start + heading * FLIGHT_SPEED * elapsed)?;
        streamer.update(FRAME_DT)?;

        if frame % 600 == 0 {
            log::info!(
                "t={:.0}s loaded={} in_flight={} pending={} health={:?}",
                elapsed,
                streamer.loaded_chunks().len(),
                streamer.in_flight(),
                streamer.pending_queue_depth(),
                streamer.health()
            );
        }
    }

    let stats = streamer.stats();
    streamer.shutdown();
    Ok(stats)
}

fn print_summary(stats: &StreamingStats, headless: &HeadlessSubsystems) {
    println!();
    println!("Fly-through summary");
    println!("  ticks:               {}", stats.ticks);
    println!("  loads completed:     {}", stats.loads_completed);
    println!("  unloads:             {}", stats.unloads);
    println!("  reaped:              {}", stats.reaped);
    println!("  predictive requests: {}", stats.predictive_requests);
    println!("  peak in flight:      {}", stats.peak_in_flight);
    println!("  peak pending:        {}", stats.peak_pending);
    println!("  generation failures: {}", stats.generation_failures);
    println!("  release failures:    {}", stats.release_failures);
    println!("  handles created:     {}", headless.created());
    println!("  handles destroyed:   {}", headless.destroyed());
    println!();
}
