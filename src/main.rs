use anyhow::Result;
use clap::Parser;
use crossbeam_channel::bounded;
use log::{info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use loopscope::audio::SamplePlayer;
use loopscope::config::EngineConfig;
use loopscope::engine::AudioEngine;

/// Interactive capture/playback/analysis loop. Commands are read line by
/// line from stdin (e.g. `startPlaying`, `resetAllMinMax`; `quit` exits).
#[derive(Parser, Debug)]
#[command(name = "loopscope", version, about)]
struct Args {
    /// Audio file armed for sample playback while the recorder is grabbing.
    #[arg(long)]
    sample: Option<PathBuf>,

    /// Disable microphone capture; with a sample armed, the synthesized
    /// output is fed back into the live buffer instead.
    #[arg(long)]
    no_mic: bool,

    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,

    #[arg(long, default_value_t = 512)]
    block_size: usize,

    /// Analysis ticks per second.
    #[arg(long, default_value_t = 100)]
    update_rate: u32,

    /// Display scale forwarded to the rendering surface, 0 to 10.
    #[arg(long, default_value_t = 5.0)]
    magnitude: f32,

    /// Sliding-window length for onset detection, in analysis ticks.
    #[arg(long, default_value_t = 5)]
    onset_steps: usize,

    /// Energy-delta threshold for onset detection.
    #[arg(long, default_value_t = 0.015)]
    onset_threshold: f32,
}

/// Octave-band energy above this level counts toward the harmonic census.
const HARMONIC_ENERGY_THRESHOLD: f32 = 2.0;
/// Bands below this index are skipped by the census; the low bands carry
/// the fundamental rather than harmonics.
const HARMONIC_FIRST_BAND: usize = 20;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    info!("starting loopscope");

    let sample = match &args.sample {
        Some(path) => Some(SamplePlayer::load(path)?),
        None => None,
    };

    let config = EngineConfig {
        sample_rate: args.sample_rate,
        block_size: args.block_size,
        update_rate_hz: args.update_rate,
        ..EngineConfig::default()
    };
    let mut engine = AudioEngine::new(config, sample, !args.no_mic)?;
    engine.analyzer_mut().set_onset_time_steps(args.onset_steps);
    engine.analyzer_mut().set_onset_threshold(args.onset_threshold);
    engine.commands().set_magnitude(args.magnitude);
    info!("engine running; type a command name or 'quit'");

    let commands = engine.commands();
    let (quit_tx, quit_rx) = bounded::<()>(1);
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let name = line.trim();
            if name.is_empty() {
                continue;
            }
            if name == "quit" || name == "exit" {
                let _ = quit_tx.send(());
                break;
            }
            if let Err(err) = commands.dispatch(name) {
                warn!("{err}");
            }
        }
    });

    let tick_interval = Duration::from_secs(1) / config.update_rate_hz;
    let mut last_report = Instant::now();
    let started = Instant::now();
    let mut harmonics_count = 0usize;

    loop {
        if quit_rx.try_recv().is_ok() {
            break;
        }
        engine.tick();

        let analyzer = engine.analyzer();
        if analyzer.is_onset() {
            harmonics_count +=
                analyzer.octave_bands_above(HARMONIC_ENERGY_THRESHOLD, HARMONIC_FIRST_BAND);
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            info!(
                "t={}s recorded={} rms={:.4} (max {:.4}) amp={:.4} (max {:.4}) onset={} harmonics={}",
                started.elapsed().as_secs(),
                engine.recorded_len(),
                analyzer.rms(),
                analyzer.max_rms(),
                analyzer.amplitude(),
                analyzer.max_amplitude(),
                analyzer.is_onset(),
                harmonics_count,
            );
            info!(
                "centroid={:.1}Hz [{:.1}, {:.1}] flatness={:.3} [{:.3}, {:.3}]",
                analyzer.spectral_centroid(),
                analyzer.spectral_centroid_min(),
                analyzer.spectral_centroid_max(),
                analyzer.spectral_flatness(),
                analyzer.spectral_flatness_min(),
                analyzer.spectral_flatness_max(),
            );
        }

        thread::sleep(tick_interval);
    }

    info!("shutting down");
    Ok(())
}
