use anyhow::{ensure, Context, Result};
use clap::Parser;
use hound::{SampleFormat, WavReader};
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use loopscope::audio::{Recorder, SpectralAnalyzer};

/// Offline analysis probe: streams a WAV file block-by-block through the
/// recorder and spectral analyzer and prints a JSON report of the run.
#[derive(Parser, Debug)]
#[command(name = "wav-probe", version, about)]
struct Args {
    /// Input WAV file.
    input: PathBuf,

    #[arg(long, default_value_t = 512)]
    block_size: usize,

    #[arg(long, default_value_t = 3)]
    octave_divisions: usize,

    /// Octave-band energy threshold for the harmonic census.
    #[arg(long, default_value_t = 2.0)]
    census_threshold: f32,
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    sample_rate: u32,
    duration_secs: f32,
    blocks: usize,
    recorded_samples: usize,
    onset_blocks: usize,
    max_rms: f32,
    max_amplitude: f32,
    centroid_min_hz: f32,
    centroid_max_hz: f32,
    flatness_min: f32,
    flatness_max: f32,
    octave_bands: usize,
    bands_above_threshold: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let reader = WavReader::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let spec = reader.spec();
    let samples = read_mono_samples(reader)?;
    ensure!(!samples.is_empty(), "{} holds no audio", args.input.display());
    info!(
        "probing {} ({} Hz, {} samples)",
        args.input.display(),
        spec.sample_rate,
        samples.len()
    );

    let mut recorder = Recorder::new(args.block_size, spec.sample_rate)?;
    recorder.start_grabbing();
    recorder.start_recording();

    let mut analyzer = SpectralAnalyzer::new(
        spec.sample_rate as f32,
        (args.block_size * 2).next_power_of_two(),
        args.block_size,
        args.octave_divisions,
        100,
    )?;

    let mut blocks = 0;
    let mut onset_blocks = 0;
    for block in samples.chunks(args.block_size) {
        recorder.grab_audio_buffer(block);
        analyzer.update(recorder.buffer_current());
        blocks += 1;
        if analyzer.is_onset() {
            onset_blocks += 1;
        }
    }

    let report = ProbeReport {
        sample_rate: spec.sample_rate,
        duration_secs: samples.len() as f32 / spec.sample_rate as f32,
        blocks,
        recorded_samples: recorder.recorded_len(),
        onset_blocks,
        max_rms: analyzer.max_rms(),
        max_amplitude: analyzer.max_amplitude(),
        centroid_min_hz: analyzer.spectral_centroid_min(),
        centroid_max_hz: analyzer.spectral_centroid_max(),
        flatness_min: analyzer.spectral_flatness_min(),
        flatness_max: analyzer.spectral_flatness_max(),
        octave_bands: analyzer.octave_averages().len(),
        bands_above_threshold: analyzer.octave_bands_above(args.census_threshold, 0),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Decode to mono f32 regardless of the source sample format, averaging
/// interleaved channels.
fn read_mono_samples<R: std::io::Read>(mut reader: WavReader<R>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    Ok(interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}
