use anyhow::{ensure, Context, Result};
use log::info;
use rodio::{Decoder, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Preloaded sample playback: the file is decoded to mono f32 once at load,
/// then `play` serves one output sample per call from a wrapping cursor.
/// Decode failures are fatal at setup; playback itself cannot fail.
pub struct SamplePlayer {
    samples: Vec<f32>,
    position: usize,
    sample_rate: u32,
}

impl SamplePlayer {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(
            File::open(path).with_context(|| format!("opening sample {}", path.display()))?,
        );
        let source = Decoder::new(file)
            .with_context(|| format!("decoding sample {}", path.display()))?;

        let sample_rate = source.sample_rate();
        let channels = source.channels();
        let samples: Vec<i16> = source.convert_samples().collect();

        // Mix interleaved channels down to mono for the single-channel loop.
        let samples: Vec<f32> = samples
            .chunks_exact(channels as usize)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|&s| s as f32 / 32768.0).sum();
                sum / channels as f32
            })
            .collect();
        ensure!(!samples.is_empty(), "sample {} decoded to no audio", path.display());

        info!(
            "loaded sample {} ({} Hz, {} samples)",
            path.display(),
            sample_rate,
            samples.len()
        );
        Ok(Self {
            samples,
            position: 0,
            sample_rate,
        })
    }

    /// Build a player from already-decoded mono samples.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate,
        }
    }

    /// Next output sample; wraps at the end of the bank.
    pub fn play(&mut self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sample = self.samples[self.position];
        self.position = (self.position + 1) % self.samples.len();
        sample
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_wraps_at_end_of_bank() {
        let mut player = SamplePlayer::from_samples(vec![0.1, 0.2, 0.3], 44_100);
        let pulled: Vec<f32> = (0..7).map(|_| player.play()).collect();
        assert_eq!(pulled, vec![0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1]);
    }

    #[test]
    fn test_empty_bank_plays_silence() {
        let mut player = SamplePlayer::from_samples(Vec::new(), 44_100);
        assert_eq!(player.play(), 0.0);
    }

    #[test]
    fn test_missing_file_is_a_setup_error() {
        assert!(SamplePlayer::load("definitely/not/here.wav").is_err());
    }
}
