use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::octave::OctaveAverager;
use super::onset::OnsetDetector;
use crate::config::ConfigError;

/// Floor applied to magnitudes before log-domain math so flatness never
/// feeds NaN/Inf into the running statistics. An all-zero window comes out
/// as centroid 0.0 and flatness 1.0.
const MAGNITUDE_EPSILON: f32 = 1e-12;

/// Streaming spectral analysis over snapshots of the live buffer.
///
/// One `update` per display tick: Hann-windowed FFT magnitudes with per-bin
/// running maxima, octave-band averages, RMS and peak amplitude with running
/// maxima, spectral centroid and flatness with running min/max, and the
/// onset flag. Running extrema initialize to infinity sentinels and only
/// tighten between explicit resets. Getters never recompute.
pub struct SpectralAnalyzer {
    sample_rate: f32,
    window_size: usize,
    hop_size: usize,
    update_rate_hint: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,

    magnitudes: Vec<f32>,
    magnitude_max: Vec<f32>,
    octaves: OctaveAverager,
    onset: OnsetDetector,

    rms: f32,
    rms_max: f32,
    amplitude: f32,
    amplitude_max: f32,
    centroid: f32,
    centroid_min: f32,
    centroid_max: f32,
    flatness: f32,
    flatness_min: f32,
    flatness_max: f32,
}

impl SpectralAnalyzer {
    pub fn new(
        sample_rate: f32,
        window_size: usize,
        hop_size: usize,
        octave_divisions: usize,
        update_rate_hint: u32,
    ) -> Result<Self, ConfigError> {
        if sample_rate <= 0.0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if hop_size == 0 {
            return Err(ConfigError::ZeroHopSize);
        }
        if !window_size.is_power_of_two() {
            return Err(ConfigError::WindowNotPowerOfTwo(window_size));
        }
        if window_size < hop_size {
            return Err(ConfigError::WindowSmallerThanHop {
                window: window_size,
                hop: hop_size,
            });
        }
        if octave_divisions == 0 {
            return Err(ConfigError::ZeroOctaveDivisions);
        }
        if update_rate_hint == 0 {
            return Err(ConfigError::ZeroUpdateRate);
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);
        let bins = window_size / 2;

        Ok(Self {
            sample_rate,
            window_size,
            hop_size,
            update_rate_hint,
            fft,
            window: hann_window(window_size),
            fft_buffer: vec![Complex::new(0.0, 0.0); window_size],
            magnitudes: vec![0.0; bins],
            magnitude_max: vec![f32::NEG_INFINITY; bins],
            octaves: OctaveAverager::new(sample_rate, window_size, octave_divisions),
            onset: OnsetDetector::default(),
            rms: 0.0,
            rms_max: f32::NEG_INFINITY,
            amplitude: 0.0,
            amplitude_max: f32::NEG_INFINITY,
            centroid: 0.0,
            centroid_min: f32::INFINITY,
            centroid_max: f32::NEG_INFINITY,
            flatness: 0.0,
            flatness_min: f32::INFINITY,
            flatness_max: f32::NEG_INFINITY,
        })
    }

    /// Run one analysis tick over a snapshot of the live buffer.
    ///
    /// Views shorter than the window are zero-padded; longer views are
    /// walked in hop-size steps, with the final window left as the
    /// instantaneous spectrum. Deterministic for identical input and
    /// configuration.
    pub fn update(&mut self, buffer_view: &[f32]) {
        self.amplitude = buffer_view.iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()));
        self.rms = if buffer_view.is_empty() {
            0.0
        } else {
            let mean_sq =
                buffer_view.iter().map(|&s| s * s).sum::<f32>() / buffer_view.len() as f32;
            mean_sq.sqrt()
        };
        self.rms_max = self.rms_max.max(self.rms);
        self.amplitude_max = self.amplitude_max.max(self.amplitude);

        let mut start = 0;
        loop {
            let window = &buffer_view[start.min(buffer_view.len())..];
            self.analyze_window(window);
            start += self.hop_size;
            if start + self.window_size > buffer_view.len() {
                break;
            }
        }

        self.onset.push(self.rms);
    }

    fn analyze_window(&mut self, samples: &[f32]) {
        let n = samples.len().min(self.window_size);
        for i in 0..self.window_size {
            let value = if i < n { samples[i] * self.window[i] } else { 0.0 };
            self.fft_buffer[i] = Complex::new(value, 0.0);
        }
        self.fft.process(&mut self.fft_buffer);

        let scale = 2.0 / self.window_size as f32;
        for (magnitude, bin) in self.magnitudes.iter_mut().zip(self.fft_buffer.iter()) {
            *magnitude = bin.norm() * scale;
        }
        for (max, &magnitude) in self.magnitude_max.iter_mut().zip(self.magnitudes.iter()) {
            *max = max.max(magnitude);
        }

        self.octaves.update(&self.magnitudes);

        self.centroid = spectral_centroid(&self.magnitudes, self.bin_hz());
        self.flatness = spectral_flatness(&self.magnitudes);
        self.centroid_min = self.centroid_min.min(self.centroid);
        self.centroid_max = self.centroid_max.max(self.centroid);
        self.flatness_min = self.flatness_min.min(self.flatness);
        self.flatness_max = self.flatness_max.max(self.flatness);
    }

    /// Restart every running extremum from its sentinel; the next update
    /// re-seeds each envelope with that tick's instantaneous value.
    pub fn reset_min_max(&mut self) {
        self.magnitude_max.fill(f32::NEG_INFINITY);
        self.rms_max = f32::NEG_INFINITY;
        self.amplitude_max = f32::NEG_INFINITY;
        self.centroid_min = f32::INFINITY;
        self.centroid_max = f32::NEG_INFINITY;
        self.flatness_min = f32::INFINITY;
        self.flatness_max = f32::NEG_INFINITY;
    }

    pub fn set_onset_time_steps(&mut self, time_steps: usize) {
        self.onset.set_time_steps(time_steps);
    }

    pub fn set_onset_threshold(&mut self, threshold: f32) {
        self.onset.set_threshold(threshold);
    }

    pub fn bin_hz(&self) -> f32 {
        self.sample_rate / self.window_size as f32
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn update_rate_hint(&self) -> u32 {
        self.update_rate_hint
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn magnitude_maximums(&self) -> &[f32] {
        &self.magnitude_max
    }

    pub fn octave_averages(&self) -> &[f32] {
        self.octaves.averages()
    }

    pub fn octave_bands_above(&self, threshold: f32, from_band: usize) -> usize {
        self.octaves.bands_above(threshold, from_band)
    }

    pub fn rms(&self) -> f32 {
        self.rms
    }

    pub fn max_rms(&self) -> f32 {
        self.rms_max
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn max_amplitude(&self) -> f32 {
        self.amplitude_max
    }

    pub fn spectral_centroid(&self) -> f32 {
        self.centroid
    }

    pub fn spectral_centroid_min(&self) -> f32 {
        self.centroid_min
    }

    pub fn spectral_centroid_max(&self) -> f32 {
        self.centroid_max
    }

    pub fn spectral_flatness(&self) -> f32 {
        self.flatness
    }

    pub fn spectral_flatness_min(&self) -> f32 {
        self.flatness_min
    }

    pub fn spectral_flatness_max(&self) -> f32 {
        self.flatness_max
    }

    pub fn is_onset(&self) -> bool {
        self.onset.is_onset()
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Magnitude-weighted mean frequency in Hz. Zero spectrum maps to 0.0.
fn spectral_centroid(magnitudes: &[f32], bin_hz: f32) -> f32 {
    let total: f32 = magnitudes.iter().sum();
    if total <= MAGNITUDE_EPSILON {
        return 0.0;
    }
    let weighted: f32 = magnitudes
        .iter()
        .enumerate()
        .map(|(i, &m)| i as f32 * m)
        .sum();
    weighted / total * bin_hz
}

/// Geometric mean over arithmetic mean of the magnitude spectrum, in (0, 1].
/// Magnitudes are floored at epsilon first, so silence comes out maximally
/// flat rather than undefined.
fn spectral_flatness(magnitudes: &[f32]) -> f32 {
    if magnitudes.is_empty() {
        return 0.0;
    }
    let inv_len = 1.0 / magnitudes.len() as f32;
    let log_mean: f32 = magnitudes
        .iter()
        .map(|&m| m.max(MAGNITUDE_EPSILON).ln())
        .sum::<f32>()
        * inv_len;
    let arith_mean: f32 =
        magnitudes.iter().map(|&m| m.max(MAGNITUDE_EPSILON)).sum::<f32>() * inv_len;
    (log_mean.exp() / arith_mean).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 44_100.0;

    fn analyzer(window_size: usize, hop_size: usize) -> SpectralAnalyzer {
        SpectralAnalyzer::new(SAMPLE_RATE, window_size, hop_size, 3, 100).unwrap()
    }

    fn sine(frequency: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE).sin()
            })
            .collect()
    }

    #[test]
    fn test_invalid_setup_rejected() {
        assert_eq!(
            SpectralAnalyzer::new(0.0, 1024, 512, 3, 100).err(),
            Some(ConfigError::ZeroSampleRate)
        );
        assert_eq!(
            SpectralAnalyzer::new(SAMPLE_RATE, 1000, 512, 3, 100).err(),
            Some(ConfigError::WindowNotPowerOfTwo(1000))
        );
        assert_eq!(
            SpectralAnalyzer::new(SAMPLE_RATE, 256, 512, 3, 100).err(),
            Some(ConfigError::WindowSmallerThanHop {
                window: 256,
                hop: 512
            })
        );
        assert_eq!(
            SpectralAnalyzer::new(SAMPLE_RATE, 1024, 0, 3, 100).err(),
            Some(ConfigError::ZeroHopSize)
        );
    }

    #[test]
    fn test_silence_block_measures_zero() {
        let mut analyzer = analyzer(1024, 512);
        analyzer.update(&vec![0.0; 512]);
        assert_eq!(analyzer.rms(), 0.0);
        assert_eq!(analyzer.amplitude(), 0.0);
        assert_eq!(analyzer.spectral_centroid(), 0.0);
        assert!(!analyzer.is_onset());
    }

    #[test]
    fn test_full_scale_block_measures_one() {
        let mut analyzer = analyzer(1024, 512);
        analyzer.update(&vec![1.0; 512]);
        assert_eq!(analyzer.rms(), 1.0);
        assert_eq!(analyzer.amplitude(), 1.0);
        assert_eq!(analyzer.max_rms(), 1.0);
        assert_eq!(analyzer.max_amplitude(), 1.0);
    }

    #[test]
    fn test_sine_peak_lands_within_one_bin() {
        let mut analyzer = analyzer(1024, 512);
        let bin_hz = analyzer.bin_hz();
        let frequency = 64.0 * bin_hz;
        analyzer.update(&sine(frequency, 1024));

        let peak_bin = analyzer
            .magnitudes()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let peak_hz = peak_bin as f32 * bin_hz;
        assert!(
            (peak_hz - frequency).abs() <= bin_hz,
            "peak at {peak_hz} Hz, expected {frequency} Hz"
        );
    }

    #[test]
    fn test_running_maxima_are_monotonic() {
        let mut analyzer = analyzer(1024, 512);
        analyzer.update(&sine(440.0, 1024));
        let rms_max = analyzer.max_rms();
        let amplitude_max = analyzer.max_amplitude();
        let magnitude_max = analyzer.magnitude_maximums().to_vec();
        let centroid_min = analyzer.spectral_centroid_min();
        let flatness_max = analyzer.spectral_flatness_max();

        analyzer.update(&sine(880.0, 1024));
        analyzer.update(&vec![0.0; 1024]);

        assert!(analyzer.max_rms() >= rms_max);
        assert!(analyzer.max_amplitude() >= amplitude_max);
        assert!(analyzer.spectral_centroid_min() <= centroid_min);
        assert!(analyzer.spectral_flatness_max() >= flatness_max);
        for (now, before) in analyzer.magnitude_maximums().iter().zip(&magnitude_max) {
            assert!(now >= before);
        }
    }

    #[test]
    fn test_reset_restarts_envelope_from_next_tick() {
        let mut analyzer = analyzer(1024, 512);
        analyzer.update(&vec![1.0; 1024]);
        assert_eq!(analyzer.max_rms(), 1.0);

        analyzer.reset_min_max();
        analyzer.update(&vec![0.25; 1024]);
        assert_eq!(analyzer.max_rms(), analyzer.rms());
        assert_eq!(analyzer.max_amplitude(), analyzer.amplitude());
        assert_eq!(analyzer.spectral_centroid_min(), analyzer.spectral_centroid());
        assert_eq!(analyzer.spectral_centroid_max(), analyzer.spectral_centroid());
        assert_eq!(analyzer.spectral_flatness_min(), analyzer.spectral_flatness());
        assert_eq!(analyzer.spectral_flatness_max(), analyzer.spectral_flatness());
        for (max, magnitude) in analyzer
            .magnitude_maximums()
            .iter()
            .zip(analyzer.magnitudes())
        {
            assert_eq!(max, magnitude);
        }
    }

    #[test]
    fn test_silence_flatness_is_defined_and_finite() {
        let mut analyzer = analyzer(1024, 512);
        analyzer.update(&vec![0.0; 1024]);
        assert!((analyzer.spectral_flatness() - 1.0).abs() < 1e-6);
        assert!(analyzer.spectral_flatness().is_finite());
        assert!(analyzer.spectral_flatness_max().is_finite());
    }

    #[test]
    fn test_pure_tone_is_not_flat() {
        let mut analyzer = analyzer(1024, 512);
        analyzer.update(&sine(440.0, 1024));
        // A pure tone concentrates energy: flatness well below 1.
        assert!(analyzer.spectral_flatness() < 0.5);
        assert!(analyzer.spectral_flatness() > 0.0);
    }

    #[test]
    fn test_centroid_tracks_frequency() {
        let mut low = analyzer(1024, 512);
        low.update(&sine(220.0, 1024));
        let mut high = analyzer(1024, 512);
        high.update(&sine(4400.0, 1024));
        assert!(high.spectral_centroid() > low.spectral_centroid());
    }

    #[test]
    fn test_onset_fires_on_silence_to_tone_transition() {
        let mut analyzer = analyzer(1024, 512);
        for _ in 0..4 {
            analyzer.update(&vec![0.0; 1024]);
        }
        analyzer.update(&sine(440.0, 1024));
        assert!(analyzer.is_onset());
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let signal = sine(1234.5, 1024);
        let mut a = analyzer(1024, 512);
        let mut b = analyzer(1024, 512);
        a.update(&signal);
        b.update(&signal);
        assert_eq!(a.magnitudes(), b.magnitudes());
        assert_eq!(a.spectral_centroid(), b.spectral_centroid());
        assert_eq!(a.spectral_flatness(), b.spectral_flatness());
    }

    #[test]
    fn test_grabbed_blocks_flow_into_analysis() {
        use crate::audio::recorder::Recorder;

        let mut recorder = Recorder::new(512, 44_100).unwrap();
        recorder.start_grabbing();
        let mut analyzer = analyzer(1024, 512);

        recorder.grab_audio_buffer(&[0.0; 512]);
        analyzer.update(recorder.buffer_current());
        assert_eq!(analyzer.rms(), 0.0);
        assert_eq!(analyzer.amplitude(), 0.0);

        recorder.grab_audio_buffer(&[1.0; 512]);
        analyzer.update(recorder.buffer_current());
        assert_eq!(analyzer.rms(), 1.0);
        assert_eq!(analyzer.amplitude(), 1.0);
    }

    #[test]
    fn test_octave_band_count_stable_across_updates() {
        let mut analyzer = analyzer(1024, 512);
        let before = analyzer.octave_averages().len();
        assert!(before > 0);
        analyzer.update(&sine(440.0, 1024));
        assert_eq!(analyzer.octave_averages().len(), before);
    }
}
