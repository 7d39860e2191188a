/// Groups FFT magnitude bins into logarithmically spaced octave bands and
/// averages the energy in each.
///
/// Band layout is derived from the sample rate and window size: octaves are
/// counted by halving from the Nyquist frequency until a band would fall
/// under one bin's bandwidth, and each octave is split into a fixed number
/// of divisions. The layout is computed once at construction.
pub struct OctaveAverager {
    /// Inclusive-exclusive bin ranges, one per band.
    bands: Vec<(usize, usize)>,
    averages: Vec<f32>,
}

impl OctaveAverager {
    pub fn new(sample_rate: f32, window_size: usize, divisions: usize) -> Self {
        let bin_hz = sample_rate / window_size as f32;
        let nyquist = sample_rate / 2.0;

        let mut octaves = 1;
        let mut f = nyquist;
        loop {
            f /= 2.0;
            if f <= bin_hz {
                break;
            }
            octaves += 1;
        }

        let mut bands = Vec::with_capacity(octaves * divisions);
        for k in 0..octaves {
            let hi = nyquist / 2.0_f32.powi((octaves - 1 - k) as i32);
            let lo = if k == 0 { 0.0 } else { hi / 2.0 };
            let step = (hi - lo) / divisions as f32;
            for j in 0..divisions {
                let band_lo = lo + step * j as f32;
                let band_hi = lo + step * (j + 1) as f32;
                let lo_bin = (band_lo / bin_hz).floor() as usize;
                let mut hi_bin = (band_hi / bin_hz).ceil() as usize;
                if hi_bin <= lo_bin {
                    hi_bin = lo_bin + 1;
                }
                bands.push((lo_bin, hi_bin));
            }
        }

        let averages = vec![0.0; bands.len()];
        Self { bands, averages }
    }

    /// Recompute the per-band averages from a magnitude spectrum.
    pub fn update(&mut self, magnitudes: &[f32]) {
        for (band, average) in self.bands.iter().zip(self.averages.iter_mut()) {
            let lo = band.0.min(magnitudes.len());
            let hi = band.1.min(magnitudes.len());
            *average = if lo < hi {
                magnitudes[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
            } else {
                0.0
            };
        }
    }

    pub fn averages(&self) -> &[f32] {
        &self.averages
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Number of bands from `from_band` on whose average exceeds
    /// `threshold`. The interactive loop accumulates this on onset ticks as
    /// a rough harmonic-content measure.
    pub fn bands_above(&self, threshold: f32, from_band: usize) -> usize {
        self.averages
            .iter()
            .skip(from_band)
            .filter(|&&v| v > threshold)
            .count()
    }

    pub fn reset(&mut self) {
        self.averages.fill(0.0);
    }
}
