use std::collections::VecDeque;

pub const DEFAULT_ONSET_TIME_STEPS: usize = 5;
pub const DEFAULT_ONSET_THRESHOLD: f32 = 0.015;

/// Energy-delta onset detection over a fixed-length sliding window.
///
/// Each analysis tick pushes one energy value; the onset flag fires when the
/// newest value exceeds the mean of the older window entries by more than
/// the threshold. The window never fires while still priming.
pub struct OnsetDetector {
    history: VecDeque<f32>,
    time_steps: usize,
    threshold: f32,
    onset: bool,
}

impl OnsetDetector {
    pub fn new(time_steps: usize, threshold: f32) -> Self {
        let time_steps = time_steps.max(2);
        Self {
            history: VecDeque::with_capacity(time_steps),
            time_steps,
            threshold,
            onset: false,
        }
    }

    /// Takes effect on the next push.
    pub fn set_time_steps(&mut self, time_steps: usize) {
        self.time_steps = time_steps.max(2);
        while self.history.len() > self.time_steps {
            self.history.pop_front();
        }
    }

    /// Takes effect on the next push.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn push(&mut self, energy: f32) -> bool {
        self.history.push_back(energy);
        while self.history.len() > self.time_steps {
            self.history.pop_front();
        }

        self.onset = if self.history.len() == self.time_steps {
            let older = self.history.len() - 1;
            let baseline: f32 = self.history.iter().take(older).sum::<f32>() / older as f32;
            energy - baseline > self.threshold
        } else {
            false
        };
        self.onset
    }

    pub fn is_onset(&self) -> bool {
        self.onset
    }

    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for OnsetDetector {
    fn default() -> Self {
        Self::new(DEFAULT_ONSET_TIME_STEPS, DEFAULT_ONSET_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_onset_while_priming() {
        let mut detector = OnsetDetector::default();
        for _ in 0..4 {
            assert!(!detector.push(1.0));
        }
    }

    #[test]
    fn test_energy_jump_fires_onset() {
        let mut detector = OnsetDetector::default();
        for _ in 0..4 {
            detector.push(0.0);
        }
        assert!(detector.push(0.5));
        assert!(detector.is_onset());
    }

    #[test]
    fn test_steady_energy_does_not_fire() {
        let mut detector = OnsetDetector::default();
        for _ in 0..20 {
            detector.push(0.5);
        }
        assert!(!detector.is_onset());
    }

    #[test]
    fn test_onset_decays_once_level_is_sustained() {
        let mut detector = OnsetDetector::default();
        for _ in 0..4 {
            detector.push(0.0);
        }
        assert!(detector.push(1.0));
        // The jump works its way into the baseline and the flag clears.
        let mut cleared = false;
        for _ in 0..DEFAULT_ONSET_TIME_STEPS {
            if !detector.push(1.0) {
                cleared = true;
            }
        }
        assert!(cleared);
        assert!(!detector.is_onset());
    }

    #[test]
    fn test_sub_threshold_jump_ignored() {
        let mut detector = OnsetDetector::default();
        for _ in 0..4 {
            detector.push(0.0);
        }
        assert!(!detector.push(0.01));
    }

    #[test]
    fn test_reconfigured_window_applies_next_push() {
        let mut detector = OnsetDetector::new(3, 0.1);
        detector.push(0.0);
        detector.push(0.0);
        detector.set_time_steps(8);
        // Window now primes to the new length before firing again.
        assert!(!detector.push(1.0));
    }
}
