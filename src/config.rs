use thiserror::Error;

/// Setup validation failure. Fatal: an engine is never constructed from an
/// invalid configuration, values are not clamped into range.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block size must be greater than zero")]
    ZeroBlockSize,
    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,
    #[error("channel count must be greater than zero")]
    ZeroChannels,
    #[error("update rate must be greater than zero")]
    ZeroUpdateRate,
    #[error("hop size must be greater than zero")]
    ZeroHopSize,
    #[error("octave divisions must be greater than zero")]
    ZeroOctaveDivisions,
    #[error("FFT window size {0} is not a power of two")]
    WindowNotPowerOfTwo(usize),
    #[error("FFT window size {window} is smaller than hop size {hop}")]
    WindowSmallerThanHop { window: usize, hop: usize },
}

/// Process-wide audio configuration, fixed before any stream is registered
/// and treated as immutable for the lifetime of the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub channels: u16,
    /// Analysis ticks per second driven by the display loop.
    pub update_rate_hz: u32,
    /// Subdivisions per octave used by the octave-band averager.
    pub octave_divisions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 512,
            channels: 1,
            update_rate_hz: 100,
            octave_divisions: 3,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.channels == 0 {
            return Err(ConfigError::ZeroChannels);
        }
        if self.update_rate_hz == 0 {
            return Err(ConfigError::ZeroUpdateRate);
        }
        if self.octave_divisions == 0 {
            return Err(ConfigError::ZeroOctaveDivisions);
        }
        Ok(())
    }
}
