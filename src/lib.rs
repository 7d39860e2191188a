pub mod audio;
pub mod config;
pub mod control;
pub mod engine;

pub use audio::{Recorder, SamplePlayer, SpectralAnalyzer};
pub use config::{ConfigError, EngineConfig};
pub use control::{Command, CommandSender};
pub use engine::AudioEngine;
