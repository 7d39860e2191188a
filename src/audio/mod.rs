pub mod analyzer;
pub mod bridge;
pub mod octave;
pub mod onset;
pub mod player;
pub mod recorder;
pub mod tap;

pub use analyzer::SpectralAnalyzer;
pub use bridge::{AudioBridge, BridgeControls};
pub use octave::OctaveAverager;
pub use onset::OnsetDetector;
pub use player::SamplePlayer;
pub use recorder::Recorder;
pub use tap::{buffer_tap, TapReader, TapWriter};
