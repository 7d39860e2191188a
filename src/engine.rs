use anyhow::Result;
use crossbeam_channel::Receiver;
use log::info;
use std::sync::{Arc, Mutex};

use crate::audio::{
    buffer_tap, AudioBridge, BridgeControls, Recorder, SamplePlayer, SpectralAnalyzer, TapReader,
};
use crate::config::EngineConfig;
use crate::control::{command_bus, Command, CommandSender};

/// Ties the capture/playback/analysis loop together: recorder and sample
/// player behind the callback bridge on the audio side, the analyzer fed
/// from the buffer tap on the display side, commands in between.
///
/// `tick` is meant to be called once per display frame. The engine starts
/// out grabbing and recording with playback stopped.
pub struct AudioEngine {
    config: EngineConfig,
    analyzer: SpectralAnalyzer,
    tap: TapReader,
    analyzer_rx: Receiver<Command>,
    commands: CommandSender,
    controls: Arc<BridgeControls>,
    recorder: Arc<Mutex<Recorder>>,
    _bridge: AudioBridge,
}

impl AudioEngine {
    pub fn new(
        config: EngineConfig,
        sample: Option<SamplePlayer>,
        use_mic: bool,
    ) -> Result<Self> {
        config.validate()?;

        let mut recorder = Recorder::new(config.block_size, config.sample_rate)?;
        recorder.start_grabbing();
        recorder.start_recording();
        recorder.stop_playing();
        let recorder = Arc::new(Mutex::new(recorder));

        let analyzer = SpectralAnalyzer::new(
            config.sample_rate as f32,
            config.block_size * 2,
            config.block_size,
            config.octave_divisions,
            config.update_rate_hz,
        )?;
        info!(
            "octave analysis: {} band averages",
            analyzer.octave_averages().len()
        );

        let (tap_writer, tap_reader) = buffer_tap(config.block_size);
        let (commands, recorder_rx, analyzer_rx) = command_bus();
        let controls = BridgeControls::new(use_mic, sample.is_some());

        let bridge = AudioBridge::new(
            &config,
            Arc::clone(&recorder),
            Arc::clone(&controls),
            recorder_rx,
            tap_writer,
            sample,
        )?;

        Ok(Self {
            config,
            analyzer,
            tap: tap_reader,
            analyzer_rx,
            commands,
            controls,
            recorder,
            _bridge: bridge,
        })
    }

    /// One analysis tick: apply pending analyzer-domain commands, then run
    /// the analyzer over the latest published live-buffer block.
    pub fn tick(&mut self) {
        while let Ok(command) = self.analyzer_rx.try_recv() {
            if command == Command::ResetAllMinMax {
                self.analyzer.reset_min_max();
                info!("analysis extrema reset");
            }
        }
        let block = self.tap.read();
        self.analyzer.update(block);
    }

    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn controls(&self) -> &BridgeControls {
        &self.controls
    }

    pub fn analyzer(&self) -> &SpectralAnalyzer {
        &self.analyzer
    }

    /// Mutable analyzer access for setup-time knobs (onset window length,
    /// onset threshold).
    pub fn analyzer_mut(&mut self) -> &mut SpectralAnalyzer {
        &mut self.analyzer
    }

    /// Most recently published live-buffer block, for waveform display.
    pub fn buffer_snapshot(&mut self) -> &[f32] {
        self.tap.read()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Length of the recorded history, for the display surface. Takes the
    /// recorder lock for a single length read.
    pub fn recorded_len(&self) -> usize {
        self.recorder.lock().unwrap().recorded_len()
    }
}
