use log::debug;

use crate::config::ConfigError;
use crate::control::Command;

/// Seconds of recorded history reserved up front so the common append path
/// in the audio callback is a plain copy.
const HISTORY_RESERVE_SECS: usize = 30;

/// Fixed-capacity live buffer plus an in-memory recorded history with a
/// playback cursor.
///
/// The live buffer always holds the most recent `block_size` samples seen
/// while grabbing; it is allocated once and never grows. The recorded
/// history is a growable sequence that retains grabbed frames while
/// recording is on. All state transitions are idempotent and driven only by
/// explicit commands.
pub struct Recorder {
    live: Vec<f32>,
    write_pos: usize,
    history: Vec<f32>,
    play_pos: usize,
    block_size: usize,
    sample_rate: u32,
    grabbing: bool,
    recording: bool,
    playing: bool,
    looping: bool,
}

impl Recorder {
    pub fn new(block_size: usize, sample_rate: u32) -> Result<Self, ConfigError> {
        if block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        Ok(Self {
            live: vec![0.0; block_size],
            write_pos: 0,
            history: Vec::with_capacity(sample_rate as usize * HISTORY_RESERVE_SECS),
            play_pos: 0,
            block_size,
            sample_rate,
            grabbing: false,
            recording: false,
            playing: false,
            looping: false,
        })
    }

    pub fn start_grabbing(&mut self) {
        if !self.grabbing {
            self.grabbing = true;
            debug!("recorder: grabbing on");
        }
    }

    pub fn stop_grabbing(&mut self) {
        if self.grabbing {
            self.grabbing = false;
            debug!("recorder: grabbing off");
        }
    }

    pub fn start_recording(&mut self) {
        if !self.recording {
            self.recording = true;
            debug!("recorder: recording on");
        }
    }

    pub fn stop_recording(&mut self) {
        if self.recording {
            self.recording = false;
            debug!("recorder: recording off");
        }
    }

    pub fn start_playing(&mut self) {
        if !self.playing {
            self.playing = true;
            debug!("recorder: playing on");
        }
    }

    pub fn stop_playing(&mut self) {
        if self.playing {
            self.playing = false;
            debug!("recorder: playing off");
        }
    }

    /// Rewinds the playback cursor without touching the play/stop state.
    pub fn restart_playing(&mut self) {
        self.play_pos = 0;
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Clears the recorded history. Keeps the reserved allocation so a
    /// subsequent recording pass stays allocation-free.
    pub fn reset_recording(&mut self) {
        self.history.clear();
        self.play_pos = 0;
        debug!("recorder: history cleared");
    }

    /// Copies one input frame into the live buffer at the write cursor and,
    /// while recording, appends it to the history. Real-time-safe: bounded
    /// copies only, no allocation on the common path (the history reserve is
    /// taken at construction).
    pub fn grab_audio_buffer(&mut self, frame: &[f32]) {
        if !self.grabbing {
            return;
        }
        for &sample in frame {
            self.live[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.block_size;
        }
        if self.recording {
            self.history.extend_from_slice(frame);
        }
    }

    /// Fills `out` with the next slice of recorded history at the playback
    /// cursor. At end of history the cursor either wraps (loop) or playback
    /// stops and the remainder is silence. An empty history always yields
    /// silence, never an error.
    pub fn output_audio_buffer(&mut self, out: &mut [f32]) {
        if self.history.is_empty() {
            out.fill(0.0);
            return;
        }
        let mut filled = 0;
        while filled < out.len() {
            if self.play_pos >= self.history.len() {
                if self.looping {
                    self.play_pos = 0;
                } else {
                    self.playing = false;
                    out[filled..].fill(0.0);
                    return;
                }
            }
            let n = (out.len() - filled).min(self.history.len() - self.play_pos);
            out[filled..filled + n]
                .copy_from_slice(&self.history[self.play_pos..self.play_pos + n]);
            self.play_pos += n;
            filled += n;
        }
    }

    pub fn apply_command(&mut self, command: Command) {
        match command {
            Command::StartGrabbing => self.start_grabbing(),
            Command::StopGrabbing => self.stop_grabbing(),
            Command::StartRecording => self.start_recording(),
            Command::StopRecording => self.stop_recording(),
            Command::StartPlaying => self.start_playing(),
            Command::StopPlaying => self.stop_playing(),
            Command::RestartPlaying => self.restart_playing(),
            Command::ResetBuffer => self.reset_recording(),
            Command::LoopPlayback => self.set_loop(true),
            Command::NoLoopPlayback => self.set_loop(false),
            // Analyzer-domain commands never reach the recorder channel.
            Command::ResetAllMinMax => {}
        }
    }

    /// Read-only view of the live buffer. Intended for the analysis path,
    /// outside the audio callback.
    pub fn buffer_current(&self) -> &[f32] {
        &self.live
    }

    pub fn recorded_len(&self) -> usize {
        self.history.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_grabbing(&self) -> bool {
        self.grabbing
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(block_size: usize) -> Recorder {
        Recorder::new(block_size, 44_100).unwrap()
    }

    #[test]
    fn test_invalid_setup_rejected() {
        assert_eq!(
            Recorder::new(0, 44_100).err(),
            Some(ConfigError::ZeroBlockSize)
        );
        assert_eq!(
            Recorder::new(512, 0).err(),
            Some(ConfigError::ZeroSampleRate)
        );
    }

    #[test]
    fn test_output_with_empty_history_is_silence() {
        let mut rec = recorder(8);
        rec.start_playing();
        let mut out = [1.0; 8];
        rec.output_audio_buffer(&mut out);
        assert_eq!(out, [0.0; 8]);
    }

    #[test]
    fn test_start_grabbing_is_idempotent() {
        let mut rec = recorder(8);
        rec.start_grabbing();
        assert!(rec.is_grabbing());
        rec.start_grabbing();
        assert!(rec.is_grabbing());
        rec.stop_grabbing();
        rec.stop_grabbing();
        assert!(!rec.is_grabbing());
    }

    #[test]
    fn test_grab_requires_grabbing_state() {
        let mut rec = recorder(4);
        rec.grab_audio_buffer(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(rec.buffer_current(), &[0.0; 4]);

        rec.start_grabbing();
        rec.grab_audio_buffer(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(rec.buffer_current(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_partial_frames_wrap_the_write_cursor() {
        let mut rec = recorder(4);
        rec.start_grabbing();
        rec.grab_audio_buffer(&[1.0, 2.0]);
        rec.grab_audio_buffer(&[3.0, 4.0]);
        rec.grab_audio_buffer(&[5.0, 6.0]);
        assert_eq!(rec.buffer_current(), &[5.0, 6.0, 3.0, 4.0]);
    }

    #[test]
    fn test_recording_appends_history_only_while_on() {
        let mut rec = recorder(2);
        rec.start_grabbing();
        rec.grab_audio_buffer(&[0.1, 0.2]);
        assert_eq!(rec.recorded_len(), 0);

        rec.start_recording();
        rec.grab_audio_buffer(&[0.3, 0.4]);
        rec.grab_audio_buffer(&[0.5, 0.6]);
        assert_eq!(rec.recorded_len(), 4);

        rec.stop_recording();
        rec.grab_audio_buffer(&[0.7, 0.8]);
        assert_eq!(rec.recorded_len(), 4);
    }

    #[test]
    fn test_playback_replays_history_then_stops() {
        let mut rec = recorder(2);
        rec.start_grabbing();
        rec.start_recording();
        rec.grab_audio_buffer(&[0.1, 0.2]);
        rec.grab_audio_buffer(&[0.3, 0.4]);

        rec.start_playing();
        let mut out = [0.0; 2];
        rec.output_audio_buffer(&mut out);
        assert_eq!(out, [0.1, 0.2]);
        rec.output_audio_buffer(&mut out);
        assert_eq!(out, [0.3, 0.4]);

        // History exhausted without looping: silence, playback stops.
        rec.output_audio_buffer(&mut out);
        assert_eq!(out, [0.0, 0.0]);
        assert!(!rec.is_playing());
    }

    #[test]
    fn test_loop_playback_repeats_with_history_period() {
        let mut rec = recorder(3);
        rec.start_grabbing();
        rec.start_recording();
        rec.grab_audio_buffer(&[1.0, 2.0, 3.0]);
        rec.stop_recording();

        rec.set_loop(true);
        rec.start_playing();

        let mut produced = Vec::new();
        let mut out = [0.0; 2];
        for _ in 0..9 {
            rec.output_audio_buffer(&mut out);
            produced.extend_from_slice(&out);
        }
        assert_eq!(produced.len(), 18);
        for (i, sample) in produced.iter().enumerate() {
            assert_eq!(*sample, produced[i % 3], "loop broke at sample {i}");
        }
        assert!(rec.is_playing());
    }

    #[test]
    fn test_restart_playing_rewinds_without_changing_state() {
        let mut rec = recorder(2);
        rec.start_grabbing();
        rec.start_recording();
        rec.grab_audio_buffer(&[0.1, 0.2]);
        rec.grab_audio_buffer(&[0.3, 0.4]);
        rec.start_playing();

        let mut out = [0.0; 2];
        rec.output_audio_buffer(&mut out);
        assert_eq!(out, [0.1, 0.2]);

        rec.restart_playing();
        assert!(rec.is_playing());
        rec.output_audio_buffer(&mut out);
        assert_eq!(out, [0.1, 0.2]);
    }

    #[test]
    fn test_reset_clears_history_but_not_flags() {
        let mut rec = recorder(2);
        rec.start_grabbing();
        rec.start_recording();
        rec.grab_audio_buffer(&[0.1, 0.2]);
        assert_eq!(rec.recorded_len(), 2);

        rec.apply_command(Command::ResetBuffer);
        assert_eq!(rec.recorded_len(), 0);
        assert!(rec.is_grabbing());
        assert!(rec.is_recording());
    }

    #[test]
    fn test_commands_drive_transitions() {
        let mut rec = recorder(2);
        rec.apply_command(Command::StartGrabbing);
        rec.apply_command(Command::StartRecording);
        rec.apply_command(Command::LoopPlayback);
        assert!(rec.is_grabbing() && rec.is_recording() && rec.is_looping());

        rec.apply_command(Command::NoLoopPlayback);
        rec.apply_command(Command::StopGrabbing);
        assert!(!rec.is_grabbing() && !rec.is_looping());
    }
}
