use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig};
use crossbeam_channel::Receiver;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::player::SamplePlayer;
use super::recorder::Recorder;
use super::tap::TapWriter;
use crate::config::EngineConfig;
use crate::control::Command;

/// Routing flags observed by the audio callbacks on their next tick.
/// Mic routing only has an effect if the bridge was built with an input
/// stream.
pub struct BridgeControls {
    use_mic: AtomicBool,
    play_sample: AtomicBool,
}

impl BridgeControls {
    pub fn new(use_mic: bool, play_sample: bool) -> Arc<Self> {
        Arc::new(Self {
            use_mic: AtomicBool::new(use_mic),
            play_sample: AtomicBool::new(play_sample),
        })
    }

    pub fn use_mic(&self) -> bool {
        self.use_mic.load(Ordering::Relaxed)
    }

    pub fn set_use_mic(&self, on: bool) {
        self.use_mic.store(on, Ordering::Relaxed);
    }

    pub fn sample_armed(&self) -> bool {
        self.play_sample.load(Ordering::Relaxed)
    }

    pub fn arm_sample(&self, on: bool) {
        self.play_sample.store(on, Ordering::Relaxed);
    }
}

/// Accumulates a sample-at-a-time stream into fixed-size blocks without
/// allocating. Returns the completed block exactly when it fills.
struct BlockChunker {
    buf: Vec<f32>,
    len: usize,
}

impl BlockChunker {
    fn new(block_size: usize) -> Self {
        Self {
            buf: vec![0.0; block_size],
            len: 0,
        }
    }

    fn push(&mut self, sample: f32) -> Option<&[f32]> {
        self.buf[self.len] = sample;
        self.len += 1;
        if self.len == self.buf.len() {
            self.len = 0;
            Some(&self.buf)
        } else {
            None
        }
    }
}

/// The real-time boundary: owns the cpal streams and routes fixed-size
/// frames between the hardware, the recorder and the sample player.
///
/// Output priority each callback, in order: an armed sample while the
/// recorder is grabbing (feeding its own output back into the live buffer
/// when the mic is off, so analysis hears what the listener hears), then
/// recorded-history playback, then silence. Control-surface commands are
/// drained in a bounded loop at the top of the output callback.
///
/// Neither callback ever blocks: the recorder lock is only contended by the
/// other callback for a bounded copy, and a missed `try_lock` drops or
/// silences one frame instead of waiting.
pub struct AudioBridge {
    _input: Option<Stream>,
    _output: Stream,
}

impl AudioBridge {
    pub fn new(
        config: &EngineConfig,
        recorder: Arc<Mutex<Recorder>>,
        controls: Arc<BridgeControls>,
        commands: Receiver<Command>,
        tap: TapWriter,
        sample: Option<SamplePlayer>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: BufferSize::Fixed(config.block_size as u32),
        };

        let output_device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no output device available"))?;
        info!(
            "using output device: {}",
            output_device.name().unwrap_or_else(|_| "unknown".to_string())
        );
        let output = Self::build_output_stream(
            &output_device,
            &stream_config,
            config.block_size,
            Arc::clone(&recorder),
            Arc::clone(&controls),
            commands,
            tap.clone(),
            sample,
        )?;
        output.play()?;

        let input = if controls.use_mic() {
            let input_device = host
                .default_input_device()
                .ok_or_else(|| anyhow!("no input device available"))?;
            info!(
                "using input device: {}",
                input_device.name().unwrap_or_else(|_| "unknown".to_string())
            );
            let stream = Self::build_input_stream(
                &input_device,
                &stream_config,
                config.block_size,
                recorder,
                controls,
                tap,
            )?;
            stream.play()?;
            Some(stream)
        } else {
            None
        };

        Ok(Self {
            _input: input,
            _output: output,
        })
    }

    fn build_input_stream(
        device: &Device,
        stream_config: &StreamConfig,
        block_size: usize,
        recorder: Arc<Mutex<Recorder>>,
        controls: Arc<BridgeControls>,
        tap: TapWriter,
    ) -> Result<Stream> {
        let channels = stream_config.channels as usize;
        let mut chunker = BlockChunker::new(block_size);

        let stream = device.build_input_stream(
            stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !controls.use_mic() {
                    return;
                }
                // A missed lock drops this hardware frame rather than
                // stalling the input callback.
                let mut rec = match recorder.try_lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                for frame in data.chunks(channels) {
                    let mono = frame.iter().sum::<f32>() / channels as f32;
                    if let Some(block) = chunker.push(mono) {
                        if rec.is_grabbing() {
                            rec.grab_audio_buffer(block);
                            tap.publish(rec.buffer_current());
                        }
                    }
                }
            },
            |err| {
                warn!("input stream error: {err}");
            },
            None,
        )?;
        Ok(stream)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_output_stream(
        device: &Device,
        stream_config: &StreamConfig,
        block_size: usize,
        recorder: Arc<Mutex<Recorder>>,
        controls: Arc<BridgeControls>,
        commands: Receiver<Command>,
        tap: TapWriter,
        mut sample: Option<SamplePlayer>,
    ) -> Result<Stream> {
        let channels = stream_config.channels as usize;
        let mut chunker = BlockChunker::new(block_size);
        let mut mono_out = vec![0.0f32; block_size];

        let stream = device.build_output_stream(
            stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut rec = match recorder.try_lock() {
                    Ok(guard) => guard,
                    Err(_) => {
                        data.fill(0.0);
                        return;
                    }
                };
                while let Ok(command) = commands.try_recv() {
                    rec.apply_command(command);
                }

                match sample.as_mut() {
                    Some(player) if controls.sample_armed() && rec.is_grabbing() => {
                        let feedback = !controls.use_mic();
                        for frame in data.chunks_mut(channels) {
                            let s = player.play();
                            for out in frame.iter_mut() {
                                *out = s;
                            }
                            if feedback {
                                if let Some(block) = chunker.push(s) {
                                    rec.grab_audio_buffer(block);
                                    tap.publish(rec.buffer_current());
                                }
                            }
                        }
                    }
                    _ if rec.is_playing() => {
                        let frames = data.len() / channels;
                        let mut done = 0;
                        while done < frames {
                            let n = (frames - done).min(block_size);
                            rec.output_audio_buffer(&mut mono_out[..n]);
                            let slice = &mut data[done * channels..(done + n) * channels];
                            for (i, frame) in slice.chunks_mut(channels).enumerate() {
                                for out in frame.iter_mut() {
                                    *out = mono_out[i];
                                }
                            }
                            done += n;
                        }
                    }
                    _ => data.fill(0.0),
                }
            },
            |err| {
                warn!("output stream error: {err}");
            },
            None,
        )?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunker_emits_exactly_on_full_blocks() {
        let mut chunker = BlockChunker::new(3);
        assert!(chunker.push(1.0).is_none());
        assert!(chunker.push(2.0).is_none());
        assert_eq!(chunker.push(3.0), Some(&[1.0, 2.0, 3.0][..]));

        assert!(chunker.push(4.0).is_none());
        assert!(chunker.push(5.0).is_none());
        assert_eq!(chunker.push(6.0), Some(&[4.0, 5.0, 6.0][..]));
    }

    #[test]
    fn test_controls_toggle() {
        let controls = BridgeControls::new(true, false);
        assert!(controls.use_mic());
        assert!(!controls.sample_armed());
        controls.set_use_mic(false);
        controls.arm_sample(true);
        assert!(!controls.use_mic());
        assert!(controls.sample_armed());
    }
}
