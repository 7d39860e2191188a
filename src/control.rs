//! Command plumbing between the control surface and the audio/analysis
//! threads. Widget bindings are modeled as a dispatch table from canonical
//! command names to zero-argument commands; commands travel over bounded
//! channels and are applied at the start of the next tick of whichever
//! thread owns the target state.

use crossbeam_channel::{bounded, Receiver, Sender};
use log::warn;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Commands are dropped rather than blocking the sender once this many are
/// queued unconsumed.
const COMMAND_QUEUE_DEPTH: usize = 64;

const MAGNITUDE_RANGE: (f32, f32) = (0.0, 10.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartGrabbing,
    StopGrabbing,
    StartRecording,
    StopRecording,
    StartPlaying,
    StopPlaying,
    RestartPlaying,
    ResetBuffer,
    ResetAllMinMax,
    LoopPlayback,
    NoLoopPlayback,
}

/// Which thread consumes a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDomain {
    Recorder,
    Analyzer,
}

/// Canonical command names as exposed to the control surface.
pub const DISPATCH_TABLE: &[(&str, Command)] = &[
    ("startGrabbingSound", Command::StartGrabbing),
    ("stopGrabbingSound", Command::StopGrabbing),
    ("startRecording", Command::StartRecording),
    ("stopRecording", Command::StopRecording),
    ("startPlaying", Command::StartPlaying),
    ("stopPlaying", Command::StopPlaying),
    ("restartPlaying", Command::RestartPlaying),
    ("resetBuffer", Command::ResetBuffer),
    ("resetAllMinMax", Command::ResetAllMinMax),
    ("loopPlayback", Command::LoopPlayback),
    ("noLoopPlayback", Command::NoLoopPlayback),
];

impl Command {
    pub fn parse(name: &str) -> Option<Command> {
        DISPATCH_TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| *c)
    }

    pub fn name(&self) -> &'static str {
        DISPATCH_TABLE
            .iter()
            .find(|(_, c)| c == self)
            .map(|(n, _)| *n)
            .unwrap_or("unknown")
    }

    pub fn domain(&self) -> CommandDomain {
        match self {
            Command::ResetAllMinMax => CommandDomain::Analyzer,
            _ => CommandDomain::Recorder,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

/// Cloneable handle held by the control surface. Routes each command to the
/// channel of its owning domain and carries the display-only `magnitude`
/// scale, which analysis never reads.
#[derive(Clone)]
pub struct CommandSender {
    recorder_tx: Sender<Command>,
    analyzer_tx: Sender<Command>,
    magnitude: Arc<AtomicU32>,
}

impl CommandSender {
    pub fn send(&self, command: Command) {
        let tx = match command.domain() {
            CommandDomain::Recorder => &self.recorder_tx,
            CommandDomain::Analyzer => &self.analyzer_tx,
        };
        if tx.try_send(command).is_err() {
            warn!("command queue full, dropping {}", command.name());
        }
    }

    pub fn dispatch(&self, name: &str) -> Result<(), UnknownCommand> {
        let command = Command::parse(name).ok_or_else(|| UnknownCommand(name.to_string()))?;
        self.send(command);
        Ok(())
    }

    pub fn set_magnitude(&self, value: f32) {
        let clamped = value.clamp(MAGNITUDE_RANGE.0, MAGNITUDE_RANGE.1);
        self.magnitude.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn magnitude(&self) -> f32 {
        f32::from_bits(self.magnitude.load(Ordering::Relaxed))
    }
}

/// Build the command transport. Returns the sender handle plus the receiving
/// ends for the audio callback (recorder domain) and the analysis tick
/// (analyzer domain).
pub fn command_bus() -> (CommandSender, Receiver<Command>, Receiver<Command>) {
    let (recorder_tx, recorder_rx) = bounded(COMMAND_QUEUE_DEPTH);
    let (analyzer_tx, analyzer_rx) = bounded(COMMAND_QUEUE_DEPTH);
    let sender = CommandSender {
        recorder_tx,
        analyzer_tx,
        magnitude: Arc::new(AtomicU32::new(5.0_f32.to_bits())),
    };
    (sender, recorder_rx, analyzer_rx)
}
