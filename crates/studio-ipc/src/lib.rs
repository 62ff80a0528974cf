//! Typed output signals, states and the signal bus.
//!
//! This crate defines the vocabulary shared by the coordinator and anything
//! observing it: output kinds and handles, the per-output state machine, the
//! lifecycle signals and the bus that fans them out to listeners.

mod bus;
mod commands;
mod events;
mod state;
mod types;

pub use bus::{SignalBus, SignalFilter, SignalReceiver, WaitError};
pub use commands::OutputCommand;
pub use events::{OutputSignal, SignalEvent, StatusCode};
pub use state::{OutputState, PipelinePhase};
pub use types::{OutputId, OutputKind, OutputStats, OutputType, RecordingFormat, RecordingQuality};

use crossbeam_channel::{Receiver, Sender};

/// Creates the per-subscriber signal channel.
///
/// Unbounded so that a slow listener never stalls an output's worker.
pub fn signal_channel() -> (Sender<SignalEvent>, Receiver<SignalEvent>) {
    crossbeam_channel::unbounded()
}
