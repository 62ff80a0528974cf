//! Error types for the coordinator.

use studio_audio::AudioError;
use studio_encoder::EncoderError;
use studio_ipc::{OutputCommand, OutputId, OutputKind, OutputType};
use studio_transport::TransportError;
use studio_video::VideoError;
use thiserror::Error;

/// Synchronous failures of coordinator requests.
///
/// Failures while a pipeline is being brought up are not reported here; they
/// arrive on the signal bus as a `Stop` carrying a status code.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Handle does not refer to a live output.
    #[error("Unknown or destroyed output {0}")]
    UnknownOutput(OutputId),

    /// Request not allowed in the output's current state.
    #[error("Cannot {command} {id} while {state}")]
    InvalidTransition {
        id: OutputId,
        state: &'static str,
        command: OutputCommand,
    },

    #[error("{0} has no video context")]
    MissingVideoContext(OutputId),

    #[error("{0} has no video encoder")]
    MissingVideoEncoder(OutputId),

    #[error("{0} has no audio encoder")]
    MissingAudioEncoder(OutputId),

    #[error("{0} has no streaming service")]
    MissingService(OutputId),

    /// Encoders are delegated to a linked output that is not set.
    #[error("{id} needs a linked {needs} output")]
    MissingLink { id: OutputId, needs: OutputType },

    /// Link between kinds that cannot be linked.
    #[error("A {from} cannot link to a {to}")]
    InvalidLink { from: OutputKind, to: OutputKind },

    /// Operation only defined for replay buffers.
    #[error("{0} is not a replay buffer")]
    NotAReplayBuffer(OutputId),

    /// Operation only defined for recordings.
    #[error("{0} is not a recording")]
    NotARecording(OutputId),

    /// Configure closure swapped the settings for another kind.
    #[error("Settings for a {expected} cannot become a {found}")]
    KindChanged {
        expected: OutputKind,
        found: OutputKind,
    },

    /// Name already registered.
    #[error("Output name '{0}' is already taken")]
    NameTaken(String),

    /// Setting value out of range.
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Worker queue full or worker gone.
    #[error("Worker for {0} is not accepting requests")]
    WorkerUnavailable(OutputId),

    /// Worker thread could not be spawned.
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Video(#[from] VideoError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
