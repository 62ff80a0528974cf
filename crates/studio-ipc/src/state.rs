//! Output state machine types.

use serde::{Deserialize, Serialize};

use crate::commands::OutputCommand;

/// The current state of a single output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputState {
    /// Created or cleanly torn down.
    #[default]
    Idle,

    /// A start request was accepted and the pipeline is being brought up.
    Starting,

    /// The pipeline is running.
    Active,

    /// A stop request was accepted and the pipeline is draining.
    Stopping,

    /// The last cycle ended with a failure.
    Stopped {
        /// Status code carried by the final signal.
        code: i32,

        /// Error message carried by the final signal, if any.
        error: Option<String>,
    },
}

impl OutputState {
    /// Returns true if the output is idle.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the output is starting.
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting)
    }

    /// Returns true if the output is active.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if the output is stopping.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping)
    }

    /// Returns true if the last cycle ended with a failure.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    /// Returns true when no pipeline is attached (idle or stopped).
    pub fn is_terminal(&self) -> bool {
        self.is_idle() || self.is_stopped()
    }

    /// Whether `command` is a legal request in this state.
    pub fn permits(&self, command: OutputCommand) -> bool {
        match command {
            OutputCommand::Start | OutputCommand::Configure | OutputCommand::Destroy => {
                self.is_terminal()
            }
            OutputCommand::Stop
            | OutputCommand::ForceStop
            | OutputCommand::Save
            | OutputCommand::Split => self.is_active(),
        }
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Active => "Active",
            Self::Stopping => "Stopping",
            Self::Stopped { .. } => "Stopped",
        }
    }
}

/// Startup phases of an output pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    /// Lease the shared video context.
    AttachVideo,

    /// Lease the resolved encoders.
    AcquireEncoders,

    /// Open the file, endpoint or replay window.
    OpenSink,

    /// Begin feeding frames.
    Activate,
}

impl PipelinePhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::AttachVideo => Some(Self::AcquireEncoders),
            Self::AcquireEncoders => Some(Self::OpenSink),
            Self::OpenSink => Some(Self::Activate),
            Self::Activate => None,
        }
    }

    /// Returns the previous phase, if any (for rollback).
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::AttachVideo => None,
            Self::AcquireEncoders => Some(Self::AttachVideo),
            Self::OpenSink => Some(Self::AcquireEncoders),
            Self::Activate => Some(Self::OpenSink),
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::AttachVideo => "Attaching video context",
            Self::AcquireEncoders => "Acquiring encoders",
            Self::OpenSink => "Opening sink",
            Self::Activate => "Activating",
        }
    }
}
