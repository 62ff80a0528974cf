//! Transition requests a caller can make against an output.

use serde::{Deserialize, Serialize};

/// A request that the coordinator validates against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputCommand {
    /// Begin the pipeline.
    Start,

    /// Drain and finalize.
    Stop,

    /// Finalize without draining buffered frames.
    ForceStop,

    /// Flush the replay window to a file.
    Save,

    /// Close the current recording file and continue in a new one.
    Split,

    /// Change a setting or link.
    Configure,

    /// Release the output.
    Destroy,
}

impl OutputCommand {
    /// Returns the name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::ForceStop => "force-stop",
            Self::Save => "save",
            Self::Split => "split",
            Self::Configure => "configure",
            Self::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for OutputCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
