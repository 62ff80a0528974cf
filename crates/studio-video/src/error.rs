//! Error types for the video module.

use thiserror::Error;

/// Errors that can occur while configuring a video context.
#[derive(Debug, Error)]
pub enum VideoError {
    /// Geometry change attempted while outputs are attached.
    #[error("Video context {id} is in use by {outputs} output(s)")]
    ContextInUse { id: u64, outputs: usize },

    /// Zero or otherwise unusable resolution.
    #[error("Invalid resolution: {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    /// Zero numerator or denominator.
    #[error("Invalid frame rate: {num}/{den}")]
    InvalidFrameRate { num: u32, den: u32 },
}
