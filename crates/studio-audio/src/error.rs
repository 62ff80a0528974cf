//! Error types for the audio module.

use thiserror::Error;

/// Errors that can occur when selecting audio tracks.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Track index outside 1..=MAX_AUDIO_MIXES.
    #[error("Audio track index {0} out of range (1-6)")]
    IndexOutOfRange(usize),

    /// Mixer mask selects no track or a track past the last slot.
    #[error("Invalid mixer mask: {0:#b}")]
    InvalidMixer(u32),

    /// A selected slot holds no track.
    #[error("No audio track at index {0}")]
    MissingTrack(usize),

    /// Bitrate of zero.
    #[error("Invalid audio bitrate: {0}")]
    InvalidBitrate(u32),
}
