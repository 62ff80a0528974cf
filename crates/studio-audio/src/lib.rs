//! Audio track slots and mixer selection.
//!
//! Advanced outputs take their audio from numbered tracks instead of a
//! single bound encoder. A recording picks tracks with a `mixer` bitmask;
//! a stream picks exactly one track by index.

mod error;
mod tracks;

pub use error::AudioError;
pub use tracks::{AudioTrack, AudioTrackTable, MixerMask};

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Number of audio track slots.
pub const MAX_AUDIO_MIXES: usize = 6;
