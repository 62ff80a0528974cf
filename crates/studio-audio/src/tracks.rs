//! Audio track table.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AudioError, AudioResult, MAX_AUDIO_MIXES};

/// An encoded audio track: bitrate plus a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Bitrate in kbps.
    pub bitrate_kbps: u32,

    /// Display name.
    pub name: String,
}

impl AudioTrack {
    /// Create a track.
    pub fn new(bitrate_kbps: u32, name: impl Into<String>) -> AudioResult<Self> {
        if bitrate_kbps == 0 {
            return Err(AudioError::InvalidBitrate(bitrate_kbps));
        }
        Ok(Self {
            bitrate_kbps,
            name: name.into(),
        })
    }
}

/// Bitmask over track slots; bit 0 is track 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerMask(pub u32);

impl MixerMask {
    /// Check that the mask selects at least one existing slot.
    pub fn validate(self) -> AudioResult<()> {
        if self.0 == 0 || self.0 >= (1 << MAX_AUDIO_MIXES) {
            return Err(AudioError::InvalidMixer(self.0));
        }
        Ok(())
    }

    /// Selected track indices, 1-based, ascending.
    pub fn indices(self) -> impl Iterator<Item = usize> {
        (0..MAX_AUDIO_MIXES)
            .filter(move |bit| self.0 & (1 << bit) != 0)
            .map(|bit| bit + 1)
    }
}

/// Shared table of track slots 1..=6.
#[derive(Debug, Clone, Default)]
pub struct AudioTrackTable {
    slots: Arc<RwLock<[Option<AudioTrack>; MAX_AUDIO_MIXES]>>,
}

impl AudioTrackTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `track` at 1-based `index`, replacing any previous one.
    pub fn set_at_index(&self, track: AudioTrack, index: usize) -> AudioResult<()> {
        let slot = Self::slot(index)?;
        debug!(index, name = %track.name, bitrate = track.bitrate_kbps, "Audio track set");
        self.slots.write()[slot] = Some(track);
        Ok(())
    }

    /// Track at 1-based `index`.
    pub fn at_index(&self, index: usize) -> AudioResult<Option<AudioTrack>> {
        let slot = Self::slot(index)?;
        Ok(self.slots.read()[slot].clone())
    }

    /// Empty the slot at 1-based `index`.
    pub fn clear_index(&self, index: usize) -> AudioResult<()> {
        let slot = Self::slot(index)?;
        self.slots.write()[slot] = None;
        Ok(())
    }

    /// Tracks selected by `mask`; every selected slot must be filled.
    pub fn select(&self, mask: MixerMask) -> AudioResult<Vec<(usize, AudioTrack)>> {
        mask.validate()?;
        let slots = self.slots.read();
        mask.indices()
            .map(|index| {
                slots[index - 1]
                    .clone()
                    .map(|track| (index, track))
                    .ok_or(AudioError::MissingTrack(index))
            })
            .collect()
    }

    fn slot(index: usize) -> AudioResult<usize> {
        if index == 0 || index > MAX_AUDIO_MIXES {
            return Err(AudioError::IndexOutOfRange(index));
        }
        Ok(index - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip() {
        let table = AudioTrackTable::new();
        let track = AudioTrack::new(160, "track1").unwrap();
        table.set_at_index(track.clone(), 1).unwrap();
        assert_eq!(table.at_index(1).unwrap(), Some(track));
        assert_eq!(table.at_index(2).unwrap(), None);
    }

    #[test]
    fn index_bounds_are_one_based() {
        let table = AudioTrackTable::new();
        let track = AudioTrack::new(128, "t").unwrap();
        assert!(matches!(
            table.set_at_index(track.clone(), 0),
            Err(AudioError::IndexOutOfRange(0))
        ));
        assert!(table.set_at_index(track, 7).is_err());
    }

    #[test]
    fn mixer_mask_selects_filled_slots() {
        let table = AudioTrackTable::new();
        table
            .set_at_index(AudioTrack::new(160, "one").unwrap(), 1)
            .unwrap();
        table
            .set_at_index(AudioTrack::new(96, "three").unwrap(), 3)
            .unwrap();

        let picked = table.select(MixerMask(0b101)).unwrap();
        let indices: Vec<_> = picked.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 3]);

        assert!(matches!(
            table.select(MixerMask(0b111)),
            Err(AudioError::MissingTrack(2))
        ));
    }

    #[test]
    fn mixer_mask_bounds() {
        assert!(MixerMask(0).validate().is_err());
        assert!(MixerMask(1 << 6).validate().is_err());
        assert!(MixerMask(0b11_1111).validate().is_ok());
    }

    #[test]
    fn zero_bitrate_rejected() {
        assert!(AudioTrack::new(0, "silent").is_err());
    }
}
