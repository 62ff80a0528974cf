//! Packets flowing into sinks.

use bytes::Bytes;

/// An encoded packet ready for a sink.
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// Encoded payload.
    pub data: Bytes,

    /// Presentation timestamp in milliseconds.
    pub pts_ms: u64,

    /// Whether this is video data.
    pub is_video: bool,

    /// Whether this starts a group of pictures.
    pub is_keyframe: bool,
}

impl MediaPacket {
    /// Frame header written before the payload: pts, flags, length.
    pub(crate) fn header(&self) -> [u8; 13] {
        let mut header = [0u8; 13];
        header[..8].copy_from_slice(&self.pts_ms.to_le_bytes());
        header[8] = (self.is_video as u8) | ((self.is_keyframe as u8) << 1);
        header[9..].copy_from_slice(&(self.data.len() as u32).to_le_bytes());
        header
    }
}
