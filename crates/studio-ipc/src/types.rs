//! Common types used across signals and settings.

use serde::{Deserialize, Serialize};

/// Generation-checked handle to an output in the coordinator's registry.
///
/// A handle stays valid only as long as the slot it points to has not been
/// reused, so links between outputs can never reach a destroyed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputId {
    /// Slot index in the registry.
    pub index: u32,

    /// Generation of the slot when the handle was issued.
    pub generation: u32,
}

impl OutputId {
    /// Create a handle from its parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl std::fmt::Display for OutputId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "output#{}v{}", self.index, self.generation)
    }
}

/// The family an output belongs to, as reported on every signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputType {
    /// Network stream.
    Streaming,

    /// File recording.
    Recording,

    /// Rolling in-memory window saved on demand.
    ReplayBuffer,
}

impl OutputType {
    /// Returns the wire name of this output type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Recording => "recording",
            Self::ReplayBuffer => "replay-buffer",
        }
    }
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete kind of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    SimpleRecording,
    AdvancedRecording,
    SimpleStreaming,
    AdvancedStreaming,
    SimpleReplayBuffer,
    AdvancedReplayBuffer,
}

impl OutputKind {
    /// All kinds, in declaration order.
    pub const ALL: [OutputKind; 6] = [
        Self::SimpleRecording,
        Self::AdvancedRecording,
        Self::SimpleStreaming,
        Self::AdvancedStreaming,
        Self::SimpleReplayBuffer,
        Self::AdvancedReplayBuffer,
    ];

    /// Returns the family this kind reports signals under.
    pub fn output_type(self) -> OutputType {
        match self {
            Self::SimpleRecording | Self::AdvancedRecording => OutputType::Recording,
            Self::SimpleStreaming | Self::AdvancedStreaming => OutputType::Streaming,
            Self::SimpleReplayBuffer | Self::AdvancedReplayBuffer => OutputType::ReplayBuffer,
        }
    }

    /// Returns true for the advanced flavour.
    pub fn is_advanced(self) -> bool {
        matches!(
            self,
            Self::AdvancedRecording | Self::AdvancedStreaming | Self::AdvancedReplayBuffer
        )
    }

    /// Returns the display name for this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::SimpleRecording => "simple recording",
            Self::AdvancedRecording => "advanced recording",
            Self::SimpleStreaming => "simple streaming",
            Self::AdvancedStreaming => "advanced streaming",
            Self::SimpleReplayBuffer => "simple replay buffer",
            Self::AdvancedReplayBuffer => "advanced replay buffer",
        }
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Container format written by recordings and replay buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordingFormat {
    #[default]
    Mp4,
    Flv,
    Mov,
    Mkv,
    Ts,
    M3u8,
}

impl RecordingFormat {
    /// File extension, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Flv => "flv",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
            Self::Ts => "ts",
            Self::M3u8 => "m3u8",
        }
    }
}

/// Quality preset of a simple recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordingQuality {
    /// Reuse the encoders of the linked streaming output.
    #[default]
    Stream,

    /// High quality, medium file size.
    HighQuality,

    /// Indistinguishable quality, large file size.
    HigherQuality,

    /// Lossless quality, tremendously large file size.
    Lossless,
}

impl RecordingQuality {
    /// Returns true when the recording borrows the stream's encoders.
    pub fn uses_stream_encoders(self) -> bool {
        matches!(self, Self::Stream)
    }
}

/// Per-output counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputStats {
    /// Frames accepted by the sink or the replay window.
    pub frames_written: u64,

    /// Payload bytes accepted by the sink or the replay window.
    pub bytes_written: u64,

    /// Frames the sink refused.
    pub dropped_frames: u64,

    /// Average frames per second since the output became active.
    pub fps: f32,

    /// Seconds since the output became active.
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_their_family() {
        assert_eq!(OutputKind::SimpleRecording.output_type(), OutputType::Recording);
        assert_eq!(OutputKind::AdvancedStreaming.output_type(), OutputType::Streaming);
        assert_eq!(
            OutputKind::AdvancedReplayBuffer.output_type(),
            OutputType::ReplayBuffer
        );
        assert_eq!(OutputKind::ALL.iter().filter(|k| k.is_advanced()).count(), 3);
    }

    #[test]
    fn format_defaults_to_mp4() {
        assert_eq!(RecordingFormat::default(), RecordingFormat::Mp4);
        assert_eq!(RecordingFormat::Mov.extension(), "mov");
    }

    #[test]
    fn output_id_serializes_as_struct() {
        let id = OutputId::new(3, 7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#"{"index":3,"generation":7}"#);
        assert_eq!(id.to_string(), "output#3v7");
    }
}
