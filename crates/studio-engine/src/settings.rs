//! Per-kind output settings.
//!
//! Every kind has a plain settings struct whose `Default` carries the
//! documented defaults. Encoder, service and video bindings and links
//! between outputs are not settings; they are set on the coordinator.

use serde::{Deserialize, Serialize};
use studio_audio::{MixerMask, MAX_AUDIO_MIXES};
use studio_ipc::{OutputKind, RecordingFormat, RecordingQuality};
use studio_transport::{parse_muxer_settings, FileNaming, DEFAULT_FILENAME_FORMAT};

use crate::{EngineError, EngineResult};

/// Where and how a file-producing output names its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    /// Target directory. Must exist when the output starts.
    pub path: String,
    pub format: RecordingFormat,
    /// Filename template, see [`studio_transport::expand_filename_template`].
    pub file_format: String,
    pub overwrite: bool,
    /// Replace spaces in generated filenames with underscores.
    pub no_space: bool,
    /// Space separated `key=value` pairs handed to the muxer.
    pub muxer_settings: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            format: RecordingFormat::Mp4,
            file_format: DEFAULT_FILENAME_FORMAT.to_string(),
            overwrite: false,
            no_space: false,
            muxer_settings: String::new(),
        }
    }
}

impl FileSettings {
    pub(crate) fn naming(&self, prefix: &str, suffix: &str) -> FileNaming {
        FileNaming {
            directory: self.path.clone().into(),
            template: self.file_format.clone(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            format: self.format,
            overwrite: self.overwrite,
            no_space: self.no_space,
        }
    }

    fn validate(&self) -> EngineResult<()> {
        if self.file_format.trim().is_empty() {
            return Err(EngineError::InvalidSetting(
                "file format must not be empty".into(),
            ));
        }
        parse_muxer_settings(&self.muxer_settings)?;
        Ok(())
    }
}

/// Output rescaling target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rescale {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for Rescale {
    fn default() -> Self {
        Self {
            enabled: false,
            width: 1280,
            height: 720,
        }
    }
}

impl Rescale {
    fn validate(&self) -> EngineResult<()> {
        if self.enabled
            && (self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0)
        {
            return Err(EngineError::InvalidSetting(format!(
                "rescale target {}x{} must be even and non-zero",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Delay applied to a stream before packets leave the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamDelay {
    pub enabled: bool,
    pub seconds: u32,
    /// Send what is still delayed when the stream stops.
    pub preserve_end: bool,
}

impl Default for StreamDelay {
    fn default() -> Self {
        Self {
            enabled: false,
            seconds: 20,
            preserve_end: true,
        }
    }
}

impl StreamDelay {
    /// Effective delay, zero when disabled.
    pub fn delay_ms(&self) -> u64 {
        if self.enabled {
            u64::from(self.seconds) * 1000
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleRecordingSettings {
    #[serde(flatten)]
    pub file: FileSettings,
    /// `Stream` reuses the linked streaming output's encoders.
    pub quality: RecordingQuality,
    pub low_cpu: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedRecordingSettings {
    #[serde(flatten)]
    pub file: FileSettings,
    /// Bitmask over audio track slots; bit 0 is track 1.
    pub mixer: u32,
    pub rescale: Rescale,
    /// Take the video encoder from the linked streaming output.
    pub use_stream_encoders: bool,
}

impl Default for AdvancedRecordingSettings {
    fn default() -> Self {
        Self {
            file: FileSettings::default(),
            mixer: 1,
            rescale: Rescale::default(),
            use_stream_encoders: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleStreamingSettings {
    pub delay: StreamDelay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedStreamingSettings {
    pub delay: StreamDelay,
    /// Audio track slot, 1-based.
    pub audio_track: usize,
    pub rescale: Rescale,
}

impl Default for AdvancedStreamingSettings {
    fn default() -> Self {
        Self {
            delay: StreamDelay::default(),
            audio_track: 1,
            rescale: Rescale::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayBufferSettings {
    #[serde(flatten)]
    pub file: FileSettings,
    /// Seconds of media kept.
    pub duration: u32,
    /// Memory cap for the window, in megabytes.
    pub max_size_mb: u32,
    pub prefix: String,
    pub suffix: String,
    /// Resolve encoders from the streaming output linked to the recording.
    pub uses_stream: bool,
}

impl Default for ReplayBufferSettings {
    fn default() -> Self {
        Self {
            file: FileSettings::default(),
            duration: 20,
            max_size_mb: 512,
            prefix: "Replay".to_string(),
            suffix: String::new(),
            uses_stream: false,
        }
    }
}

impl ReplayBufferSettings {
    fn validate(&self) -> EngineResult<()> {
        if self.duration == 0 {
            return Err(EngineError::InvalidSetting(
                "replay duration must be at least one second".into(),
            ));
        }
        if self.max_size_mb == 0 {
            return Err(EngineError::InvalidSetting(
                "replay size cap must be at least 1 MB".into(),
            ));
        }
        self.file.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedReplayBufferSettings {
    #[serde(flatten)]
    pub replay: ReplayBufferSettings,
    pub mixer: u32,
}

impl Default for AdvancedReplayBufferSettings {
    fn default() -> Self {
        Self {
            replay: ReplayBufferSettings::default(),
            mixer: 1,
        }
    }
}

/// Settings of one output, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputSettings {
    SimpleRecording(SimpleRecordingSettings),
    AdvancedRecording(AdvancedRecordingSettings),
    SimpleStreaming(SimpleStreamingSettings),
    AdvancedStreaming(AdvancedStreamingSettings),
    SimpleReplayBuffer(ReplayBufferSettings),
    AdvancedReplayBuffer(AdvancedReplayBufferSettings),
}

impl OutputSettings {
    /// Defaults for `kind`.
    pub fn for_kind(kind: OutputKind) -> Self {
        match kind {
            OutputKind::SimpleRecording => Self::SimpleRecording(Default::default()),
            OutputKind::AdvancedRecording => Self::AdvancedRecording(Default::default()),
            OutputKind::SimpleStreaming => Self::SimpleStreaming(Default::default()),
            OutputKind::AdvancedStreaming => Self::AdvancedStreaming(Default::default()),
            OutputKind::SimpleReplayBuffer => Self::SimpleReplayBuffer(Default::default()),
            OutputKind::AdvancedReplayBuffer => Self::AdvancedReplayBuffer(Default::default()),
        }
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            Self::SimpleRecording(_) => OutputKind::SimpleRecording,
            Self::AdvancedRecording(_) => OutputKind::AdvancedRecording,
            Self::SimpleStreaming(_) => OutputKind::SimpleStreaming,
            Self::AdvancedStreaming(_) => OutputKind::AdvancedStreaming,
            Self::SimpleReplayBuffer(_) => OutputKind::SimpleReplayBuffer,
            Self::AdvancedReplayBuffer(_) => OutputKind::AdvancedReplayBuffer,
        }
    }

    /// File settings of recordings and replay buffers.
    pub fn file(&self) -> Option<&FileSettings> {
        match self {
            Self::SimpleRecording(s) => Some(&s.file),
            Self::AdvancedRecording(s) => Some(&s.file),
            Self::SimpleReplayBuffer(s) => Some(&s.file),
            Self::AdvancedReplayBuffer(s) => Some(&s.replay.file),
            Self::SimpleStreaming(_) | Self::AdvancedStreaming(_) => None,
        }
    }

    pub fn file_mut(&mut self) -> Option<&mut FileSettings> {
        match self {
            Self::SimpleRecording(s) => Some(&mut s.file),
            Self::AdvancedRecording(s) => Some(&mut s.file),
            Self::SimpleReplayBuffer(s) => Some(&mut s.file),
            Self::AdvancedReplayBuffer(s) => Some(&mut s.replay.file),
            Self::SimpleStreaming(_) | Self::AdvancedStreaming(_) => None,
        }
    }

    /// Replay window settings of either replay buffer flavour.
    pub fn replay(&self) -> Option<&ReplayBufferSettings> {
        match self {
            Self::SimpleReplayBuffer(s) => Some(s),
            Self::AdvancedReplayBuffer(s) => Some(&s.replay),
            _ => None,
        }
    }

    pub fn replay_mut(&mut self) -> Option<&mut ReplayBufferSettings> {
        match self {
            Self::SimpleReplayBuffer(s) => Some(s),
            Self::AdvancedReplayBuffer(s) => Some(&mut s.replay),
            _ => None,
        }
    }

    /// Stream delay of either streaming flavour.
    pub fn delay(&self) -> Option<&StreamDelay> {
        match self {
            Self::SimpleStreaming(s) => Some(&s.delay),
            Self::AdvancedStreaming(s) => Some(&s.delay),
            _ => None,
        }
    }

    /// Rescaling target of the advanced recording and streaming kinds.
    pub fn rescale(&self) -> Option<&Rescale> {
        match self {
            Self::AdvancedRecording(s) => Some(&s.rescale),
            Self::AdvancedStreaming(s) => Some(&s.rescale),
            _ => None,
        }
    }

    /// Track selection of the advanced recording and replay buffer kinds.
    pub fn mixer(&self) -> Option<MixerMask> {
        match self {
            Self::AdvancedRecording(s) => Some(MixerMask(s.mixer)),
            Self::AdvancedReplayBuffer(s) => Some(MixerMask(s.mixer)),
            _ => None,
        }
    }

    /// Check every value is in range.
    pub fn validate(&self) -> EngineResult<()> {
        if let Some(mask) = self.mixer() {
            mask.validate()?;
        }
        if let Some(rescale) = self.rescale() {
            rescale.validate()?;
        }
        match self {
            Self::SimpleRecording(s) => s.file.validate(),
            Self::AdvancedRecording(s) => s.file.validate(),
            Self::SimpleReplayBuffer(s) => s.validate(),
            Self::AdvancedReplayBuffer(s) => s.replay.validate(),
            Self::AdvancedStreaming(s) if s.audio_track == 0 || s.audio_track > MAX_AUDIO_MIXES => {
                Err(EngineError::InvalidSetting(format!(
                    "audio track {} is outside 1..={}",
                    s.audio_track, MAX_AUDIO_MIXES
                )))
            }
            Self::SimpleStreaming(_) | Self::AdvancedStreaming(_) => Ok(()),
        }
    }
}
