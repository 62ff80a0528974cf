//! Video and audio encoder handles.

use std::sync::Arc;

use tracing::info;

use crate::binding::{Binding, BindingLease};
use crate::{AudioEncoderConfig, EncoderError, EncoderResult, VideoEncoderConfig};

/// Video encoder type identifiers accepted by [`create_video_encoder`].
pub const VIDEO_ENCODER_TYPES: &[&str] = &[
    "obs_x264",
    "x264",
    "x264_lowcpu",
    "ffmpeg_nvenc",
    "jim_nvenc",
    "jim_hevc_nvenc",
    "obs_qsv11",
    "h264_texture_amf",
    "h265_texture_amf",
    "com.apple.videotoolbox.videoencoder.h264",
    "com.apple.videotoolbox.videoencoder.h264.gva",
    "com.apple.videotoolbox.videoencoder.ave.avc",
];

/// Audio encoder type identifiers accepted by [`create_audio_encoder`].
pub const AUDIO_ENCODER_TYPES: &[&str] = &["ffmpeg_aac", "CoreAudio_AAC", "ffmpeg_opus"];

/// Shared handle to a video encoder.
#[derive(Clone)]
pub struct VideoEncoder {
    inner: Arc<Binding<VideoEncoderConfig>>,
}

/// Shared handle to an audio encoder.
#[derive(Clone)]
pub struct AudioEncoder {
    inner: Arc<Binding<AudioEncoderConfig>>,
}

/// Create a video encoder from a type identifier and an instance name.
pub fn create_video_encoder(
    type_id: &str,
    name: &str,
    config: VideoEncoderConfig,
) -> EncoderResult<VideoEncoder> {
    if !VIDEO_ENCODER_TYPES.contains(&type_id) {
        return Err(EncoderError::UnknownType(type_id.to_string()));
    }
    if config.bitrate_kbps == 0 {
        return Err(EncoderError::InvalidSetting("video bitrate must be > 0".into()));
    }
    let inner = Arc::new(Binding::new(type_id, name, config)?);
    info!(type_id, name, "Video encoder created");
    Ok(VideoEncoder { inner })
}

/// Create an audio encoder from a type identifier and an instance name.
pub fn create_audio_encoder(
    type_id: &str,
    name: &str,
    config: AudioEncoderConfig,
) -> EncoderResult<AudioEncoder> {
    if !AUDIO_ENCODER_TYPES.contains(&type_id) {
        return Err(EncoderError::UnknownType(type_id.to_string()));
    }
    if config.bitrate_kbps == 0 || config.channels == 0 || config.sample_rate == 0 {
        return Err(EncoderError::InvalidSetting(
            "audio bitrate, channels and sample rate must be > 0".into(),
        ));
    }
    let inner = Arc::new(Binding::new(type_id, name, config)?);
    info!(type_id, name, "Audio encoder created");
    Ok(AudioEncoder { inner })
}

macro_rules! binding_accessors {
    ($handle:ident, $config:ty) => {
        impl $handle {
            /// Type identifier the encoder was created with.
            pub fn type_id(&self) -> &str {
                &self.inner.type_id
            }

            /// Instance name.
            pub fn name(&self) -> &str {
                &self.inner.name
            }

            /// Current settings.
            pub fn config(&self) -> $config {
                self.inner.config()
            }

            /// Replace the settings. Refused while any output is running on
            /// this encoder.
            pub fn update(&self, config: $config) -> EncoderResult<()> {
                self.inner.update(config)
            }

            /// Hold the encoder for a running output.
            pub fn lease(&self) -> BindingLease {
                self.inner.lease()
            }

            /// Number of running outputs using the encoder.
            pub fn active_outputs(&self) -> usize {
                self.inner.active_outputs()
            }

            /// Number of handles alive, including this one.
            pub fn holders(&self) -> usize {
                Arc::strong_count(&self.inner)
            }

            /// Whether two handles refer to the same encoder.
            pub fn same_as(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.inner, &other.inner)
            }
        }

        impl std::fmt::Debug for $handle {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("type_id", &self.inner.type_id)
                    .field("name", &self.inner.name)
                    .finish()
            }
        }
    };
}

binding_accessors!(VideoEncoder, VideoEncoderConfig);
binding_accessors!(AudioEncoder, AudioEncoderConfig);

impl VideoEncoder {
    /// Check if the encoder runs on dedicated hardware.
    pub fn is_hardware_accelerated(&self) -> bool {
        !matches!(self.type_id(), "obs_x264" | "x264" | "x264_lowcpu")
    }
}

impl AudioEncoder {
    /// The default AAC encoder.
    pub fn default_aac() -> EncoderResult<Self> {
        create_audio_encoder("ffmpeg_aac", "audio-encoder", AudioEncoderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_known_types_only() {
        assert!(create_video_encoder("obs_x264", "video-encoder", Default::default()).is_ok());
        assert!(matches!(
            create_video_encoder("h266_magic", "video-encoder", Default::default()),
            Err(EncoderError::UnknownType(_))
        ));
        assert!(matches!(
            create_video_encoder("obs_x264", "  ", Default::default()),
            Err(EncoderError::EmptyName)
        ));
    }

    #[test]
    fn shared_handles_outlive_each_other() {
        let encoder = create_video_encoder("obs_x264", "shared", Default::default()).unwrap();
        let other = encoder.clone();
        assert_eq!(encoder.holders(), 2);
        drop(encoder);
        assert_eq!(other.holders(), 1);
        assert_eq!(other.name(), "shared");
    }

    #[test]
    fn settings_frozen_while_leased() {
        let encoder = create_video_encoder("jim_nvenc", "nv", Default::default()).unwrap();
        assert!(encoder.is_hardware_accelerated());

        let lease = encoder.lease();
        let faster = VideoEncoderConfig {
            bitrate_kbps: 6000,
            ..Default::default()
        };
        assert!(matches!(
            encoder.update(faster.clone()),
            Err(EncoderError::InUse { outputs: 1, .. })
        ));

        drop(lease);
        encoder.update(faster).unwrap();
        assert_eq!(encoder.config().bitrate_kbps, 6000);
    }

    #[test]
    fn default_aac_matches_documented_settings() {
        let aac = AudioEncoder::default_aac().unwrap();
        assert_eq!(aac.type_id(), "ffmpeg_aac");
        assert_eq!(aac.config().bitrate_kbps, 160);
        assert_eq!(aac.config().sample_rate, 48000);
    }
}
