//! Shared encoder and streaming-service bindings.
//!
//! Encoders and services are opaque to the coordinator: a type identifier,
//! an instance name and settings. Handles are reference counted so several
//! outputs can share one encoder, and each running output holds a
//! [`BindingLease`] that freezes the settings until it stops.

mod binding;
mod encoders;
mod error;
mod service;

pub use binding::BindingLease;
pub use encoders::{
    create_audio_encoder, create_video_encoder, AudioEncoder, VideoEncoder,
    AUDIO_ENCODER_TYPES, VIDEO_ENCODER_TYPES,
};
pub use error::EncoderError;
pub use service::{create_service, Service, ServiceSettings, SERVICE_TYPES};

use serde::{Deserialize, Serialize};

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEncoderConfig {
    /// Target bitrate in kbps.
    pub bitrate_kbps: u32,

    /// Keyframe interval in seconds.
    pub keyframe_interval_secs: u32,
}

impl Default for VideoEncoderConfig {
    fn default() -> Self {
        Self {
            bitrate_kbps: 2500,
            keyframe_interval_secs: 2,
        }
    }
}

/// Audio encoding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEncoderConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of channels.
    pub channels: u16,

    /// Target bitrate in kbps.
    pub bitrate_kbps: u32,
}

impl Default for AudioEncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            bitrate_kbps: 160,
        }
    }
}
