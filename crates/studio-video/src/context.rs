//! Video context handles and leases.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{VideoError, VideoResult};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Pixel format of the rendered output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoFormat {
    #[default]
    Nv12,
    I420,
    I444,
    P010,
    Rgba,
}

impl VideoFormat {
    /// Short name, as used in filename templates.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nv12 => "NV12",
            Self::I420 => "I420",
            Self::I444 => "I444",
            Self::P010 => "P010",
            Self::Rgba => "RGBA",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Cs601,
    #[default]
    Cs709,
    Srgb,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorRange {
    #[default]
    Partial,
    Full,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleType {
    Point,
    Bilinear,
    #[default]
    Bicubic,
    Lanczos,
    Area,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FpsType {
    #[default]
    Common,
    Integer,
    Fractional,
}

/// Geometry and timing of a video context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub fps_num: u32,
    pub fps_den: u32,
    pub base_width: u32,
    pub base_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub output_format: VideoFormat,
    pub colorspace: ColorSpace,
    pub range: ColorRange,
    pub scale_type: ScaleType,
    pub fps_type: FpsType,
}

impl Default for VideoInfo {
    fn default() -> Self {
        Self {
            fps_num: 30,
            fps_den: 1,
            base_width: 1920,
            base_height: 1080,
            output_width: 1280,
            output_height: 720,
            output_format: VideoFormat::Nv12,
            colorspace: ColorSpace::Cs709,
            range: ColorRange::Partial,
            scale_type: ScaleType::Bicubic,
            fps_type: FpsType::Common,
        }
    }
}

impl VideoInfo {
    /// Check that resolutions and frame rate are usable.
    pub fn validate(&self) -> VideoResult<()> {
        for (width, height) in [
            (self.base_width, self.base_height),
            (self.output_width, self.output_height),
        ] {
            if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
                return Err(VideoError::InvalidResolution { width, height });
            }
        }
        if self.fps_num == 0 || self.fps_den == 0 {
            return Err(VideoError::InvalidFrameRate {
                num: self.fps_num,
                den: self.fps_den,
            });
        }
        Ok(())
    }

    /// Frames per second as a float.
    pub fn fps(&self) -> f64 {
        self.fps_num as f64 / self.fps_den as f64
    }
}

struct ContextInner {
    id: u64,
    info: RwLock<VideoInfo>,
    leases: AtomicUsize,
    encoded_frames: AtomicU64,
    skipped_frames: AtomicU64,
}

/// Shared handle to a video context.
///
/// Clones refer to the same context. Any number of outputs may read it;
/// geometry changes are refused while a [`VideoLease`] is alive.
#[derive(Clone)]
pub struct VideoContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for VideoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoContext")
            .field("id", &self.inner.id)
            .field("leases", &self.active_outputs())
            .finish()
    }
}

impl PartialEq for VideoContext {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl VideoContext {
    /// Create a context with the given settings.
    pub fn new(info: VideoInfo) -> VideoResult<Self> {
        info.validate()?;
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            id,
            base = %format!("{}x{}", info.base_width, info.base_height),
            output = %format!("{}x{}", info.output_width, info.output_height),
            "Video context created"
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                id,
                info: RwLock::new(info),
                leases: AtomicUsize::new(0),
                encoded_frames: AtomicU64::new(0),
                skipped_frames: AtomicU64::new(0),
            }),
        })
    }

    /// Identifier of this context.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current settings.
    pub fn info(&self) -> VideoInfo {
        self.inner.info.read().clone()
    }

    /// Replace the settings. Refused while any output holds a lease.
    pub fn set_info(&self, info: VideoInfo) -> VideoResult<()> {
        info.validate()?;
        let mut current = self.inner.info.write();
        let outputs = self.inner.leases.load(Ordering::SeqCst);
        if outputs > 0 {
            return Err(VideoError::ContextInUse {
                id: self.inner.id,
                outputs,
            });
        }
        *current = info;
        debug!(id = self.inner.id, "Video context updated");
        Ok(())
    }

    /// Attach an output; geometry is frozen until the lease drops.
    pub fn lease(&self) -> VideoLease {
        let _guard = self.inner.info.read();
        self.inner.leases.fetch_add(1, Ordering::SeqCst);
        VideoLease {
            context: self.clone(),
        }
    }

    /// Number of outputs currently attached.
    pub fn active_outputs(&self) -> usize {
        self.inner.leases.load(Ordering::SeqCst)
    }

    /// Frames handed to an output.
    pub fn encoded_frames(&self) -> u64 {
        self.inner.encoded_frames.load(Ordering::Relaxed)
    }

    /// Frames an output failed to take.
    pub fn skipped_frames(&self) -> u64 {
        self.inner.skipped_frames.load(Ordering::Relaxed)
    }

    /// Release this handle. Refused while outputs are attached.
    pub fn destroy(self) -> VideoResult<()> {
        let outputs = self.active_outputs();
        if outputs > 0 {
            return Err(VideoError::ContextInUse {
                id: self.inner.id,
                outputs,
            });
        }
        debug!(id = self.inner.id, "Video context handle released");
        Ok(())
    }
}

/// An output's attachment to a video context.
#[derive(Debug)]
pub struct VideoLease {
    context: VideoContext,
}

impl VideoLease {
    /// The leased context.
    pub fn context(&self) -> &VideoContext {
        &self.context
    }

    /// Record a frame delivered to the output.
    pub fn record_encoded(&self) {
        self.context
            .inner
            .encoded_frames
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame the output could not take.
    pub fn record_skipped(&self) {
        self.context
            .inner
            .skipped_frames
            .fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for VideoLease {
    fn drop(&mut self) {
        self.context.inner.leases.fetch_sub(1, Ordering::SeqCst);
    }
}
