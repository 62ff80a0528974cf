//! Shared video contexts for outputs.
//!
//! A video context describes the canvas every attached output renders from:
//! base and output resolution, frame rate and pixel format. Outputs hold a
//! [`VideoLease`] while running; geometry cannot change while any lease is
//! alive.

mod context;
mod error;
mod frame;

pub use context::{
    ColorRange, ColorSpace, FpsType, ScaleType, VideoContext, VideoFormat, VideoInfo, VideoLease,
};
pub use error::VideoError;
pub use frame::{FrameClock, FrameTimestamp};

/// Result type for video context operations.
pub type VideoResult<T> = Result<T, VideoError>;
