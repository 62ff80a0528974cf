//! Output sinks: container files, replay window and stream endpoints.
//!
//! A [`Sink`] is where an output's packets end up. Opening a sink is the
//! resource acquisition step of a start; finalizing it is the last step of a
//! stop. Failures carry a [`StatusCode`](studio_ipc::StatusCode) through
//! [`TransportError::status_code`].

mod connection;
mod error;
mod file;
mod packet;
mod replay;
mod stream;
mod template;

pub use connection::ConnectionState;
pub use error::TransportError;
pub use file::{parse_muxer_settings, FileNaming, FileSink};
pub use packet::MediaPacket;
pub use replay::ReplayRing;
pub use stream::{StreamEndpoint, StreamSink};
pub use template::{expand_filename_template, DEFAULT_FILENAME_FORMAT};

use std::path::Path;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Connect timeout for stream endpoints, in milliseconds.
pub const CONNECT_TIMEOUT_MS: u64 = 5000;

/// Destination of an output's packets.
pub trait Sink: Send {
    /// Acquire the target. Failing here means the output never started.
    fn open(&mut self) -> TransportResult<()>;

    /// Write one packet.
    fn write(&mut self, packet: &MediaPacket) -> TransportResult<()>;

    /// Flush trailing data and release the target.
    fn finalize(&mut self) -> TransportResult<()>;

    /// Drop anything held back instead of sending it on finalize.
    fn discard_pending(&mut self) {}

    /// Path of the file being written, once opened.
    fn path(&self) -> Option<&Path> {
        None
    }

    /// Sink name for diagnostics.
    fn name(&self) -> &'static str;
}
