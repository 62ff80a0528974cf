//! Construction of sinks for workers.

use studio_transport::{FileNaming, FileSink, Sink, StreamEndpoint, StreamSink};
use studio_video::VideoInfo;

use crate::StreamDelay;

/// Builds the sinks a worker writes to.
///
/// Swap it out with [`Coordinator::with_sinks`](crate::Coordinator::with_sinks)
/// to route outputs somewhere other than the filesystem and the network.
pub trait SinkProvider: Send + Sync {
    /// Sink for a recording, or for one replay buffer save.
    fn file_sink(
        &self,
        naming: FileNaming,
        muxer_settings: Vec<(String, String)>,
        video: VideoInfo,
    ) -> Box<dyn Sink>;

    /// Sink for a stream.
    fn stream_sink(&self, endpoint: StreamEndpoint, delay: &StreamDelay) -> Box<dyn Sink>;
}

/// Files on disk and TCP endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSinks;

impl SinkProvider for DefaultSinks {
    fn file_sink(
        &self,
        naming: FileNaming,
        muxer_settings: Vec<(String, String)>,
        video: VideoInfo,
    ) -> Box<dyn Sink> {
        Box::new(FileSink::new(naming, muxer_settings, Some(video)))
    }

    fn stream_sink(&self, endpoint: StreamEndpoint, delay: &StreamDelay) -> Box<dyn Sink> {
        Box::new(StreamSink::new(endpoint, delay.delay_ms(), delay.preserve_end))
    }
}
