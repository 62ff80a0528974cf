//! Output lifecycle coordinator.
//!
//! The [`Coordinator`] owns every live output, validates transition requests
//! against each output's state and hands accepted requests to a per-output
//! worker thread. Workers bring pipelines up and down and report progress on
//! the [`SignalBus`](studio_ipc::SignalBus) passed in at construction.

mod config;
mod coordinator;
mod error;
mod metrics;
mod registry;
mod resolve;
mod resources;
mod settings;
mod sinks;
mod worker;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use error::EngineError;
pub use metrics::MetricsCollector;
pub use settings::{
    AdvancedRecordingSettings, AdvancedReplayBufferSettings, AdvancedStreamingSettings,
    FileSettings, OutputSettings, ReplayBufferSettings, Rescale, SimpleRecordingSettings,
    SimpleStreamingSettings, StreamDelay,
};
pub use sinks::{DefaultSinks, SinkProvider};

/// Result type for coordinator operations.
pub type EngineResult<T> = Result<T, EngineError>;
