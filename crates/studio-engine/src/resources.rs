//! Phased acquisition and release of an output's pipeline resources.

use studio_encoder::BindingLease;
use studio_ipc::PipelinePhase;
use studio_transport::{ReplayRing, Sink, StreamEndpoint, TransportError, TransportResult};
use studio_video::{FrameClock, VideoLease};
use tracing::{debug, info, instrument};

use crate::resolve::{SinkPlan, StartPlan};
use crate::SinkProvider;

/// Resources held by a running output.
#[derive(Default)]
pub(crate) struct PipelineResources {
    pub(crate) video: Option<VideoLease>,
    pub(crate) bindings: Vec<BindingLease>,
    pub(crate) sink: Option<Box<dyn Sink>>,
    pub(crate) ring: Option<ReplayRing>,
    pub(crate) clock: Option<FrameClock>,
}

/// Brings resources up phase by phase and tears them down in reverse.
#[derive(Default)]
pub(crate) struct ResourceManager {
    resources: PipelineResources,
    current_phase: Option<PipelinePhase>,
}

impl ResourceManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquire every phase for `plan`. On failure the phases acquired so far
    /// are released before returning.
    #[instrument(name = "acquire_resources", skip_all)]
    pub(crate) fn acquire(
        &mut self,
        plan: &StartPlan,
        sinks: &dyn SinkProvider,
    ) -> TransportResult<()> {
        let mut phase = PipelinePhase::AttachVideo;
        loop {
            self.current_phase = Some(phase);
            if let Err(err) = self.acquire_phase(plan, sinks, phase) {
                self.release();
                return Err(err);
            }
            match phase.next() {
                Some(next) => phase = next,
                None => return Ok(()),
            }
        }
    }

    fn acquire_phase(
        &mut self,
        plan: &StartPlan,
        sinks: &dyn SinkProvider,
        phase: PipelinePhase,
    ) -> TransportResult<()> {
        debug!(phase = phase.name(), "Acquiring");

        match phase {
            PipelinePhase::AttachVideo => {
                self.resources.video = Some(plan.video.lease());
            }
            PipelinePhase::AcquireEncoders => {
                self.resources.bindings = plan.binding_leases();
            }
            PipelinePhase::OpenSink => match &plan.sink {
                SinkPlan::File {
                    naming,
                    muxer_settings,
                } => {
                    let mut sink =
                        sinks.file_sink(naming.clone(), muxer_settings.clone(), plan.video_info.clone());
                    sink.open()?;
                    self.resources.sink = Some(sink);
                }
                SinkPlan::Stream {
                    server,
                    key,
                    credentials,
                    delay,
                } => {
                    let mut endpoint = StreamEndpoint::parse(server, key)?;
                    if let Some((username, password)) = credentials {
                        endpoint = endpoint.with_credentials(username, password)?;
                    }
                    let mut sink = sinks.stream_sink(endpoint, delay);
                    sink.open()?;
                    self.resources.sink = Some(sink);
                }
                SinkPlan::Replay {
                    naming,
                    window_ms,
                    max_bytes,
                    ..
                } => {
                    if !naming.directory.is_dir() {
                        return Err(TransportError::BadPath(format!(
                            "'{}' is not a directory",
                            naming.directory.display()
                        )));
                    }
                    self.resources.ring = Some(ReplayRing::new(*window_ms, *max_bytes));
                }
            },
            PipelinePhase::Activate => {
                let info = &plan.video_info;
                let keyframe_secs = plan.encoders.video.config().keyframe_interval_secs;
                self.resources.clock = Some(FrameClock::new(info.fps_num, info.fps_den, keyframe_secs));
            }
        }
        Ok(())
    }

    /// Release resources from the current phase backwards.
    #[instrument(name = "release_resources", skip(self))]
    pub(crate) fn release(&mut self) {
        let mut phase = self.current_phase.take();
        while let Some(current) = phase {
            self.release_phase(current);
            phase = current.previous();
        }
    }

    fn release_phase(&mut self, phase: PipelinePhase) {
        debug!(phase = phase.name(), "Releasing");

        match phase {
            PipelinePhase::Activate => {
                self.resources.clock = None;
            }
            PipelinePhase::OpenSink => {
                if self.resources.sink.take().is_some() {
                    info!("Sink released");
                }
                self.resources.ring = None;
            }
            PipelinePhase::AcquireEncoders => {
                self.resources.bindings.clear();
            }
            PipelinePhase::AttachVideo => {
                self.resources.video = None;
            }
        }
    }

    pub(crate) fn is_acquired(&self) -> bool {
        self.current_phase == Some(PipelinePhase::Activate)
    }

    pub(crate) fn resources_mut(&mut self) -> &mut PipelineResources {
        &mut self.resources
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.release();
    }
}
