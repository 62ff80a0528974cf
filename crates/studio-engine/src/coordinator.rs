//! The output lifecycle coordinator.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use studio_audio::AudioTrackTable;
use studio_encoder::{AudioEncoder, Service, VideoEncoder};
use studio_ipc::{
    OutputCommand, OutputId, OutputKind, OutputState, OutputStats, OutputType, SignalBus,
    SignalFilter, SignalReceiver,
};
use studio_video::{VideoContext, VideoError};
use tracing::{debug, info, instrument};

use crate::registry::Registry;
use crate::resolve::{plan_start, Bindings, ConfigLookup, OutputConfig};
use crate::worker::{OutputCell, WorkerCommand, WorkerHandle};
use crate::{
    CoordinatorConfig, DefaultSinks, EngineError, EngineResult, OutputSettings, SinkProvider,
};

struct OutputEntry {
    config: OutputConfig,
    cell: Arc<OutputCell>,
    worker: WorkerHandle,
}

impl ConfigLookup for Registry<OutputEntry> {
    fn config(&self, id: OutputId) -> Option<&OutputConfig> {
        self.get(id).map(|entry| &entry.config)
    }
}

/// Owns every live output and drives its transitions.
///
/// `start`, `stop`, `force_stop`, `save` and `split` validate the request, move the
/// output's state and return; progress is reported on the bus passed to the
/// constructor. A request the current state does not allow fails with
/// [`EngineError::InvalidTransition`]. Linked outputs are never started or
/// stopped on each other's behalf.
pub struct Coordinator {
    bus: SignalBus,
    config: CoordinatorConfig,
    sinks: Arc<dyn SinkProvider>,
    tracks: AudioTrackTable,
    outputs: Mutex<Registry<OutputEntry>>,
}

impl Coordinator {
    /// Create a coordinator publishing on `bus`.
    pub fn new(bus: SignalBus) -> Self {
        Self::with_config(bus, CoordinatorConfig::default())
    }

    pub fn with_config(bus: SignalBus, config: CoordinatorConfig) -> Self {
        Self::with_sinks(bus, config, Arc::new(DefaultSinks))
    }

    /// Create a coordinator whose outputs write through `sinks`.
    pub fn with_sinks(
        bus: SignalBus,
        config: CoordinatorConfig,
        sinks: Arc<dyn SinkProvider>,
    ) -> Self {
        info!(?config, "Coordinator created");
        Self {
            bus,
            config,
            sinks,
            tracks: AudioTrackTable::new(),
            outputs: Mutex::new(Registry::new()),
        }
    }

    /// The bus outputs publish on.
    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    /// Audio track slots shared by every advanced output.
    pub fn audio_tracks(&self) -> &AudioTrackTable {
        &self.tracks
    }

    /// Subscribe to every output's signals.
    pub fn subscribe(&self) -> SignalReceiver {
        self.bus.subscribe()
    }

    /// Subscribe to one output's signals.
    pub fn subscribe_output(&self, id: OutputId) -> SignalReceiver {
        self.bus.subscribe_filtered(SignalFilter::Output(id))
    }

    /// Subscribe to the signals of one output family.
    pub fn subscribe_type(&self, output_type: OutputType) -> SignalReceiver {
        self.bus
            .subscribe_filtered(SignalFilter::OutputType(output_type))
    }

    /// Create an output of `kind` with default settings.
    pub fn create(&self, kind: OutputKind) -> EngineResult<OutputId> {
        self.insert(kind, None)
    }

    /// Create an output that can later be found with [`from_name`](Self::from_name).
    pub fn create_named(&self, kind: OutputKind, name: &str) -> EngineResult<OutputId> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidSetting("output name must not be empty".into()));
        }
        self.insert(kind, Some(name.to_string()))
    }

    fn insert(&self, kind: OutputKind, name: Option<String>) -> EngineResult<OutputId> {
        let mut outputs = self.outputs.lock();
        if let Some(name) = &name {
            if outputs.by_name(name).is_some() {
                return Err(EngineError::NameTaken(name.clone()));
            }
        }

        let id = outputs.next_id();
        let cell = Arc::new(OutputCell::new(id, kind));
        let worker = WorkerHandle::spawn(
            Arc::clone(&cell),
            self.bus.clone(),
            Arc::clone(&self.sinks),
            &self.config,
        )?;
        let entry = OutputEntry {
            config: OutputConfig {
                settings: OutputSettings::for_kind(kind),
                bindings: Bindings::default(),
            },
            cell,
            worker,
        };
        let id = outputs.insert(name.clone(), entry)?;
        info!(%id, %kind, name = name.as_deref().unwrap_or(""), outputs = outputs.len(), "Output created");
        Ok(id)
    }

    /// Look up a named output.
    pub fn from_name(&self, name: &str) -> Option<OutputId> {
        self.outputs.lock().by_name(name)
    }

    pub fn name(&self, id: OutputId) -> EngineResult<Option<String>> {
        let outputs = self.outputs.lock();
        outputs.require(id)?;
        Ok(outputs.name_of(id).map(str::to_string))
    }

    pub fn kind(&self, id: OutputId) -> EngineResult<OutputKind> {
        Ok(self.outputs.lock().require(id)?.cell.kind)
    }

    /// Handles of every live output.
    pub fn outputs(&self) -> Vec<OutputId> {
        self.outputs.lock().iter().map(|(id, _)| id).collect()
    }

    /// Release an output. Refused unless it is idle or stopped.
    #[instrument(skip(self))]
    pub fn destroy(&self, id: OutputId) -> EngineResult<()> {
        let entry = {
            let mut outputs = self.outputs.lock();
            outputs.require(id)?.cell.begin(OutputCommand::Destroy, None)?;
            outputs.remove(id).ok_or(EngineError::UnknownOutput(id))?
        };
        drop(entry);
        info!("Output destroyed");
        Ok(())
    }

    /// Current settings of an output.
    pub fn settings(&self, id: OutputId) -> EngineResult<OutputSettings> {
        Ok(self.outputs.lock().require(id)?.config.settings.clone())
    }

    /// Change an output's settings. Refused while the output is running.
    ///
    /// `apply` runs under the coordinator's lock and must not call back into
    /// the coordinator. The result is validated before it is stored.
    #[instrument(skip(self, apply))]
    pub fn configure(
        &self,
        id: OutputId,
        apply: impl FnOnce(&mut OutputSettings),
    ) -> EngineResult<()> {
        let mut outputs = self.outputs.lock();
        let entry = outputs.require_mut(id)?;
        entry.cell.begin(OutputCommand::Configure, None)?;

        let mut next = entry.config.settings.clone();
        apply(&mut next);
        if next.kind() != entry.cell.kind {
            return Err(EngineError::KindChanged {
                expected: entry.cell.kind,
                found: next.kind(),
            });
        }
        next.validate()?;
        entry.config.settings = next;
        debug!("Settings updated");
        Ok(())
    }

    fn bind(&self, id: OutputId, apply: impl FnOnce(&mut Bindings)) -> EngineResult<()> {
        let mut outputs = self.outputs.lock();
        let entry = outputs.require_mut(id)?;
        entry.cell.begin(OutputCommand::Configure, None)?;
        apply(&mut entry.config.bindings);
        Ok(())
    }

    fn bindings(&self, id: OutputId) -> EngineResult<Bindings> {
        Ok(self.outputs.lock().require(id)?.config.bindings.clone())
    }

    /// Replace an output's video context. Refused while the context it has
    /// now is held by a running output, such as a linked stream.
    pub fn set_video_context(&self, id: OutputId, video: Option<VideoContext>) -> EngineResult<()> {
        let mut outputs = self.outputs.lock();
        let entry = outputs.require_mut(id)?;
        entry.cell.begin(OutputCommand::Configure, None)?;
        if let Some(current) = &entry.config.bindings.video {
            let attached = current.active_outputs();
            if attached > 0 && video.as_ref() != Some(current) {
                return Err(VideoError::ContextInUse {
                    id: current.id(),
                    outputs: attached,
                }
                .into());
            }
        }
        entry.config.bindings.video = video;
        Ok(())
    }

    pub fn video_context(&self, id: OutputId) -> EngineResult<Option<VideoContext>> {
        Ok(self.bindings(id)?.video)
    }

    pub fn set_video_encoder(&self, id: OutputId, encoder: Option<VideoEncoder>) -> EngineResult<()> {
        self.bind(id, |b| b.video_encoder = encoder)
    }

    pub fn video_encoder(&self, id: OutputId) -> EngineResult<Option<VideoEncoder>> {
        Ok(self.bindings(id)?.video_encoder)
    }

    pub fn set_audio_encoder(&self, id: OutputId, encoder: Option<AudioEncoder>) -> EngineResult<()> {
        self.bind(id, |b| b.audio_encoder = encoder)
    }

    pub fn audio_encoder(&self, id: OutputId) -> EngineResult<Option<AudioEncoder>> {
        Ok(self.bindings(id)?.audio_encoder)
    }

    /// Attach a streaming service. Only streaming outputs take one.
    pub fn set_service(&self, id: OutputId, service: Option<Service>) -> EngineResult<()> {
        if self.kind(id)?.output_type() != OutputType::Streaming {
            return Err(EngineError::InvalidSetting(format!(
                "{id} is not a streaming output"
            )));
        }
        self.bind(id, |b| b.service = service)
    }

    pub fn service(&self, id: OutputId) -> EngineResult<Option<Service>> {
        Ok(self.bindings(id)?.service)
    }

    /// Link a recording to a streaming output, or a replay buffer to a
    /// recording. `None` clears the link.
    ///
    /// Links only decide where encoders come from; they never start or stop
    /// the linked output.
    #[instrument(skip(self))]
    pub fn link(&self, id: OutputId, target: Option<OutputId>) -> EngineResult<()> {
        if let Some(target) = target {
            let (from, to) = {
                let outputs = self.outputs.lock();
                (outputs.require(id)?.cell.kind, outputs.require(target)?.cell.kind)
            };
            let allowed = matches!(
                (from.output_type(), to.output_type()),
                (OutputType::Recording, OutputType::Streaming)
                    | (OutputType::ReplayBuffer, OutputType::Recording)
            );
            if !allowed {
                return Err(EngineError::InvalidLink { from, to });
            }
        }
        self.bind(id, |b| b.link = target)
    }

    pub fn linked(&self, id: OutputId) -> EngineResult<Option<OutputId>> {
        Ok(self.bindings(id)?.link)
    }

    /// Start an output.
    ///
    /// Configuration problems (missing encoders, service, video context or
    /// link) are returned here. Failures while acquiring the file or endpoint
    /// are reported on the bus as a `Stop` carrying a nonzero code.
    #[instrument(skip(self))]
    pub fn start(&self, id: OutputId) -> EngineResult<()> {
        let outputs = self.outputs.lock();
        let entry = outputs.require(id)?;
        let previous = entry.cell.begin(OutputCommand::Start, Some(OutputState::Starting))?;

        let plan = match plan_start(&*outputs, &self.tracks, &self.config, id) {
            Ok(plan) => plan,
            Err(err) => {
                entry.cell.restore(previous);
                return Err(err);
            }
        };

        if let Err(err) = entry.worker.send(WorkerCommand::Start(Box::new(plan))) {
            entry.cell.restore(previous);
            return Err(err);
        }
        info!(kind = %entry.cell.kind, "Start requested");
        Ok(())
    }

    /// Stop an active output after draining buffered frames.
    pub fn stop(&self, id: OutputId) -> EngineResult<()> {
        self.request_stop(id, OutputCommand::Stop)
    }

    /// Stop an active output without draining. The signals are the same as
    /// for [`stop`](Self::stop).
    pub fn force_stop(&self, id: OutputId) -> EngineResult<()> {
        self.request_stop(id, OutputCommand::ForceStop)
    }

    #[instrument(skip(self))]
    fn request_stop(&self, id: OutputId, command: OutputCommand) -> EngineResult<()> {
        let outputs = self.outputs.lock();
        let entry = outputs.require(id)?;
        let previous = entry.cell.begin(command, Some(OutputState::Stopping))?;
        let force = command == OutputCommand::ForceStop;
        if let Err(err) = entry.worker.send(WorkerCommand::Stop { force }) {
            entry.cell.restore(previous);
            return Err(err);
        }
        info!(kind = %entry.cell.kind, force, "Stop requested");
        Ok(())
    }

    /// Write the replay window of an active replay buffer to a file.
    #[instrument(skip(self))]
    pub fn save(&self, id: OutputId) -> EngineResult<()> {
        let outputs = self.outputs.lock();
        let entry = outputs.require(id)?;
        if entry.cell.kind.output_type() != OutputType::ReplayBuffer {
            return Err(EngineError::NotAReplayBuffer(id));
        }
        entry.cell.begin(OutputCommand::Save, None)?;
        entry.worker.send(WorkerCommand::Save)
    }

    /// Close an active recording's file and continue in a new one. The
    /// closed file is reported with `Wrote`.
    #[instrument(skip(self))]
    pub fn split(&self, id: OutputId) -> EngineResult<()> {
        let outputs = self.outputs.lock();
        let entry = outputs.require(id)?;
        if entry.cell.kind.output_type() != OutputType::Recording {
            return Err(EngineError::NotARecording(id));
        }
        entry.cell.begin(OutputCommand::Split, None)?;
        entry.worker.send(WorkerCommand::Split)
    }

    /// Request a stop on every active output. Returns the outputs asked.
    pub fn stop_all(&self) -> Vec<OutputId> {
        let active: Vec<OutputId> = {
            let outputs = self.outputs.lock();
            outputs
                .iter()
                .filter(|(_, entry)| entry.cell.state().is_active())
                .map(|(id, _)| id)
                .collect()
        };
        active
            .into_iter()
            .filter(|id| self.stop(*id).is_ok())
            .collect()
    }

    pub fn state(&self, id: OutputId) -> EngineResult<OutputState> {
        Ok(self.outputs.lock().require(id)?.cell.state())
    }

    /// Last file written: a finished recording or a saved replay.
    pub fn last_file(&self, id: OutputId) -> EngineResult<Option<PathBuf>> {
        Ok(self.outputs.lock().require(id)?.cell.last_file())
    }

    /// Most recent file closed by any recording.
    pub fn last_recording(&self) -> Option<PathBuf> {
        self.latest_file(OutputType::Recording)
    }

    /// Most recent file saved by any replay buffer.
    pub fn last_replay(&self) -> Option<PathBuf> {
        self.latest_file(OutputType::ReplayBuffer)
    }

    fn latest_file(&self, output_type: OutputType) -> Option<PathBuf> {
        self.outputs
            .lock()
            .iter()
            .filter(|(_, entry)| entry.cell.kind.output_type() == output_type)
            .filter_map(|(_, entry)| entry.cell.last_written())
            .max_by_key(|(_, at)| *at)
            .map(|(path, _)| path)
    }

    pub fn stats(&self, id: OutputId) -> EngineResult<OutputStats> {
        Ok(self.outputs.lock().require(id)?.cell.metrics.snapshot())
    }

    /// Stop every running output and wait for all workers to exit.
    pub fn shutdown(&self) {
        let entries = self.outputs.lock().drain();
        if !entries.is_empty() {
            info!(outputs = entries.len(), "Shutting down outputs");
        }
        drop(entries);
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> Coordinator {
        Coordinator::new(SignalBus::new())
    }

    #[test]
    fn create_and_destroy() {
        let coordinator = coordinator();
        let id = coordinator.create(OutputKind::SimpleRecording).unwrap();
        assert_eq!(coordinator.kind(id).unwrap(), OutputKind::SimpleRecording);
        assert!(coordinator.state(id).unwrap().is_idle());

        coordinator.destroy(id).unwrap();
        assert!(matches!(
            coordinator.state(id),
            Err(EngineError::UnknownOutput(_))
        ));
        assert!(coordinator.outputs().is_empty());
    }

    #[test]
    fn named_outputs() {
        let coordinator = coordinator();
        let id = coordinator
            .create_named(OutputKind::SimpleStreaming, "main")
            .unwrap();
        assert_eq!(coordinator.from_name("main"), Some(id));
        assert_eq!(coordinator.name(id).unwrap().as_deref(), Some("main"));
        assert!(matches!(
            coordinator.create_named(OutputKind::SimpleRecording, "main"),
            Err(EngineError::NameTaken(_))
        ));
        assert!(coordinator
            .create_named(OutputKind::SimpleRecording, " ")
            .is_err());
    }

    #[test]
    fn configure_rejects_kind_change_and_bad_values() {
        let coordinator = coordinator();
        let id = coordinator.create(OutputKind::AdvancedRecording).unwrap();

        let err = coordinator
            .configure(id, |s| *s = OutputSettings::for_kind(OutputKind::SimpleStreaming))
            .unwrap_err();
        assert!(matches!(err, EngineError::KindChanged { .. }));

        let err = coordinator
            .configure(id, |s| {
                if let OutputSettings::AdvancedRecording(r) = s {
                    r.mixer = 1 << 6;
                }
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Audio(_)));
        assert_eq!(
            coordinator.settings(id).unwrap(),
            OutputSettings::for_kind(OutputKind::AdvancedRecording)
        );
    }

    #[test]
    fn links_follow_the_output_graph() {
        let coordinator = coordinator();
        let stream = coordinator.create(OutputKind::SimpleStreaming).unwrap();
        let recording = coordinator.create(OutputKind::AdvancedRecording).unwrap();
        let replay = coordinator.create(OutputKind::SimpleReplayBuffer).unwrap();

        coordinator.link(recording, Some(stream)).unwrap();
        coordinator.link(replay, Some(recording)).unwrap();
        assert_eq!(coordinator.linked(replay).unwrap(), Some(recording));

        assert!(matches!(
            coordinator.link(stream, Some(recording)),
            Err(EngineError::InvalidLink { .. })
        ));
        assert!(matches!(
            coordinator.link(replay, Some(stream)),
            Err(EngineError::InvalidLink { .. })
        ));

        coordinator.link(replay, None).unwrap();
        assert_eq!(coordinator.linked(replay).unwrap(), None);
    }

    #[test]
    fn start_without_encoders_fails_synchronously() {
        let coordinator = coordinator();
        let mut rx = coordinator.subscribe();
        let id = coordinator.create(OutputKind::SimpleStreaming).unwrap();

        assert!(matches!(
            coordinator.start(id),
            Err(EngineError::MissingVideoContext(_))
        ));
        assert!(coordinator.state(id).unwrap().is_idle());
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn stop_and_save_need_an_active_output() {
        let coordinator = coordinator();
        let recording = coordinator.create(OutputKind::SimpleRecording).unwrap();
        let replay = coordinator.create(OutputKind::SimpleReplayBuffer).unwrap();

        assert!(matches!(
            coordinator.stop(recording),
            Err(EngineError::InvalidTransition {
                command: OutputCommand::Stop,
                ..
            })
        ));
        assert!(matches!(
            coordinator.save(recording),
            Err(EngineError::NotAReplayBuffer(_))
        ));
        assert!(matches!(
            coordinator.split(replay),
            Err(EngineError::NotARecording(_))
        ));
        assert!(matches!(
            coordinator.split(recording),
            Err(EngineError::InvalidTransition {
                command: OutputCommand::Split,
                ..
            })
        ));
        assert!(matches!(
            coordinator.save(replay),
            Err(EngineError::InvalidTransition { .. })
        ));
        assert!(coordinator.stop_all().is_empty());
        assert_eq!(coordinator.last_recording(), None);
        assert_eq!(coordinator.last_replay(), None);
    }

    #[test]
    fn service_only_for_streams() {
        let coordinator = coordinator();
        let recording = coordinator.create(OutputKind::SimpleRecording).unwrap();
        let service = Service::custom("rtmp://127.0.0.1/live", "key").unwrap();
        assert!(coordinator
            .set_service(recording, Some(service.clone()))
            .is_err());

        let stream = coordinator.create(OutputKind::AdvancedStreaming).unwrap();
        coordinator.set_service(stream, Some(service)).unwrap();
        assert_eq!(
            coordinator.service(stream).unwrap().unwrap().name(),
            "default_service"
        );
    }
}
