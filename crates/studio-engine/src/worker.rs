//! Per-output worker threads.
//!
//! Each output owns one worker. The coordinator validates a request, moves the
//! output's state and enqueues a [`WorkerCommand`]; the worker performs the
//! pipeline work and publishes the resulting signals. Requests for one output
//! are handled strictly in order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::RwLock;
use studio_ipc::{
    OutputCommand, OutputId, OutputKind, OutputSignal, OutputState, OutputType, SignalBus,
    SignalEvent,
};
use studio_transport::{MediaPacket, Sink, TransportError, TransportResult};
use tracing::{debug, error, info, instrument, warn};

use crate::resolve::{SinkPlan, StartPlan};
use crate::resources::ResourceManager;
use crate::{CoordinatorConfig, EngineError, EngineResult, MetricsCollector, SinkProvider};

/// Largest synthetic packet a worker produces.
const MAX_PACKET_BYTES: usize = 64 * 1024;

/// State of one output shared between the coordinator and its worker.
pub(crate) struct OutputCell {
    pub(crate) id: OutputId,
    pub(crate) kind: OutputKind,
    state: RwLock<OutputState>,
    last_file: RwLock<Option<(PathBuf, Instant)>>,
    pub(crate) metrics: MetricsCollector,
}

impl OutputCell {
    pub(crate) fn new(id: OutputId, kind: OutputKind) -> Self {
        Self {
            id,
            kind,
            state: RwLock::new(OutputState::Idle),
            last_file: RwLock::new(None),
            metrics: MetricsCollector::new(),
        }
    }

    pub(crate) fn state(&self) -> OutputState {
        self.state.read().clone()
    }

    /// Check `command` against the current state and, when allowed, move to
    /// `next`. Returns the state that was replaced.
    pub(crate) fn begin(
        &self,
        command: OutputCommand,
        next: Option<OutputState>,
    ) -> EngineResult<OutputState> {
        let mut state = self.state.write();
        if !state.permits(command) {
            return Err(EngineError::InvalidTransition {
                id: self.id,
                state: state.name(),
                command,
            });
        }
        let previous = state.clone();
        if let Some(next) = next {
            debug!(output = %self.id, from = previous.name(), to = next.name(), "State transition");
            *state = next;
        }
        Ok(previous)
    }

    pub(crate) fn restore(&self, state: OutputState) {
        *self.state.write() = state;
    }

    fn set_state(&self, next: OutputState) {
        let mut state = self.state.write();
        debug!(output = %self.id, from = state.name(), to = next.name(), "State transition");
        *state = next;
    }

    pub(crate) fn last_file(&self) -> Option<PathBuf> {
        self.last_file.read().as_ref().map(|(path, _)| path.clone())
    }

    /// Last file written and when it was closed.
    pub(crate) fn last_written(&self) -> Option<(PathBuf, Instant)> {
        self.last_file.read().clone()
    }

    fn set_last_file(&self, path: &Path) {
        *self.last_file.write() = Some((path.to_path_buf(), Instant::now()));
    }
}

pub(crate) enum WorkerCommand {
    Start(Box<StartPlan>),
    Stop { force: bool },
    Save,
    Split,
    Shutdown,
}

/// Coordinator-side handle to a worker thread.
pub(crate) struct WorkerHandle {
    id: OutputId,
    tx: Sender<WorkerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn spawn(
        cell: Arc<OutputCell>,
        bus: SignalBus,
        sinks: Arc<dyn SinkProvider>,
        config: &CoordinatorConfig,
    ) -> EngineResult<Self> {
        let id = cell.id;
        let (tx, rx) = crossbeam_channel::bounded(config.command_capacity.max(1));
        let worker = Worker {
            cell,
            bus,
            sinks,
            rx,
            poll: config.poll_interval(),
            max_catch_up: config.max_catch_up_frames.max(1),
            resources: ResourceManager::new(),
            plan: None,
            file: None,
            payload: Bytes::from(vec![0u8; MAX_PACKET_BYTES]),
            video_bytes: 1,
            audio_bytes: Vec::new(),
        };

        let thread = thread::Builder::new()
            .name(format!("output-{}", id.index))
            .spawn(move || worker.run())?;

        Ok(Self {
            id,
            tx,
            thread: Some(thread),
        })
    }

    pub(crate) fn send(&self, command: WorkerCommand) -> EngineResult<()> {
        self.tx.try_send(command).map_err(|err| {
            match err {
                TrySendError::Full(_) => warn!(output = %self.id, "Worker queue full"),
                TrySendError::Disconnected(_) => error!(output = %self.id, "Worker gone"),
            }
            EngineError::WorkerUnavailable(self.id)
        })
    }

    /// Ask the worker to stop whatever is running and wait for it to exit.
    pub(crate) fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.tx.send(WorkerCommand::Shutdown);
        if thread.join().is_err() {
            error!(output = %self.id, "Worker panicked");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    cell: Arc<OutputCell>,
    bus: SignalBus,
    sinks: Arc<dyn SinkProvider>,
    rx: Receiver<WorkerCommand>,
    poll: Duration,
    max_catch_up: u32,
    resources: ResourceManager,
    plan: Option<StartPlan>,
    file: Option<PathBuf>,
    payload: Bytes,
    video_bytes: usize,
    audio_bytes: Vec<usize>,
}

impl Worker {
    fn run(mut self) {
        debug!(output = %self.cell.id, kind = %self.cell.kind, "Worker started");

        loop {
            let timeout = match self.resources.resources_mut().clock.as_ref() {
                Some(clock) => clock.until_next().min(self.poll),
                None => self.poll,
            };

            match self.rx.recv_timeout(timeout) {
                Ok(WorkerCommand::Start(plan)) => self.start(*plan),
                Ok(WorkerCommand::Stop { force }) => self.stop(force),
                Ok(WorkerCommand::Save) => self.save(),
                Ok(WorkerCommand::Split) => self.split(),
                Ok(WorkerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    if self.resources.is_acquired() {
                        info!(output = %self.cell.id, "Stopping output for shutdown");
                        self.stop(false);
                    }
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            if self.resources.is_acquired() {
                if let Err(err) = self.write_due_frames() {
                    self.fail_active(err);
                }
            }
        }

        debug!(output = %self.cell.id, "Worker exited");
    }

    fn output_type(&self) -> OutputType {
        self.cell.kind.output_type()
    }

    fn emit(&self, signal: OutputSignal) {
        self.bus
            .publish(SignalEvent::ok(self.cell.id, self.output_type(), signal));
    }

    fn emit_result(&self, signal: OutputSignal, result: &TransportResult<()>) {
        let event = match result {
            Ok(()) => SignalEvent::ok(self.cell.id, self.output_type(), signal),
            Err(err) => SignalEvent::failed(
                self.cell.id,
                self.output_type(),
                signal,
                err.status_code(),
                err.to_string(),
            ),
        };
        self.bus.publish(event);
    }

    #[instrument(name = "output_start", skip_all, fields(output = %self.cell.id))]
    fn start(&mut self, plan: StartPlan) {
        let streaming = self.output_type() == OutputType::Streaming;
        if streaming {
            self.emit(OutputSignal::Starting);
        }

        if let Err(err) = self.resources.acquire(&plan, self.sinks.as_ref()) {
            error!(error = %err, "Output failed to start");
            let status = err.status_code();
            self.cell.set_state(OutputState::Stopped {
                code: status.code(),
                error: Some(err.to_string()),
            });
            self.emit_result(OutputSignal::Stop, &Err(err));
            return;
        }

        let info = &plan.video_info;
        self.video_bytes = frame_bytes(plan.encoders.video.config().bitrate_kbps, info.fps_num, info.fps_den);
        self.audio_bytes = plan
            .encoders
            .audio
            .bitrates()
            .into_iter()
            .map(|kbps| frame_bytes(kbps, info.fps_num, info.fps_den))
            .collect();
        self.file = self
            .resources
            .resources_mut()
            .sink
            .as_ref()
            .and_then(|sink| sink.path().map(Path::to_path_buf));
        self.plan = Some(plan);

        self.cell.metrics.start();
        self.cell.set_state(OutputState::Active);
        info!(file = ?self.file, "Output started");

        if streaming {
            self.emit(OutputSignal::Activate);
        }
        self.emit(OutputSignal::Start);
    }

    #[instrument(name = "output_stop", skip(self), fields(output = %self.cell.id))]
    fn stop(&mut self, force: bool) {
        if !self.resources.is_acquired() {
            debug!("Stop ignored, output already ended");
            return;
        }
        self.cell.set_state(OutputState::Stopping);
        self.emit(OutputSignal::Stopping);

        let drained = if force {
            if let Some(sink) = self.resources.resources_mut().sink.as_mut() {
                sink.discard_pending();
            }
            Ok(())
        } else {
            self.write_due_frames()
        };

        let finalized = match self.resources.resources_mut().sink.take() {
            Some(mut sink) => sink.finalize(),
            None => Ok(()),
        };
        self.finish(drained.and(finalized));
    }

    /// An active output failed without being asked to stop.
    fn fail_active(&mut self, err: TransportError) {
        warn!(output = %self.cell.id, error = %err, "Output failed while active");
        if let Some(mut sink) = self.resources.resources_mut().sink.take() {
            sink.discard_pending();
            if let Err(finalize_err) = sink.finalize() {
                debug!(error = %finalize_err, "Finalize after failure also failed");
            }
        }
        self.finish(Err(err));
    }

    fn finish(&mut self, result: TransportResult<()>) {
        self.resources.release();
        self.plan = None;
        self.cell.metrics.stop();
        let file = self.file.take();

        match &result {
            Ok(()) => {
                self.cell.set_state(OutputState::Idle);
                if self.output_type() == OutputType::Recording {
                    if let Some(path) = &file {
                        self.cell.set_last_file(path);
                    }
                }
                info!(output = %self.cell.id, "Output stopped");
            }
            Err(err) => {
                self.cell.set_state(OutputState::Stopped {
                    code: err.status_code().code(),
                    error: Some(err.to_string()),
                });
                error!(output = %self.cell.id, error = %err, "Output stopped with error");
            }
        }

        self.emit_result(OutputSignal::Stop, &result);
        match self.output_type() {
            OutputType::Recording => self.emit_result(OutputSignal::Wrote, &result),
            OutputType::Streaming => self.emit(OutputSignal::Deactivate),
            OutputType::ReplayBuffer => {}
        }
    }

    #[instrument(name = "replay_save", skip(self), fields(output = %self.cell.id))]
    fn save(&mut self) {
        let Some(StartPlan {
            sink: SinkPlan::Replay {
                naming,
                muxer_settings,
                ..
            },
            video_info,
            ..
        }) = &self.plan
        else {
            warn!("Save ignored, replay buffer is not running");
            return;
        };

        self.emit(OutputSignal::Writing);

        let packets = self
            .resources
            .resources_mut()
            .ring
            .as_ref()
            .map(|ring| ring.snapshot_from_keyframe())
            .unwrap_or_default();
        let mut sink = self
            .sinks
            .file_sink(naming.clone(), muxer_settings.clone(), video_info.clone());

        let result = write_file(sink.as_mut(), &packets);
        match (&result, sink.path()) {
            (Ok(()), Some(path)) => {
                info!(path = %path.display(), packets = packets.len(), "Replay saved");
                self.cell.set_last_file(path);
            }
            (Ok(()), None) => info!(packets = packets.len(), "Replay saved"),
            (Err(err), _) => error!(error = %err, "Replay save failed"),
        }
        self.emit_result(OutputSignal::Wrote, &result);
    }

    /// Close the current recording file and carry on in a freshly named one.
    /// A failed close is reported on its `Wrote`; failing to open the next
    /// file stops the recording.
    #[instrument(name = "recording_split", skip(self), fields(output = %self.cell.id))]
    fn split(&mut self) {
        let Some(StartPlan {
            sink: SinkPlan::File {
                naming,
                muxer_settings,
            },
            video_info,
            ..
        }) = &self.plan
        else {
            warn!("Split ignored, recording is not running");
            return;
        };
        let mut next = self
            .sinks
            .file_sink(naming.clone(), muxer_settings.clone(), video_info.clone());

        if let Err(err) = self.write_due_frames() {
            self.fail_active(err);
            return;
        }
        let closed = match self.resources.resources_mut().sink.take() {
            Some(mut sink) => sink.finalize(),
            None => Err(TransportError::NotOpen),
        };
        match (&closed, self.file.take()) {
            (Ok(()), Some(path)) => {
                info!(path = %path.display(), "Recording file closed");
                self.cell.set_last_file(&path);
            }
            (Ok(()), None) => {}
            (Err(err), _) => error!(error = %err, "Closing recording file failed"),
        }
        self.emit_result(OutputSignal::Wrote, &closed);

        if let Err(err) = next.open() {
            self.fail_active(err);
            return;
        }
        self.file = next.path().map(Path::to_path_buf);
        info!(file = ?self.file, "Recording continues");
        self.resources.resources_mut().sink = Some(next);
    }

    /// Write every frame that has come due, up to the catch-up limit.
    fn write_due_frames(&mut self) -> TransportResult<()> {
        let resources = self.resources.resources_mut();
        let Some(clock) = resources.clock.as_mut() else {
            return Ok(());
        };

        for _ in 0..self.max_catch_up {
            if !clock.is_due() {
                break;
            }
            let ts = clock.tick();
            let mut packets = Vec::with_capacity(1 + self.audio_bytes.len());
            packets.push(MediaPacket {
                data: self.payload.slice(..self.video_bytes),
                pts_ms: ts.pts_ms,
                is_video: true,
                is_keyframe: clock.is_keyframe(ts.sequence),
            });
            for &len in &self.audio_bytes {
                packets.push(MediaPacket {
                    data: self.payload.slice(..len),
                    pts_ms: ts.pts_ms,
                    is_video: false,
                    is_keyframe: false,
                });
            }
            let audio: u64 = packets[1..].iter().map(|p| p.data.len() as u64).sum();

            if let Some(ring) = resources.ring.as_mut() {
                for packet in packets {
                    ring.push(packet);
                }
            } else if let Some(sink) = resources.sink.as_mut() {
                let written = packets.iter().try_for_each(|packet| sink.write(packet));
                if let Err(err) = written {
                    self.cell.metrics.record_drop();
                    if let Some(video) = &resources.video {
                        video.record_skipped();
                    }
                    return Err(err);
                }
            }

            self.cell.metrics.record_frame(self.video_bytes as u64);
            self.cell.metrics.record_bytes(audio);
            if let Some(video) = &resources.video {
                video.record_encoded();
            }
        }
        Ok(())
    }
}

fn write_file(sink: &mut dyn Sink, packets: &[MediaPacket]) -> TransportResult<()> {
    sink.open()?;
    for packet in packets {
        sink.write(packet)?;
    }
    sink.finalize()
}

/// Bytes per frame for a stream at `kbps` and `fps_num / fps_den`.
fn frame_bytes(kbps: u32, fps_num: u32, fps_den: u32) -> usize {
    let per_second = u64::from(kbps) * 1000 / 8;
    let per_frame = per_second * u64::from(fps_den.max(1)) / u64::from(fps_num.max(1));
    (per_frame as usize).clamp(1, MAX_PACKET_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_bytes_follow_bitrate() {
        assert_eq!(frame_bytes(2400, 30, 1), 10_000);
        assert_eq!(frame_bytes(160, 30, 1), 666);
        assert_eq!(frame_bytes(0, 30, 1), 1);
        assert_eq!(frame_bytes(1_000_000, 1, 1), MAX_PACKET_BYTES);
    }

    #[test]
    fn begin_moves_state_only_when_permitted() {
        let cell = OutputCell::new(OutputId::new(0, 0), OutputKind::SimpleRecording);
        let previous = cell
            .begin(OutputCommand::Start, Some(OutputState::Starting))
            .unwrap();
        assert_eq!(previous, OutputState::Idle);
        assert!(cell.state().is_starting());

        assert!(matches!(
            cell.begin(OutputCommand::Start, Some(OutputState::Starting)),
            Err(EngineError::InvalidTransition {
                command: OutputCommand::Start,
                state: "Starting",
                ..
            })
        ));

        cell.restore(previous);
        assert!(cell.state().is_idle());
    }
}
