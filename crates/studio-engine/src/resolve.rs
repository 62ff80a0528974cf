//! Turning an output's configuration into a start plan.
//!
//! Everything that can be checked without touching the filesystem or the
//! network is checked here, so configuration mistakes surface as synchronous
//! errors from `start` rather than as a `Stop` signal.

use studio_audio::{AudioError, AudioTrack, AudioTrackTable, MixerMask};
use studio_encoder::{AudioEncoder, BindingLease, Service, VideoEncoder};
use studio_ipc::{OutputId, OutputType};
use studio_transport::{parse_muxer_settings, FileNaming};
use studio_video::{VideoContext, VideoInfo};

use crate::{
    CoordinatorConfig, EngineError, EngineResult, OutputSettings, ReplayBufferSettings,
    StreamDelay,
};

/// Handles attached to an output. Links point at the streaming output of a
/// recording or the recording of a replay buffer.
#[derive(Debug, Clone, Default)]
pub(crate) struct Bindings {
    pub(crate) video: Option<VideoContext>,
    pub(crate) video_encoder: Option<VideoEncoder>,
    pub(crate) audio_encoder: Option<AudioEncoder>,
    pub(crate) service: Option<Service>,
    pub(crate) link: Option<OutputId>,
}

/// Settings plus bindings of one output.
#[derive(Debug, Clone)]
pub(crate) struct OutputConfig {
    pub(crate) settings: OutputSettings,
    pub(crate) bindings: Bindings,
}

pub(crate) trait ConfigLookup {
    fn config(&self, id: OutputId) -> Option<&OutputConfig>;
}

/// Where audio comes from: bound encoders or track slots.
#[derive(Debug, Clone)]
pub(crate) enum AudioSource {
    Encoders(Vec<AudioEncoder>),
    Tracks(Vec<(usize, AudioTrack)>),
}

impl AudioSource {
    pub(crate) fn bitrates(&self) -> Vec<u32> {
        match self {
            Self::Encoders(encoders) => encoders.iter().map(|e| e.config().bitrate_kbps).collect(),
            Self::Tracks(tracks) => tracks.iter().map(|(_, t)| t.bitrate_kbps).collect(),
        }
    }

    fn leases(&self) -> Vec<BindingLease> {
        match self {
            Self::Encoders(encoders) => encoders.iter().map(AudioEncoder::lease).collect(),
            Self::Tracks(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Encoders {
    pub(crate) video: VideoEncoder,
    pub(crate) audio: AudioSource,
}

#[derive(Debug, Clone)]
pub(crate) enum SinkPlan {
    File {
        naming: FileNaming,
        muxer_settings: Vec<(String, String)>,
    },
    Stream {
        server: String,
        key: String,
        credentials: Option<(String, String)>,
        delay: StreamDelay,
    },
    Replay {
        naming: FileNaming,
        muxer_settings: Vec<(String, String)>,
        window_ms: u64,
        max_bytes: usize,
    },
}

/// Everything a worker needs to bring an output up.
#[derive(Debug, Clone)]
pub(crate) struct StartPlan {
    pub(crate) video: VideoContext,
    pub(crate) video_info: VideoInfo,
    pub(crate) encoders: Encoders,
    pub(crate) service: Option<Service>,
    pub(crate) sink: SinkPlan,
}

impl StartPlan {
    /// Leases on every encoder and service the plan uses.
    pub(crate) fn binding_leases(&self) -> Vec<BindingLease> {
        let mut leases = vec![self.encoders.video.lease()];
        leases.extend(self.encoders.audio.leases());
        if let Some(service) = &self.service {
            leases.push(service.lease());
        }
        leases
    }
}

/// Validate `id`'s configuration and resolve everything it starts with.
pub(crate) fn plan_start(
    outputs: &dyn ConfigLookup,
    tracks: &AudioTrackTable,
    config: &CoordinatorConfig,
    id: OutputId,
) -> EngineResult<StartPlan> {
    let entry = outputs.config(id).ok_or(EngineError::UnknownOutput(id))?;
    entry.settings.validate()?;

    let video = entry
        .bindings
        .video
        .clone()
        .ok_or(EngineError::MissingVideoContext(id))?;
    let mut video_info = video.info();
    if let Some(rescale) = entry.settings.rescale().filter(|r| r.enabled) {
        video_info.output_width = rescale.width;
        video_info.output_height = rescale.height;
    }

    let encoders = resolve_encoders(outputs, tracks, id)?;

    let (service, sink) = match &entry.settings {
        OutputSettings::SimpleStreaming(s) => stream_plan(entry, id, &s.delay)?,
        OutputSettings::AdvancedStreaming(s) => stream_plan(entry, id, &s.delay)?,
        OutputSettings::SimpleRecording(s) => (None, file_plan(&s.file.naming("", ""), &s.file.muxer_settings)?),
        OutputSettings::AdvancedRecording(s) => (None, file_plan(&s.file.naming("", ""), &s.file.muxer_settings)?),
        OutputSettings::SimpleReplayBuffer(s) => (None, replay_plan(s, config)?),
        OutputSettings::AdvancedReplayBuffer(s) => (None, replay_plan(&s.replay, config)?),
    };

    Ok(StartPlan {
        video,
        video_info,
        encoders,
        service,
        sink,
    })
}

fn stream_plan(
    entry: &OutputConfig,
    id: OutputId,
    delay: &StreamDelay,
) -> EngineResult<(Option<Service>, SinkPlan)> {
    let service = entry
        .bindings
        .service
        .clone()
        .ok_or(EngineError::MissingService(id))?;
    let settings = service.settings();
    Ok((
        Some(service),
        SinkPlan::Stream {
            credentials: settings
                .use_auth
                .then(|| (settings.username.clone(), settings.password.clone())),
            server: settings.server,
            key: settings.key,
            delay: delay.clone(),
        },
    ))
}

fn file_plan(naming: &FileNaming, muxer_settings: &str) -> EngineResult<SinkPlan> {
    Ok(SinkPlan::File {
        naming: naming.clone(),
        muxer_settings: parse_muxer_settings(muxer_settings)?,
    })
}

fn replay_plan(replay: &ReplayBufferSettings, config: &CoordinatorConfig) -> EngineResult<SinkPlan> {
    let cap_mb = replay.max_size_mb.min(config.replay_max_size_mb).max(1);
    Ok(SinkPlan::Replay {
        naming: replay.file.naming(&replay.prefix, &replay.suffix),
        muxer_settings: parse_muxer_settings(&replay.file.muxer_settings)?,
        window_ms: u64::from(replay.duration) * 1000,
        max_bytes: cap_mb as usize * 1024 * 1024,
    })
}

/// Resolve the encoders `id` runs on, following links where delegated.
pub(crate) fn resolve_encoders(
    outputs: &dyn ConfigLookup,
    tracks: &AudioTrackTable,
    id: OutputId,
) -> EngineResult<Encoders> {
    let entry = outputs.config(id).ok_or(EngineError::UnknownOutput(id))?;

    match &entry.settings {
        OutputSettings::SimpleStreaming(_) => Ok(Encoders {
            video: own_video(entry, id)?,
            audio: AudioSource::Encoders(vec![own_audio(entry, id)?]),
        }),
        OutputSettings::AdvancedStreaming(s) => {
            let track = tracks
                .at_index(s.audio_track)?
                .ok_or(AudioError::MissingTrack(s.audio_track))?;
            Ok(Encoders {
                video: own_video(entry, id)?,
                audio: AudioSource::Tracks(vec![(s.audio_track, track)]),
            })
        }
        OutputSettings::SimpleRecording(s) if s.quality.uses_stream_encoders() => {
            let stream = linked(outputs, entry, id, OutputType::Streaming)?;
            resolve_encoders(outputs, tracks, stream)
        }
        OutputSettings::SimpleRecording(_) => Ok(Encoders {
            video: own_video(entry, id)?,
            audio: AudioSource::Encoders(vec![own_audio(entry, id)?]),
        }),
        OutputSettings::AdvancedRecording(s) => {
            let video = if s.use_stream_encoders {
                let stream = linked(outputs, entry, id, OutputType::Streaming)?;
                resolve_encoders(outputs, tracks, stream)?.video
            } else {
                own_video(entry, id)?
            };
            Ok(Encoders {
                video,
                audio: AudioSource::Tracks(tracks.select(MixerMask(s.mixer))?),
            })
        }
        OutputSettings::SimpleReplayBuffer(s) => match &entry.bindings.video_encoder {
            Some(video) => Ok(Encoders {
                video: video.clone(),
                audio: AudioSource::Encoders(vec![own_audio(entry, id)?]),
            }),
            None => through_recording(outputs, tracks, entry, id, s.uses_stream),
        },
        OutputSettings::AdvancedReplayBuffer(s) => match &entry.bindings.video_encoder {
            Some(video) => Ok(Encoders {
                video: video.clone(),
                audio: AudioSource::Tracks(tracks.select(MixerMask(s.mixer))?),
            }),
            None => through_recording(outputs, tracks, entry, id, s.replay.uses_stream),
        },
    }
}

fn through_recording(
    outputs: &dyn ConfigLookup,
    tracks: &AudioTrackTable,
    entry: &OutputConfig,
    id: OutputId,
    uses_stream: bool,
) -> EngineResult<Encoders> {
    let recording = linked(outputs, entry, id, OutputType::Recording)?;
    if !uses_stream {
        return resolve_encoders(outputs, tracks, recording);
    }
    let recording_entry = outputs
        .config(recording)
        .ok_or(EngineError::UnknownOutput(recording))?;
    let stream = linked(outputs, recording_entry, recording, OutputType::Streaming)?;
    resolve_encoders(outputs, tracks, stream)
}

fn linked(
    outputs: &dyn ConfigLookup,
    entry: &OutputConfig,
    id: OutputId,
    needs: OutputType,
) -> EngineResult<OutputId> {
    let target = entry
        .bindings
        .link
        .ok_or(EngineError::MissingLink { id, needs })?;
    outputs
        .config(target)
        .map(|_| target)
        .ok_or(EngineError::UnknownOutput(target))
}

fn own_video(entry: &OutputConfig, id: OutputId) -> EngineResult<VideoEncoder> {
    entry
        .bindings
        .video_encoder
        .clone()
        .ok_or(EngineError::MissingVideoEncoder(id))
}

fn own_audio(entry: &OutputConfig, id: OutputId) -> EngineResult<AudioEncoder> {
    entry
        .bindings
        .audio_encoder
        .clone()
        .ok_or(EngineError::MissingAudioEncoder(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use studio_audio::AudioTrack;
    use studio_encoder::{create_video_encoder, Service};
    use studio_ipc::{OutputKind, RecordingQuality};
    use studio_video::VideoInfo;

    impl ConfigLookup for Registry<OutputConfig> {
        fn config(&self, id: OutputId) -> Option<&OutputConfig> {
            self.get(id)
        }
    }

    fn output(kind: OutputKind) -> OutputConfig {
        OutputConfig {
            settings: OutputSettings::for_kind(kind),
            bindings: Bindings {
                video: Some(VideoContext::new(VideoInfo::default()).unwrap()),
                ..Bindings::default()
            },
        }
    }

    fn stream_with_encoders() -> OutputConfig {
        let mut stream = output(OutputKind::SimpleStreaming);
        stream.bindings.video_encoder =
            Some(create_video_encoder("obs_x264", "video-encoder", Default::default()).unwrap());
        stream.bindings.audio_encoder = Some(AudioEncoder::default_aac().unwrap());
        stream.bindings.service = Some(Service::custom("rtmp://127.0.0.1/live", "key").unwrap());
        stream
    }

    #[test]
    fn simple_recording_borrows_stream_encoders() {
        let mut outputs = Registry::new();
        let tracks = AudioTrackTable::new();
        let stream_config = stream_with_encoders();
        let stream_video = stream_config.bindings.video_encoder.clone().unwrap();
        let stream = outputs.insert(None, stream_config).unwrap();

        let mut recording = output(OutputKind::SimpleRecording);
        let unlinked = outputs.insert(None, recording.clone()).unwrap();
        assert!(matches!(
            resolve_encoders(&outputs, &tracks, unlinked),
            Err(EngineError::MissingLink {
                needs: OutputType::Streaming,
                ..
            })
        ));

        recording.bindings.link = Some(stream);
        let linked = outputs.insert(None, recording).unwrap();
        let encoders = resolve_encoders(&outputs, &tracks, linked).unwrap();
        assert!(encoders.video.same_as(&stream_video));
    }

    #[test]
    fn simple_recording_with_own_quality_needs_own_encoders() {
        let mut outputs = Registry::new();
        let tracks = AudioTrackTable::new();
        let mut recording = output(OutputKind::SimpleRecording);
        if let OutputSettings::SimpleRecording(s) = &mut recording.settings {
            s.quality = RecordingQuality::HighQuality;
        }
        let id = outputs.insert(None, recording).unwrap();
        assert!(matches!(
            resolve_encoders(&outputs, &tracks, id),
            Err(EngineError::MissingVideoEncoder(_))
        ));
    }

    #[test]
    fn advanced_recording_uses_mixer_tracks() {
        let mut outputs = Registry::new();
        let tracks = AudioTrackTable::new();
        let mut recording = output(OutputKind::AdvancedRecording);
        if let OutputSettings::AdvancedRecording(s) = &mut recording.settings {
            s.use_stream_encoders = false;
            s.mixer = 0b11;
        }
        recording.bindings.video_encoder =
            Some(create_video_encoder("obs_x264", "video-encoder", Default::default()).unwrap());
        let id = outputs.insert(None, recording).unwrap();

        tracks.set_at_index(AudioTrack::new(160, "track1").unwrap(), 1).unwrap();
        assert!(matches!(
            resolve_encoders(&outputs, &tracks, id),
            Err(EngineError::Audio(AudioError::MissingTrack(2)))
        ));

        tracks.set_at_index(AudioTrack::new(128, "track2").unwrap(), 2).unwrap();
        let encoders = resolve_encoders(&outputs, &tracks, id).unwrap();
        assert_eq!(encoders.audio.bitrates(), vec![160, 128]);
    }

    #[test]
    fn replay_buffer_resolves_through_recording_and_stream() {
        let mut outputs = Registry::new();
        let tracks = AudioTrackTable::new();
        let stream = outputs.insert(None, stream_with_encoders()).unwrap();

        let mut recording = output(OutputKind::SimpleRecording);
        recording.bindings.link = Some(stream);
        let recording = outputs.insert(None, recording).unwrap();

        for uses_stream in [false, true] {
            let mut replay = output(OutputKind::SimpleReplayBuffer);
            replay.settings.replay_mut().unwrap().uses_stream = uses_stream;
            replay.bindings.link = Some(recording);
            let id = outputs.insert(None, replay).unwrap();
            let encoders = resolve_encoders(&outputs, &tracks, id).unwrap();
            assert_eq!(encoders.video.name(), "video-encoder");
        }
    }

    #[test]
    fn streaming_requires_service_and_video() {
        let mut outputs = Registry::new();
        let tracks = AudioTrackTable::new();
        let config = CoordinatorConfig::default();

        let mut stream = stream_with_encoders();
        stream.bindings.service = None;
        let no_service = outputs.insert(None, stream).unwrap();
        assert!(matches!(
            plan_start(&outputs, &tracks, &config, no_service),
            Err(EngineError::MissingService(_))
        ));

        let mut stream = stream_with_encoders();
        stream.bindings.video = None;
        let no_video = outputs.insert(None, stream).unwrap();
        assert!(matches!(
            plan_start(&outputs, &tracks, &config, no_video),
            Err(EngineError::MissingVideoContext(_))
        ));
    }

    #[test]
    fn authenticated_service_carries_credentials() {
        let mut outputs = Registry::new();
        let tracks = AudioTrackTable::new();
        let config = CoordinatorConfig::default();

        let stream = stream_with_encoders();
        let service = stream.bindings.service.clone().unwrap();
        let id = outputs.insert(None, stream).unwrap();
        let plan = plan_start(&outputs, &tracks, &config, id).unwrap();
        assert!(matches!(plan.sink, SinkPlan::Stream { credentials: None, .. }));

        service
            .update(studio_encoder::ServiceSettings {
                use_auth: true,
                username: "user".into(),
                password: "secret".into(),
                ..service.settings()
            })
            .unwrap();
        let plan = plan_start(&outputs, &tracks, &config, id).unwrap();
        let SinkPlan::Stream { credentials, .. } = plan.sink else {
            panic!("expected a stream plan");
        };
        assert_eq!(credentials, Some(("user".to_string(), "secret".to_string())));
    }

    #[test]
    fn stale_link_is_reported() {
        let mut outputs = Registry::new();
        let tracks = AudioTrackTable::new();
        let stream = outputs.insert(None, stream_with_encoders()).unwrap();
        let mut recording = output(OutputKind::SimpleRecording);
        recording.bindings.link = Some(stream);
        let id = outputs.insert(None, recording).unwrap();

        outputs.remove(stream);
        assert!(matches!(
            resolve_encoders(&outputs, &tracks, id),
            Err(EngineError::UnknownOutput(gone)) if gone == stream
        ));
    }

    #[test]
    fn replay_plan_caps_memory_and_names_files() {
        let mut outputs = Registry::new();
        let tracks = AudioTrackTable::new();
        let mut replay = output(OutputKind::SimpleReplayBuffer);
        replay.bindings.video_encoder =
            Some(create_video_encoder("obs_x264", "video-encoder", Default::default()).unwrap());
        replay.bindings.audio_encoder = Some(AudioEncoder::default_aac().unwrap());
        {
            let settings = replay.settings.replay_mut().unwrap();
            settings.max_size_mb = 4096;
            settings.suffix = "Clip".into();
        }
        let id = outputs.insert(None, replay).unwrap();

        let config = CoordinatorConfig {
            replay_max_size_mb: 64,
            ..CoordinatorConfig::default()
        };
        let plan = plan_start(&outputs, &tracks, &config, id).unwrap();
        let SinkPlan::Replay {
            naming,
            window_ms,
            max_bytes,
            ..
        } = plan.sink
        else {
            panic!("expected a replay plan");
        };
        assert_eq!(window_ms, 20_000);
        assert_eq!(max_bytes, 64 * 1024 * 1024);
        assert_eq!(naming.prefix, "Replay");
        assert_eq!(naming.suffix, "Clip");
    }
}
