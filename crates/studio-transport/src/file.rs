//! Container file sink.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use studio_ipc::RecordingFormat;
use studio_video::VideoInfo;
use tracing::{debug, info, warn};

use crate::error::is_no_space;
use crate::template::{expand_filename_template, sanitize_part};
use crate::{MediaPacket, Sink, TransportError, TransportResult};

/// Upper bound on ` (n)` suffixes tried before giving up.
const MAX_UNIQUE_ATTEMPTS: u32 = 10_000;

/// How a file sink names its target.
#[derive(Debug, Clone)]
pub struct FileNaming {
    /// Target directory; must already exist.
    pub directory: PathBuf,

    /// Filename template.
    pub template: String,

    /// Prepended with a space when non-empty.
    pub prefix: String,

    /// Appended with a space when non-empty.
    pub suffix: String,

    /// Container format, selects the extension.
    pub format: RecordingFormat,

    /// Replace an existing file instead of adding a counter.
    pub overwrite: bool,

    /// Replace spaces in the generated name with underscores.
    pub no_space: bool,
}

impl FileNaming {
    /// Resolve the target path for a file started at `now`.
    pub fn resolve(
        &self,
        now: &DateTime<Local>,
        video: Option<&VideoInfo>,
    ) -> TransportResult<PathBuf> {
        if self.directory.as_os_str().is_empty() {
            return Err(TransportError::BadPath("output path is empty".into()));
        }
        if !self.directory.is_dir() {
            return Err(TransportError::BadPath(format!(
                "{} is not a directory",
                self.directory.display()
            )));
        }

        let stamp = expand_filename_template(&self.template, now, video);
        let first = self.directory.join(self.file_name(&stamp, None));
        if self.overwrite || !first.exists() {
            return Ok(first);
        }

        for n in 2..MAX_UNIQUE_ATTEMPTS {
            let candidate = self.directory.join(self.file_name(&stamp, Some(n)));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(TransportError::BadPath(format!(
            "no free filename for {}",
            first.display()
        )))
    }

    fn file_name(&self, stamp: &str, counter: Option<u32>) -> String {
        let prefix = sanitize_part(&self.prefix);
        let suffix = sanitize_part(&self.suffix);

        let mut stem = String::new();
        if !prefix.is_empty() {
            stem.push_str(&prefix);
            stem.push(' ');
        }
        stem.push_str(stamp);
        if let Some(n) = counter {
            stem.push_str(&format!(" ({n})"));
        }
        if !suffix.is_empty() {
            stem.push(' ');
            stem.push_str(&suffix);
        }
        if self.no_space {
            stem = stem.replace(' ', "_");
        }
        format!("{stem}.{}", self.format.extension())
    }
}

/// Parse muxer settings of the form `key=value key2=value2`.
pub fn parse_muxer_settings(settings: &str) -> TransportResult<Vec<(String, String)>> {
    settings
        .split_whitespace()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(TransportError::InvalidSetting(format!(
                "muxer setting '{pair}' is not key=value"
            ))),
        })
        .collect()
}

/// Writes packets to a file named by a [`FileNaming`].
pub struct FileSink {
    naming: FileNaming,
    muxer_settings: Vec<(String, String)>,
    video: Option<VideoInfo>,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl FileSink {
    /// Create an unopened sink.
    pub fn new(
        naming: FileNaming,
        muxer_settings: Vec<(String, String)>,
        video: Option<VideoInfo>,
    ) -> Self {
        Self {
            naming,
            muxer_settings,
            video,
            path: None,
            writer: None,
            bytes_written: 0,
        }
    }

    /// Bytes written so far, headers included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn write_all(&mut self, buf: &[u8]) -> TransportResult<()> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotOpen)?;
        writer.write_all(buf).map_err(map_write_error)?;
        self.bytes_written += buf.len() as u64;
        Ok(())
    }
}

impl Sink for FileSink {
    fn open(&mut self) -> TransportResult<()> {
        let path = self.naming.resolve(&Local::now(), self.video.as_ref())?;

        let mut options = OpenOptions::new();
        options.write(true);
        if self.naming.overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                TransportError::BadPath(format!("{}: {}", path.display(), err))
            }
            _ => map_write_error(err),
        })?;

        info!(path = %path.display(), format = ?self.naming.format, "Output file opened");
        self.writer = Some(BufWriter::new(file));
        self.path = Some(path);

        let mut header = format!("{}\n", self.naming.format.extension());
        for (key, value) in &self.muxer_settings {
            header.push_str(&format!("{key}={value}\n"));
        }
        header.push('\n');
        self.write_all(header.as_bytes())
    }

    fn write(&mut self, packet: &MediaPacket) -> TransportResult<()> {
        self.write_all(&packet.header())?;
        self.write_all(&packet.data)
    }

    fn finalize(&mut self) -> TransportResult<()> {
        let Some(mut writer) = self.writer.take() else {
            warn!("Finalize on a file sink that was never opened");
            return Err(TransportError::NotOpen);
        };
        writer.flush().map_err(map_write_error)?;
        let file = writer
            .into_inner()
            .map_err(|err| map_write_error(err.into_error()))?;
        file.sync_all().map_err(map_write_error)?;

        debug!(
            path = ?self.path,
            bytes = self.bytes_written,
            "Output file finalized"
        );
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

fn map_write_error(err: std::io::Error) -> TransportError {
    if is_no_space(&err) {
        TransportError::NoSpace
    } else {
        TransportError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeZone;

    fn naming(dir: &Path) -> FileNaming {
        FileNaming {
            directory: dir.to_path_buf(),
            template: crate::DEFAULT_FILENAME_FORMAT.to_string(),
            prefix: String::new(),
            suffix: String::new(),
            format: RecordingFormat::Mp4,
            overwrite: false,
            no_space: false,
        }
    }

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn prefix_and_suffix_wrap_the_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let naming = FileNaming {
            prefix: "Prefix".into(),
            suffix: "Suffix".into(),
            ..naming(dir.path())
        };
        let path = naming.resolve(&at(), None).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "Prefix 2024-01-02 03-04-05 Suffix.mp4"
        );
    }

    #[test]
    fn path_like_prefix_and_suffix_stay_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir(&target).unwrap();
        let naming = FileNaming {
            prefix: "../escaped".into(),
            suffix: "nested/../../x".into(),
            template: "%CCYY".into(),
            ..naming(&target)
        };

        let path = naming.resolve(&at(), None).unwrap();
        assert_eq!(path.parent().unwrap(), target.as_path());
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "_escaped 2024 nested_.._.._x.mp4"
        );

        let mut sink = FileSink::new(naming, Vec::new(), None);
        sink.open().unwrap();
        sink.finalize().unwrap();
        let written = sink.path().unwrap().canonicalize().unwrap();
        assert_eq!(written.parent().unwrap(), target.canonicalize().unwrap());
    }

    #[test]
    fn collisions_get_a_counter_unless_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let mut naming = naming(dir.path());
        naming.suffix = "S".into();
        let first = naming.resolve(&at(), None).unwrap();
        std::fs::write(&first, b"x").unwrap();

        let second = naming.resolve(&at(), None).unwrap();
        assert!(second.to_str().unwrap().ends_with("03-04-05 (2) S.mp4"));

        naming.overwrite = true;
        assert_eq!(naming.resolve(&at(), None).unwrap(), first);
    }

    #[test]
    fn no_space_replaces_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let naming = FileNaming {
            no_space: true,
            format: RecordingFormat::Mkv,
            ..naming(dir.path())
        };
        let path = naming.resolve(&at(), None).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "2024-01-02_03-04-05.mkv"
        );
    }

    #[test]
    fn missing_directory_is_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = naming(&dir.path().join("nope"));
        let err = missing.resolve(&at(), None).unwrap_err();
        assert_eq!(err.status_code(), studio_ipc::StatusCode::BadPath);

        let empty = naming(Path::new(""));
        assert!(matches!(
            empty.resolve(&at(), None),
            Err(TransportError::BadPath(_))
        ));
    }

    #[test]
    fn writes_and_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(
            naming(dir.path()),
            parse_muxer_settings("movflags=faststart").unwrap(),
            None,
        );
        sink.open().unwrap();
        sink.write(&MediaPacket {
            data: Bytes::from_static(b"frame"),
            pts_ms: 0,
            is_video: true,
            is_keyframe: true,
        })
        .unwrap();
        sink.finalize().unwrap();

        let path = sink.path().unwrap().to_path_buf();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len() as u64, sink.bytes_written());
        assert!(written.ends_with(b"frame"));
        assert!(matches!(sink.finalize(), Err(TransportError::NotOpen)));
    }

    #[test]
    fn muxer_settings_must_be_pairs() {
        assert!(parse_muxer_settings("").unwrap().is_empty());
        assert!(parse_muxer_settings("a=1 broken").is_err());
    }
}
