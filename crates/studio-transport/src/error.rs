//! Error types for the transport module.

use studio_ipc::StatusCode;
use thiserror::Error;

/// Errors that can occur while opening, writing or finalizing a sink.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Target directory missing or not writable.
    #[error("Bad output path: {0}")]
    BadPath(String),

    /// Disk full.
    #[error("No space left on device")]
    NoSpace,

    /// Invalid ingest URL.
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(String),

    /// Endpoint refused or unreachable.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Endpoint went away while streaming.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// Setting the sink cannot honour.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Malformed sink setting.
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Write before open or after finalize.
    #[error("Sink not open")]
    NotOpen,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Status code reported on the signal that carries this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadPath(_) => StatusCode::BadPath,
            Self::NoSpace => StatusCode::NoSpace,
            Self::InvalidUrl(_) => StatusCode::InvalidStream,
            Self::ConnectionFailed(_) => StatusCode::ConnectFailed,
            Self::Disconnected(_) => StatusCode::Disconnected,
            Self::Unsupported(_) => StatusCode::Unsupported,
            Self::InvalidSetting(_) | Self::NotOpen => StatusCode::Error,
            Self::Io(err) if is_no_space(err) => StatusCode::NoSpace,
            Self::Io(_) => StatusCode::Error,
        }
    }
}

/// Disk full, as reported by the OS.
pub(crate) fn is_no_space(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::StorageFull || is_disk_full_code(err.raw_os_error())
}

/// ERROR_DISK_FULL and ERROR_HANDLE_DISK_FULL.
#[cfg(windows)]
fn is_disk_full_code(code: Option<i32>) -> bool {
    matches!(code, Some(112) | Some(39))
}

#[cfg(not(windows))]
fn is_disk_full_code(_code: Option<i32>) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_status_codes() {
        assert_eq!(
            TransportError::BadPath("x".into()).status_code().code(),
            -1
        );
        assert_eq!(
            TransportError::ConnectionFailed("x".into()).status_code(),
            StatusCode::ConnectFailed
        );
    }

    #[test]
    fn storage_full_is_no_space() {
        let full = std::io::Error::from(std::io::ErrorKind::StorageFull);
        assert_eq!(TransportError::Io(full).status_code(), StatusCode::NoSpace);

        let other = std::io::Error::other("broken pipe");
        assert_eq!(TransportError::Io(other).status_code(), StatusCode::Error);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn only_enospc_counts_as_full_on_linux() {
        let enospc = std::io::Error::from_raw_os_error(28);
        assert_eq!(TransportError::Io(enospc).status_code(), StatusCode::NoSpace);

        // EHOSTDOWN
        let host_down = std::io::Error::from_raw_os_error(112);
        assert_eq!(TransportError::Io(host_down).status_code(), StatusCode::Error);
    }
}
