//! Signals emitted by outputs.

use serde::{Deserialize, Serialize};

use crate::types::{OutputId, OutputType};

/// Lifecycle signal names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputSignal {
    Starting,
    Start,
    Activate,
    Stopping,
    Stop,
    Deactivate,
    Writing,
    Wrote,
}

impl OutputSignal {
    /// Returns the wire name of this signal.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Start => "start",
            Self::Activate => "activate",
            Self::Stopping => "stopping",
            Self::Stop => "stop",
            Self::Deactivate => "deactivate",
            Self::Writing => "writing",
            Self::Wrote => "wrote",
        }
    }
}

impl std::fmt::Display for OutputSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status codes carried by signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Success,
    BadPath,
    ConnectFailed,
    InvalidStream,
    Error,
    Disconnected,
    Unsupported,
    NoSpace,
    EncodeError,
}

impl StatusCode {
    /// Numeric value of the code.
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::BadPath => -1,
            Self::ConnectFailed => -2,
            Self::InvalidStream => -3,
            Self::Error => -4,
            Self::Disconnected => -5,
            Self::Unsupported => -6,
            Self::NoSpace => -7,
            Self::EncodeError => -8,
        }
    }

    /// Parse a numeric code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            -1 => Some(Self::BadPath),
            -2 => Some(Self::ConnectFailed),
            -3 => Some(Self::InvalidStream),
            -4 => Some(Self::Error),
            -5 => Some(Self::Disconnected),
            -6 => Some(Self::Unsupported),
            -7 => Some(Self::NoSpace),
            -8 => Some(Self::EncodeError),
            _ => None,
        }
    }
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEvent {
    /// Output that emitted the signal.
    pub output: OutputId,

    /// Family of the emitting output.
    pub output_type: OutputType,

    /// Signal name.
    pub signal: OutputSignal,

    /// Status code, 0 on success.
    pub code: i32,

    /// Error message accompanying a nonzero code.
    pub error: Option<String>,
}

impl SignalEvent {
    /// A successful signal.
    pub fn ok(output: OutputId, output_type: OutputType, signal: OutputSignal) -> Self {
        Self {
            output,
            output_type,
            signal,
            code: StatusCode::Success.code(),
            error: None,
        }
    }

    /// A signal carrying a failure.
    pub fn failed(
        output: OutputId,
        output_type: OutputType,
        signal: OutputSignal,
        status: StatusCode,
        error: impl Into<String>,
    ) -> Self {
        Self {
            output,
            output_type,
            signal,
            code: status.code(),
            error: Some(error.into()),
        }
    }

    /// Returns true when the code is 0.
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// The decoded status, when the code is a known one.
    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_code(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for code in -8..=0 {
            let status = StatusCode::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(StatusCode::from_code(1), None);
    }

    #[test]
    fn failed_event_carries_code_and_message() {
        let event = SignalEvent::failed(
            OutputId::new(0, 0),
            OutputType::Recording,
            OutputSignal::Stop,
            StatusCode::BadPath,
            "directory missing",
        );
        assert!(!event.is_success());
        assert_eq!(event.code, -1);
        assert_eq!(event.status(), Some(StatusCode::BadPath));
        assert_eq!(event.error.as_deref(), Some("directory missing"));
    }
}
