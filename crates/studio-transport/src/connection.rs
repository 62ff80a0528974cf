//! Where a stream sink is in its session with the ingest server.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// Publish request sent; packets flow.
    Publishing,
    /// Terminal until the sink is reopened. Nothing reconnects on its own.
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_publishing(&self) -> bool {
        matches!(self, Self::Publishing)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Publishing => f.write_str("publishing"),
            Self::Failed { reason } => write!(f, "failed ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_failure_reason() {
        let state = ConnectionState::Failed {
            reason: "connection refused".into(),
        };
        assert!(state.is_failed());
        assert!(!state.is_publishing());
        assert_eq!(state.to_string(), "failed (connection refused)");
        assert_eq!(ConnectionState::default().to_string(), "disconnected");
    }
}
