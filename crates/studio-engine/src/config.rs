//! Coordinator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Pending requests a worker may hold before new ones are refused.
    pub command_capacity: usize,

    /// How long an idle worker waits for a request before checking again.
    pub poll_interval_ms: u64,

    /// Frames a worker may produce in one pass when it has fallen behind.
    pub max_catch_up_frames: u32,

    /// Upper bound applied to every replay buffer's `max_size_mb`.
    pub replay_max_size_mb: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            command_capacity: 64,
            poll_interval_ms: 100,
            max_catch_up_frames: 8,
            replay_max_size_mb: 512,
        }
    }
}

impl CoordinatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
