//! Rolling packet window backing a replay buffer.

use std::collections::VecDeque;

use crate::MediaPacket;

/// Keeps the most recent packets within a duration and a byte budget.
///
/// `pts_ms` of pushed packets must be monotonically increasing.
#[derive(Debug)]
pub struct ReplayRing {
    max_duration_ms: u64,
    max_bytes: usize,
    packets: VecDeque<MediaPacket>,
    keyframes: VecDeque<u64>,
    bytes: usize,
}

impl ReplayRing {
    /// Create a ring holding `max_duration_ms` of media in at most `max_bytes`.
    pub fn new(max_duration_ms: u64, max_bytes: usize) -> Self {
        Self {
            max_duration_ms,
            max_bytes,
            packets: VecDeque::new(),
            keyframes: VecDeque::new(),
            bytes: 0,
        }
    }

    pub fn push(&mut self, packet: MediaPacket) {
        if packet.is_video
            && packet.is_keyframe
            && self.keyframes.back().map_or(true, |last| *last < packet.pts_ms)
        {
            self.keyframes.push_back(packet.pts_ms);
        }
        self.bytes += packet.data.len();
        self.packets.push_back(packet);
        self.evict();
    }

    fn evict(&mut self) {
        let Some(newest_pts) = self.packets.back().map(|p| p.pts_ms) else {
            return;
        };

        while let Some(oldest) = self.packets.front() {
            let too_old = newest_pts.saturating_sub(oldest.pts_ms) > self.max_duration_ms;
            let too_big = self.bytes > self.max_bytes && self.packets.len() > 1;
            if !(too_old || too_big) {
                break;
            }
            if let Some(evicted) = self.packets.pop_front() {
                self.bytes -= evicted.data.len();
            }
        }

        match self.packets.front() {
            Some(oldest) => {
                let oldest_pts = oldest.pts_ms;
                while self.keyframes.front().is_some_and(|k| *k < oldest_pts) {
                    self.keyframes.pop_front();
                }
            }
            None => self.keyframes.clear(),
        }
    }

    /// Packets from the oldest retained keyframe onward, without draining.
    ///
    /// Falls back to everything held when no keyframe is retained.
    pub fn snapshot_from_keyframe(&self) -> Vec<MediaPacket> {
        match self.keyframes.front() {
            Some(start) => self
                .packets
                .iter()
                .filter(|p| p.pts_ms >= *start)
                .cloned()
                .collect(),
            None => self.packets.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Bytes currently held.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn duration_ms(&self) -> u64 {
        match (self.packets.front(), self.packets.back()) {
            (Some(first), Some(last)) => last.pts_ms.saturating_sub(first.pts_ms),
            _ => 0,
        }
    }

    pub fn clear(&mut self) {
        self.packets.clear();
        self.keyframes.clear();
        self.bytes = 0;
    }
}
