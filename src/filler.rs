//! Black-filler source: the reserved last entry in every source list
//! (spec.md §3's `color=black` convention), generating a minimal H.264-ish
//! keyframe stream so the arbiter always has somewhere safe to fail over
//! to even when every real source is down.

use std::time::{Duration, Instant};

use crate::error::SourceReadError;
use crate::packet::Packet;
use crate::source::PacketSource;

/// Emits one synthetic IDR-tagged packet every `frame_interval`, with
/// monotonically increasing timestamps starting at zero. Never reaches EOF
/// on its own; it's meant to run for the lifetime of the switcher.
pub struct BlackFillerSource {
    frame_interval: Duration,
    next_emit: Instant,
    next_pts: i64,
    pts_step: i64,
}

impl BlackFillerSource {
    pub fn new(frame_interval: Duration, pts_step: i64) -> Self {
        Self {
            frame_interval,
            next_emit: Instant::now(),
            next_pts: 0,
            pts_step,
        }
    }

    /// 30fps filler with a 90kHz time base, matching spec.md's reanchor
    /// threshold assumption.
    pub fn at_30fps() -> Self {
        Self::new(Duration::from_millis(33), 3000)
    }
}

impl PacketSource for BlackFillerSource {
    fn read_packet(&mut self) -> Result<Packet, SourceReadError> {
        let now = Instant::now();
        if now < self.next_emit {
            std::thread::sleep(self.next_emit - now);
        }
        self.next_emit += self.frame_interval;

        let pts = self.next_pts;
        self.next_pts += self.pts_step;

        // 4-byte Annex-B start code + NAL type 5 (IDR slice); payload
        // content doesn't matter beyond the keyframe marker itself.
        let mut payload = vec![0, 0, 0, 1, 5];
        payload.extend_from_slice(&[0u8; 16]);

        let mut packet = Packet::new(payload, Some(pts), Some(pts), 0);
        packet.keyframe = true;
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_packet_is_flagged_as_a_keyframe() {
        let mut source = BlackFillerSource::new(Duration::from_millis(1), 1);
        let p1 = source.read_packet().unwrap();
        let p2 = source.read_packet().unwrap();
        assert!(p1.keyframe);
        assert!(p2.keyframe);
        assert!(p2.pts.unwrap() > p1.pts.unwrap());
    }
}
