//! Timestamp continuity across switches (spec.md §4.5).
//!
//! Each source keeps its own timestamp space; the normaliser maintains a
//! per-source additive offset so the packet stream handed to the consumer
//! has monotonically non-decreasing DTS across a switch. The offset is
//! recomputed ("reanchored") the first time a source becomes active after
//! not having been, using the last emitted DTS as the new anchor.

use crate::config::DEFAULT_TS_REANCHOR_THRESHOLD;
use crate::packet::Packet;

/// Tracks the output timeline and per-source offsets needed to keep DTS
/// monotonic across switch boundaries.
pub struct TimestampNormaliser {
    reanchor_threshold: i64,
    last_output_dts: Option<i64>,
    offsets: Vec<i64>,
    last_source_seen: Option<usize>,
}

impl TimestampNormaliser {
    pub fn new(num_sources: usize) -> Self {
        Self::with_threshold(num_sources, DEFAULT_TS_REANCHOR_THRESHOLD)
    }

    pub fn with_threshold(num_sources: usize, reanchor_threshold: i64) -> Self {
        Self {
            reanchor_threshold,
            last_output_dts: None,
            offsets: vec![0; num_sources],
            last_source_seen: None,
        }
    }

    /// Rewrite `packet`'s pts/dts in place for the output timeline, applying
    /// (and if needed, recomputing) the offset for `source_index`.
    ///
    /// Reanchoring happens whenever the active source changed since the
    /// previous call, or when the raw-plus-offset DTS would jump backwards
    /// or forwards by more than `reanchor_threshold` ticks relative to the
    /// last emitted DTS; the new offset is chosen so the packet lands
    /// exactly one tick after `last_output_dts`.
    pub fn normalise(&mut self, packet: &mut Packet, source_index: usize) {
        let switched = self.last_source_seen != Some(source_index);
        self.last_source_seen = Some(source_index);

        let Some(raw_dts) = packet.dts.or(packet.pts) else {
            return;
        };

        let offset = self.offsets[source_index];
        let mut candidate = raw_dts + offset;

        let needs_reanchor = switched
            || match self.last_output_dts {
                Some(last) => (candidate - last).abs() > self.reanchor_threshold || candidate <= last,
                None => false,
            };

        if needs_reanchor {
            let anchor = self.last_output_dts.map(|last| last + 1).unwrap_or(raw_dts);
            let new_offset = anchor - raw_dts;
            self.offsets[source_index] = new_offset;
            candidate = raw_dts + new_offset;
        }

        if let Some(pts) = packet.pts {
            packet.pts = Some(pts + self.offsets[source_index]);
        }
        packet.dts = Some(candidate);
        self.last_output_dts = Some(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(dts: i64) -> Packet {
        Packet::new(vec![], Some(dts), Some(dts), 0)
    }

    #[test]
    fn first_packet_passes_through_unchanged() {
        let mut norm = TimestampNormaliser::new(2);
        let mut p = packet(1000);
        norm.normalise(&mut p, 0);
        assert_eq!(p.dts, Some(1000));
    }

    #[test]
    fn same_source_stays_monotonic_without_offset_change() {
        let mut norm = TimestampNormaliser::new(2);
        let mut p1 = packet(1000);
        norm.normalise(&mut p1, 0);
        let mut p2 = packet(1033);
        norm.normalise(&mut p2, 0);
        assert_eq!(p2.dts, Some(1033));
    }

    #[test]
    fn switch_reanchors_to_continue_from_last_output() {
        let mut norm = TimestampNormaliser::new(2);
        let mut p1 = packet(1000);
        norm.normalise(&mut p1, 0);
        let mut p2 = packet(2033);
        norm.normalise(&mut p2, 0);

        // Switch to source 1, whose own clock starts at 50.
        let mut p3 = packet(50);
        norm.normalise(&mut p3, 1);
        assert_eq!(p3.dts, Some(2034));

        let mut p4 = packet(83);
        norm.normalise(&mut p4, 1);
        assert_eq!(p4.dts, Some(2067));
    }

    #[test]
    fn switching_back_reuses_the_recomputed_offset() {
        let mut norm = TimestampNormaliser::new(2);
        let mut p1 = packet(1000);
        norm.normalise(&mut p1, 0);

        let mut p2 = packet(50);
        norm.normalise(&mut p2, 1);
        assert_eq!(p2.dts, Some(1001));

        // Back to source 0: its own timeline jumped far ahead in real time,
        // so this also reanchors rather than producing a huge jump.
        let mut p3 = packet(50_000);
        norm.normalise(&mut p3, 0);
        assert_eq!(p3.dts, Some(1002));
    }
}
