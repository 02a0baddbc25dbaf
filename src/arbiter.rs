//! Switch arbiter: decides, packet by packet, which source's queue to drain
//! from and enforces the keyframe-safe switch boundary (spec.md §4.4).
//!
//! Two cases on every call to [`SwitchArbiter::read_packet`]:
//!
//! - **Case A** — pull the next packet from the active source's queue and
//!   pass it through. Runs on every call where no switch is pending, and
//!   also whenever a pending switch hasn't found its keyframe yet, so the
//!   active source never stalls while a switch is in flight.
//! - **Case B** — when a switch is pending, first make one non-blocking
//!   attempt on the target queue: a keyframe (or, once `switch_timeout_ms`
//!   elapses without one — I-FRAME-02 in spec.md §8, any packet) commits
//!   the switch and is emitted in place of a Case A read this round;
//!   anything else is discarded so the target doesn't back up while
//!   unused.
//!
//! A switch is therefore never completed mid-GOP; the only relaxation is
//! the forced-after-timeout path, which trades a brief decode glitch for
//! bounded switch latency. Manual switches (spec.md §4.7) don't go through
//! either case: [`SwitchArbiter::switch_immediate`] flips `active` directly
//! and unconditionally, the same way the original demuxer's control server
//! and CLI `switch` command write `active_source_index` with no iframe
//! wait.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;

use crate::clock::now_ms;
use crate::config::SwitcherConfig;
use crate::error::{ReadError, TryGetError};
use crate::keyframe;
use crate::packet::Packet;
use crate::queue::PacketQueue;
use crate::source::SourceLiveness;
use crate::timestamp::TimestampNormaliser;

/// Why the active source changed, threaded through to control-plane status
/// and logs (supplements spec.md's minimal status payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    Manual,
    AutoFailover,
    Recovery,
    ForcedTimeout,
}

impl SwitchReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchReason::Manual => "manual",
            SwitchReason::AutoFailover => "auto_failover",
            SwitchReason::Recovery => "recovery",
            SwitchReason::ForcedTimeout => "forced_timeout",
        }
    }
}

struct PendingSwitch {
    target: usize,
    requested_at_ms: i64,
    reason: SwitchReason,
    /// Packets pulled from the target while waiting for a keyframe that
    /// turned out not to be one; dropped once the switch completes or is
    /// superseded by a newer request.
    discarded: usize,
}

pub struct SwitchArbiter {
    queues: Vec<Arc<PacketQueue>>,
    liveness: Vec<Arc<SourceLiveness>>,
    active: AtomicUsize,
    pending: Mutex<Option<PendingSwitch>>,
    normaliser: Mutex<TimestampNormaliser>,
    switch_timeout_ms: i64,
    black_source_index: usize,
    auto_failover_enabled: bool,
}

impl SwitchArbiter {
    pub fn new(
        queues: Vec<Arc<PacketQueue>>,
        liveness: Vec<Arc<SourceLiveness>>,
        config: &SwitcherConfig,
    ) -> Self {
        let normaliser = TimestampNormaliser::with_threshold(queues.len(), config.ts_reanchor_threshold);
        Self {
            black_source_index: queues.len() - 1,
            queues,
            liveness,
            active: AtomicUsize::new(0),
            pending: Mutex::new(None),
            normaliser: Mutex::new(normaliser),
            switch_timeout_ms: config.switch_timeout_ms,
            auto_failover_enabled: config.auto_failover_enabled,
        }
    }

    pub fn active_source(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Request a switch to `target` that waits for a keyframe (automatic
    /// failover/recovery). A later request before the current one completes
    /// simply replaces it (spec.md's "most recent request wins"). Manual
    /// switches should use [`Self::switch_immediate`] instead.
    pub fn request_switch(&self, target: usize, reason: SwitchReason) {
        if target == self.active_source() {
            return;
        }
        let mut pending = self.pending.lock();
        info!("switch requested: -> source {target} ({})", reason.as_str());
        *pending = Some(PendingSwitch {
            target,
            requested_at_ms: now_ms(),
            reason,
            discarded: 0,
        });
    }

    /// Switch to `target` immediately and unconditionally: no pending
    /// keyframe wait, any in-flight automatic switch is cancelled, and the
    /// very next packet `read_packet` returns comes from `target`
    /// (testable property 4 / scenario S1 in spec.md §8).
    pub fn switch_immediate(&self, target: usize, reason: SwitchReason) {
        let mut pending = self.pending.lock();
        *pending = None;
        drop(pending);
        if self.active.swap(target, Ordering::AcqRel) != target {
            info!("switch completed: -> source {target} ({}, immediate)", reason.as_str());
        }
    }

    pub fn has_pending_switch(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Pull and return the next output packet, applying timestamp
    /// continuity. While a switch is pending, every call makes one
    /// non-blocking attempt to complete it (Case B) before falling back to
    /// a normal read from whichever source is still active (Case A) — the
    /// active source never stalls just because a switch is waiting on a
    /// keyframe.
    pub fn read_packet(&self) -> Result<Packet, ReadError> {
        loop {
            let pending_target = self.pending.lock().as_ref().map(|p| p.target);

            if let Some(target) = pending_target {
                if let Some(packet) = self.try_complete_switch_once(target) {
                    return Ok(packet);
                }
            }

            let active = self.active_source();
            match self.queues[active].get_timeout(Duration::from_millis(200)) {
                Ok(mut packet) => {
                    self.liveness[active].record_consumption();
                    self.normaliser.lock().normalise(&mut packet, active);
                    return Ok(packet);
                }
                Err(TryGetError::WouldBlock) => continue,
                Err(TryGetError::EndOfStream) => {
                    if active == self.black_source_index {
                        return Err(ReadError::EndOfStream);
                    }
                    if !self.auto_failover_enabled {
                        return Err(ReadError::EndOfStream);
                    }
                    warn!("active source {active} reached end of stream; forcing switch to black filler");
                    self.request_switch(self.black_source_index, SwitchReason::AutoFailover);
                    continue;
                }
            }
        }
    }

    /// Case B, one attempt: a single non-blocking poll of `target`. Commits
    /// the switch and returns its packet if that packet is a keyframe, or
    /// if `switch_timeout_ms` has elapsed since the request (I-FRAME-02);
    /// otherwise discards a non-keyframe packet (so the target doesn't back
    /// up while unused) and reports nothing, leaving the caller to read
    /// from the still-active source this round.
    fn try_complete_switch_once(&self, target: usize) -> Option<Packet> {
        let elapsed = {
            let pending = self.pending.lock();
            match pending.as_ref() {
                Some(p) if p.target == target => now_ms() - p.requested_at_ms,
                _ => return None, // superseded between the read and the lock
            }
        };
        let forced = elapsed >= self.switch_timeout_ms;

        match self.queues[target].try_get() {
            Ok(mut packet) => {
                let is_keyframe = packet.keyframe || keyframe::is_keyframe(&packet.payload);
                if is_keyframe || forced {
                    let reason = {
                        let mut pending = self.pending.lock();
                        let reason = pending.as_ref().map(|p| p.reason).unwrap_or(SwitchReason::AutoFailover);
                        *pending = None;
                        reason
                    };
                    let reason = if forced && !is_keyframe {
                        SwitchReason::ForcedTimeout
                    } else {
                        reason
                    };
                    self.active.store(target, Ordering::Release);
                    self.liveness[target].record_consumption();
                    info!(
                        "switch completed: -> source {target} ({}, forced={forced})",
                        reason.as_str()
                    );
                    self.normaliser.lock().normalise(&mut packet, target);
                    Some(packet)
                } else {
                    if let Some(p) = self.pending.lock().as_mut() {
                        if p.target == target {
                            p.discarded += 1;
                        }
                    }
                    None
                }
            }
            Err(TryGetError::WouldBlock) => None,
            Err(TryGetError::EndOfStream) => {
                warn!("switch target {target} is already at end of stream; abandoning switch");
                let mut pending = self.pending.lock();
                if pending.as_ref().map(|p| p.target) == Some(target) {
                    *pending = None;
                }
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_discarded(&self) -> Option<usize> {
        self.pending.lock().as_ref().map(|p| p.discarded)
    }
}

/// Replay buffer used only by tests to script deterministic queue contents.
#[cfg(test)]
fn queue_with(packets: Vec<Packet>, capacity: usize) -> Arc<PacketQueue> {
    let q = Arc::new(PacketQueue::new(capacity.max(packets.len().max(1))));
    for p in packets {
        q.put(p).unwrap();
    }
    q
}

#[cfg(test)]
fn liveness_for(n: usize) -> Vec<Arc<SourceLiveness>> {
    (0..n).map(|_| Arc::new(SourceLiveness::new())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(dts: i64) -> Packet {
        let mut p = Packet::new(vec![0, 0, 0, 1, 1], Some(dts), Some(dts), 0);
        p.keyframe = false;
        p
    }

    fn keyframe_packet(dts: i64) -> Packet {
        let mut p = Packet::new(vec![0, 0, 0, 1, 5], Some(dts), Some(dts), 0);
        p.keyframe = true;
        p
    }

    fn test_config(n: usize) -> SwitcherConfig {
        let mut cfg = SwitcherConfig::new((0..n).map(|i| format!("s{i}")).collect()).unwrap();
        cfg.switch_timeout_ms = 200;
        cfg
    }

    #[test]
    fn case_a_passes_through_active_source_packets() {
        let q0 = queue_with(vec![plain(0), plain(33)], 8);
        let q1 = queue_with(vec![], 8);
        let arbiter = SwitchArbiter::new(vec![q0, q1], liveness_for(2), &test_config(2));

        assert_eq!(arbiter.read_packet().unwrap().dts, Some(0));
        assert_eq!(arbiter.read_packet().unwrap().dts, Some(33));
    }

    #[test]
    fn auto_failover_switch_waits_for_keyframe_before_committing() {
        let q0 = queue_with(vec![plain(0), plain(33), plain(66)], 8);
        let q1 = queue_with(vec![plain(1000), plain(1033), keyframe_packet(1066)], 8);
        let arbiter = SwitchArbiter::new(vec![q0, q1], liveness_for(2), &test_config(2));

        assert_eq!(arbiter.read_packet().unwrap().dts, Some(0));
        arbiter.request_switch(1, SwitchReason::AutoFailover);

        // Non-keyframe packets on the target are discarded, not emitted;
        // source 0 keeps flowing until the keyframe on source 1 shows up.
        let next = arbiter.read_packet().unwrap();
        assert_eq!(arbiter.active_source(), 0);
        assert!(next.dts == Some(33) || next.dts == Some(66));
    }

    #[test]
    fn manual_switch_is_immediate_and_unconditional() {
        let q0 = queue_with(vec![plain(0), plain(33)], 8);
        let q1 = queue_with(vec![plain(1000)], 8); // not a keyframe
        let arbiter = SwitchArbiter::new(vec![q0, q1], liveness_for(2), &test_config(2));

        assert_eq!(arbiter.read_packet().unwrap().dts, Some(0));
        arbiter.switch_immediate(1, SwitchReason::Manual);

        // The very next packet comes from source 1, keyframe or not.
        let packet = arbiter.read_packet().unwrap();
        assert_eq!(arbiter.active_source(), 1);
        assert_eq!(packet.dts, Some(1000));
    }

    #[test]
    fn manual_switch_cancels_a_pending_automatic_switch() {
        let q0 = queue_with(vec![plain(0)], 8);
        let q1 = queue_with(vec![], 8);
        let q2 = queue_with(vec![plain(5000)], 8);
        let arbiter = SwitchArbiter::new(vec![q0, q1, q2], liveness_for(3), &test_config(3));

        assert_eq!(arbiter.read_packet().unwrap().dts, Some(0));
        arbiter.request_switch(1, SwitchReason::AutoFailover);
        assert!(arbiter.has_pending_switch());

        arbiter.switch_immediate(2, SwitchReason::Manual);
        assert!(!arbiter.has_pending_switch());
        assert_eq!(arbiter.active_source(), 2);
    }

    #[test]
    fn forced_switch_after_timeout_ignores_keyframe_requirement() {
        let q0 = queue_with(vec![plain(0)], 8);
        let q1 = queue_with(vec![], 8); // never produces a keyframe
        let arbiter = SwitchArbiter::new(vec![q0, q1], liveness_for(2), &test_config(2));

        assert_eq!(arbiter.read_packet().unwrap().dts, Some(0));
        arbiter.request_switch(1, SwitchReason::AutoFailover);

        // Push a non-keyframe packet onto the target after the timeout
        // elapses; it should still be forced through.
        std::thread::sleep(Duration::from_millis(250));
        arbiter.queues[1].put(plain(5000)).unwrap();

        let packet = arbiter.read_packet().unwrap();
        assert_eq!(arbiter.active_source(), 1);
        assert_eq!(packet.dts, Some(5000));
    }

    #[test]
    fn request_switch_to_current_active_is_a_no_op() {
        let q0 = queue_with(vec![], 8);
        let q1 = queue_with(vec![], 8);
        let arbiter = SwitchArbiter::new(vec![q0, q1], liveness_for(2), &test_config(2));
        arbiter.request_switch(0, SwitchReason::Manual);
        assert!(!arbiter.has_pending_switch());
    }

    #[test]
    fn eof_on_active_source_propagates_when_auto_failover_disabled() {
        let q0 = queue_with(vec![plain(0)], 8);
        q0.close(); // buffered packet still readable, then EndOfStream
        let q1 = queue_with(vec![], 8);
        let mut cfg = test_config(2);
        cfg.auto_failover_enabled = false;
        let arbiter = SwitchArbiter::new(vec![q0, q1], liveness_for(2), &cfg);

        assert_eq!(arbiter.read_packet().unwrap().dts, Some(0));
        assert!(matches!(arbiter.read_packet(), Err(ReadError::EndOfStream)));
        assert_eq!(arbiter.active_source(), 0);
    }
}
