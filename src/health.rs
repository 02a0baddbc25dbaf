//! Health monitor: background thread implementing the two-stage failover
//! policy from spec.md §4.6.
//!
//! Stage 1 (primary failure): when the active source hasn't had a packet
//! *consumed* (dequeued and emitted by the arbiter, not merely received)
//! for longer than `source_timeout_ms`, switch to the reserved black-filler
//! source. Consumption, not reception, is the signal so a wedged
//! downstream consumer that stops reading doesn't get mistaken for a
//! healthy upstream. Stage 2 (recovery): once on black filler, keep
//! sweeping every other source by reception instead (nothing downstream is
//! consuming them yet); the first one that's healthy again becomes the
//! switch target, preferring the original primary (index 0) when more than
//! one has recovered.
//!
//! Manual switches suppress automatic failover for `manual_switch_grace_ms`
//! so an operator's choice isn't immediately overridden by the monitor.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::info;

use crate::arbiter::{SwitchArbiter, SwitchReason};
use crate::clock::now_ms;
use crate::config::SwitcherConfig;
use crate::source::SourceLiveness;

pub struct HealthMonitor {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Shared with the control plane so a manual switch can suppress automatic
/// failover for the grace window without the monitor and the HTTP handler
/// needing a direct reference to each other.
pub struct ManualOverride {
    last_manual_switch_ms: AtomicI64,
}

impl ManualOverride {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            last_manual_switch_ms: AtomicI64::new(i64::MIN),
        })
    }

    pub fn record(&self) {
        self.last_manual_switch_ms.store(now_ms(), Ordering::Release);
    }

    fn within_grace(&self, grace_ms: i64) -> bool {
        let last = self.last_manual_switch_ms.load(Ordering::Acquire);
        last != i64::MIN && now_ms() - last < grace_ms
    }
}

impl HealthMonitor {
    pub fn spawn(
        arbiter: Arc<SwitchArbiter>,
        liveness: Vec<Arc<SourceLiveness>>,
        manual_override: Arc<ManualOverride>,
        config: &SwitcherConfig,
    ) -> Self {
        if !config.auto_failover_enabled {
            info!("auto failover disabled; health monitor not started");
            return Self {
                shutdown: Arc::new(AtomicBool::new(true)),
                handle: None,
            };
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let interval = Duration::from_millis(config.health_check_interval_ms);
        let source_timeout_ms = config.source_timeout_ms as i64;
        let manual_switch_grace_ms = config.manual_switch_grace_ms;
        let startup_grace_ms = config.startup_grace_period_ms as i64;
        let black_index = config.black_source_index();
        let started_at = now_ms();

        let handle = std::thread::Builder::new()
            .name("mswitch-health".to_string())
            .spawn(move || {
                info!("health monitor starting, interval={interval:?}");
                while !thread_shutdown.load(Ordering::Acquire) {
                    std::thread::sleep(interval);
                    if thread_shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    if now_ms() - started_at < startup_grace_ms {
                        continue;
                    }
                    if manual_override.within_grace(manual_switch_grace_ms) {
                        continue;
                    }
                    if arbiter.has_pending_switch() {
                        continue;
                    }

                    let active = arbiter.active_source();
                    if active != black_index {
                        // Stage 1: is the active source still alive? Judged
                        // by consumption (packets actually dequeued for
                        // output), not reception, so a wedged consumer that
                        // stops calling read_packet isn't mistaken for a
                        // healthy upstream.
                        let consumption_idle = liveness[active].consumption_idle_ms();
                        if consumption_idle > source_timeout_ms {
                            info!(
                                "source {active} unconsumed for {consumption_idle}ms, exceeds {source_timeout_ms}ms timeout; failing over to black filler"
                            );
                            arbiter.request_switch(black_index, SwitchReason::AutoFailover);
                        }
                    } else {
                        // Stage 2: is a real source healthy again? Prefer
                        // the lowest index (closest to the original
                        // primary) among the ones that have recovered.
                        let recovered = liveness
                            .iter()
                            .enumerate()
                            .take(black_index)
                            .find(|(_, l)| l.is_running() && l.idle_ms() <= source_timeout_ms);
                        if let Some((index, _)) = recovered {
                            info!("source {index} recovered; switching back from black filler");
                            arbiter.request_switch(index, SwitchReason::Recovery);
                        }
                    }
                }
                info!("health monitor exiting");
            })
            .expect("failed to spawn health monitor thread");

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_override_tracks_grace_window() {
        let manual = ManualOverride::new();
        assert!(!manual.within_grace(1000));
        manual.record();
        assert!(manual.within_grace(1000));
    }
}
