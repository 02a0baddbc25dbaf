//! The top-level capability handle tying sources, the arbiter, the health
//! monitor and the control plane together (spec.md §3, redesign flag
//! R-1: no process-global singleton — callers hold an `Arc<Switcher>`).

use std::sync::Arc;

use log::info;
use serde::Serialize;

use crate::arbiter::{SwitchArbiter, SwitchReason};
use crate::config::SwitcherConfig;
use crate::control::console::ConsoleController;
use crate::control::http::ControlPlane;
use crate::error::{ControlError, ReadError, SwitcherError};
use crate::health::{HealthMonitor, ManualOverride};
use crate::packet::Packet;
use crate::source::{PacketSource, SourceLiveness, SourceReader};

/// Per-source status, as exposed via `GET /status` (spec.md §5 minimal
/// payload, enriched per SPEC_FULL.md §5 with a per-source breakdown).
#[derive(Debug, Serialize)]
pub struct SourceStatus {
    pub index: usize,
    pub label: String,
    pub active: bool,
    pub running: bool,
    pub idle_ms: i64,
    pub packets_read: i64,
    pub queue_depth: usize,
}

#[derive(Debug, Serialize)]
pub struct SwitcherStatus {
    pub active_source: usize,
    pub num_sources: usize,
    pub sources: Vec<SourceStatus>,
}

/// Owns every source reader, the arbiter, and the background threads that
/// drive failover and the control plane. Constructed once per switched
/// stream; `Arc<Switcher>` is the shared handle passed to the control
/// plane and to callers pulling output packets.
pub struct Switcher {
    config: SwitcherConfig,
    readers: Vec<SourceReader>,
    arbiter: Arc<SwitchArbiter>,
    manual_override: Arc<ManualOverride>,
    health_monitor: std::sync::Mutex<Option<HealthMonitor>>,
    control_plane: std::sync::Mutex<Option<ControlPlane>>,
    console: std::sync::Mutex<Option<ConsoleController>>,
}

impl Switcher {
    /// Build a switcher from already-connected sources. `sources` must be
    /// the same length and order as `config.sources`; the last one is
    /// treated as the reserved black-filler source.
    pub fn open(
        config: SwitcherConfig,
        sources: Vec<Box<dyn PacketSource>>,
    ) -> Result<Arc<Self>, SwitcherError> {
        config.validate().map_err(SwitcherError::Config)?;
        if sources.is_empty() {
            return Err(SwitcherError::NoSources);
        }
        if sources.len() != config.num_sources() {
            return Err(SwitcherError::SourceCountMismatch {
                expected: config.num_sources(),
                got: sources.len(),
            });
        }

        let mut readers = Vec::with_capacity(sources.len());
        for (index, source) in sources.into_iter().enumerate() {
            let label = config.sources[index].clone();
            readers.push(SourceReader::spawn(index, label, source, config.queue_capacity));
        }

        let queues = readers.iter().map(|r| Arc::clone(&r.queue)).collect();
        let arbiter_liveness: Vec<_> = readers.iter().map(|r| Arc::clone(&r.liveness)).collect();
        let arbiter = Arc::new(SwitchArbiter::new(queues, arbiter_liveness, &config));
        let manual_override = ManualOverride::new();

        let switcher = Arc::new(Self {
            config,
            readers,
            arbiter,
            manual_override,
            health_monitor: std::sync::Mutex::new(None),
            control_plane: std::sync::Mutex::new(None),
            console: std::sync::Mutex::new(None),
        });

        let liveness: Vec<_> = switcher.readers.iter().map(|r| Arc::clone(&r.liveness)).collect();
        let health_monitor = HealthMonitor::spawn(
            Arc::clone(&switcher.arbiter),
            liveness,
            Arc::clone(&switcher.manual_override),
            &switcher.config,
        );
        *switcher.health_monitor.lock().unwrap() = Some(health_monitor);

        if switcher.config.control_port != 0 {
            let control_plane = ControlPlane::spawn(Arc::clone(&switcher))
                .map_err(|source| SwitcherError::ControlBind {
                    port: switcher.config.control_port,
                    source,
                })?;
            *switcher.control_plane.lock().unwrap() = Some(control_plane);
        }

        *switcher.console.lock().unwrap() = Some(ConsoleController::spawn(Arc::clone(&switcher)));

        info!(
            "switcher open: {} sources, control plane on port {}",
            switcher.config.num_sources(),
            switcher.config.control_port
        );
        Ok(switcher)
    }

    /// Pull the next output packet (spec.md §4.4's consumer-facing API).
    pub fn read_packet(&self) -> Result<Packet, ReadError> {
        self.arbiter.read_packet()
    }

    /// Request a switch to `index`, as if issued by an operator
    /// (`POST /switch/<N>`, the console, or any other caller of this
    /// capability handle directly). A [`SwitchReason::Manual`] switch is
    /// immediate and unconditional (spec.md §4.7): it bypasses the
    /// keyframe wait entirely and the very next packet `read_packet`
    /// returns comes from `index`. Automatic reasons still go through the
    /// keyframe-gated pending mechanism.
    pub fn switch_to(&self, index: i64, reason: SwitchReason) -> Result<(), ControlError> {
        let num_sources = self.config.num_sources();
        if index < 0 || index as usize >= num_sources {
            return Err(ControlError::InvalidSource { index, num_sources });
        }
        if reason == SwitchReason::Manual {
            self.manual_override.record();
            self.arbiter.switch_immediate(index as usize, reason);
        } else {
            self.arbiter.request_switch(index as usize, reason);
        }
        Ok(())
    }

    pub fn active_source(&self) -> usize {
        self.arbiter.active_source()
    }

    pub fn config(&self) -> &SwitcherConfig {
        &self.config
    }

    /// Non-HTTP capability exposure of the same status `GET /status`
    /// returns, for embedders that don't want to go through the control
    /// plane (SPEC_FULL.md §5).
    pub fn snapshot(&self) -> SwitcherStatus {
        let active = self.active_source();
        let sources = self
            .readers
            .iter()
            .map(|r| SourceStatus {
                index: r.index,
                label: r.label.clone(),
                active: r.index == active,
                running: r.liveness.is_running(),
                idle_ms: r.liveness.idle_ms(),
                packets_read: r.liveness.packets_read(),
                queue_depth: r.queue.len(),
            })
            .collect();
        SwitcherStatus {
            active_source: active,
            num_sources: self.config.num_sources(),
            sources,
        }
    }

    /// Shut down reader threads, the health monitor, the control plane and
    /// the console listener. Idempotent; also run on `Drop`.
    pub fn close(&self) {
        if let Some(mut monitor) = self.health_monitor.lock().unwrap().take() {
            monitor.stop();
        }
        if let Some(plane) = self.control_plane.lock().unwrap().take() {
            plane.stop();
        }
        if let Some(console) = self.console.lock().unwrap().take() {
            console.stop();
        }
    }
}

impl Drop for Switcher {
    fn drop(&mut self) {
        self.close();
    }
}
