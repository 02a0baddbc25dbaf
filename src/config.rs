//! Switcher configuration: the enumerated options from spec.md §3/§6.
//!
//! Parsing the CLI/open-URL form is an external concern (spec.md's
//! Non-goals), but the resulting option set is still a first-class,
//! independently constructible and validated type — see
//! [`SwitcherConfig::from_open_url`] for the one bit of URL parsing we do
//! own: turning `mswitchdirect://...` query parameters into this struct.

use crate::error::ConfigError;

pub const MAX_SOURCES: usize = 10;

/// Default control-plane TCP port.
pub const DEFAULT_CONTROL_PORT: u16 = 8099;
/// Default health-check sweep interval.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 2000;
/// Default time without consumption before an active source is unhealthy.
pub const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 5000;
/// Default startup grace period before health checks begin.
pub const DEFAULT_STARTUP_GRACE_PERIOD_MS: u64 = 0;
/// Packet queue depth: ~3s at 30fps, one GOP plus margin (spec.md §2/§3).
pub const DEFAULT_QUEUE_CAPACITY: usize = 90;
/// Keyframe-wait timeout fallback (spec.md §4.4).
pub const DEFAULT_SWITCH_TIMEOUT_MS: i64 = 3000;
/// Post-manual-switch grace period during which the monitor won't revert
/// the choice, and EOF on the active queue is treated as "still buffering"
/// (spec.md §4.4, §4.6).
pub const DEFAULT_MANUAL_SWITCH_GRACE_MS: i64 = 3000;
/// Timestamp reanchoring threshold, in the packet's own time-base ticks
/// (spec.md §4.5 uses 90000 ticks ~= 1s at a 90kHz time base).
pub const DEFAULT_TS_REANCHOR_THRESHOLD: i64 = 90_000;

/// The full, validated option set for a [`crate::switcher::Switcher`].
#[derive(Debug, Clone)]
pub struct SwitcherConfig {
    /// Ordered source URLs; the last entry is the reserved black-filler
    /// source (spec.md §3).
    pub sources: Vec<String>,
    /// TCP port for the HTTP control plane, or `0` to disable it entirely.
    pub control_port: u16,
    pub auto_failover_enabled: bool,
    pub health_check_interval_ms: u64,
    pub source_timeout_ms: u64,
    pub startup_grace_period_ms: u64,
    pub queue_capacity: usize,
    pub switch_timeout_ms: i64,
    pub manual_switch_grace_ms: i64,
    pub ts_reanchor_threshold: i64,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            control_port: DEFAULT_CONTROL_PORT,
            auto_failover_enabled: true,
            health_check_interval_ms: DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            source_timeout_ms: DEFAULT_SOURCE_TIMEOUT_MS,
            startup_grace_period_ms: DEFAULT_STARTUP_GRACE_PERIOD_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            switch_timeout_ms: DEFAULT_SWITCH_TIMEOUT_MS,
            manual_switch_grace_ms: DEFAULT_MANUAL_SWITCH_GRACE_MS,
            ts_reanchor_threshold: DEFAULT_TS_REANCHOR_THRESHOLD,
        }
    }
}

impl SwitcherConfig {
    /// Build a config from an ordered source list, applying defaults to
    /// everything else, and validating ranges per the Options table in
    /// spec.md §6.
    pub fn new(sources: Vec<String>) -> Result<Self, ConfigError> {
        let cfg = Self {
            sources,
            ..Default::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Index of the reserved black-filler source (always the last entry).
    pub fn black_source_index(&self) -> usize {
        self.num_sources() - 1
    }

    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() || self.sources.len() > MAX_SOURCES {
            return Err(ConfigError::SourceCountOutOfRange {
                got: self.sources.len(),
                max: MAX_SOURCES,
            });
        }
        // Port 0 is a sentinel meaning "don't start the HTTP control
        // plane" (handy for embedding or for tests); any other value must
        // fall in the usual unprivileged range.
        if self.control_port != 0 && !(1024..=65535).contains(&(self.control_port as u32)) {
            return Err(ConfigError::PortOutOfRange(self.control_port as u32));
        }
        if !(100..=10_000).contains(&self.health_check_interval_ms) {
            return Err(ConfigError::HealthIntervalOutOfRange(
                self.health_check_interval_ms,
            ));
        }
        if !(1_000..=60_000).contains(&self.source_timeout_ms) {
            return Err(ConfigError::SourceTimeoutOutOfRange(self.source_timeout_ms));
        }
        if self.startup_grace_period_ms > 60_000 {
            return Err(ConfigError::GracePeriodOutOfRange(
                self.startup_grace_period_ms,
            ));
        }
        Ok(())
    }

    /// Parse the `mswitchdirect://localhost?msw_sources=...&msw_port=...`
    /// open-URL form from spec.md §6. Only the query string is inspected;
    /// scheme/host are accepted as-is since the actual transport binding is
    /// external to this crate.
    pub fn from_open_url(url: &str) -> Result<Self, ConfigError> {
        let query = url
            .split_once('?')
            .map(|(_, q)| q)
            .ok_or_else(|| ConfigError::InvalidUrl(url.to_string()))?;

        let mut cfg = Self::default();
        let mut sources: Option<Vec<String>> = None;

        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urldecode(value);
            match key {
                "msw_sources" => {
                    sources = Some(value.split(',').map(|s| s.to_string()).collect());
                }
                "msw_port" => {
                    cfg.control_port = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
                }
                "msw_auto_failover" => {
                    cfg.auto_failover_enabled = value != "0";
                }
                "msw_health_interval" => {
                    cfg.health_check_interval_ms = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
                }
                "msw_source_timeout" => {
                    cfg.source_timeout_ms = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
                }
                "msw_grace_period" => {
                    cfg.startup_grace_period_ms = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
                }
                _ => {}
            }
        }

        cfg.sources = sources.ok_or_else(|| ConfigError::InvalidUrl(url.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Minimal percent-decoding for the handful of characters likely to appear
/// in a `msw_sources` URL list (`:`, `/`, `,`).
fn urldecode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hi = chars.next();
            let lo = chars.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                if let Ok(byte) = u8::from_str_radix(&format!("{hi}{lo}"), 16) {
                    out.push(byte as char);
                    continue;
                }
            }
            out.push('%');
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = SwitcherConfig::new(vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(cfg.control_port, 8099);
        assert!(cfg.auto_failover_enabled);
        assert_eq!(cfg.health_check_interval_ms, 2000);
        assert_eq!(cfg.source_timeout_ms, 5000);
        assert_eq!(cfg.startup_grace_period_ms, 0);
    }

    #[test]
    fn rejects_too_many_sources() {
        let sources = (0..11).map(|i| format!("s{i}")).collect();
        assert!(matches!(
            SwitcherConfig::new(sources),
            Err(ConfigError::SourceCountOutOfRange { got: 11, max: 10 })
        ));
    }

    #[test]
    fn rejects_empty_sources() {
        assert!(SwitcherConfig::new(vec![]).is_err());
    }

    #[test]
    fn black_source_is_last() {
        let cfg = SwitcherConfig::new(vec!["a".into(), "b".into(), "black".into()]).unwrap();
        assert_eq!(cfg.black_source_index(), 2);
    }

    #[test]
    fn parses_open_url() {
        let url = "mswitchdirect://localhost?msw_sources=udp://1,udp://2,color=black&msw_port=9100&msw_auto_failover=0&msw_health_interval=500&msw_source_timeout=3000&msw_grace_period=1000";
        let cfg = SwitcherConfig::from_open_url(url).unwrap();
        assert_eq!(cfg.sources, vec!["udp://1", "udp://2", "color=black"]);
        assert_eq!(cfg.control_port, 9100);
        assert!(!cfg.auto_failover_enabled);
        assert_eq!(cfg.health_check_interval_ms, 500);
        assert_eq!(cfg.source_timeout_ms, 3000);
        assert_eq!(cfg.startup_grace_period_ms, 1000);
    }

    #[test]
    fn rejects_url_without_query() {
        assert!(SwitcherConfig::from_open_url("mswitchdirect://localhost").is_err());
    }
}
