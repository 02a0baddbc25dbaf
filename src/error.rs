//! Error types for the switcher. The taxonomy follows spec.md §7: most
//! conditions here are routine control flow (queue closed, end of stream,
//! would-block) rather than failures, so only the handful of genuinely
//! exceptional cases go through `thiserror`.

use std::fmt;

/// Result of attempting to read the next packet from an external source.
/// Mirrors spec.md §4.2/§7's transient-stall / end-of-stream / fatal-error
/// taxonomy.
#[derive(Debug)]
pub enum SourceReadError {
    /// No data available right now (live-source stall or container EAGAIN).
    /// Not fatal; the reader retries without updating liveness.
    WouldBlock,
    /// The external demuxer returned a terminal end of stream.
    Eof,
    /// Unrecoverable demuxer error; the reader thread exits.
    Fatal(String),
}

impl fmt::Display for SourceReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceReadError::WouldBlock => write!(f, "would block"),
            SourceReadError::Eof => write!(f, "end of stream"),
            SourceReadError::Fatal(msg) => write!(f, "fatal source error: {msg}"),
        }
    }
}

impl std::error::Error for SourceReadError {}

/// `PacketQueue::put` outcome.
#[derive(Debug, PartialEq, Eq)]
pub enum PutError {
    /// The queue has been marked end-of-stream; the producer should exit.
    Closed,
}

/// `PacketQueue::get` outcome.
#[derive(Debug, PartialEq, Eq)]
pub enum GetError {
    /// The queue is empty and will never produce another packet.
    EndOfStream,
}

/// `PacketQueue::try_get` outcome.
#[derive(Debug, PartialEq, Eq)]
pub enum TryGetError {
    /// The queue is empty but may still produce packets later.
    WouldBlock,
    /// The queue is empty and will never produce another packet.
    EndOfStream,
}

/// Outcome of a call into the switch arbiter's read path. There is no
/// transient "try again" variant here: `SwitchArbiter::read_packet` already
/// retries internally (polling with a timeout) for every condition spec.md
/// §6 treats as retryable, so by the time it returns to the caller the
/// result is either a packet or this terminal condition.
#[derive(Debug)]
pub enum ReadError {
    /// All sources are exhausted; this is terminal.
    EndOfStream,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::EndOfStream => write!(f, "end of stream"),
        }
    }
}

impl std::error::Error for ReadError {}

/// Errors constructing or validating a [`crate::config::SwitcherConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("msw_sources must contain between 1 and {max} entries, got {got}")]
    SourceCountOutOfRange { got: usize, max: usize },
    #[error("msw_port {0} out of range 1024-65535")]
    PortOutOfRange(u32),
    #[error("msw_health_interval {0}ms out of range 100-10000")]
    HealthIntervalOutOfRange(u64),
    #[error("msw_source_timeout {0}ms out of range 1000-60000")]
    SourceTimeoutOutOfRange(u64),
    #[error("msw_grace_period {0}ms out of range 0-60000")]
    GracePeriodOutOfRange(u64),
    #[error("invalid open URL: {0}")]
    InvalidUrl(String),
}

/// Errors opening or operating the switcher as a whole.
#[derive(Debug, thiserror::Error)]
pub enum SwitcherError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no sources configured")]
    NoSources,
    #[error("expected {expected} sources to match config, got {got}")]
    SourceCountMismatch { expected: usize, got: usize },
    #[error("control plane failed to bind port {port}: {source}")]
    ControlBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by the control plane's mutating operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("source index {index} out of range 0..{num_sources}")]
    InvalidSource { index: i64, num_sources: usize },
}
