//! The packet type that flows from sources through the switcher to the
//! downstream consumer. Deliberately opaque about codec/container details —
//! demuxing is an external collaborator's job (see [`crate::source::PacketSource`]).

/// A single media packet with enough metadata for the switcher to reason
/// about switch boundaries and timestamp continuity, but no opinion on the
/// payload's codec.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Encoded payload bytes, as handed back by the external demuxer.
    pub payload: Vec<u8>,
    /// Presentation timestamp in the source's time base, if known.
    pub pts: Option<i64>,
    /// Decode timestamp in the source's time base, if known.
    pub dts: Option<i64>,
    /// Container-level keyframe flag. May be unset even for a true keyframe
    /// (e.g. lost across a UDP boundary) — see [`crate::keyframe`].
    pub keyframe: bool,
    /// Index of the elementary stream this packet belongs to, as assigned by
    /// the external demuxer.
    pub stream_index: i32,
}

impl Packet {
    /// Construct a packet with the keyframe flag unset; callers that know
    /// the flag should set `keyframe` directly.
    pub fn new(payload: Vec<u8>, pts: Option<i64>, dts: Option<i64>, stream_index: i32) -> Self {
        Self {
            payload,
            pts,
            dts,
            keyframe: false,
            stream_index,
        }
    }
}
