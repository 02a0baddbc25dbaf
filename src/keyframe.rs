//! H.264 Annex-B keyframe detection (spec.md §4.3).
//!
//! A container-level keyframe flag can be lost (common across certain UDP
//! transports), so the arbiter re-derives "is this an IDR access unit" by
//! scanning for NAL unit types 5 (IDR slice), 7 (SPS) and 8 (PPS) after
//! 3-byte or 4-byte Annex-B start codes, matching the original demuxer's
//! `is_keyframe_packet`.

const NAL_TYPE_MASK: u8 = 0x1f;
const NAL_IDR_SLICE: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;

/// Scan `payload` for an Annex-B start code followed by an IDR/SPS/PPS NAL
/// unit. Returns `true` as soon as one is found.
pub fn is_keyframe(payload: &[u8]) -> bool {
    let mut i = 0;
    while i + 3 < payload.len() {
        let (start_code_len, found) = if payload[i] == 0 && payload[i + 1] == 0 && payload[i + 2] == 1 {
            (3, true)
        } else if i + 4 < payload.len()
            && payload[i] == 0
            && payload[i + 1] == 0
            && payload[i + 2] == 0
            && payload[i + 3] == 1
        {
            (4, true)
        } else {
            (0, false)
        };

        if found {
            let nal_header_idx = i + start_code_len;
            if nal_header_idx >= payload.len() {
                break;
            }
            let nal_type = payload[nal_header_idx] & NAL_TYPE_MASK;
            if nal_type == NAL_IDR_SLICE || nal_type == NAL_SPS || nal_type == NAL_PPS {
                return true;
            }
            i += start_code_len;
        } else {
            i += 1;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_idr_with_4_byte_start_code() {
        let mut payload = vec![0, 0, 0, 1, NAL_IDR_SLICE];
        payload.extend_from_slice(&[1, 2, 3, 4]);
        assert!(is_keyframe(&payload));
    }

    #[test]
    fn detects_sps_with_3_byte_start_code() {
        let payload = vec![0, 0, 1, NAL_SPS, 0x42, 0x00, 0x1e];
        assert!(is_keyframe(&payload));
    }

    #[test]
    fn detects_pps() {
        let payload = vec![0, 0, 0, 1, NAL_PPS, 0xce];
        assert!(is_keyframe(&payload));
    }

    #[test]
    fn non_iframe_slice_is_not_a_keyframe() {
        // NAL type 1 = non-IDR slice
        let payload = vec![0, 0, 0, 1, 1, 0xab, 0xcd];
        assert!(!is_keyframe(&payload));
    }

    #[test]
    fn empty_or_tiny_payload_is_not_a_keyframe() {
        assert!(!is_keyframe(&[]));
        assert!(!is_keyframe(&[0, 0, 1]));
    }

    #[test]
    fn finds_idr_after_leading_garbage() {
        let mut payload = vec![0xff, 0xee, 0xdd];
        payload.extend_from_slice(&[0, 0, 1, NAL_IDR_SLICE, 0x88]);
        assert!(is_keyframe(&payload));
    }
}
