//! Runs a switcher over two synthetic oscillating sources plus the
//! reserved black filler, printing each output packet's source/timestamp
//! and periodically dumping the status snapshot. Useful for exercising the
//! control plane by hand: `curl -X POST localhost:8099/switch/1`.

use std::time::Duration;

use mswitch_core::{BlackFillerSource, Packet, PacketSource, SourceReadError, Switcher, SwitcherConfig};

/// A fake live source: emits a keyframe every `gop_size`th packet, never
/// stalls, never ends.
struct OscillatingSource {
    label: &'static str,
    frame_interval: Duration,
    next_emit: std::time::Instant,
    counter: u64,
    gop_size: u64,
    pts_step: i64,
    next_pts: i64,
}

impl OscillatingSource {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            frame_interval: Duration::from_millis(33),
            next_emit: std::time::Instant::now(),
            counter: 0,
            gop_size: 15,
            pts_step: 3000,
            next_pts: 0,
        }
    }
}

impl PacketSource for OscillatingSource {
    fn read_packet(&mut self) -> Result<Packet, SourceReadError> {
        let now = std::time::Instant::now();
        if now < self.next_emit {
            std::thread::sleep(self.next_emit - now);
        }
        self.next_emit += self.frame_interval;

        let is_keyframe = self.counter % self.gop_size == 0;
        self.counter += 1;
        let pts = self.next_pts;
        self.next_pts += self.pts_step;

        let nal_type = if is_keyframe { 5 } else { 1 };
        let mut payload = vec![0, 0, 0, 1, nal_type];
        payload.extend_from_slice(self.label.as_bytes());

        let mut packet = Packet::new(payload, Some(pts), Some(pts), 0);
        packet.keyframe = is_keyframe;
        Ok(packet)
    }
}

fn main() {
    env_logger::init();

    let config = SwitcherConfig::new(vec!["feed-a".into(), "feed-b".into(), "black".into()])
        .expect("valid config");

    let sources: Vec<Box<dyn PacketSource>> = vec![
        Box::new(OscillatingSource::new("feed-a")),
        Box::new(OscillatingSource::new("feed-b")),
        Box::new(BlackFillerSource::at_30fps()),
    ];

    let switcher = Switcher::open(config, sources).expect("switcher opens");

    let mut count = 0u64;
    loop {
        match switcher.read_packet() {
            Ok(packet) => {
                count += 1;
                if count % 30 == 0 {
                    let status = switcher.snapshot();
                    println!(
                        "active={} dts={:?} packets={} status={:?}",
                        status.active_source, packet.dts, count, status
                    );
                }
            }
            Err(err) => {
                eprintln!("switcher stopped: {err}");
                break;
            }
        }
    }
}
