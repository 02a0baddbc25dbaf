//! Source ingest: the external-demuxer boundary and the reader thread that
//! pumps it into a [`PacketQueue`] (spec.md §4.2).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info, warn};

use crate::clock::now_ms;
use crate::error::{PutError, SourceReadError};
use crate::packet::Packet;
use crate::queue::PacketQueue;

/// The demuxer collaborator a source reader pulls packets from. Implemented
/// by whatever actually speaks the source's transport/container — this
/// crate only consumes the trait.
pub trait PacketSource: Send {
    /// Read the next packet. Implementations should not block longer than
    /// necessary to determine [`SourceReadError::WouldBlock`] vs genuine
    /// data; the reader thread loops on `WouldBlock`.
    fn read_packet(&mut self) -> Result<Packet, SourceReadError>;
}

/// Liveness and diagnostics for one source, shared between the reader
/// thread, the switch arbiter and the health monitor.
///
/// Two independent clocks are tracked deliberately: `last_packet_at_ms`
/// (reception — did the external source hand us a packet recently) and
/// `last_consumed_at_ms` (consumption — did the arbiter actually dequeue
/// and emit one recently). spec.md §4.6 judges the *active* source's
/// health by consumption, not reception, so a wedged downstream consumer
/// that stops calling `read_packet` isn't mistaken for a healthy upstream;
/// inactive sources are judged by reception, since nothing is consuming
/// them at all.
pub struct SourceLiveness {
    last_packet_at_ms: AtomicI64,
    last_consumed_at_ms: AtomicI64,
    packets_read: AtomicI64,
    running: AtomicBool,
}

impl SourceLiveness {
    pub fn new() -> Self {
        let now = now_ms();
        Self {
            last_packet_at_ms: AtomicI64::new(now),
            last_consumed_at_ms: AtomicI64::new(now),
            packets_read: AtomicI64::new(0),
            running: AtomicBool::new(true),
        }
    }

    /// Milliseconds since the last packet was successfully received from
    /// the external source, or since the reader started if none have
    /// arrived yet.
    pub fn idle_ms(&self) -> i64 {
        now_ms() - self.last_packet_at_ms.load(Ordering::Acquire)
    }

    /// Milliseconds since a packet from this source was last dequeued and
    /// emitted by the switch arbiter.
    pub fn consumption_idle_ms(&self) -> i64 {
        now_ms() - self.last_consumed_at_ms.load(Ordering::Acquire)
    }

    pub fn packets_read(&self) -> i64 {
        self.packets_read.load(Ordering::Relaxed)
    }

    /// Whether the reader thread is still pumping this source.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn record_packet(&self) {
        self.last_packet_at_ms.store(now_ms(), Ordering::Release);
        self.packets_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Stamped by the switch arbiter whenever it dequeues and emits a
    /// packet from this source.
    pub fn record_consumption(&self) {
        self.last_consumed_at_ms.store(now_ms(), Ordering::Release);
    }

    fn mark_stopped(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Default for SourceLiveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the reader thread for one source: pulls packets from a
/// [`PacketSource`] and pushes them into a [`PacketQueue`] until EOF, a
/// fatal error, or [`SourceReader::stop`].
pub struct SourceReader {
    pub index: usize,
    pub label: String,
    pub queue: Arc<PacketQueue>,
    pub liveness: Arc<SourceLiveness>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SourceReader {
    pub fn spawn(
        index: usize,
        label: String,
        mut source: Box<dyn PacketSource>,
        queue_capacity: usize,
    ) -> Self {
        let queue = Arc::new(PacketQueue::new(queue_capacity));
        let liveness = Arc::new(SourceLiveness::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_queue = Arc::clone(&queue);
        let thread_liveness = Arc::clone(&liveness);
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_label = label.clone();

        let handle = std::thread::Builder::new()
            .name(format!("mswitch-reader-{index}"))
            .spawn(move || {
                info!("source {index} ({thread_label}): reader thread starting");
                loop {
                    if thread_shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    match source.read_packet() {
                        Ok(packet) => {
                            thread_liveness.record_packet();
                            match thread_queue.put(packet) {
                                Ok(()) => {}
                                Err(PutError::Closed) => break,
                            }
                        }
                        Err(SourceReadError::WouldBlock) => {
                            debug!("source {index} ({thread_label}): would block");
                            std::thread::yield_now();
                        }
                        Err(SourceReadError::Eof) => {
                            info!("source {index} ({thread_label}): end of stream");
                            break;
                        }
                        Err(SourceReadError::Fatal(msg)) => {
                            warn!("source {index} ({thread_label}): fatal error: {msg}");
                            break;
                        }
                    }
                }
                thread_queue.close();
                thread_liveness.mark_stopped();
                info!("source {index} ({thread_label}): reader thread exiting");
            })
            .expect("failed to spawn source reader thread");

        Self {
            index,
            label,
            queue,
            liveness,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal the reader thread to stop and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.queue.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SourceReader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct ScriptedSource {
        packets: StdMutex<Vec<Result<Packet, SourceReadError>>>,
    }

    impl PacketSource for ScriptedSource {
        fn read_packet(&mut self) -> Result<Packet, SourceReadError> {
            let mut packets = self.packets.lock().unwrap();
            if packets.is_empty() {
                Err(SourceReadError::Eof)
            } else {
                packets.remove(0)
            }
        }
    }

    #[test]
    fn reads_packets_until_eof_then_closes_queue() {
        let scripted = ScriptedSource {
            packets: StdMutex::new(vec![
                Ok(Packet::new(vec![1], Some(0), Some(0), 0)),
                Ok(Packet::new(vec![2], Some(1), Some(1), 0)),
            ]),
        };
        let mut reader = SourceReader::spawn(0, "test".into(), Box::new(scripted), 8);
        let queue = Arc::clone(&reader.queue);

        assert_eq!(queue.get().unwrap().payload, vec![1]);
        assert_eq!(queue.get().unwrap().payload, vec![2]);
        assert!(queue.get().is_err());

        reader.stop();
        assert!(!reader.liveness.is_running());
    }

    #[test]
    fn stop_is_idempotent() {
        let scripted = ScriptedSource {
            packets: StdMutex::new(vec![]),
        };
        let mut reader = SourceReader::spawn(0, "test".into(), Box::new(scripted), 8);
        reader.stop();
        reader.stop();
    }
}
