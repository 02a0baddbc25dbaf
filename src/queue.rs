//! Bounded blocking packet queue: one per source (spec.md §4.1).
//!
//! A single `Condvar` guards both "not empty" and "not full" wakeups, the
//! same shape as the original demuxer's `pthread_cond_t cond` pair collapsed
//! onto one queue-state mutex. Capacity and EOF are tracked inside the lock
//! so `put`/`get`/`try_get` never race a concurrent `close`.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{GetError, PutError, TryGetError};
use crate::packet::Packet;

struct State {
    packets: VecDeque<Packet>,
    eof: bool,
}

/// FIFO handoff between a [`crate::source::SourceReader`] and the
/// [`crate::arbiter::SwitchArbiter`]. Bounded: a slow consumer applies
/// backpressure to the reader rather than growing without limit.
pub struct PacketQueue {
    capacity: usize,
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                packets: VecDeque::with_capacity(capacity),
                eof: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Block until there's room, then push `packet`. Returns
    /// [`PutError::Closed`] without pushing if the queue has already been
    /// marked end-of-stream.
    pub fn put(&self, packet: Packet) -> Result<(), PutError> {
        let mut state = self.state.lock();
        loop {
            if state.eof {
                return Err(PutError::Closed);
            }
            if state.packets.len() < self.capacity {
                state.packets.push_back(packet);
                self.not_empty.notify_one();
                return Ok(());
            }
            self.not_full.wait(&mut state);
        }
    }

    /// Block until a packet is available or the queue reaches end-of-stream
    /// with nothing left buffered.
    pub fn get(&self) -> Result<Packet, GetError> {
        let mut state = self.state.lock();
        loop {
            if let Some(packet) = state.packets.pop_front() {
                self.not_full.notify_one();
                return Ok(packet);
            }
            if state.eof {
                return Err(GetError::EndOfStream);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Block until a packet is available or end-of-stream, but give up after
    /// `timeout` and report [`TryGetError::WouldBlock`] instead.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Packet, TryGetError> {
        let mut state = self.state.lock();
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(packet) = state.packets.pop_front() {
                self.not_full.notify_one();
                return Ok(packet);
            }
            if state.eof {
                return Err(TryGetError::EndOfStream);
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return Err(TryGetError::WouldBlock);
            }
            let timed_out = self.not_empty.wait_for(&mut state, deadline - now);
            if timed_out.timed_out() && state.packets.is_empty() && !state.eof {
                return Err(TryGetError::WouldBlock);
            }
        }
    }

    /// Non-blocking poll: returns immediately regardless of queue state.
    pub fn try_get(&self) -> Result<Packet, TryGetError> {
        let mut state = self.state.lock();
        if let Some(packet) = state.packets.pop_front() {
            self.not_full.notify_one();
            return Ok(packet);
        }
        if state.eof {
            Err(TryGetError::EndOfStream)
        } else {
            Err(TryGetError::WouldBlock)
        }
    }

    /// Mark end-of-stream. Already-buffered packets remain readable; future
    /// `put` calls fail and blocked `get`/`get_timeout` callers wake once the
    /// buffer drains.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.eof = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_eof(&self) -> bool {
        self.state.lock().eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn packet(n: i64) -> Packet {
        Packet::new(vec![0u8; 4], Some(n), Some(n), 0)
    }

    #[test]
    fn put_then_get_roundtrips() {
        let q = PacketQueue::new(4);
        q.put(packet(1)).unwrap();
        let p = q.get().unwrap();
        assert_eq!(p.pts, Some(1));
    }

    #[test]
    fn get_after_close_drains_then_eof() {
        let q = PacketQueue::new(4);
        q.put(packet(1)).unwrap();
        q.close();
        assert_eq!(q.get().unwrap().pts, Some(1));
        assert_eq!(q.get().unwrap_err(), GetError::EndOfStream);
    }

    #[test]
    fn put_after_close_fails() {
        let q = PacketQueue::new(4);
        q.close();
        assert_eq!(q.put(packet(1)).unwrap_err(), PutError::Closed);
    }

    #[test]
    fn try_get_would_block_on_empty_open_queue() {
        let q = PacketQueue::new(4);
        assert_eq!(q.try_get().unwrap_err(), TryGetError::WouldBlock);
    }

    #[test]
    fn blocking_put_wakes_on_consumer_drain() {
        let q = Arc::new(PacketQueue::new(1));
        q.put(packet(1)).unwrap();

        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || {
            q2.put(packet(2)).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.get().unwrap().pts, Some(1));
        handle.join().unwrap();
        assert_eq!(q.get().unwrap().pts, Some(2));
    }

    #[test]
    fn get_timeout_expires_on_empty_open_queue() {
        let q = PacketQueue::new(4);
        let err = q.get_timeout(Duration::from_millis(10)).unwrap_err();
        assert_eq!(err, TryGetError::WouldBlock);
    }
}
