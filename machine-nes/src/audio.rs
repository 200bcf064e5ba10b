//! Bounded audio sample queue.
//!
//! The single synchronization point between the emulation thread (producer)
//! and the audio thread (consumer). Both ends block: a full queue paces the
//! emulation to the audio clock, an empty queue parks the audio thread.
//! Shutdown wakes every waiter without enqueuing anything.

use std::sync::{Condvar, Mutex};

/// Queue capacity in samples (~93 ms at 44.1 kHz).
pub const AUDIO_QUEUE_CAPACITY: usize = 4096;

struct Ring {
    buf: Vec<f64>,
    read: usize,
    write: usize,
    count: usize,
    shutdown: bool,
}

/// Blocking bounded sample queue.
pub struct SampleQueue {
    ring: Mutex<Ring>,
    readable: Condvar,
    writable: Condvar,
}

impl SampleQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(Ring {
                buf: vec![0.0; AUDIO_QUEUE_CAPACITY],
                read: 0,
                write: 0,
                count: 0,
                shutdown: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// Enqueue one sample, blocking while the queue is full. Dropped
    /// silently after shutdown.
    pub fn push(&self, sample: f64) {
        let mut ring = self.ring.lock().unwrap();
        while ring.count == ring.buf.len() && !ring.shutdown {
            ring = self.writable.wait(ring).unwrap();
        }
        if ring.shutdown {
            return;
        }
        let write = ring.write;
        ring.buf[write] = sample;
        ring.write = (write + 1) % AUDIO_QUEUE_CAPACITY;
        ring.count += 1;
        self.readable.notify_one();
    }

    /// Dequeue one sample, blocking while the queue is empty. Returns
    /// `None` once the queue is shut down and drained.
    pub fn pop(&self) -> Option<f64> {
        let mut ring = self.ring.lock().unwrap();
        while ring.count == 0 && !ring.shutdown {
            ring = self.readable.wait(ring).unwrap();
        }
        if ring.count == 0 {
            return None;
        }
        let sample = ring.buf[ring.read];
        ring.read = (ring.read + 1) % AUDIO_QUEUE_CAPACITY;
        ring.count -= 1;
        self.writable.notify_one();
        Some(sample)
    }

    /// Wake both ends; subsequent pushes are dropped and pops drain then
    /// return `None`.
    pub fn shutdown(&self) {
        let mut ring = self.ring.lock().unwrap();
        ring.shutdown = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Discard all queued samples (reset, or headless runs with no
    /// consumer).
    pub fn drain(&self) {
        let mut ring = self.ring.lock().unwrap();
        ring.read = 0;
        ring.write = 0;
        ring.count = 0;
        self.writable.notify_all();
    }

    /// Samples currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.lock().unwrap().count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}
