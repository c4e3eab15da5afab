//! Single-producer single-consumer ring of decoded audio.
//!
//! The decode thread owns the [`RingProducer`], the output thread owns the
//! [`RingConsumer`]. Samples are interleaved in the device layout and always
//! move in whole frames, so the consumer never sees a frame split across two
//! reads. The ring itself is `ringbuf`'s lock-free `HeapRb`.
//!
//! Only the consumer may discard buffered audio. After a seek the producer
//! calls [`RingProducer::request_flush`] and stops pushing until the consumer
//! has serviced the request on its next tick.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug)]
struct RingShared {
    channels: usize,
    capacity_frames: usize,
    buffered_samples: AtomicUsize,
    flush_requested: AtomicBool,
}

/// Create a ring holding `capacity_frames` frames of `channels` interleaved samples.
pub fn sample_ring(capacity_frames: usize, channels: u16) -> (RingProducer, RingConsumer) {
    let channels = channels.max(1) as usize;
    let capacity_frames = capacity_frames.max(1);
    let rb = HeapRb::<f32>::new(capacity_frames * channels);
    let (producer, consumer) = rb.split();
    let shared = Arc::new(RingShared {
        channels,
        capacity_frames,
        buffered_samples: AtomicUsize::new(0),
        flush_requested: AtomicBool::new(false),
    });

    (
        RingProducer {
            inner: producer,
            shared: shared.clone(),
        },
        RingConsumer {
            inner: consumer,
            shared,
        },
    )
}

pub struct RingProducer {
    inner: HeapProd<f32>,
    shared: Arc<RingShared>,
}

impl RingProducer {
    /// Push as many whole frames from `samples` as fit. Returns samples written.
    ///
    /// Returns 0 while a flush is pending.
    pub fn push_frames(&mut self, samples: &[f32]) -> usize {
        if self.flush_pending() {
            return 0;
        }
        let channels = self.shared.channels;
        let fit = (self.inner.vacant_len() / channels) * channels;
        let whole = (samples.len() / channels) * channels;
        let count = fit.min(whole);
        if count == 0 {
            return 0;
        }
        let written = self.inner.push_slice(&samples[..count]);
        self.shared
            .buffered_samples
            .fetch_add(written, Ordering::AcqRel);
        written
    }

    pub fn vacant_frames(&self) -> usize {
        self.inner.vacant_len() / self.shared.channels
    }

    /// Ask the consumer to drop everything currently buffered.
    pub fn request_flush(&self) {
        self.shared.flush_requested.store(true, Ordering::Release);
    }

    pub fn flush_pending(&self) -> bool {
        self.shared.flush_requested.load(Ordering::Acquire)
    }

    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            shared: self.shared.clone(),
        }
    }
}

pub struct RingConsumer {
    inner: HeapCons<f32>,
    shared: Arc<RingShared>,
}

impl RingConsumer {
    /// Fill `out` with whole frames. Returns the number of frames read; the
    /// rest of `out` is left untouched.
    pub fn pop_frames(&mut self, out: &mut [f32]) -> usize {
        let channels = self.shared.channels;
        let available = (self.inner.occupied_len() / channels) * channels;
        let wanted = (out.len() / channels) * channels;
        let count = available.min(wanted);
        if count == 0 {
            return 0;
        }
        let read = self.inner.pop_slice(&mut out[..count]);
        self.shared.buffered_samples.fetch_sub(read, Ordering::AcqRel);
        read / channels
    }

    /// Drop buffered audio if the producer asked for it. Returns true if a
    /// flush was serviced.
    pub fn service_flush(&mut self) -> bool {
        if !self.shared.flush_requested.load(Ordering::Acquire) {
            return false;
        }
        let cleared = self.inner.clear();
        self.shared
            .buffered_samples
            .fetch_sub(cleared, Ordering::AcqRel);
        self.shared.flush_requested.store(false, Ordering::Release);
        true
    }

    pub fn flush_pending(&self) -> bool {
        self.shared.flush_requested.load(Ordering::Acquire)
    }

    pub fn buffered_frames(&self) -> usize {
        self.inner.occupied_len() / self.shared.channels
    }

    pub fn channels(&self) -> usize {
        self.shared.channels
    }
}

/// Read-only view of ring occupancy for threads that own neither end.
#[derive(Debug, Clone)]
pub struct RingMonitor {
    shared: Arc<RingShared>,
}

impl RingMonitor {
    pub fn buffered_frames(&self) -> usize {
        self.shared.buffered_samples.load(Ordering::Acquire) / self.shared.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.capacity_frames
    }
}
