//! Lock-free sample queue between the capture callback and the control thread
//!
//! The capture callback runs on a real-time audio thread and must never
//! block or wait on the control thread. A SPSC ring buffer gives it a
//! wait-free producer side; the control thread drains whole blocks from the
//! consumer side at its own pace.
//!
//! When the control thread falls behind and the ring fills up, new samples
//! are dropped and counted. Capture keeps running on the degraded data
//! rather than failing - overflow is non-fatal and only surfaces as a
//! warning with the dropped count.

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Producer half of the sample queue (owned by the capture callback)
pub struct QueueProducer {
    producer: ringbuf::HeapProd<i16>,
    dropped: Arc<AtomicU64>,
}

impl QueueProducer {
    /// Push a single sample, counting it as dropped if the ring is full.
    ///
    /// Lock-free and safe to call from the audio callback.
    #[inline]
    pub fn push(&mut self, sample: i16) {
        if self.producer.try_push(sample).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Consumer half of the sample queue (owned by the control thread)
pub struct QueueConsumer {
    consumer: ringbuf::HeapCons<i16>,
    dropped: Arc<AtomicU64>,
}

impl QueueConsumer {
    /// Move samples into `out` until it holds `target` samples or the ring
    /// runs dry, whichever comes first.
    pub fn pop_into(&mut self, out: &mut Vec<i16>, target: usize) {
        while out.len() < target {
            match self.consumer.try_pop() {
                Some(sample) => out.push(sample),
                None => break,
            }
        }
    }

    /// Samples dropped to overflow since the last call. Resets the counter.
    pub fn take_dropped(&mut self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

/// Create a queue with room for `capacity` samples, returning both halves.
pub fn sample_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let rb = HeapRb::<i16>::new(capacity);
    let (prod, cons) = rb.split();

    let dropped = Arc::new(AtomicU64::new(0));

    (
        QueueProducer {
            producer: prod,
            dropped: Arc::clone(&dropped),
        },
        QueueConsumer {
            consumer: cons,
            dropped,
        },
    )
}
