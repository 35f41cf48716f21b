//! Non-blocking fan-out of processed frames to subscribers.
//!
//! Each subscriber gets its own bounded queue. When a queue is full the oldest
//! event is evicted to make room, so a slow consumer sees the most recent
//! frames and the producer never waits.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::detect::Detection;
use crate::engine::{DetectionMode, ModeParameters, ModeState};
use crate::frame::{BoundingBox, Frame};
use crate::stats::FrameStatistics;

/// Everything the consumer gets for one frame.
#[derive(Clone, Debug)]
pub struct FrameEvent {
    /// The annotated frame.
    pub frame: Frame,
    /// Computed on the frame before annotation.
    pub stats: FrameStatistics,
    pub fps: f64,
    /// Pipeline-wide sequence number.
    pub index: u64,
    pub mode: DetectionMode,
    pub state: ModeState,
    pub parameters: ModeParameters,
    pub tracked: Option<BoundingBox>,
    pub detections: Vec<Detection>,
}

struct Slot {
    tx: Sender<Arc<FrameEvent>>,
    /// Producer-side handle used to evict the oldest entry.
    evict: Receiver<Arc<FrameEvent>>,
    closed: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct EventPublisher {
    capacity: usize,
    slots: Arc<Mutex<Vec<Slot>>>,
    dropped: Arc<AtomicU64>,
    shut: Arc<AtomicBool>,
}

impl EventPublisher {
    /// `capacity` is the per-subscriber queue bound (at least 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Arc::new(Mutex::new(Vec::new())),
            dropped: Arc::new(AtomicU64::new(0)),
            shut: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = crossbeam_channel::bounded(self.capacity);
        let closed = Arc::new(AtomicBool::new(false));
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Late subscribers to a closed publisher see disconnection at once.
        if !self.shut.load(Ordering::Acquire) {
            slots.push(Slot {
                tx,
                evict: rx.clone(),
                closed: closed.clone(),
            });
        }
        Subscription { rx, closed }
    }

    /// Disconnect every subscriber. Queued events stay readable, after which
    /// `recv` returns `None`. Later publishes are discarded.
    pub fn close(&self) {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.shut.store(true, Ordering::Release);
        slots.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.shut.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        match self.slots.lock() {
            Ok(slots) => slots.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Events evicted from full queues since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Hand `event` to every live subscriber. Returns how many stale events
    /// were evicted to make room.
    pub fn publish(&self, event: FrameEvent) -> u64 {
        let event = Arc::new(event);
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.retain(|slot| !slot.closed.load(Ordering::Acquire));

        let mut evicted = 0;
        for slot in slots.iter() {
            let mut pending = event.clone();
            loop {
                match slot.tx.try_send(pending) {
                    Ok(()) => break,
                    Err(TrySendError::Full(back)) => {
                        if slot.evict.try_recv().is_ok() {
                            evicted += 1;
                        }
                        pending = back;
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }
        if evicted > 0 {
            self.dropped.fetch_add(evicted, Ordering::Relaxed);
            log::trace!("publish: evicted {} stale event(s)", evicted);
        }
        evicted
    }
}

/// Receiving end for one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    rx: Receiver<Arc<FrameEvent>>,
    closed: Arc<AtomicBool>,
}

impl Subscription {
    /// Block until an event arrives. `None` once the publisher is closed or
    /// gone and the queue is drained.
    pub fn recv(&self) -> Option<Arc<FrameEvent>> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Arc<FrameEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<FrameEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Events currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}
