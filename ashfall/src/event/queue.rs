use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use super::Event;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded MPMC FIFO of events. The producers can never be back-pressured
/// (the upstream keeps replicating and the simulation must not stall), so
/// overflow drops the *oldest* entries to admit the new batch. Drops are
/// counted and logged, nothing else.
pub struct EventQueue {
    inner: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

struct QueueState {
    events: VecDeque<Event>,
    closed: bool,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            inner: Mutex::new(QueueState {
                events: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, event: Event) {
        self.push_batch(vec![event]);
    }

    /// Admit a batch, shedding the oldest queued events first when the
    /// result would exceed capacity. Events whose payload does not match
    /// their kind are skipped rather than propagated.
    pub fn push_batch(&self, events: Vec<Event>) {
        let mut state = self.inner.lock();
        if state.closed {
            return;
        }

        let mut admitted = 0usize;
        for event in events {
            if !event.payload_matches_kind() {
                log::error!(
                    "skipping event {:?} with mismatched payload",
                    event.kind
                );
                continue;
            }
            state.events.push_back(event);
            admitted += 1;
        }

        let mut shed = 0u64;
        while state.events.len() > self.capacity {
            state.events.pop_front();
            shed += 1;
        }
        if shed > 0 {
            let total = self.dropped.fetch_add(shed, Ordering::Relaxed) + shed;
            log::warn!("event queue over capacity, dropped {shed} oldest (total {total})");
        }

        drop(state);
        if admitted == 1 {
            self.available.notify_one();
        } else if admitted > 1 {
            self.available.notify_all();
        }
    }

    /// Block until an event is available. Returns `None` once the queue is
    /// closed and drained.
    pub fn pop(&self) -> Option<Event> {
        let mut state = self.inner.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Block until at least one event is available, then take up to `max`.
    /// Returns an empty vec only after close.
    pub fn pop_batch(&self, max: usize) -> Vec<Event> {
        let mut state = self.inner.lock();
        loop {
            if !state.events.is_empty() {
                let take = max.min(state.events.len());
                return state.events.drain(..take).collect();
            }
            if state.closed {
                return Vec::new();
            }
            self.available.wait(&mut state);
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Shed excess capacity while idle; called from the periodic cleanup.
    pub fn force_cleanup(&self) {
        let mut state = self.inner.lock();
        if state.events.is_empty() {
            state.events = VecDeque::new();
        } else {
            state.events.shrink_to_fit();
        }
    }

    /// Wake all consumers and make further pops return empty once drained.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventPayload};
    use std::sync::Arc;

    fn ping(client_id: i32) -> Event {
        Event::new(EventKind::PingClient, client_id, EventPayload::Empty)
    }

    #[test]
    fn fifo_order_is_preserved() {
        let queue = EventQueue::with_capacity(16);
        queue.push(ping(1));
        queue.push(ping(2));
        assert_eq!(queue.pop().unwrap().client_id, 1);
        assert_eq!(queue.pop().unwrap().client_id, 2);
    }

    #[test]
    fn overflow_drops_oldest_and_never_panics() {
        let capacity = 8;
        let queue = EventQueue::with_capacity(capacity);
        let extra = 5;
        for i in 0..(capacity as i32 + extra) {
            queue.push(ping(i));
        }

        assert_eq!(queue.size(), capacity);
        assert_eq!(queue.dropped(), extra as u64);
        // The first `extra` pushes were shed; the survivor window starts after them.
        assert_eq!(queue.pop().unwrap().client_id, extra);
    }

    #[test]
    fn batch_admission_sheds_as_a_unit() {
        let queue = EventQueue::with_capacity(4);
        queue.push_batch((0..10).map(ping).collect());
        assert_eq!(queue.size(), 4);
        assert_eq!(queue.pop().unwrap().client_id, 6);
    }

    #[test]
    fn mismatched_payload_is_skipped() {
        let queue = EventQueue::with_capacity(4);
        queue.push(Event::new(
            EventKind::PlayerAttack,
            1,
            EventPayload::Empty,
        ));
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn pop_batch_blocks_until_data() {
        let queue = Arc::new(EventQueue::with_capacity(16));
        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            producer.push_batch(vec![ping(1), ping(2), ping(3)]);
        });

        let batch = queue.pop_batch(2);
        assert_eq!(batch.len(), 2);
        handle.join().unwrap();
    }

    #[test]
    fn close_releases_blocked_consumers() {
        let queue = Arc::new(EventQueue::with_capacity(16));
        let consumer = queue.clone();
        let handle = std::thread::spawn(move || consumer.pop());
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.close();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn force_cleanup_keeps_pending_events() {
        let queue = EventQueue::with_capacity(16);
        queue.push(ping(1));
        queue.force_cleanup();
        assert_eq!(queue.size(), 1);
    }
}
