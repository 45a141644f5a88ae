//! Bounded event log with live fan-out
//!
//! Each entity owns one publisher; a registry additionally owns one merged
//! publisher that every member forwards into. The buffered log is a
//! drop-oldest ring, the live feed is a broadcast channel whose lagging
//! subscribers lose oldest events instead of ever blocking the publisher.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Bounded, append-only event log plus live subscription feed
///
/// Publishing never blocks and never fails. Once the configured capacity is
/// exceeded the oldest buffered event is dropped. When constructed with an
/// upstream publisher (the registry's merged view), every published event is
/// forwarded there after being recorded locally.
#[derive(Debug)]
pub struct EventPublisher<E> {
    capacity: usize,
    buffer: Mutex<VecDeque<E>>,
    live: broadcast::Sender<E>,
    upstream: Option<Arc<EventPublisher<E>>>,
}

impl<E: Clone> EventPublisher<E> {
    /// Create a standalone publisher with the given buffer capacity
    ///
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Create a publisher forwarding into a merged upstream view
    pub(crate) fn with_upstream(capacity: usize, upstream: Arc<EventPublisher<E>>) -> Self {
        Self::build(capacity, Some(upstream))
    }

    fn build(capacity: usize, upstream: Option<Arc<EventPublisher<E>>>) -> Self {
        let capacity = capacity.max(1);
        let (live, _) = broadcast::channel(capacity);
        Self { capacity, buffer: Mutex::new(VecDeque::with_capacity(capacity)), live, upstream }
    }

    /// Append an event to the buffered log and the live feed
    pub fn publish(&self, event: E) {
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() == self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(event.clone());
        }
        match &self.upstream {
            Some(upstream) => {
                // A send with no active receivers is not an error.
                let _ = self.live.send(event.clone());
                upstream.publish(event);
            }
            None => {
                let _ = self.live.send(event);
            }
        }
    }

    /// Snapshot of the currently buffered events, oldest first
    pub fn events(&self) -> Vec<E> {
        self.buffer.lock().iter().cloned().collect()
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.live.subscribe()
    }

    /// Number of currently buffered events
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether the buffered log is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Configured buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all buffered events; live subscriptions are unaffected
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}
