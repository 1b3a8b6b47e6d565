//! Slot Event Queues
//!
//! Bounded MPSC ingress for indications pushed from PHY/FAPI threads. The
//! scheduler thread drains the queue once per tick, so every handler observes
//! exactly the events that had arrived by tick time. Overflow is logged and
//! the event dropped; the sender retries naturally (PRACH re-attempts,
//! periodic CRC reporting).

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

/// Cross-thread producer handle for an [`EventQueue`]
#[derive(Clone)]
pub struct EventSender<T> {
    tx: Sender<T>,
    name: &'static str,
}

impl<T> EventSender<T> {
    /// Push an event. Never blocks; a full queue drops the event with a warning.
    pub fn push(&self, event: T) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("{} event queue full, dropping indication", self.name);
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("{} event queue disconnected, dropping indication", self.name);
            }
        }
    }
}

/// Bounded MPSC queue drained once per scheduler tick
pub struct EventQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    drained: Vec<T>,
    capacity: usize,
    name: &'static str,
}

impl<T> EventQueue<T> {
    /// Create a queue with a fixed capacity
    pub fn new(capacity: usize, name: &'static str) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            drained: Vec::with_capacity(capacity),
            capacity,
            name,
        }
    }

    /// Get a producer handle usable from other threads
    pub fn sender(&self) -> EventSender<T> {
        EventSender {
            tx: self.tx.clone(),
            name: self.name,
        }
    }

    /// Push an event from the owning thread
    pub fn push(&self, event: T) {
        self.sender().push(event);
    }

    /// Drain everything that arrived before this tick. Events pushed while
    /// draining are observed on the next tick.
    pub fn slot_indication(&mut self) {
        self.drained.clear();
        while self.drained.len() < self.capacity {
            match self.rx.try_recv() {
                Ok(event) => self.drained.push(event),
                Err(_) => break,
            }
        }
    }

    /// Events drained by the last `slot_indication` call
    pub fn get_events(&self) -> &[T] {
        &self.drained
    }

    /// Take ownership of the drained events, leaving the queue reusable
    pub fn take_events(&mut self) -> Vec<T> {
        std::mem::take(&mut self.drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_per_slot() {
        let mut queue: EventQueue<u32> = EventQueue::new(8, "TEST");
        queue.push(1);
        queue.push(2);
        queue.slot_indication();
        assert_eq!(queue.get_events(), &[1, 2]);

        // Events pushed after the drain show up on the next tick only.
        queue.push(3);
        assert_eq!(queue.get_events(), &[1, 2]);
        queue.slot_indication();
        assert_eq!(queue.get_events(), &[3]);
    }

    #[test]
    fn test_overflow_drops() {
        let mut queue: EventQueue<u32> = EventQueue::new(2, "TEST");
        queue.push(1);
        queue.push(2);
        queue.push(3);
        queue.slot_indication();
        assert_eq!(queue.get_events(), &[1, 2]);
    }

    #[test]
    fn test_cross_thread_push() {
        let mut queue: EventQueue<u32> = EventQueue::new(8, "TEST");
        let sender = queue.sender();
        let handle = std::thread::spawn(move || {
            for i in 0..4 {
                sender.push(i);
            }
        });
        handle.join().unwrap();
        queue.slot_indication();
        assert_eq!(queue.get_events().len(), 4);
    }
}
