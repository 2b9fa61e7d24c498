//! Bounded queue with a drop-oldest overflow policy.
//!
//! Built on a bounded crossbeam channel. The producer keeps its own receiver
//! clone so it can evict the oldest item itself when the queue is full, which
//! means a push never waits on the consumer.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::time::Duration;

/// Multi-producer, multi-consumer queue that never holds more than
/// `capacity` items.
#[derive(Debug)]
pub struct DropOldestQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
}

impl<T> Clone for DropOldestQueue<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> DropOldestQueue<T> {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Enqueue `item`, evicting the oldest item if the queue is full.
    ///
    /// Returns the evicted item, if any.
    pub fn push(&self, item: T) -> Option<T> {
        let mut item = item;
        let mut evicted = None;
        loop {
            match self.sender.try_send(item) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(rejected)) => {
                    item = rejected;
                    // A consumer may have emptied the slot in between; retry either way
                    if let Ok(oldest) = self.receiver.try_recv() {
                        evicted = Some(oldest);
                    }
                }
                // Unreachable while this handle owns a receiver
                Err(TrySendError::Disconnected(rejected)) => return Some(rejected),
            }
        }
    }

    /// Wait up to `timeout` for the oldest item.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Wait up to `timeout` for an item, then skip to the newest one queued.
    ///
    /// Returns the newest item and how many older items were skipped.
    pub fn recv_latest(&self, timeout: Duration) -> Option<(T, usize)> {
        let mut latest = self.receiver.recv_timeout(timeout).ok()?;
        let mut skipped = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(newer) => {
                    latest = newer;
                    skipped += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Some((latest, skipped))
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let queue = DropOldestQueue::new(2);
        assert_eq!(queue.push(1), None);
        assert_eq!(queue.push(2), None);
        assert_eq!(queue.push(3), Some(1));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), Ok(2));
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), Ok(3));
    }

    #[test]
    fn test_recv_latest_skips_to_newest() {
        let queue = DropOldestQueue::new(4);
        for i in 0..4 {
            queue.push(i);
        }
        assert_eq!(queue.recv_latest(Duration::from_millis(10)), Some((3, 3)));
        assert!(queue.is_empty());
        assert_eq!(queue.recv_latest(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = DropOldestQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push("a");
        assert_eq!(queue.push("b"), Some("a"));
    }

    #[test]
    fn test_fast_producer_never_exceeds_capacity() {
        let queue = DropOldestQueue::new(2);
        let producer = queue.clone();

        let handle = thread::spawn(move || {
            let mut dropped = 0;
            for i in 0..10_000u32 {
                if producer.push(i).is_some() {
                    dropped += 1;
                }
                assert!(producer.len() <= 2);
            }
            dropped
        });

        let mut received = Vec::new();
        while let Some((item, _)) = queue.recv_latest(Duration::from_millis(50)) {
            received.push(item);
            thread::sleep(Duration::from_micros(200));
        }
        let dropped = handle.join().unwrap();

        assert!(dropped > 0);
        assert!(received.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(received.last(), Some(&9_999));
    }
}
