// src/conflate.rs

//! Depth-1 conflating channels for event-loop inputs.
//!
//! A conflating channel holds at most one undelivered value; a producer
//! overwrites the slot if the consumer has not drained it yet. This bounds
//! memory no matter how bursty the producer is, at the cost of
//! intermediate values: the consumer always observes the most recent one.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// Create a conflating channel pair
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(None),
        notify: Notify::new(),
    });
    (Sender { shared: shared.clone() }, Receiver { shared })
}

struct Shared<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

/// Producer half; cloneable, never blocks
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T> Sender<T> {
    /// Store `value` as the pending item, replacing any undelivered one
    pub fn send(&self, value: T) {
        *self.shared.slot.lock().expect("conflate slot lock") = Some(value);
        self.shared.notify.notify_one();
    }
}

/// Consumer half
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Wait for a value and take it. Values sent while the consumer was
    /// busy are conflated to the latest.
    pub async fn recv(&mut self) -> T {
        loop {
            if let Some(value) = self.shared.slot.lock().expect("conflate slot lock").take() {
                return value;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Take the pending value without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.shared.slot.lock().expect("conflate slot lock").take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_then_recv() {
        let (tx, mut rx) = channel();
        tx.send(7u32);
        assert_eq!(rx.recv().await, 7);
    }

    #[tokio::test]
    async fn test_conflates_to_latest() {
        let (tx, mut rx) = channel();
        tx.send(1u32);
        tx.send(2);
        tx.send(3);
        assert_eq!(rx.recv().await, 3);
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_send() {
        let (tx, mut rx) = channel::<u32>();
        let handle = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        tx.send(42);
        assert_eq!(handle.await.unwrap(), 42);
    }
}
