//! Event queue - FIFO delivery of unsolicited device messages.
//!
//! Events arrive whenever the device feels like it, including while a
//! command is in flight. The reader task pushes them here; the application
//! drains them with [`EventQueue::wait_event`] at its own pace. Ordering is
//! strict arrival order and the queue is unbounded: the device dictates the
//! event rate and dropping events silently would corrupt application state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::codec::Message;
use crate::error::{BgError, Result};

/// FIFO queue of decoded events.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: Mutex<VecDeque<Message>>,
    notify: Notify,
    closed: AtomicBool,
}

impl EventQueue {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and wake one waiter.
    pub fn push(&self, event: Message) {
        self.queue
            .lock()
            .expect("event queue mutex poisoned")
            .push_back(event);
        self.notify.notify_one();
    }

    /// Wait for the next event in arrival order.
    ///
    /// Drains any already-queued events before blocking. After the session
    /// closes, queued events are still delivered; only once the queue is
    /// empty does this return `SessionClosed`.
    pub async fn wait_event(&self) -> Result<Message> {
        loop {
            // Arm the notification before checking state so a push between
            // the check and the await cannot be lost.
            let notified = self.notify.notified();

            if let Some(event) = self.pop() {
                return Ok(event);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(BgError::SessionClosed);
            }

            notified.await;
        }
    }

    /// Non-blocking dequeue: the next event in arrival order, or `None`
    /// when the queue is empty. Same contract as [`EventQueue::wait_event`]
    /// minus the waiting; use [`EventQueue::has_pending`] to inspect
    /// without consuming.
    pub fn peek_event(&self) -> Option<Message> {
        self.pop()
    }

    /// Check whether any events are queued. A `false` here tells the
    /// application it can let the transport sleep.
    pub fn has_pending(&self) -> bool {
        !self
            .queue
            .lock()
            .expect("event queue mutex poisoned")
            .is_empty()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.queue.lock().expect("event queue mutex poisoned").len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark the session closed and wake all waiters.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Check whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn pop(&self) -> Option<Message> {
        self.queue
            .lock()
            .expect("event queue mutex poisoned")
            .pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::classes;
    use std::sync::Arc;
    use std::time::Duration;

    fn event(id: u8) -> Message {
        Message::event(classes::SYSTEM, id, vec![])
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = EventQueue::new();
        queue.push(event(1));
        queue.push(event(2));
        queue.push(event(3));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.wait_event().await.unwrap().id.id, 1);
        assert_eq!(queue.wait_event().await.unwrap().id.id, 2);
        assert_eq!(queue.wait_event().await.unwrap().id.id, 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_peek_event_dequeues_without_blocking() {
        let queue = EventQueue::new();
        assert!(queue.peek_event().is_none());
        assert!(!queue.has_pending());

        queue.push(event(7));
        queue.push(event(8));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.peek_event().unwrap().id.id, 7);
        assert_eq!(queue.peek_event().unwrap().id.id, 8);
        // a drained queue yields nothing on the next poll
        assert!(queue.peek_event().is_none());
        assert!(!queue.has_pending());
    }

    #[tokio::test]
    async fn test_wait_blocks_until_push() {
        let queue = Arc::new(EventQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_event().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(event(9));

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.id.id, 9);
    }

    #[tokio::test]
    async fn test_close_wakes_waiter() {
        let queue = Arc::new(EventQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_event().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(BgError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_queued_events_survive_close() {
        let queue = EventQueue::new();
        queue.push(event(1));
        queue.push(event(2));
        queue.close();

        assert_eq!(queue.wait_event().await.unwrap().id.id, 1);
        assert_eq!(queue.wait_event().await.unwrap().id.id, 2);
        assert!(matches!(
            queue.wait_event().await,
            Err(BgError::SessionClosed)
        ));
    }
}
