//! Frame queue for concurrent script population and playback
//!
//! Decouples the two sides of a session:
//! - Producer: the populator (and opportunistic refills) parse script lines
//!   and push messages
//! - Consumer: the frame loop pops the next message when it is due
//!
//! There is no hard capacity. How far ahead the producer runs is the fill
//! policy of the owning [`ScriptSource`](super::ScriptSource).

use parking_lot::Mutex;
use std::collections::VecDeque;

use super::ControlMessage;
use crate::{Result, TasError};

/// FIFO of pending control messages
///
/// # Thread Safety
/// - One producer (populator / refill) and one consumer (frame loop)
/// - Every operation takes the single per-queue lock for a bounded critical
///   section, so `len()` never waits on parsing or I/O
/// - Insertion order is frame order; the producer guarantees non-decreasing
///   frames, the queue does not check
#[derive(Debug, Default)]
pub struct FrameQueue {
    messages: Mutex<VecDeque<ControlMessage>>,
}

impl FrameQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message (producer)
    pub fn push(&self, msg: ControlMessage) {
        self.messages.lock().push_back(msg);
    }

    /// Remove the oldest message (consumer)
    ///
    /// # Errors
    ///
    /// Returns [`TasError::EmptyQueue`] if nothing is queued. Callers are
    /// expected to check [`is_empty`](Self::is_empty) first.
    pub fn pop(&self) -> Result<ControlMessage> {
        self.messages.lock().pop_front().ok_or(TasError::EmptyQueue)
    }

    /// Check if the queue has no pending messages
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Number of pending messages
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Buttons, ControllerState};
    use std::sync::Arc;

    fn msg(frame: u64) -> ControlMessage {
        ControlMessage::new(frame, ControllerState::pressing(Buttons::A))
    }

    #[test]
    fn test_queue_fifo() {
        let queue = FrameQueue::new();
        assert!(queue.is_empty());

        queue.push(msg(0));
        queue.push(msg(3));
        queue.push(msg(3));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop().unwrap().frame, 0);
        assert_eq!(queue.pop().unwrap().frame, 3);
        assert_eq!(queue.pop().unwrap().frame, 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_empty_queue() {
        let queue = FrameQueue::new();
        assert!(matches!(queue.pop(), Err(TasError::EmptyQueue)));
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let producer_queue = Arc::clone(&queue);

        let producer = std::thread::spawn(move || {
            for frame in 0..1000 {
                producer_queue.push(msg(frame));
            }
        });

        let mut received = Vec::with_capacity(1000);
        while received.len() < 1000 {
            if let Ok(m) = queue.pop() {
                received.push(m.frame);
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();

        assert!(received.iter().copied().eq(0..1000));
    }
}
