//! Bounded drop-oldest frame queue

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

/// Default queue capacity for buffered output
pub const DEFAULT_CAPACITY: usize = 20;

/// Largest capacity a viewer may ask for with `wait`
pub const MAX_CAPACITY: usize = 1000;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Single-producer, single-consumer queue that never blocks the producer
///
/// When full, a push evicts the oldest entry.
pub struct FrameQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> FrameQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1)
    ///
    /// Storage grows with the items actually queued.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push an item, returning whether the oldest item was dropped for it
    pub fn push(&self, item: T) -> bool {
        let dropped = {
            let mut state = self.lock();
            let dropped = if state.items.len() >= self.capacity {
                state.items.pop_front();
                true
            } else {
                false
            };
            state.items.push_back(item);
            dropped
        };

        self.notify.notify_one();
        dropped
    }

    /// Wait for the next item; `None` once closed and drained
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Mark the queue closed; queued items can still be popped
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
