use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct Shared<T> {
    deque: VecDeque<T>,
    closed: bool,
}

/// Bounded MPMC queue: producers block while the queue is at capacity,
/// consumers block while it is empty. `close()` wakes every waiter and
/// makes further blocking pops return `None` once the queue drains —
/// used both for the worker task queue and the log writer's queue.
pub struct BlockingQueue<T> {
    shared: Mutex<Shared<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BlockingQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            shared: Mutex::new(Shared {
                deque: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.shared.lock().unwrap().deque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Blocks until there is room, then pushes. Returns `false` if the
    /// queue was closed before the item could be accepted.
    pub fn push(&self, item: T) -> bool {
        let mut guard = self.shared.lock().unwrap();
        while guard.deque.len() >= self.capacity && !guard.closed {
            guard = self.not_full.wait(guard).unwrap();
        }
        if guard.closed {
            return false;
        }
        guard.deque.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Blocks until an item is available or the queue is closed and
    /// drained.
    pub fn pop(&self) -> Option<T> {
        let mut guard = self.shared.lock().unwrap();
        loop {
            if let Some(item) = guard.deque.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if guard.closed {
                return None;
            }
            guard = self.not_empty.wait(guard).unwrap();
        }
    }

    /// Blocks up to `timeout`; returns `None` on timeout, on closure, or
    /// if nothing arrived before the wait elapsed.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut guard = self.shared.lock().unwrap();
        loop {
            if let Some(item) = guard.deque.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if guard.closed {
                return None;
            }
            let (g, result) = self.not_empty.wait_timeout(guard, timeout).unwrap();
            guard = g;
            if result.timed_out() {
                return guard.deque.pop_front().inspect(|_| {
                    self.not_full.notify_one();
                });
            }
        }
    }

    pub fn close(&self) {
        let mut guard = self.shared.lock().unwrap();
        guard.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().unwrap().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_then_pop_round_trips() {
        let q = BlockingQueue::new(4);
        q.push(1);
        q.push(2);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn pop_blocks_until_pushed() {
        let q = Arc::new(BlockingQueue::new(4));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.push(42);
        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn push_blocks_while_full_and_releases_on_pop() {
        let q = Arc::new(BlockingQueue::new(2));
        q.push(1);
        q.push(2);
        assert!(q.is_full());

        let q2 = q.clone();
        let handle = thread::spawn(move || q2.push(3));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.pop(), Some(1));
        handle.join().unwrap();
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn close_wakes_blocked_consumers_with_none() {
        let q = Arc::new(BlockingQueue::<i32>::new(2));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn closed_queue_still_drains_existing_items() {
        let q = BlockingQueue::new(4);
        q.push(1);
        q.push(2);
        q.close();
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }
}
