use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type TimerId = usize;
pub type TimeoutCallback = Box<dyn FnOnce() + Send>;

struct TimerNode {
    id: TimerId,
    expires: Instant,
    cb: TimeoutCallback,
}

/// Binary min-heap of timeouts ordered by `expires`, with a sidecar
/// `id -> heap index` map so `adjust`/`doWork` can locate and repair a
/// single entry in `O(log n)` instead of scanning the heap.
pub struct TimerHeap {
    heap: Vec<TimerNode>,
    ref_: HashMap<TimerId, usize>,
}

impl TimerHeap {
    pub fn new() -> Self {
        Self {
            heap: Vec::with_capacity(64),
            ref_: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Adds a timer, or if `id` is already tracked, adjusts its deadline
    /// (this mirrors the source's behavior where `Connection` re-add on
    /// every read refreshes its existing timer entry).
    pub fn add(&mut self, id: TimerId, timeout: Duration, cb: TimeoutCallback) {
        if let Some(&i) = self.ref_.get(&id) {
            self.heap[i].expires = Instant::now() + timeout;
            self.heap[i].cb = cb;
            if !self.siftdown(i, self.heap.len()) {
                self.siftup(i);
            }
            return;
        }

        let i = self.heap.len();
        self.ref_.insert(id, i);
        self.heap.push(TimerNode {
            id,
            expires: Instant::now() + timeout,
            cb,
        });
        self.siftup(i);
    }

    /// Pushes `id`'s deadline out to `Instant::now() + timeout` without
    /// touching its callback.
    pub fn adjust(&mut self, id: TimerId, timeout: Duration) {
        if let Some(&i) = self.ref_.get(&id) {
            self.heap[i].expires = Instant::now() + timeout;
            self.siftdown(i, self.heap.len());
        }
    }

    /// Fires `id`'s callback immediately and removes it, regardless of
    /// where it sits in the heap (used when a connection closes early).
    pub fn do_work(&mut self, id: TimerId) {
        if self.heap.is_empty() || !self.ref_.contains_key(&id) {
            return;
        }
        let i = self.ref_[&id];
        let node = self.del(i);
        (node.cb)();
    }

    /// Drains every timer whose deadline has passed, invoking each
    /// callback exactly once.
    pub fn tick(&mut self) {
        if self.heap.is_empty() {
            return;
        }
        let now = Instant::now();
        while let Some(node) = self.heap.first() {
            if node.expires > now {
                break;
            }
            if let Some(node) = self.pop() {
                (node.cb)();
            }
        }
    }

    /// Milliseconds until the next deadline, or `-1` if none are pending
    /// (matches `HeapTimer::GetNextTick`'s sentinel for "no timers").
    pub fn get_next_tick(&mut self) -> i64 {
        self.tick();
        let mut res = -1i64;
        if let Some(node) = self.heap.first() {
            let now = Instant::now();
            res = if node.expires > now {
                (node.expires - now).as_millis() as i64
            } else {
                0
            };
        }
        res
    }

    fn pop(&mut self) -> Option<TimerNode> {
        if self.heap.is_empty() {
            return None;
        }
        Some(self.del(0))
    }

    fn del(&mut self, i: usize) -> TimerNode {
        let last = self.heap.len() - 1;
        if i < last {
            self.swap_node(i, last);
            if !self.siftdown(i, last) {
                self.siftup(i);
            }
        }
        let node = self.heap.pop().expect("del called on empty heap");
        self.ref_.remove(&node.id);
        node
    }

    fn siftup(&mut self, mut i: usize) {
        loop {
            if i == 0 {
                break;
            }
            let parent = (i - 1) / 2;
            if self.heap[parent].expires <= self.heap[i].expires {
                break;
            }
            self.swap_node(i, parent);
            i = parent;
        }
    }

    /// Returns `true` if the node actually moved down.
    fn siftdown(&mut self, mut i: usize, n: usize) -> bool {
        let start = i;
        loop {
            let left = i * 2 + 1;
            let right = i * 2 + 2;
            let mut smallest = i;
            if left < n && self.heap[left].expires < self.heap[smallest].expires {
                smallest = left;
            }
            if right < n && self.heap[right].expires < self.heap[smallest].expires {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap_node(i, smallest);
            i = smallest;
        }
        i > start
    }

    fn swap_node(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.ref_.insert(self.heap[i].id, i);
        self.ref_.insert(self.heap[j].id, j);
    }

    #[cfg(test)]
    fn invariant_holds(&self) -> bool {
        for (id, &i) in &self.ref_ {
            if self.heap[i].id != *id {
                return false;
            }
        }
        for i in 0..self.heap.len() {
            let left = i * 2 + 1;
            let right = i * 2 + 2;
            if left < self.heap.len() && self.heap[left].expires < self.heap[i].expires {
                return false;
            }
            if right < self.heap.len() && self.heap[right].expires < self.heap[i].expires {
                return false;
            }
        }
        true
    }
}

impl Default for TimerHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_exactly_once_at_expiry() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut heap = TimerHeap::new();
        let f = fired.clone();
        heap.add(1, Duration::from_millis(5), Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        }));

        std::thread::sleep(Duration::from_millis(20));
        heap.tick();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        heap.tick();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn adjust_before_expiry_postpones_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut heap = TimerHeap::new();
        let f = fired.clone();
        heap.add(1, Duration::from_millis(10), Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        }));

        heap.adjust(1, Duration::from_millis(200));
        std::thread::sleep(Duration::from_millis(15));
        heap.tick();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn heap_invariant_holds_under_interleaved_ops() {
        let mut heap = TimerHeap::new();
        for id in 0..50 {
            heap.add(id, Duration::from_millis(1000 + id as u64), Box::new(|| {}));
        }
        for id in (0..50).step_by(3) {
            heap.adjust(id, Duration::from_millis(500));
        }
        for id in (0..50).step_by(7) {
            heap.do_work(id);
        }
        assert!(heap.invariant_holds());
    }

    #[test]
    fn do_work_removes_regardless_of_heap_position() {
        let mut heap = TimerHeap::new();
        heap.add(1, Duration::from_secs(100), Box::new(|| {}));
        heap.add(2, Duration::from_secs(1), Box::new(|| {}));
        heap.add(3, Duration::from_secs(50), Box::new(|| {}));
        heap.do_work(1);
        assert_eq!(heap.len(), 2);
        assert!(heap.invariant_holds());
    }
}
