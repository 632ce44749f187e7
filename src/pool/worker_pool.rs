use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::pool::blocking_queue::BlockingQueue;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads pulling from one shared, bounded
/// task queue. A full queue applies backpressure to `submit` rather than
/// growing unboundedly or dropping work.
pub struct WorkerPool {
    queue: Arc<BlockingQueue<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(thread_count: usize, queue_capacity: usize) -> Self {
        assert!(thread_count > 0);
        let queue = Arc::new(BlockingQueue::new(queue_capacity));
        let mut workers = Vec::with_capacity(thread_count);

        for i in 0..thread_count {
            let queue = queue.clone();
            let handle = thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(move || {
                    while let Some(task) = queue.pop() {
                        task();
                    }
                })
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        Self { queue, workers }
    }

    /// Blocks the caller while the queue is full, matching the source
    /// pool's `AddTask` which blocks the reactor thread rather than
    /// drop or grow the queue under sustained overload.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.push(Box::new(task))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn shutdown(self) {
        self.queue.close();
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}
