use std::sync::Arc;
use std::thread::JoinHandle;

use crate::pool::BlockingQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl From<u32> for LogLevel {
    fn from(n: u32) -> Self {
        match n {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN ",
            LogLevel::Info => "INFO ",
            LogLevel::Debug => "DEBUG",
        }
    }

    fn color(self) -> &'static str {
        match self {
            LogLevel::Error => "31",
            LogLevel::Warn => "33",
            LogLevel::Info => "32",
            LogLevel::Debug => "36",
        }
    }
}

pub trait Log: Send + Sync {
    fn log(&self, level: LogLevel, message: String);
}

/// `log(level, fmt, args)` backed by its own bounded queue and a single
/// writer thread, so callers (reactor or workers) never block on I/O —
/// only transiently on a full queue, same backpressure contract as the
/// worker task queue.
pub struct AsyncLogger {
    queue: Arc<BlockingQueue<(LogLevel, String)>>,
    threshold: LogLevel,
    writer: Option<JoinHandle<()>>,
}

impl AsyncLogger {
    pub fn start(threshold: LogLevel, queue_size: usize) -> Self {
        let queue = Arc::new(BlockingQueue::new(queue_size));
        let writer_queue = queue.clone();
        let writer = std::thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                while let Some((level, message)) = writer_queue.pop() {
                    println!("{}", proxy_log::render_line(level.tag(), level.color(), &message));
                }
            })
            .expect("failed to spawn log writer thread");

        Self {
            queue,
            threshold,
            writer: Some(writer),
        }
    }

    pub fn close(&mut self) {
        self.queue.close();
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
    }
}

impl Log for AsyncLogger {
    fn log(&self, level: LogLevel, message: String) {
        if level > self.threshold {
            return;
        }
        self.queue.push((level, message));
    }
}

impl Drop for AsyncLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Used when `openLog = false`: every call is a no-op, no thread spawned.
pub struct NullLogger;

impl Log for NullLogger {
    fn log(&self, _level: LogLevel, _message: String) {}
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)*) => {
        $logger.log($crate::log::LogLevel::Error, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.log($crate::log::LogLevel::Info, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn close_drains_the_queue_before_stopping_the_writer() {
        let mut logger = AsyncLogger::start(LogLevel::Debug, 8);
        for i in 0..5 {
            logger.log(LogLevel::Info, format!("line {i}"));
        }
        logger.close();
        assert!(logger.queue.is_closed());
        assert!(logger.queue.is_empty());
    }

    #[test]
    fn messages_above_threshold_are_dropped_before_enqueue() {
        let logger = AsyncLogger::start(LogLevel::Error, 8);
        logger.log(LogLevel::Debug, "should not enqueue".to_string());
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(logger.queue.len(), 0);
    }

    #[test]
    fn null_logger_never_blocks() {
        let logger = NullLogger;
        for _ in 0..1000 {
            logger.log(LogLevel::Error, "x".to_string());
        }
    }
}
