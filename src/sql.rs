use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug)]
pub enum SqlError {
    PoolExhausted,
    Query(String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::PoolExhausted => write!(f, "sql pool exhausted"),
            SqlError::Query(msg) => write!(f, "query failed: {msg}"),
        }
    }
}

impl std::error::Error for SqlError {}

/// The contract the HTTP layer needs from a database connection: verify
/// a login, register a new account. A real driver sits behind this trait;
/// `ProcessConnection` below is the dependency-free stand-in used when no
/// external database is configured.
pub trait SqlConnection: Send {
    fn verify_login(&mut self, user: &str, pass: &str) -> Result<bool, SqlError>;
    fn register(&mut self, user: &str, pass: &str) -> Result<bool, SqlError>;
}

/// In-process user table, queried the same way a MySQL-backed
/// `SqlConnection` would be: one `verify_login`/`register` call per
/// `/login` or `/register` POST.
pub struct ProcessConnection {
    users: std::sync::Arc<Mutex<std::collections::HashMap<String, String>>>,
}

impl ProcessConnection {
    pub fn new(shared: std::sync::Arc<Mutex<std::collections::HashMap<String, String>>>) -> Self {
        Self { users: shared }
    }
}

impl SqlConnection for ProcessConnection {
    fn verify_login(&mut self, user: &str, pass: &str) -> Result<bool, SqlError> {
        let users = self.users.lock().unwrap();
        Ok(users.get(user).map(|p| p == pass).unwrap_or(false))
    }

    fn register(&mut self, user: &str, pass: &str) -> Result<bool, SqlError> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(user) {
            return Ok(false);
        }
        users.insert(user.to_string(), pass.to_string());
        Ok(true)
    }
}

/// Counting-semaphore connection pool, modeled in safe Rust as a bounded
/// deque guarded by a mutex and condvar rather than `sem_t`. `borrow()`
/// blocks until a connection is free; `release()` returns it and wakes
/// exactly one waiter.
pub struct SqlPool<C> {
    conns: Mutex<VecDeque<C>>,
    available: Condvar,
}

impl<C> SqlPool<C> {
    pub fn new(conns: Vec<C>) -> Self {
        Self {
            conns: Mutex::new(conns.into()),
            available: Condvar::new(),
        }
    }

    pub fn free_count(&self) -> usize {
        self.conns.lock().unwrap().len()
    }

    /// Blocks until a connection is available, up to `timeout`. Returns
    /// `None` if the pool stays exhausted past the deadline — the caller
    /// treats this the same as a failed login, per the source's
    /// silent-failure behavior on an unreachable pool.
    pub fn borrow(&self, timeout: Duration) -> Option<C> {
        let mut guard = self.conns.lock().unwrap();
        loop {
            if let Some(conn) = guard.pop_front() {
                return Some(conn);
            }
            let (g, result) = self.available.wait_timeout(guard, timeout).unwrap();
            guard = g;
            if result.timed_out() {
                return guard.pop_front();
            }
        }
    }

    pub fn release(&self, conn: C) {
        let mut guard = self.conns.lock().unwrap();
        guard.push_back(conn);
        self.available.notify_one();
    }
}
