use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::TcpStream;
use mio::{Interest, Token};

use crate::buffer::{write_vectored_all, ByteBuffer};
use crate::http::request::{HttpParser, ParseOutcome};
use crate::http::response::HttpResponder;
use crate::sql::{SqlConnection, SqlPool};

/// One accepted client: its own read/write buffers, a parser, and a
/// responder. `read`/`write`/`process` loop inside the worker task;
/// `close` is idempotent and the only path that decrements the shared
/// connection counter.
pub struct Connection {
    pub token: Token,
    pub stream: TcpStream,
    pub addr: SocketAddr,
    pub conn_et: bool,
    read_buf: ByteBuffer,
    write_buf: ByteBuffer,
    parser: HttpParser,
    responder: HttpResponder,
    closed: bool,
}

impl Connection {
    pub fn new(token: Token, stream: TcpStream, addr: SocketAddr, conn_et: bool) -> Self {
        Self {
            token,
            stream,
            addr,
            conn_et,
            read_buf: ByteBuffer::new(),
            write_buf: ByteBuffer::new(),
            parser: HttpParser::new(),
            responder: HttpResponder::new(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Scatter-reads into `read_buf`, looping until `EAGAIN` when the
    /// connection socket is edge-triggered (a single level-triggered
    /// read is sufficient and correct too, just less eager). The second
    /// return value is `true` iff the kernel signaled EOF (peer closed) —
    /// distinct from `WouldBlock`, which just means "no more data yet".
    pub fn read(&mut self) -> io::Result<(usize, bool)> {
        let mut total = 0usize;
        loop {
            match self.read_buf.read_from_fd(&mut self.stream) {
                Ok(0) => return Ok((total, true)),
                Ok(n) => {
                    total += n;
                    if !self.conn_et {
                        return Ok((total, false));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok((total, false)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs the parser over the bytes accumulated in `read_buf`. Returns
    /// `true` once a response has been built into `write_buf` and is
    /// ready to send; `false` means the caller should re-arm read
    /// interest and wait for more bytes.
    pub fn process<C: SqlConnection>(
        &mut self,
        src_dir: &str,
        error_pages: &HashMap<u16, String>,
        sql: Option<&SqlPool<C>>,
    ) -> bool {
        let (outcome, forced_code) = self.parser.parse(&mut self.read_buf, sql);
        if outcome == ParseOutcome::NeedMore {
            return false;
        }

        let keep_alive = forced_code.is_none() && self.parser.is_keep_alive();
        self.responder.init_with_error_pages(
            src_dir,
            &self.parser.path,
            keep_alive,
            forced_code,
            error_pages,
        );
        self.responder.make_response(&mut self.write_buf);
        true
    }

    pub fn status_code(&self) -> u16 {
        self.responder.code()
    }

    pub fn path(&self) -> &str {
        &self.parser.path
    }

    pub fn is_keep_alive(&self) -> bool {
        self.parser.is_keep_alive()
    }

    /// Vectored write of the header region plus the mmap'd/inline body.
    /// Loops until the socket would block (ET) or everything is sent.
    pub fn write(&mut self) -> io::Result<usize> {
        let mut total = 0usize;
        loop {
            let header = self.write_buf.peek();
            let body = self.responder.file();
            if header.is_empty() && body.is_empty() {
                return Ok(total);
            }

            match write_vectored_all(&mut self.stream, header, body) {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    total += n;
                    self.advance_write_cursors(n);
                    if !self.conn_et {
                        return Ok(total);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn advance_write_cursors(&mut self, mut n: usize) {
        let header_len = self.write_buf.readable_bytes();
        if n <= header_len {
            self.write_buf.retrieve(n);
            return;
        }
        n -= header_len;
        self.write_buf.retrieve(header_len);
        self.responder.advance_body(n);
    }

    pub fn to_write_bytes(&self) -> usize {
        self.write_buf.readable_bytes() + self.responder.file().len()
    }

    /// Resets per-request state so the connection can parse another
    /// pipelined-free request on the same keep-alive socket.
    pub fn reset_for_next_request(&mut self) {
        self.parser = HttpParser::new();
        self.write_buf.retrieve_all();
        self.responder.unmap_file();
    }

    pub fn interests(&self) -> Interest {
        Interest::READABLE
    }

    /// Deregisters the fd, shuts down both halves of the socket so the
    /// peer observes EOF, and unmaps any mapped file. Idempotent.
    pub fn close(&mut self, registry: &mio::Registry) {
        if self.closed {
            return;
        }
        let _ = registry.deregister(&mut self.stream);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        self.responder.unmap_file();
        self.closed = true;
    }
}

/// The reactor thread owns inserts; removals can come from the reactor
/// thread (hangup, shutdown) or from a worker/timer callback running
/// elsewhere, so the backing map is behind its own lock. Each entry is
/// still handed to exactly one worker at a time via the one-shot re-arm
/// invariant — this lock is about letting any thread reap a token out of
/// the table, not about connection I/O itself.
pub struct ConnectionTable {
    conns: Arc<std::sync::Mutex<std::collections::HashMap<usize, Arc<std::sync::Mutex<Connection>>>>>,
    pub user_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            conns: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
            user_count: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    pub fn insert(&mut self, token: Token, conn: Connection) {
        self.conns
            .lock()
            .unwrap()
            .insert(token.0, Arc::new(std::sync::Mutex::new(conn)));
        self.user_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn get(&self, token: Token) -> Option<Arc<std::sync::Mutex<Connection>>> {
        self.conns.lock().unwrap().get(&token.0).cloned()
    }

    /// Closes and removes `token`'s connection. For callers that do not
    /// already hold the connection's own lock (the reactor thread on
    /// hangup, or shutdown).
    pub fn remove(&mut self, token: Token, registry: &mio::Registry) {
        self.reaper().reap(token.0, registry);
    }

    pub fn len(&self) -> usize {
        self.conns.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.lock().unwrap().is_empty()
    }

    /// A cloneable, `'static` handle for reaping a connection by token
    /// from a thread other than the reactor's — timer expiry callbacks
    /// and worker `on_read`/`on_write` closures capture this instead of
    /// `&mut self` since they run after the reactor has moved on.
    pub fn reaper(&self) -> ConnReaper {
        ConnReaper {
            conns: self.conns.clone(),
            user_count: self.user_count.clone(),
        }
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct ConnReaper {
    conns: Arc<std::sync::Mutex<std::collections::HashMap<usize, Arc<std::sync::Mutex<Connection>>>>>,
    user_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl ConnReaper {
    /// Removes `token` from the table and closes it. Used where the
    /// caller has not already locked the connection (a timer expiry
    /// firing on the reactor thread) — locking it here is safe.
    pub fn reap(&self, token: usize, registry: &mio::Registry) {
        let removed = self.conns.lock().unwrap().remove(&token);
        if let Some(conn) = removed {
            conn.lock().unwrap().close(registry);
            self.user_count.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    /// Removes `token` from the table and decrements `user_count`
    /// without touching the connection itself. Used by worker
    /// `on_read`/`on_write` closures that already hold the connection's
    /// own lock and have already called `Connection::close` on it —
    /// calling `reap` there would try to lock it a second time and
    /// deadlock.
    pub fn forget(&self, token: usize) {
        if self.conns.lock().unwrap().remove(&token).is_some() {
            self.user_count.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlError;
    use std::io::Write;

    struct NoopConn;
    impl SqlConnection for NoopConn {
        fn verify_login(&mut self, _u: &str, _p: &str) -> Result<bool, SqlError> {
            Ok(false)
        }
        fn register(&mut self, _u: &str, _p: &str) -> Result<bool, SqlError> {
            Ok(false)
        }
    }

    /// Builds a `Connection` wrapping one end of a real loopback socket
    /// pair, with the other end handed back as a plain `std::net::TcpStream`
    /// the test drives directly.
    fn connection_pair() -> (Connection, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server, peer_addr) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        let server = TcpStream::from_std(server);

        (
            Connection::new(Token(1), server, peer_addr, false),
            client,
        )
    }

    #[test]
    fn process_builds_a_response_once_the_request_is_complete() {
        let (mut conn, mut client) = connection_pair();
        client
            .write_all(b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        conn.read().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), b"hi").unwrap();
        let ready = conn.process::<NoopConn>(dir.path().to_str().unwrap(), &HashMap::new(), None);

        assert!(ready);
        assert_eq!(conn.status_code(), 200);
        assert!(conn.is_keep_alive());
    }

    #[test]
    fn process_reports_need_more_until_the_request_line_is_complete() {
        let (mut conn, mut client) = connection_pair();
        client.write_all(b"GET /index.html HTTP/1.1\r\n").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        conn.read().unwrap();
        let ready = conn.process::<NoopConn>("/tmp", &HashMap::new(), None);
        assert!(!ready);
    }

    #[test]
    fn close_is_idempotent() {
        let (mut conn, _client) = connection_pair();
        let poll = mio::Poll::new().unwrap();
        let registry = poll.registry().try_clone().unwrap();

        conn.close(&registry);
        assert!(conn.is_closed());
        conn.close(&registry);
        assert!(conn.is_closed());
    }
}
