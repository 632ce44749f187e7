use std::io;
use std::net::SocketAddr;
use std::os::fd::{FromRawFd, IntoRawFd};
use std::sync::Arc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use socket2::{Domain, Socket, Type};

use crate::config::EngineConfig;
use crate::demux::Demultiplexer;
use crate::error::{classify_io_error, RequestError};
use crate::http::{ConnReaper, ConnectionTable};
use crate::log::{Log, LogLevel};
use crate::pool::WorkerPool;
use crate::router;
use crate::sql::{SqlConnection, SqlPool};
use crate::timer::TimerHeap;
use crate::{log_error, log_info};

const LISTENER: Token = Token(0);
const MAX_FD: usize = 65536;

/// The single thread that owns the demultiplexer, the connection map, and
/// the timer heap. All per-connection I/O and parsing is handed off to
/// the worker pool; this struct never blocks anywhere but in
/// `demux.wait`.
pub struct Reactor<C: SqlConnection + 'static> {
    config: Arc<EngineConfig>,
    demux: Demultiplexer,
    listener: TcpListener,
    conns: ConnectionTable,
    timers: TimerHeap,
    pool: WorkerPool,
    sql: Option<Arc<SqlPool<C>>>,
    logger: Arc<dyn Log>,
    next_token: usize,
    registry: Registry,
}

impl<C: SqlConnection + 'static> Reactor<C> {
    pub fn new(
        config: EngineConfig,
        sql: Option<Arc<SqlPool<C>>>,
        logger: Arc<dyn Log>,
    ) -> io::Result<Self> {
        let mut demux = Demultiplexer::new(1024)?;
        let mut listener = bind_listener(config.port, config.opt_linger)?;
        let registry = demux.try_clone_registry()?;

        demux.register(&mut listener, LISTENER, Interest::READABLE)?;

        let pool = WorkerPool::new(config.thread_num, 1000);
        let config = Arc::new(config);

        Ok(Self {
            config,
            demux,
            listener,
            conns: ConnectionTable::new(),
            timers: TimerHeap::new(),
            pool,
            sql,
            logger,
            next_token: 1,
            registry,
        })
    }

    /// Address the listen socket actually bound to — useful in tests
    /// that request an ephemeral port (`port: 0`) and need to dial it
    /// back.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn run(&mut self) -> io::Result<()> {
        loop {
            let next_ms = self.timers.get_next_tick();
            let timeout = if next_ms < 0 {
                None
            } else {
                Some(Duration::from_millis(next_ms as u64))
            };

            let events = self.demux.wait(timeout)?;
            let ready: Vec<(Token, bool, bool, bool)> = events
                .iter()
                .map(|e| (e.token(), e.is_readable(), e.is_writable(), e.is_error() || e.is_read_closed()))
                .collect();

            for (token, readable, writable, hup) in ready {
                if token == LISTENER {
                    self.accept_loop();
                    continue;
                }

                if hup {
                    self.close_connection(token);
                    continue;
                }
                if readable {
                    self.dispatch_read(token);
                } else if writable {
                    self.dispatch_write(token);
                }
            }
        }
    }

    fn accept_loop(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.conns.len() >= MAX_FD {
                        self.logger.log(
                            LogLevel::Warn,
                            format!("rejecting {addr}: {}", RequestError::ResourceExhaustion),
                        );
                        drop(stream);
                        continue;
                    }
                    self.add_client(stream, addr);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }

    fn add_client(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        let token = Token(self.next_token);
        self.next_token += 1;

        let trig = self.config.trig_mode();

        if self
            .demux
            .register(&mut stream, token, Interest::READABLE)
            .is_err()
        {
            return;
        }

        let conn = crate::http::Connection::new(token, stream, addr, trig.conn_et);
        self.conns.insert(token, conn);
        self.arm_timer(token);
    }

    fn arm_timer(&mut self, token: Token) {
        if self.conns.get(token).is_none() {
            return;
        }
        let Ok(registry) = self.registry.try_clone() else {
            return;
        };
        let reaper = self.conns.reaper();
        let timeout = Duration::from_millis(self.config.timeout_ms as u64);
        self.timers.add(
            token.0,
            timeout,
            Box::new(move || {
                reaper.reap(token.0, &registry);
            }),
        );
    }

    fn extend_time(&mut self, token: Token) {
        if self.conns.get(token).is_some() {
            self.timers
                .adjust(token.0, Duration::from_millis(self.config.timeout_ms as u64));
        }
    }

    fn dispatch_read(&mut self, token: Token) {
        let Some(conn_arc) = self.conns.get(token) else {
            return;
        };
        let src_dir = self.config.src_dir.clone();
        let error_pages = self.config.error_pages.clone();
        let sql = self.sql.clone();
        let registry = match self.registry.try_clone() {
            Ok(r) => r,
            Err(_) => return,
        };
        let logger = self.logger.clone();
        let reaper = self.conns.reaper();

        self.extend_time(token);

        self.pool.submit(move || {
            on_read(
                conn_arc,
                token,
                &src_dir,
                &error_pages,
                sql.as_deref(),
                &registry,
                &logger,
                &reaper,
            );
        });
    }

    fn dispatch_write(&mut self, token: Token) {
        let Some(conn_arc) = self.conns.get(token) else {
            return;
        };
        let registry = match self.registry.try_clone() {
            Ok(r) => r,
            Err(_) => return,
        };
        let logger = self.logger.clone();
        let reaper = self.conns.reaper();

        self.extend_time(token);

        self.pool.submit(move || {
            on_write(conn_arc, token, &registry, &logger, &reaper);
        });
    }

    fn close_connection(&mut self, token: Token) {
        self.timers.do_work(token.0);
        self.conns.remove(token, &self.registry);
    }

    pub fn shutdown(mut self) {
        let _ = self.demux.deregister(&mut self.listener);
        let tokens: Vec<usize> = (1..self.next_token).collect();
        for t in tokens {
            self.conns.remove(Token(t), &self.registry);
        }
        self.pool.shutdown();
    }
}

fn on_read<C: SqlConnection>(
    conn_arc: Arc<std::sync::Mutex<crate::http::Connection>>,
    token: Token,
    src_dir: &str,
    error_pages: &std::collections::HashMap<u16, String>,
    sql: Option<&SqlPool<C>>,
    registry: &Registry,
    logger: &Arc<dyn Log>,
    reaper: &ConnReaper,
) {
    let mut conn = conn_arc.lock().unwrap();
    if conn.is_closed() {
        return;
    }

    match conn.read() {
        Ok((_, true)) => {
            conn.close(registry);
            drop(conn);
            reaper.forget(token.0);
        }
        Ok((n, false)) if n == 0 => {
            let _ = re_arm(&mut conn, registry, Interest::READABLE);
        }
        Ok(_) => {
            if conn.process(src_dir, error_pages, sql) {
                let status = conn.status_code();
                log_info!(
                    logger,
                    "{:?} {} -> {}",
                    router::classify(conn.path()),
                    conn.path(),
                    status
                );
                match status {
                    400 => log_info!(logger, "{}", RequestError::ParseError(conn.path().to_string())),
                    403 => log_info!(logger, "{}", RequestError::Forbidden),
                    404 => log_info!(logger, "{}", RequestError::FileNotFound),
                    _ => {}
                }
                let _ = re_arm(&mut conn, registry, Interest::WRITABLE);
            } else {
                let _ = re_arm(&mut conn, registry, Interest::READABLE);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            let _ = re_arm(&mut conn, registry, Interest::READABLE);
        }
        Err(e) => {
            log_error!(logger, "{}: {e}", classify_io_error(&e));
            conn.close(registry);
            drop(conn);
            reaper.forget(token.0);
        }
    }
}

fn on_write(
    conn_arc: Arc<std::sync::Mutex<crate::http::Connection>>,
    token: Token,
    registry: &Registry,
    logger: &Arc<dyn Log>,
    reaper: &ConnReaper,
) {
    let mut conn = conn_arc.lock().unwrap();
    if conn.is_closed() {
        return;
    }

    match conn.write() {
        Ok(_) if conn.to_write_bytes() == 0 => {
            if conn.is_keep_alive() {
                conn.reset_for_next_request();
                let _ = re_arm(&mut conn, registry, Interest::READABLE);
            } else {
                conn.close(registry);
                drop(conn);
                reaper.forget(token.0);
            }
        }
        Ok(_) => {
            let _ = re_arm(&mut conn, registry, Interest::WRITABLE);
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            let _ = re_arm(&mut conn, registry, Interest::WRITABLE);
        }
        Err(e) => {
            log_error!(logger, "{}: {e}", classify_io_error(&e));
            conn.close(registry);
            drop(conn);
            reaper.forget(token.0);
        }
    }
}

fn re_arm(
    conn: &mut crate::http::Connection,
    registry: &Registry,
    interest: Interest,
) -> io::Result<()> {
    registry.reregister(&mut conn.stream, conn.token, interest)
}

fn bind_listener(port: u16, opt_linger: bool) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    if opt_linger {
        socket.set_linger(Some(Duration::from_secs(1)))?;
    }
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().unwrap();
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;

    let raw = socket.into_raw_fd();
    let std_listener = unsafe { std::net::TcpListener::from_raw_fd(raw) };
    TcpListener::from_std(std_listener)
}
