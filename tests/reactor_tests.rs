use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use evhttpd::config::EngineConfig;
use evhttpd::log::NullLogger;
use evhttpd::reactor::Reactor;
use evhttpd::sql::{ProcessConnection, SqlPool};

fn config_for(src_dir: &std::path::Path, timeout_ms: u32) -> EngineConfig {
    let mut error_pages = HashMap::new();
    error_pages.insert(400, "/400.html".to_string());
    error_pages.insert(403, "/403.html".to_string());
    error_pages.insert(404, "/404.html".to_string());

    EngineConfig {
        port: 0,
        trig_mode: 3,
        timeout_ms,
        src_dir: src_dir.to_str().unwrap().to_string(),
        thread_num: 2,
        error_pages,
        ..EngineConfig::default()
    }
}

/// Spawns a reactor bound to an ephemeral port and returns the address
/// to dial. The reactor thread is not joined — it lives for the rest of
/// the test process, same as the production binary's `run()` which
/// never returns except on I/O error.
fn spawn_reactor(config: EngineConfig) -> std::net::SocketAddr {
    let sql = Arc::new(SqlPool::new(vec![ProcessConnection::new(Arc::new(
        std::sync::Mutex::new(HashMap::new()),
    ))]));
    let mut reactor: Reactor<ProcessConnection> =
        Reactor::new(config, Some(sql), Arc::new(NullLogger)).expect("reactor should bind");
    let bound = reactor.local_addr().expect("listener should have an address");
    let addr = std::net::SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
        bound.port(),
    );

    std::thread::spawn(move || {
        let _ = reactor.run();
    });

    // Give the reactor thread a moment to enter its poll loop.
    std::thread::sleep(Duration::from_millis(20));
    addr
}

fn send_and_read(addr: std::net::SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.write_all(request).expect("write");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                // Static fixtures in this test are tiny; once we have a
                // full header block plus some body, that's enough to
                // assert against.
                if buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.len() > 4 {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[test]
fn static_get_keep_alive_serves_the_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"hi").unwrap();

    let addr = spawn_reactor(config_for(dir.path(), 60_000));
    let resp = send_and_read(
        addr,
        b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
    );

    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
    assert!(resp.contains("Connection: keep-alive\r\n"), "{resp}");
    assert!(resp.contains("Content-Length: 2\r\n"), "{resp}");
    assert!(resp.ends_with("hi"), "{resp}");
}

#[test]
fn missing_file_serves_the_canonical_404_page() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("404.html"), b"nf").unwrap();

    let addr = spawn_reactor(config_for(dir.path(), 60_000));
    let resp = send_and_read(addr, b"GET /nope HTTP/1.1\r\n\r\n");

    assert!(resp.starts_with("HTTP/1.1 404 Not Found\r\n"), "{resp}");
    assert!(resp.ends_with("nf"), "{resp}");
}

#[test]
fn unreadable_file_serves_403() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("403.html"), b"forbidden").unwrap();
    let secret = dir.path().join("secret");
    std::fs::write(&secret, b"shh").unwrap();
    std::fs::set_permissions(&secret, std::fs::Permissions::from_mode(0o600)).unwrap();

    let addr = spawn_reactor(config_for(dir.path(), 60_000));
    let resp = send_and_read(addr, b"GET /secret HTTP/1.1\r\n\r\n");

    assert!(resp.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{resp}");
}

#[test]
fn malformed_request_gets_400_and_the_connection_closes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("400.html"), b"bad").unwrap();

    let addr = spawn_reactor(config_for(dir.path(), 60_000));
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(b"GARBAGE\r\n\r\n").unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();
    let resp = String::from_utf8_lossy(&buf);

    assert!(resp.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{resp}");
    assert!(resp.contains("Connection: close\r\n"), "{resp}");
}

#[test]
fn idle_connection_is_closed_by_the_timer() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"hi").unwrap();

    let addr = spawn_reactor(config_for(dir.path(), 100));
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).expect("peer should close, not error");
    assert_eq!(n, 0, "expected server-initiated close after idle timeout");
}

#[test]
fn login_with_unreachable_credentials_redirects_to_error_page() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("error.html"), b"nope").unwrap();

    let addr = spawn_reactor(config_for(dir.path(), 60_000));
    let body = "username=ghost&password=wrong";
    let req = format!(
        "POST /login HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let resp = send_and_read(addr, req.as_bytes());

    assert!(resp.contains("nope"), "{resp}");
}
