use std::collections::HashMap;
use std::time::Duration;

use crate::buffer::ByteBuffer;
use crate::sql::{SqlConnection, SqlPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, PartialEq, Eq)]
enum ParseState {
    RequestLine,
    Headers,
    Body,
    Finish,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    NeedMore,
    Done,
}

/// Scans `buf` for bytes `"\r\n"` starting at `from`, returning the index
/// of the `\r`. Used by both the request-line and header phases.
fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|p| from + p)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(
                    std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""),
                    16,
                ) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_form_body(body: &str) -> HashMap<String, String> {
    let mut form = HashMap::new();
    for pair in body.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut it = pair.splitn(2, '=');
        let key = it.next().unwrap_or("");
        let val = it.next().unwrap_or("");
        form.insert(percent_decode(key), percent_decode(val));
    }
    form
}

/// Per-connection request parser state machine: RequestLine -> Headers ->
/// Body -> Finish. `parse` consumes as much of `buf` as it can and
/// returns `NeedMore` when a full line or body has not yet arrived —
/// the reactor must preserve buffer contents across reads so the next
/// call picks up exactly where this one left off.
pub struct HttpParser {
    state: ParseState,
    pub method: Method,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    content_length: usize,
    body_start: usize,
}

impl HttpParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            method: Method::Get,
            path: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            content_length: 0,
            body_start: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == ParseState::Finish
    }

    pub fn is_keep_alive(&self) -> bool {
        let conn = self
            .headers
            .get("connection")
            .map(|v| v.to_ascii_lowercase());
        match self.version.as_str() {
            "1.1" | "1.0" => conn.as_deref() == Some("keep-alive"),
            _ => false,
        }
    }

    /// Drives the state machine as far as `buf`'s contents allow. On a
    /// malformed request line, sets `path` to the 400 sentinel and
    /// transitions straight to `Finish` so the responder can still
    /// produce a reply.
    pub fn parse<C: SqlConnection>(
        &mut self,
        buf: &mut ByteBuffer,
        sql: Option<&SqlPool<C>>,
    ) -> (ParseOutcome, Option<u16>) {
        loop {
            match self.state {
                ParseState::RequestLine => match self.parse_request_line(buf) {
                    Some(Ok(())) => self.state = ParseState::Headers,
                    Some(Err(code)) => {
                        self.state = ParseState::Finish;
                        return (ParseOutcome::Done, Some(code));
                    }
                    None => return (ParseOutcome::NeedMore, None),
                },
                ParseState::Headers => match self.parse_headers(buf) {
                    Some(true) => self.state = ParseState::Body,
                    Some(false) => self.state = ParseState::Finish,
                    None => return (ParseOutcome::NeedMore, None),
                },
                ParseState::Body => match self.parse_body(buf, sql) {
                    Some(()) => self.state = ParseState::Finish,
                    None => return (ParseOutcome::NeedMore, None),
                },
                ParseState::Finish => return (ParseOutcome::Done, None),
            }
        }
    }

    fn parse_request_line(&mut self, buf: &mut ByteBuffer) -> Option<Result<(), u16>> {
        let data = buf.peek();
        let end = find_crlf(data, 0)?;
        let line = std::str::from_utf8(&data[..end]).unwrap_or("").to_string();
        buf.retrieve_until(end + 2);

        let mut parts = line.split(' ');
        let (method, uri, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(u), Some(v)) => (m, u, v),
            _ => return Some(Err(400)),
        };

        self.method = match method {
            "GET" => Method::Get,
            "POST" => Method::Post,
            _ => return Some(Err(400)),
        };

        let version = match version.strip_prefix("HTTP/") {
            Some(v) => v.trim_end(),
            None => return Some(Err(400)),
        };
        self.version = version.to_string();

        self.path = if uri == "/" {
            "/index.html".to_string()
        } else {
            uri.to_string()
        };

        Some(Ok(()))
    }

    fn parse_headers(&mut self, buf: &mut ByteBuffer) -> Option<bool> {
        loop {
            let data = buf.peek();
            let end = find_crlf(data, 0)?;

            if end == 0 {
                buf.retrieve_until(2);
                return Some(self.method == Method::Post);
            }

            let line = std::str::from_utf8(&data[..end]).unwrap_or("").to_string();
            buf.retrieve_until(end + 2);

            if let Some(colon) = line.find(':') {
                let key = line[..colon].trim().to_ascii_lowercase();
                let value = line[colon + 1..].trim_start().to_string();
                if key == "content-length" {
                    self.content_length = value.parse().unwrap_or(0);
                }
                self.headers.insert(key, value);
            }
        }
    }

    fn parse_body<C: SqlConnection>(
        &mut self,
        buf: &mut ByteBuffer,
        sql: Option<&SqlPool<C>>,
    ) -> Option<()> {
        if buf.readable_bytes() < self.content_length {
            return None;
        }

        let body = std::str::from_utf8(&buf.peek()[..self.content_length])
            .unwrap_or("")
            .to_string();
        buf.retrieve(self.content_length);

        let is_form = self
            .headers
            .get("content-type")
            .map(|v| v.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        if is_form && (self.path == "/login" || self.path == "/register") {
            let form = parse_form_body(&body);
            let user = form.get("username").cloned().unwrap_or_default();
            let pass = form.get("password").cloned().unwrap_or_default();
            let ok = self.run_credential_check(sql, &user, &pass);
            self.path = if ok { "/welcome.html" } else { "/error.html" }.to_string();
        }

        Some(())
    }

    fn run_credential_check<C: SqlConnection>(
        &self,
        sql: Option<&SqlPool<C>>,
        user: &str,
        pass: &str,
    ) -> bool {
        let Some(pool) = sql else { return false };
        let Some(mut conn) = pool.borrow(Duration::from_millis(200)) else {
            return false;
        };

        let result = if self.path == "/login" {
            conn.verify_login(user, pass)
        } else {
            conn.register(user, pass)
        };

        pool.release(conn);
        result.unwrap_or(false)
    }
}

impl Default for HttpParser {
    fn default() -> Self {
        Self::new()
    }
}
