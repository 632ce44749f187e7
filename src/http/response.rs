use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::sync::OnceLock;

use memmap2::Mmap;

use crate::buffer::ByteBuffer;

fn suffix_type() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        HashMap::from([
            (".html", "text/html"),
            (".xml", "text/xml"),
            (".xhtml", "application/xhtml+xml"),
            (".txt", "text/plain"),
            (".rtf", "application/rtf"),
            (".pdf", "application/pdf"),
            (".word", "application/nsword"),
            (".png", "image/png"),
            (".gif", "image/gif"),
            (".jpg", "image/jpeg"),
            (".jpeg", "image/jpeg"),
            (".au", "audio/basic"),
            (".mpeg", "video/mpeg"),
            (".mpg", "video/mpeg"),
            (".avi", "video/x-msvideo"),
            (".gz", "application/x-gzip"),
            (".tar", "application/x-tar"),
            (".css", "text/css"),
            (".js", "text/javascript"),
        ])
    })
}

fn code_status(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

fn default_code_path(code: u16) -> &'static str {
    match code {
        400 => "/400.html",
        403 => "/403.html",
        404 => "/404.html",
        _ => "/400.html",
    }
}

/// Builds one response into a `ByteBuffer` header region, and exposes the
/// body either as an `mmap`-backed file region (zero-copy) or an inline
/// synthesized error body when the file can't be mapped.
pub struct HttpResponder {
    src_dir: String,
    path: String,
    keep_alive: bool,
    code: Option<u16>,
    error_pages: HashMap<u16, String>,
    mapped: Option<Mmap>,
    inline_body: Vec<u8>,
    file_len: u64,
    body_pos: usize,
}

impl HttpResponder {
    pub fn new() -> Self {
        Self {
            src_dir: String::new(),
            path: String::new(),
            keep_alive: false,
            code: None,
            error_pages: HashMap::new(),
            mapped: None,
            inline_body: Vec::new(),
            file_len: 0,
            body_pos: 0,
        }
    }

    pub fn init(&mut self, src_dir: &str, path: &str, keep_alive: bool, code: Option<u16>) {
        self.init_with_error_pages(src_dir, path, keep_alive, code, &HashMap::new());
    }

    /// Same as `init`, but consults `error_pages` (typically
    /// `EngineConfig::error_pages`) ahead of the built-in defaults when
    /// resolving the canonical page for a 400/403/404 response.
    pub fn init_with_error_pages(
        &mut self,
        src_dir: &str,
        path: &str,
        keep_alive: bool,
        code: Option<u16>,
        error_pages: &HashMap<u16, String>,
    ) {
        self.unmap_file();
        self.src_dir = src_dir.to_string();
        self.path = path.to_string();
        self.keep_alive = keep_alive;
        self.code = code;
        self.error_pages = error_pages.clone();
        self.inline_body.clear();
        self.file_len = 0;
        self.body_pos = 0;
    }

    fn code_path(&self, code: u16) -> String {
        self.error_pages
            .get(&code)
            .cloned()
            .unwrap_or_else(|| default_code_path(code).to_string())
    }

    pub fn code(&self) -> u16 {
        self.code.unwrap_or(200)
    }

    /// Remaining (unwritten) body bytes, advanced by `advance_body` as a
    /// partial vectored write progresses.
    pub fn file(&self) -> &[u8] {
        let full: &[u8] = match &self.mapped {
            Some(m) => m,
            None => &self.inline_body,
        };
        &full[self.body_pos.min(full.len())..]
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn advance_body(&mut self, n: usize) {
        self.body_pos += n;
    }

    pub fn unmap_file(&mut self) {
        self.mapped = None;
        self.body_pos = 0;
    }

    /// Writes the status line and headers into `buf`, and loads the body
    /// (mmap or inline). Mirrors the source's four-step resolution:
    /// stat the requested path, fall back to the canonical error page on
    /// 400/403/404, and synthesize an inline body if even that fails.
    pub fn make_response(&mut self, buf: &mut ByteBuffer) {
        let full_path = format!("{}{}", self.src_dir, self.path);
        let meta = std::fs::metadata(&full_path);

        let mut code = match &meta {
            Ok(m) if m.is_dir() => 404,
            Err(_) => 404,
            Ok(m) if (m.mode() & 0o004) == 0 => 403,
            _ => self.code.unwrap_or(200),
        };
        if self.code.is_none() {
            self.code = Some(code);
        } else {
            code = self.code.unwrap();
        }

        let resolved_path = if matches!(code, 400 | 403 | 404) {
            self.code_path(code)
        } else {
            self.path.clone()
        };

        self.load_body(&resolved_path, code);

        self.add_state_line(buf, code);
        self.add_headers(buf, code, &resolved_path);
        buf.append_str("\r\n");
    }

    fn load_body(&mut self, resolved_path: &str, code: u16) {
        let full_path = format!("{}{}", self.src_dir, resolved_path);
        match File::open(&full_path).and_then(|f| {
            let meta = f.metadata()?;
            Ok((f, meta.len()))
        }) {
            Ok((file, len)) if len > 0 => match unsafe { Mmap::map(&file) } {
                Ok(m) => {
                    self.file_len = len;
                    self.mapped = Some(m);
                }
                Err(_) => self.error_content(code),
            },
            Ok((_, _)) => {
                self.mapped = None;
                self.file_len = 0;
            }
            Err(_) => self.error_content(code),
        }
    }

    fn error_content(&mut self, code: u16) {
        self.mapped = None;
        let body = format!(
            "<html><title>Error</title><body bgcolor=\"ffffff\">{} : {}</body></html>",
            code,
            code_status(code)
        );
        self.file_len = body.len() as u64;
        self.inline_body = body.into_bytes();
    }

    fn add_state_line(&self, buf: &mut ByteBuffer, code: u16) {
        buf.append_str(&format!("HTTP/1.1 {} {}\r\n", code, code_status(code)));
    }

    fn add_headers(&self, buf: &mut ByteBuffer, code: u16, resolved_path: &str) {
        if self.keep_alive {
            buf.append_str("Connection: keep-alive\r\n");
            buf.append_str("keep-alive: timeout=120\r\n");
        } else {
            buf.append_str("Connection: close\r\n");
        }
        let mime = mime_for(resolved_path);
        buf.append_str(&format!("Content-Type: {mime}\r\n"));
        let len = if matches!(code, 400 | 403 | 404) && self.mapped.is_none() {
            self.inline_body.len() as u64
        } else {
            self.file_len
        };
        buf.append_str(&format!("Content-Length: {len}\r\n"));
    }
}

impl Default for HttpResponder {
    fn default() -> Self {
        Self::new()
    }
}

fn mime_for(path: &str) -> &'static str {
    let suffix = path.rfind('.').map(|i| &path[i..]).unwrap_or("");
    suffix_type().get(suffix).copied().unwrap_or("text/plain")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn static_file_resolves_to_200_with_matching_content_length() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), b"hi").unwrap();

        let mut responder = HttpResponder::new();
        responder.init(dir.path().to_str().unwrap(), "/index.html", true, None);
        let mut buf = ByteBuffer::new();
        responder.make_response(&mut buf);

        let headers = buf.retrieve_all_to_string();
        assert!(headers.contains("200 OK"));
        assert!(headers.contains("Content-Length: 2"));
        assert_eq!(responder.file(), b"hi");
    }

    #[test]
    fn missing_file_resolves_to_404() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("404.html"), b"nf").unwrap();

        let mut responder = HttpResponder::new();
        responder.init(dir.path().to_str().unwrap(), "/nope", false, None);
        let mut buf = ByteBuffer::new();
        responder.make_response(&mut buf);

        let headers = buf.retrieve_all_to_string();
        assert!(headers.contains("404 Not Found"));
        assert_eq!(responder.file(), b"nf");
    }

    #[test]
    fn unreadable_file_resolves_to_403() {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("secret");
        let mut f = std::fs::File::create(&secret).unwrap();
        f.write_all(b"shh").unwrap();
        std::fs::set_permissions(&secret, std::fs::Permissions::from_mode(0o600)).unwrap();
        std::fs::write(dir.path().join("403.html"), b"forbidden").unwrap();

        let mut responder = HttpResponder::new();
        responder.init(dir.path().to_str().unwrap(), "/secret", false, None);
        let mut buf = ByteBuffer::new();
        responder.make_response(&mut buf);

        let headers = buf.retrieve_all_to_string();
        assert!(headers.contains("403 Forbidden"));
    }

    #[test]
    fn mime_type_falls_back_to_text_plain_for_unknown_suffix() {
        assert_eq!(mime_for("/a.html"), "text/html");
        assert_eq!(mime_for("/a.unknown"), "text/plain");
    }

    #[test]
    fn configured_error_page_overrides_the_built_in_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("oops.html"), b"custom 404").unwrap();

        let mut overrides = HashMap::new();
        overrides.insert(404, "/oops.html".to_string());

        let mut responder = HttpResponder::new();
        responder.init_with_error_pages(
            dir.path().to_str().unwrap(),
            "/missing",
            false,
            None,
            &overrides,
        );
        let mut buf = ByteBuffer::new();
        responder.make_response(&mut buf);

        assert!(buf.retrieve_all_to_string().contains("404 Not Found"));
        assert_eq!(responder.file(), b"custom 404");
    }
}
