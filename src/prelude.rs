pub use crate::config::{EngineConfig, TrigMode};
pub use crate::error::{EngineError, RequestError, Result};
pub use crate::http::{Connection, ConnectionTable, HttpParser, HttpResponder, Method};

pub use mio::{
    event::Event,
    net::{TcpListener, TcpStream},
    Events, Interest, Poll, Registry, Token,
};
pub use std::collections::HashMap;
pub use std::io::{self, ErrorKind};
pub use std::net::SocketAddr;
pub use std::sync::{Arc, Mutex};
pub use std::time::{Duration, Instant};

pub const READ_BUF_SIZE: usize = 1024;
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_OK: u16 = 200;
