use std::io;
use std::time::Duration;

use mio::event::Event;
use mio::{Events, Interest, Poll, Registry, Token};

/// Thin wrapper over the platform readiness multiplexer. Registration is
/// always one-shot: after a connection's fd fires, it stays disarmed
/// until the reactor explicitly re-registers it, which is the sole
/// mechanism preventing two workers from touching the same connection at
/// once.
pub struct Demultiplexer {
    poll: Poll,
    events: Events,
}

impl Demultiplexer {
    pub fn new(events_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(events_capacity),
        })
    }

    pub fn register(
        &mut self,
        source: &mut impl mio::event::Source,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interests)
    }

    pub fn reregister(
        &mut self,
        source: &mut impl mio::event::Source,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interests)
    }

    pub fn deregister(&mut self, source: &mut impl mio::event::Source) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// A cloned `Registry` handle workers can use to re-arm a connection's
    /// fd without touching the reactor thread — `Registry` is internally
    /// an `epoll_ctl`-backed handle, safe to call concurrently.
    pub fn try_clone_registry(&self) -> io::Result<Registry> {
        self.poll.registry().try_clone()
    }

    /// Blocks up to `timeout` (or indefinitely if `None`) and returns the
    /// events that fired. `None` timeout is only appropriate when the
    /// timer heap has no pending deadlines.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<&Events> {
        loop {
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => return Ok(&self.events),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

pub fn is_readable(event: &Event) -> bool {
    event.is_readable()
}

pub fn is_writable(event: &Event) -> bool {
    event.is_writable()
}

pub fn is_error_or_hup(event: &Event) -> bool {
    event.is_error() || event.is_read_closed() || event.is_write_closed()
}
