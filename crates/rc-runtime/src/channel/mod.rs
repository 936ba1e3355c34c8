//! Lifecycle command channel between controllers and the supervisor.
//!
//! The supervisor's listening socket is bound by the creating controller
//! before bootstrap and inherited through the clone, so it exists before
//! the two processes end up in different namespaces. Later controllers
//! connect to it by path, send one framed [`Request`], and read one
//! [`Response`].

pub mod protocol;

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::time::Duration;

use rc_common::error::ChannelError;

pub use protocol::{Request, Response};

/// Outcome of a call over the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The supervisor answered.
    Answered(Response),
    /// The supervisor closed the connection without answering. After START
    /// this means the supervisor image was replaced.
    HungUp,
}

/// Controller side of one channel connection.
#[derive(Debug)]
pub struct ChannelClient {
    stream: UnixStream,
}

impl ChannelClient {
    /// Connects to a supervisor's control socket.
    ///
    /// # Errors
    ///
    /// Returns the raw connect error so callers can tell a missing or
    /// abandoned socket (`NotFound`, `ConnectionRefused`) from other failures.
    pub fn connect(path: &Path, timeout: Duration) -> io::Result<Self> {
        let stream = UnixStream::connect(path)?;
        Self::from_stream(stream, timeout)
    }

    /// Wraps an already connected stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeouts cannot be applied.
    pub fn from_stream(stream: UnixStream, timeout: Duration) -> io::Result<Self> {
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(Self { stream })
    }

    /// Sends one request and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the request cannot be written, the reply
    /// is malformed, or no reply arrives within the timeout.
    pub fn call(&mut self, request: &Request) -> Result<Reply, ChannelError> {
        tracing::debug!(operation = %request.operation, "sending request");
        protocol::write_request(&mut self.stream, request)?;
        match protocol::read_response(&mut self.stream)? {
            Some(response) => Ok(Reply::Answered(response)),
            None => Ok(Reply::HungUp),
        }
    }
}

/// Supervisor side of one accepted connection.
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
}

impl Connection {
    /// Reads the connection's request.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] for closed, truncated, or malformed input.
    pub fn receive(&mut self) -> Result<Request, ChannelError> {
        protocol::read_request(&mut self.stream)
    }

    /// Answers the request.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] if the peer is gone.
    pub fn respond(&mut self, response: &Response) -> Result<(), ChannelError> {
        protocol::write_response(&mut self.stream, response)
    }
}

/// Pause before accepting again after a transient failure.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept failures that concern one connection or a passing resource
/// shortage rather than the listener itself.
fn is_transient(error: &io::Error) -> bool {
    use nix::errno::Errno;

    error.kind() == io::ErrorKind::ConnectionAborted
        || error.raw_os_error().is_some_and(|code| {
            [Errno::EMFILE, Errno::ENFILE, Errno::ENOBUFS, Errno::ENOMEM, Errno::EPROTO]
                .iter()
                .any(|errno| *errno as i32 == code)
        })
}

/// Blocks until the next controller connects.
///
/// Accepted streams are close-on-exec, so a connection still open when the
/// supervisor replaces its image is closed by the kernel. Aborted
/// connections and descriptor or memory shortages are retried; any other
/// accept failure means the listener is unusable.
///
/// # Errors
///
/// Returns [`ChannelError::Io`] if the listener itself is broken.
pub fn accept(listener: &UnixListener, timeout: Duration) -> Result<Connection, ChannelError> {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                return Ok(Connection { stream });
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_transient(&e) => {
                tracing::warn!(error = %e, "accept failed, retrying");
                std::thread::sleep(ACCEPT_BACKOFF);
            }
            Err(e) => return Err(ChannelError::Io(e)),
        }
    }
}
