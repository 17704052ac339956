//! SSH Session
//!
//! The wire protocol is behind `SshTransport`. `Session` runs the connect
//! sequence on a worker thread and publishes its progress through an
//! atomic state; once connected the UI task takes the transport and
//! drives it with `SessionIo`.

mod io;
mod session;

use std::sync::atomic::{AtomicU8, Ordering};

pub use self::io::{PumpResult, SessionIo};
pub use session::{ConnectParams, Session};

/// Transport errors, one per connect step plus the I/O loop's
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    /// Every offered authentication method was refused
    #[error("authentication denied: {0}")]
    AuthDenied(String),
    #[error("channel open failed: {0}")]
    Channel(String),
    #[error("PTY request failed: {0}")]
    Pty(String),
    #[error("shell request failed: {0}")]
    Shell(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote closed the channel")]
    Eof,
    #[error("cancelled")]
    Cancelled,
}

/// SSH client capability
pub trait SshTransport: Send {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    fn auth_publickey(&mut self, user: &str, pem: &str) -> Result<(), TransportError>;

    fn auth_password(&mut self, user: &str, password: &str) -> Result<(), TransportError>;

    fn open_channel(&mut self) -> Result<(), TransportError>;

    fn request_pty(&mut self, term: &str, cols: u16, rows: u16) -> Result<(), TransportError>;

    fn request_shell(&mut self) -> Result<(), TransportError>;

    /// Bytes accepted, possibly fewer than offered
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Bytes available now; `Ok(0)` when nothing is pending
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn is_eof(&self) -> bool;

    fn close(&mut self);

    fn write_all(&mut self, mut data: &[u8]) -> Result<(), TransportError> {
        while !data.is_empty() {
            let n = self.write(data)?;
            if n == 0 {
                return Err(TransportError::Eof);
            }
            data = &data[n..];
        }
        Ok(())
    }
}

/// Creates a fresh transport per connect
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn SshTransport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Box<dyn SshTransport> + Send + Sync,
{
    fn create(&self) -> Box<dyn SshTransport> {
        self()
    }
}

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    /// Terminal; the error is kept on the session
    Failed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            3 => SessionState::Failed,
            _ => SessionState::Disconnected,
        }
    }
}

/// State readable from any task without a lock
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
