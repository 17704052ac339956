//! Connect worker
//!
//! The worker thread owns the transport until the shell is up. It checks
//! the cancel flag before every blocking step and writes one banner line
//! into the terminal per outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::io::SessionIo;
use super::{AtomicState, SessionState, SshTransport, TransportError, TransportFactory};
use crate::app::Config;
use crate::runtime::RefreshHandle;
use crate::terminal::SharedTerminal;

/// Everything needed to open a session
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// PEM private key, tried before the password
    pub key: Option<String>,
    pub term_type: String,
    pub cols: u16,
    pub rows: u16,
    /// Sent followed by CR once the shell is up
    pub initial_command: Option<String>,
}

impl ConnectParams {
    pub fn new(host: &str, port: u16, user: &str, password: &str) -> Self {
        let config = Config::default();
        Self {
            host: host.to_string(),
            port,
            user: user.to_string(),
            password: password.to_string(),
            key: None,
            term_type: config.term_type,
            cols: config.cols as u16,
            rows: config.rows as u16,
            initial_command: None,
        }
    }

    /// PTY geometry and TERM from the config
    pub fn with_terminal(mut self, config: &Config) -> Self {
        self.term_type = config.term_type.clone();
        self.cols = u16::try_from(config.cols).unwrap_or(u16::MAX);
        self.rows = u16::try_from(config.rows).unwrap_or(u16::MAX);
        self
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.key = key;
        self
    }

    pub fn with_initial_command(mut self, command: Option<String>) -> Self {
        self.initial_command = command;
        self
    }
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("key", &self.key.is_some())
            .field("term_type", &self.term_type)
            .finish()
    }
}

struct Shared {
    state: AtomicState,
    cancel: AtomicBool,
    error: Mutex<Option<TransportError>>,
    transport: Mutex<Option<Box<dyn SshTransport>>>,
}

impl Shared {
    fn error(&self) -> MutexGuard<'_, Option<TransportError>> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transport(&self) -> MutexGuard<'_, Option<Box<dyn SshTransport>>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// Handle on one SSH session
pub struct Session {
    shared: Arc<Shared>,
    host: String,
    port: u16,
    initial_command: Option<String>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Start connecting on a worker thread
    pub fn connect(
        params: ConnectParams,
        factory: &dyn TransportFactory,
        terminal: SharedTerminal,
        refresh: RefreshHandle,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: AtomicState::new(SessionState::Connecting),
            cancel: AtomicBool::new(false),
            error: Mutex::new(None),
            transport: Mutex::new(None),
        });
        let transport = factory.create();
        let host = params.host.clone();
        let port = params.port;
        let initial_command = params.initial_command.clone();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("ssh-connect".into())
            .spawn(move || run_connect(transport, params, &worker_shared, &terminal, &refresh))?;
        Ok(Self {
            shared,
            host,
            port,
            initial_command,
            worker: Some(worker),
        })
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.load()
    }

    /// Captured failure text
    pub fn error(&self) -> Option<String> {
        self.shared.error().as_ref().map(ToString::to_string)
    }

    /// Take the captured failure
    pub fn take_error(&self) -> Option<TransportError> {
        self.shared.error().take()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Ask the worker to stop at its next step
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled()
    }

    /// Wait for the worker to finish
    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("SSH worker panicked");
                self.shared.state.store(SessionState::Failed);
            }
        }
    }

    /// Hand the connected transport to the UI task. Only succeeds once,
    /// and only while `Connected`.
    pub fn take_channel(&mut self, chunk: usize, budget: usize) -> Option<SessionIo> {
        if self.state() != SessionState::Connected {
            return None;
        }
        self.join();
        let transport = self.shared.transport().take()?;
        let mut io = SessionIo::new(transport, chunk, budget);
        if let Some(command) = self.initial_command.take() {
            io.queue_command(&command);
        }
        Some(io)
    }

    /// Record that the I/O loop ended
    pub fn mark_disconnected(&self, error: Option<TransportError>) {
        if let Some(error) = error {
            *self.shared.error() = Some(error);
        }
        self.shared.state.store(SessionState::Disconnected);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel();
        self.join();
        if let Some(mut transport) = self.shared.transport().take() {
            transport.close();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state())
            .finish()
    }
}

fn run_connect(
    mut transport: Box<dyn SshTransport>,
    params: ConnectParams,
    shared: &Shared,
    terminal: &SharedTerminal,
    refresh: &RefreshHandle,
) {
    let banner = |text: &str| {
        terminal.write_banner(text);
        refresh.request();
    };
    banner(&format!("Connecting to {}:{}...", params.host, params.port));

    match connect_steps(transport.as_mut(), &params, shared) {
        Ok(()) => {
            *shared.transport() = Some(transport);
            banner("SSH Connected!");
            info!(host = %params.host, port = params.port, "SSH session up");
            shared.state.store(SessionState::Connected);
        },
        Err(TransportError::Cancelled) => {
            transport.close();
            info!(host = %params.host, "connect cancelled");
            *shared.error() = Some(TransportError::Cancelled);
            shared.state.store(SessionState::Disconnected);
        },
        Err(e) => {
            transport.close();
            banner(failure_banner(&e));
            warn!(host = %params.host, error = %e, "SSH connect failed");
            *shared.error() = Some(e);
            shared.state.store(SessionState::Failed);
        },
    }
    refresh.request();
}

fn failure_banner(error: &TransportError) -> &'static str {
    match error {
        TransportError::AuthDenied(_) => "SSH auth failed!",
        TransportError::Channel(_) => "Channel open failed!",
        TransportError::Pty(_) => "PTY request failed!",
        TransportError::Shell(_) => "Shell request failed!",
        _ => "SSH connect failed!",
    }
}

fn checkpoint(shared: &Shared) -> Result<(), TransportError> {
    if shared.cancelled() {
        Err(TransportError::Cancelled)
    } else {
        Ok(())
    }
}

fn connect_steps(
    transport: &mut dyn SshTransport,
    params: &ConnectParams,
    shared: &Shared,
) -> Result<(), TransportError> {
    checkpoint(shared)?;
    transport.connect(&params.host, params.port)?;

    checkpoint(shared)?;
    authenticate(transport, params)?;

    checkpoint(shared)?;
    transport.open_channel()?;

    checkpoint(shared)?;
    transport.request_pty(&params.term_type, params.cols, params.rows)?;

    checkpoint(shared)?;
    transport.request_shell()?;
    checkpoint(shared)
}

fn authenticate(transport: &mut dyn SshTransport, params: &ConnectParams) -> Result<(), TransportError> {
    if let Some(key) = params.key.as_deref().filter(|k| !k.is_empty()) {
        match transport.auth_publickey(&params.user, key) {
            Ok(()) => {
                debug!("public key accepted");
                return Ok(());
            },
            Err(TransportError::AuthDenied(reason)) => {
                debug!(%reason, "public key refused, trying password");
            },
            Err(e) => return Err(e),
        }
    }
    transport.auth_password(&params.user, &params.password)
}
