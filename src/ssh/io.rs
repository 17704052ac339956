//! Connected I/O loop, run on the UI task

use tracing::{debug, trace, warn};

use super::{SshTransport, TransportError};
use crate::input::{encode_key, Key};
use crate::terminal::SharedTerminal;

/// Outcome of one pump
#[derive(Debug)]
pub enum PumpResult {
    /// Still connected; `received` bytes went to the terminal
    Continue { received: usize },
    /// Remote closed the channel
    Eof,
    Error(TransportError),
}

/// Bulk I/O over a connected transport
pub struct SessionIo {
    transport: Box<dyn SshTransport>,
    chunk: usize,
    budget: usize,
    pending: Vec<u8>,
}

impl SessionIo {
    pub fn new(transport: Box<dyn SshTransport>, chunk: usize, budget: usize) -> Self {
        let chunk = chunk.max(1);
        Self {
            transport,
            chunk,
            budget: budget.max(chunk),
            pending: Vec::new(),
        }
    }

    /// Queue `command` plus CR for the next pump
    pub fn queue_command(&mut self, command: &str) {
        self.pending.extend_from_slice(command.as_bytes());
        self.pending.push(b'\r');
    }

    /// Write one key, encoded for the terminal's cursor-key mode
    pub fn send_key(&mut self, key: Key, application_cursor: bool) -> Result<(), TransportError> {
        let bytes = encode_key(key, application_cursor);
        trace!(?key, len = bytes.len(), "key to remote");
        self.transport.write_all(&bytes)
    }

    /// Write raw bytes in order
    pub fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.transport.write_all(data)
    }

    /// Flush queued writes, then read up to the budget into the terminal
    pub fn pump(&mut self, terminal: &SharedTerminal) -> PumpResult {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            if let Err(e) = self.transport.write_all(&pending) {
                return PumpResult::Error(e);
            }
        }

        let mut buf = vec![0u8; self.chunk];
        let mut received = 0;
        while received < self.budget {
            match self.transport.read_nonblocking(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    terminal.process(&buf[..n]);
                    received += n;
                },
                Err(TransportError::Eof) => return PumpResult::Eof,
                Err(e) => {
                    warn!(error = %e, "SSH read failed");
                    return PumpResult::Error(e);
                },
            }
        }
        if received == 0 && self.transport.is_eof() {
            debug!("remote closed the channel");
            return PumpResult::Eof;
        }
        PumpResult::Continue { received }
    }

    pub fn close(&mut self) {
        self.transport.close();
    }
}

impl Drop for SessionIo {
    fn drop(&mut self) {
        self.transport.close();
    }
}

impl std::fmt::Debug for SessionIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIo")
            .field("chunk", &self.chunk)
            .field("budget", &self.budget)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::terminal::Terminal;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    /// Calls and writes seen by a `ScriptedTransport`
    #[derive(Clone, Default)]
    pub(crate) struct TransportLog {
        calls: Arc<Mutex<Vec<String>>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl TransportLog {
        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn written(&self) -> Vec<u8> {
            self.written.lock().unwrap().clone()
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    /// In-memory transport with scripted failures and incoming data
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        log: TransportLog,
        pub(crate) refuse_key: bool,
        pub(crate) refuse_password: bool,
        pub(crate) fail_pty: bool,
        pub(crate) connect_delay: Duration,
        pub(crate) incoming: VecDeque<Vec<u8>>,
        pub(crate) eof_when_drained: bool,
    }

    impl ScriptedTransport {
        pub(crate) fn new(log: &TransportLog) -> Self {
            Self {
                log: log.clone(),
                ..Self::default()
            }
        }
    }

    impl SshTransport for ScriptedTransport {
        fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
            thread::sleep(self.connect_delay);
            self.log.push(format!("connect {host}:{port}"));
            Ok(())
        }

        fn auth_publickey(&mut self, user: &str, _pem: &str) -> Result<(), TransportError> {
            self.log.push(format!("publickey {user}"));
            if self.refuse_key {
                Err(TransportError::AuthDenied("publickey".into()))
            } else {
                Ok(())
            }
        }

        fn auth_password(&mut self, user: &str, _password: &str) -> Result<(), TransportError> {
            self.log.push(format!("password {user}"));
            if self.refuse_password {
                Err(TransportError::AuthDenied("password".into()))
            } else {
                Ok(())
            }
        }

        fn open_channel(&mut self) -> Result<(), TransportError> {
            self.log.push("channel".into());
            Ok(())
        }

        fn request_pty(&mut self, term: &str, cols: u16, rows: u16) -> Result<(), TransportError> {
            self.log.push(format!("pty {term} {cols}x{rows}"));
            if self.fail_pty {
                Err(TransportError::Pty("refused".into()))
            } else {
                Ok(())
            }
        }

        fn request_shell(&mut self) -> Result<(), TransportError> {
            self.log.push("shell".into());
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
            self.log.written.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let Some(mut next) = self.incoming.pop_front() else {
                return Ok(0);
            };
            let n = next.len().min(buf.len());
            buf[..n].copy_from_slice(&next[..n]);
            if n < next.len() {
                next.drain(..n);
                self.incoming.push_front(next);
            }
            Ok(n)
        }

        fn is_eof(&self) -> bool {
            self.eof_when_drained && self.incoming.is_empty()
        }

        fn close(&mut self) {
            self.log.push("close".into());
        }
    }

    #[test]
    fn test_pump_respects_budget() {
        let log = TransportLog::default();
        let mut transport = ScriptedTransport::new(&log);
        transport.incoming.push_back(vec![b'x'; 5000]);
        let terminal = SharedTerminal::new(Terminal::default());
        let mut io = SessionIo::new(Box::new(transport), 1024, 2048);

        assert!(matches!(io.pump(&terminal), PumpResult::Continue { received: 2048 }));
        assert!(matches!(io.pump(&terminal), PumpResult::Continue { received: 2048 }));
        assert!(matches!(io.pump(&terminal), PumpResult::Continue { received: 904 }));
        assert!(matches!(io.pump(&terminal), PumpResult::Continue { received: 0 }));
    }

    #[test]
    fn test_keys_written_in_order_with_decckm() {
        let log = TransportLog::default();
        let mut io = SessionIo::new(Box::new(ScriptedTransport::new(&log)), 1024, 8192);
        io.send_key(Key::Char(b'l'), false).unwrap();
        io.send_key(Key::Char(b's'), false).unwrap();
        io.send_key(Key::Up, true).unwrap();
        io.send_key(Key::Enter, true).unwrap();
        assert_eq!(log.written(), b"ls\x1bOA\r");
    }

    #[test]
    fn test_initial_command_sent_on_first_pump() {
        let log = TransportLog::default();
        let mut io = SessionIo::new(Box::new(ScriptedTransport::new(&log)), 1024, 8192);
        io.queue_command("uptime");
        let terminal = SharedTerminal::default();
        io.pump(&terminal);
        assert_eq!(log.written(), b"uptime\r");
    }

    #[test]
    fn test_eof_after_drain() {
        let log = TransportLog::default();
        let mut transport = ScriptedTransport::new(&log);
        transport.incoming.push_back(b"bye\r\n".to_vec());
        transport.eof_when_drained = true;
        let terminal = SharedTerminal::default();
        let mut io = SessionIo::new(Box::new(transport), 1024, 8192);
        assert!(matches!(io.pump(&terminal), PumpResult::Continue { received: 5 }));
        assert!(matches!(io.pump(&terminal), PumpResult::Eof));
        assert_eq!(terminal.with(|t| t.screen().line(0).unwrap().text()), "bye");
    }
}
