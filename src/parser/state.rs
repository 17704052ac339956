//! Parser State Machine
//!
//! A byte-at-a-time parser for the xterm subset this terminal supports.
//! It handles arbitrary chunk boundaries and produces semantic actions for
//! the executor.
//!
//! States:
//! - Normal: printable bytes and C0 controls
//! - Escape: after ESC, waiting for the dispatch byte
//! - CsiParam: after `ESC [`, accumulating parameters up to the final byte
//! - Osc: after `ESC ]`, discarding payload up to BEL or `ESC \`
//! - WaitChar: after a charset designator, consuming one payload byte
//!
//! Malformed input never produces output: the parser drops the sequence
//! and returns to Normal.

use tracing::trace;

use super::actions::{Action, CsiAction, CsiMarker, EscAction, MAX_PARAMS};

/// Upper bound on bytes accumulated inside one CSI sequence
const MAX_CSI_LEN: usize = 64;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const CAN: u8 = 0x18;
const SUB: u8 = 0x1a;

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Normal,
    Escape,
    CsiParam,
    Osc,
    /// Holds the designator byte (`(`, `)`, `*`, `+` or `#`)
    WaitChar(u8),
}

/// The terminal parser
#[derive(Debug)]
pub struct Parser {
    state: State,
    /// Completed parameters of the current CSI sequence
    params: Vec<u16>,
    /// Parameter being built, `None` until a digit arrives
    current: Option<u16>,
    marker: Option<CsiMarker>,
    /// Bytes seen since `ESC [`
    csi_len: usize,
    /// Sequence will be dropped at its final byte
    malformed: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Create a new parser in the normal state
    pub fn new() -> Self {
        Self {
            state: State::Normal,
            params: Vec::with_capacity(MAX_PARAMS),
            current: None,
            marker: None,
            csi_len: 0,
            malformed: false,
        }
    }

    /// Current state, mostly useful for tests
    pub fn state(&self) -> State {
        self.state
    }

    /// Reset the parser to the normal state
    pub fn reset(&mut self) {
        self.state = State::Normal;
        self.clear_csi();
    }

    fn clear_csi(&mut self) {
        self.params.clear();
        self.current = None;
        self.marker = None;
        self.csi_len = 0;
        self.malformed = false;
    }

    /// Process a chunk of bytes, returning actions
    pub fn parse(&mut self, data: &[u8]) -> Vec<Action> {
        let mut actions = Vec::new();
        for &byte in data {
            if let Some(action) = self.advance(byte) {
                actions.push(action);
            }
        }
        actions
    }

    /// Process a single byte
    pub fn advance(&mut self, byte: u8) -> Option<Action> {
        match self.state {
            State::Normal => self.normal(byte),
            State::Escape => self.escape(byte),
            State::CsiParam => self.csi_param(byte),
            State::Osc => self.osc(byte),
            State::WaitChar(slot) => self.wait_char(slot, byte),
        }
    }

    fn normal(&mut self, byte: u8) -> Option<Action> {
        match byte {
            ESC => {
                self.state = State::Escape;
                None
            },
            0x20..=0x7e => Some(Action::Print(byte)),
            0x00..=0x1f => Some(Action::Execute(byte)),
            _ => {
                trace!(byte, "ignoring non-ASCII byte");
                None
            },
        }
    }

    fn escape(&mut self, byte: u8) -> Option<Action> {
        self.state = State::Normal;
        match byte {
            b'[' => {
                self.clear_csi();
                self.state = State::CsiParam;
                None
            },
            b']' => {
                self.state = State::Osc;
                None
            },
            b'(' | b')' | b'*' | b'+' | b'#' => {
                self.state = State::WaitChar(byte);
                None
            },
            ESC => {
                self.state = State::Escape;
                None
            },
            CAN | SUB => None,
            0x00..=0x1f => Some(Action::Execute(byte)),
            _ => match EscAction::from_final(byte) {
                Some(esc) => Some(Action::Esc(esc)),
                None => {
                    trace!(byte, "dropping unknown escape");
                    None
                },
            },
        }
    }

    fn csi_param(&mut self, byte: u8) -> Option<Action> {
        self.csi_len += 1;
        if self.csi_len > MAX_CSI_LEN {
            self.malformed = true;
        }

        match byte {
            b'0'..=b'9' => {
                let digit = u16::from(byte - b'0');
                let value = self.current.unwrap_or(0);
                self.current = Some(value.saturating_mul(10).saturating_add(digit));
                None
            },
            b';' => {
                self.push_param();
                None
            },
            b'?' | b'>' | b'<' | b'=' => {
                if self.marker.is_none() && self.params.is_empty() && self.current.is_none() {
                    self.marker = Some(match byte {
                        b'?' => CsiMarker::Private,
                        b'>' => CsiMarker::Secondary,
                        other => CsiMarker::Other(other),
                    });
                } else {
                    self.malformed = true;
                }
                None
            },
            0x20..=0x2f => {
                self.malformed = true;
                None
            },
            0x40..=0x7e => {
                self.state = State::Normal;
                self.dispatch_csi(byte)
            },
            ESC => {
                trace!("CSI interrupted by ESC");
                self.state = State::Escape;
                None
            },
            0x7f => None,
            _ => {
                trace!(byte, "aborting CSI");
                self.state = State::Normal;
                None
            },
        }
    }

    fn push_param(&mut self) {
        let value = self.current.take().unwrap_or(0);
        if self.params.len() < MAX_PARAMS {
            self.params.push(value);
        }
    }

    fn dispatch_csi(&mut self, final_byte: u8) -> Option<Action> {
        if self.current.is_some() || !self.params.is_empty() {
            self.push_param();
        }
        if self.malformed {
            trace!(final_byte, "dropping malformed CSI");
            self.clear_csi();
            return None;
        }
        let action = CsiAction {
            params: std::mem::take(&mut self.params),
            marker: self.marker.take(),
            final_byte,
        };
        self.clear_csi();
        Some(Action::Csi(action))
    }

    fn osc(&mut self, byte: u8) -> Option<Action> {
        match byte {
            BEL | CAN | SUB => self.state = State::Normal,
            ESC => self.state = State::Escape,
            _ => {},
        }
        None
    }

    fn wait_char(&mut self, slot: u8, byte: u8) -> Option<Action> {
        if byte == ESC {
            self.state = State::Escape;
            return None;
        }
        self.state = State::Normal;
        Some(Action::Designate {
            slot,
            charset: byte,
        })
    }
}
