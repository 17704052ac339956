//! Terminal Executor
//!
//! Ties together the parser and the screen model, applying parsed actions
//! to update the terminal state. `SharedTerminal` is the locked handle the
//! SSH I/O loop writes through and the render pipeline reads through.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::core::{Screen, Snapshot};
use crate::parser::{Action, CsiAction, CsiMarker, EscAction, Parser};

/// Screen width in cells
pub const TERM_COLS: usize = 40;
/// Screen height in cells
pub const TERM_ROWS: usize = 30;
/// Rows kept in the scrollback ring by default
pub const SCROLLBACK_LINES: usize = 200;
/// Terminal type announced in the PTY request
pub const TERM_TYPE: &str = "xterm-mono";

/// Terminal executor that processes parsed actions and updates the screen
#[derive(Debug)]
pub struct Terminal {
    screen: Screen,
    parser: Parser,
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new(TERM_COLS, TERM_ROWS, SCROLLBACK_LINES)
    }
}

impl Terminal {
    /// Create a new terminal with the given dimensions
    pub fn new(cols: usize, rows: usize, scrollback_capacity: usize) -> Self {
        Self {
            screen: Screen::new(cols, rows, scrollback_capacity),
            parser: Parser::new(),
        }
    }

    /// Get a reference to the screen
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Get a mutable reference to the screen
    pub fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screen
    }

    /// Feed bytes from the remote side
    pub fn process(&mut self, data: &[u8]) {
        for &byte in data {
            if let Some(action) = self.parser.advance(byte) {
                self.apply_action(action);
            }
        }
        self.screen.sync_cursor_dirty();
    }

    /// Write a local status line (connect banners and the like) on its own row
    pub fn write_banner(&mut self, text: &str) {
        if self.screen.cursor().col != 0 {
            self.process(b"\r\n");
        }
        self.process(text.as_bytes());
        self.process(b"\r\n");
    }

    /// Snapshot of the current state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_screen(&self.screen)
    }

    /// Reset screen and parser state
    pub fn reset(&mut self) {
        self.parser.reset();
        self.screen.reset();
    }

    /// Apply a single parsed action to the screen
    fn apply_action(&mut self, action: Action) {
        match action {
            Action::Print(byte) => self.screen.print(byte),
            Action::Execute(byte) => self.execute_c0(byte),
            Action::Csi(csi) => self.execute_csi(&csi),
            Action::Esc(esc) => self.execute_esc(esc),
            Action::Designate { slot, charset } => {
                if slot == b'(' {
                    match charset {
                        b'0' => self.screen.modes.line_drawing = true,
                        b'B' => self.screen.modes.line_drawing = false,
                        _ => {},
                    }
                }
            },
        }
    }

    /// Execute a C0 control character
    fn execute_c0(&mut self, byte: u8) {
        match byte {
            0x08 => self.screen.backspace(),
            0x09 => self.screen.tab(),
            // LF, VT, FF
            0x0a..=0x0c => self.screen.linefeed(),
            0x0d => self.screen.carriage_return(),
            _ => {},
        }
    }

    fn execute_esc(&mut self, esc: EscAction) {
        match esc {
            EscAction::ReverseIndex => self.screen.reverse_index(),
            EscAction::Index => self.screen.index(),
            EscAction::NextLine => self.screen.next_line(),
            EscAction::SaveCursor => self.screen.save_cursor(),
            EscAction::RestoreCursor => self.screen.restore_cursor(),
            EscAction::ApplicationKeypad => self.screen.modes.application_keypad = true,
            EscAction::NormalKeypad => self.screen.modes.application_keypad = false,
            EscAction::FullReset => self.screen.reset(),
            EscAction::StringTerminator => {},
        }
    }

    /// Execute a CSI sequence
    fn execute_csi(&mut self, csi: &CsiAction) {
        match csi.marker {
            Some(CsiMarker::Private) => {
                self.execute_csi_private(csi);
                return;
            },
            Some(_) => {
                trace!(final_byte = csi.final_byte, "ignoring marked CSI");
                return;
            },
            None => {},
        }

        let n = csi.param_or_default(0, 1) as usize;
        match csi.final_byte {
            // Cursor movement
            b'A' => self.screen.move_cursor_up(n),
            b'B' => self.screen.move_cursor_down(n),
            b'C' => self.screen.move_cursor_forward(n),
            b'D' => self.screen.move_cursor_backward(n),
            b'E' => {
                self.screen.move_cursor_down(n);
                self.screen.move_cursor_to_col(0);
            },
            b'F' => {
                self.screen.move_cursor_up(n);
                self.screen.move_cursor_to_col(0);
            },
            b'G' => self.screen.move_cursor_to_col(n - 1),
            b'd' => self.screen.move_cursor_to_row(n - 1),
            b'H' | b'f' => {
                let col = csi.param_or_default(1, 1) as usize;
                self.screen.move_cursor_to(n - 1, col - 1);
            },

            // Erase
            b'J' => self.screen.erase_in_display(csi.param(0)),
            b'K' => self.screen.erase_in_line(csi.param(0)),
            b'X' => self.screen.erase_chars(n),

            // Insert/Delete
            b'L' => self.screen.insert_lines(n),
            b'M' => self.screen.delete_lines(n),
            b'@' => self.screen.insert_chars(n),
            b'P' => self.screen.delete_chars(n),

            // Scroll
            b'S' => self.screen.scroll_up(n),
            b'T' => self.screen.scroll_down(n),

            b'r' => {
                let rows = self.screen.rows() as u16;
                let top = csi.param_or_default(0, 1) as usize;
                let bottom = csi.param_or_default(1, rows) as usize;
                self.screen.set_scroll_region(top - 1, bottom - 1);
            },

            b'm' => self.execute_sgr(csi),

            b's' if csi.params.is_empty() => self.screen.save_cursor(),
            b'u' if csi.params.is_empty() => self.screen.restore_cursor(),

            // Device attributes: no reply channel, consumed
            b'c' => {},

            _ => trace!(
                params = ?csi.params,
                final_byte = csi.final_byte,
                "unhandled CSI"
            ),
        }
    }

    /// Execute a private CSI sequence (starts with ?)
    fn execute_csi_private(&mut self, csi: &CsiAction) {
        let enable = match csi.final_byte {
            b'h' => true,
            b'l' => false,
            _ => return,
        };
        for &mode in &csi.params {
            self.set_dec_mode(mode, enable);
        }
    }

    fn set_dec_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.screen.modes.application_cursor = enable,
            25 => self.screen.set_cursor_visible(enable),
            47 | 1047 => {
                if enable {
                    self.screen.enter_alternate_screen(false, false);
                } else {
                    self.screen.exit_alternate_screen(false);
                }
            },
            1049 => {
                if enable {
                    self.screen.enter_alternate_screen(true, true);
                } else {
                    self.screen.exit_alternate_screen(true);
                }
            },
            _ => trace!(mode, enable, "unsupported DEC mode"),
        }
    }

    /// SGR: only inverse video exists on this panel
    fn execute_sgr(&mut self, csi: &CsiAction) {
        if csi.params.is_empty() {
            self.screen.set_inverse(false);
            return;
        }
        for &param in &csi.params {
            match param {
                0 | 27 => self.screen.set_inverse(false),
                7 => self.screen.set_inverse(true),
                _ => {},
            }
        }
    }
}

/// Locked handle to a terminal shared between the SSH worker and the UI.
///
/// Every access goes through one closure holding the lock, so callers
/// cannot nest locks or hold the guard across a blocking call.
#[derive(Debug, Clone, Default)]
pub struct SharedTerminal {
    inner: Arc<Mutex<Terminal>>,
}

impl SharedTerminal {
    /// Wrap a terminal
    pub fn new(terminal: Terminal) -> Self {
        Self {
            inner: Arc::new(Mutex::new(terminal)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Terminal> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the terminal under the lock
    pub fn with<R>(&self, f: impl FnOnce(&Terminal) -> R) -> R {
        f(&self.lock())
    }

    /// Mutate the terminal under the lock
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Terminal) -> R) -> R {
        f(&mut self.lock())
    }

    /// Feed remote bytes under the lock
    pub fn process(&self, data: &[u8]) {
        self.lock().process(data);
    }

    /// Write a banner line under the lock
    pub fn write_banner(&self, text: &str) {
        self.lock().write_banner(text);
    }
}
