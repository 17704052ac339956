//! Terminal actions produced by the parser
//!
//! These actions represent the semantic meaning of parsed escape sequences.
//! The executor in `terminal` maps each one onto screen operations.

use serde::{Deserialize, Serialize};

/// Maximum number of CSI parameters kept; extras are dropped
pub const MAX_PARAMS: usize = 16;

/// Actions produced by the parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Print a printable ASCII byte (0x20-0x7E) at the cursor
    Print(u8),

    /// Execute a C0 control byte (0x00-0x1F except ESC).
    /// Only CR, LF, VT, FF, BS and HT have an effect on this terminal.
    Execute(u8),

    /// Complete CSI sequence
    Csi(CsiAction),

    /// Two-byte escape sequence
    Esc(EscAction),

    /// Character set designation: `ESC <slot> <charset>`
    Designate {
        /// One of `(`, `)`, `*`, `+`, `#`
        slot: u8,
        /// The payload byte, e.g. `0` for DEC special graphics
        charset: u8,
    },
}

impl Action {
    /// Check if this is a print action
    pub fn is_print(&self) -> bool {
        matches!(self, Action::Print(_))
    }
}

/// Leading marker of a CSI parameter string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsiMarker {
    /// `?` DEC private mode
    Private,
    /// `>` secondary device attributes
    Secondary,
    /// `<` or `=`, accepted and ignored
    Other(u8),
}

/// A parsed CSI sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsiAction {
    /// Numeric parameters; empty parameters are 0
    pub params: Vec<u16>,
    /// Leading marker, if any
    pub marker: Option<CsiMarker>,
    /// Final byte (0x40-0x7E)
    pub final_byte: u8,
}

impl CsiAction {
    /// Raw parameter, 0 when absent
    pub fn param(&self, index: usize) -> u16 {
        self.params.get(index).copied().unwrap_or(0)
    }

    /// Parameter with "absent or 0 means default" semantics
    pub fn param_or_default(&self, index: usize, default: u16) -> u16 {
        match self.param(index) {
            0 => default,
            n => n,
        }
    }

    /// Check for the `?` marker
    pub fn is_private(&self) -> bool {
        self.marker == Some(CsiMarker::Private)
    }
}

/// Two-byte escape sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscAction {
    /// `ESC M`
    ReverseIndex,
    /// `ESC D`
    Index,
    /// `ESC E`
    NextLine,
    /// `ESC 7`
    SaveCursor,
    /// `ESC 8`
    RestoreCursor,
    /// `ESC =`
    ApplicationKeypad,
    /// `ESC >`
    NormalKeypad,
    /// `ESC c`
    FullReset,
    /// `ESC \`
    StringTerminator,
}

impl EscAction {
    /// Map an escape final byte to its action
    pub fn from_final(byte: u8) -> Option<Self> {
        Some(match byte {
            b'M' => EscAction::ReverseIndex,
            b'D' => EscAction::Index,
            b'E' => EscAction::NextLine,
            b'7' => EscAction::SaveCursor,
            b'8' => EscAction::RestoreCursor,
            b'=' => EscAction::ApplicationKeypad,
            b'>' => EscAction::NormalKeypad,
            b'c' => EscAction::FullReset,
            b'\\' => EscAction::StringTerminator,
            _ => return None,
        })
    }
}
