//! Cursor state management
//!
//! The cursor tracks position and visibility. Save/restore (DECSC/DECRC)
//! keeps position together with the active inverse attribute.

use serde::{Deserialize, Serialize};

/// Cursor position and visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Column position (0-indexed)
    pub col: usize,
    /// Row position (0-indexed)
    pub row: usize,
    /// Whether the cursor is visible (DECTCEM)
    pub visible: bool,
    /// Cursor sits on the last column and the next printable wraps first
    pub pending_wrap: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            col: 0,
            row: 0,
            visible: true,
            pending_wrap: false,
        }
    }
}

impl Cursor {
    /// Create a cursor at the origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to an absolute position, clamped to a `cols` x `rows` grid
    pub fn move_to(&mut self, col: usize, row: usize, cols: usize, rows: usize) {
        self.col = col.min(cols.saturating_sub(1));
        self.row = row.min(rows.saturating_sub(1));
        self.pending_wrap = false;
    }

    /// Carriage return
    pub fn carriage_return(&mut self) {
        self.col = 0;
        self.pending_wrap = false;
    }
}

/// Saved cursor state for DECSC/DECRC and mode 1049
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SavedCursor {
    pub col: usize,
    pub row: usize,
    pub inverse: bool,
}
