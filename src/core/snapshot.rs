//! Deterministic snapshot generation
//!
//! Snapshots capture the visible terminal state in a serializable form for
//! golden tests and the headless runner. The same byte stream always
//! produces the same snapshot.

use serde::{Deserialize, Serialize};

use super::screen::{ActiveBuffer, Screen};

/// A complete snapshot of the terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cols: usize,
    pub rows: usize,
    /// Row text with trailing spaces trimmed
    pub lines: Vec<String>,
    /// Runs of inverse cells
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inverse: Vec<InverseSpan>,
    pub cursor: CursorSnapshot,
    pub scroll_top: usize,
    pub scroll_bottom: usize,
    pub modes: ModesSnapshot,
    pub alternate_screen: bool,
    pub scrollback_lines: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub view_offset: usize,
}

/// A horizontal run of inverse cells, `start..end` on `row`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InverseSpan {
    pub row: usize,
    pub start: usize,
    pub end: usize,
}

/// Snapshot of cursor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSnapshot {
    pub col: usize,
    pub row: usize,
    pub visible: bool,
}

/// Snapshot of terminal modes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModesSnapshot {
    #[serde(default, skip_serializing_if = "is_false")]
    pub application_cursor: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub application_keypad: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub line_drawing: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub inverse: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl Snapshot {
    /// Capture the active grid of `screen`
    pub fn from_screen(screen: &Screen) -> Self {
        let mut lines = Vec::with_capacity(screen.rows());
        let mut inverse = Vec::new();

        for row in 0..screen.rows() {
            let Some(line) = screen.line(row) else {
                continue;
            };
            lines.push(line.text());

            let mut start = None;
            for (col, cell) in line.cells.iter().enumerate() {
                match (cell.inverse, start) {
                    (true, None) => start = Some(col),
                    (false, Some(s)) => {
                        inverse.push(InverseSpan { row, start: s, end: col });
                        start = None;
                    },
                    _ => {},
                }
            }
            if let Some(s) = start {
                inverse.push(InverseSpan {
                    row,
                    start: s,
                    end: line.len(),
                });
            }
        }

        let cursor = screen.cursor();
        let (scroll_top, scroll_bottom) = screen.scroll_region();

        Self {
            cols: screen.cols(),
            rows: screen.rows(),
            lines,
            inverse,
            cursor: CursorSnapshot {
                col: cursor.col,
                row: cursor.row,
                visible: cursor.visible,
            },
            scroll_top,
            scroll_bottom,
            modes: ModesSnapshot {
                application_cursor: screen.modes.application_cursor,
                application_keypad: screen.modes.application_keypad,
                line_drawing: screen.modes.line_drawing,
                inverse: screen.inverse(),
            },
            alternate_screen: screen.active_buffer() == ActiveBuffer::Alternate,
            scrollback_lines: screen.scrollback().len(),
            view_offset: screen.view_offset(),
        }
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a snapshot from JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Plain-text rendering: every row padded to width inside a border,
    /// followed by the cursor position.
    pub fn to_text(&self) -> String {
        let border = format!("+{}+", "-".repeat(self.cols));
        let mut out = String::with_capacity((self.cols + 3) * (self.rows + 3));
        out.push_str(&border);
        out.push('\n');
        for line in &self.lines {
            out.push('|');
            out.push_str(line);
            out.push_str(&" ".repeat(self.cols.saturating_sub(line.len())));
            out.push_str("|\n");
        }
        out.push_str(&border);
        out.push('\n');
        out.push_str(&format!(
            "cursor: ({}, {}){}\n",
            self.cursor.col,
            self.cursor.row,
            if self.cursor.visible { "" } else { " hidden" }
        ));
        out
    }
}
