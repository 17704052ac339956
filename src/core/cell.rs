//! Terminal Cell
//!
//! A single cell of the monochrome grid: one byte of content and an
//! inverse-video flag. There is no color and no other styling on this
//! display.

use serde::{Deserialize, Serialize};

/// A single cell in the terminal grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Printable ASCII byte stored in this cell (space when blank)
    pub ch: u8,
    /// Whether the cell is drawn white-on-black
    pub inverse: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self::BLANK
    }
}

impl Cell {
    /// A blank, non-inverse cell
    pub const BLANK: Cell = Cell {
        ch: b' ',
        inverse: false,
    };

    /// Create a new cell holding `ch`
    pub fn new(ch: u8, inverse: bool) -> Self {
        Self { ch, inverse }
    }

    /// Check if this cell is blank (space, no inverse)
    pub fn is_blank(&self) -> bool {
        *self == Self::BLANK
    }

    /// Reset the cell to blank
    pub fn clear(&mut self) {
        *self = Self::BLANK;
    }

    /// The character to display for this cell
    pub fn display_char(&self) -> char {
        self.ch as char
    }
}

/// Map a printable byte through the DEC special-graphics fallback table.
///
/// The panel font has no box-drawing glyphs, so line-drawing characters
/// are stored as their closest ASCII equivalents.
pub fn line_drawing_fallback(byte: u8) -> u8 {
    match byte {
        b'j' | b'k' | b'l' | b'm' | b'`' => b'+',
        b'q' => b'-',
        b'x' => b'|',
        b'a' => b'#',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_default_is_blank() {
        let cell = Cell::default();
        assert!(cell.is_blank());
        assert_eq!(cell.display_char(), ' ');
    }

    #[test]
    fn test_inverse_space_is_not_blank() {
        let cell = Cell::new(b' ', true);
        assert!(!cell.is_blank());
    }

    #[test]
    fn test_cell_clear() {
        let mut cell = Cell::new(b'A', true);
        cell.clear();
        assert_eq!(cell, Cell::BLANK);
    }

    #[test]
    fn test_line_drawing_fallback() {
        assert_eq!(line_drawing_fallback(b'j'), b'+');
        assert_eq!(line_drawing_fallback(b'k'), b'+');
        assert_eq!(line_drawing_fallback(b'l'), b'+');
        assert_eq!(line_drawing_fallback(b'm'), b'+');
        assert_eq!(line_drawing_fallback(b'`'), b'+');
        assert_eq!(line_drawing_fallback(b'q'), b'-');
        assert_eq!(line_drawing_fallback(b'x'), b'|');
        assert_eq!(line_drawing_fallback(b'a'), b'#');
        assert_eq!(line_drawing_fallback(b'Z'), b'Z');
    }
}
