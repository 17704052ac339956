//! Scrollback ring
//!
//! Rows that leave the top of the scroll region in the primary buffer are
//! kept here, oldest first. The ring has a fixed capacity; once full, each
//! push evicts the oldest row.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::cell::Cell;

/// One row of cells
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    /// The cells in this line
    pub cells: Vec<Cell>,
}

impl Line {
    /// Create a blank line with the given number of columns
    pub fn new(cols: usize) -> Self {
        Self {
            cells: vec![Cell::BLANK; cols],
        }
    }

    /// Build a line from text, padding or truncating to `cols`
    pub fn from_text(text: &str, cols: usize) -> Self {
        let mut line = Self::new(cols);
        for (cell, byte) in line.cells.iter_mut().zip(text.bytes()) {
            cell.ch = byte;
        }
        line
    }

    /// Number of cells in the line
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the line has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Blank every cell
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(Cell::clear);
    }

    /// Blank the cells in `range`, clamped to the line
    pub fn clear_range(&mut self, start: usize, end: usize) {
        let end = end.min(self.cells.len());
        if start < end {
            self.cells[start..end].iter_mut().for_each(Cell::clear);
        }
    }

    /// Check if every cell is blank
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }

    /// Get a cell at the given column
    pub fn get(&self, col: usize) -> Option<&Cell> {
        self.cells.get(col)
    }

    /// Get a mutable cell at the given column
    pub fn get_mut(&mut self, col: usize) -> Option<&mut Cell> {
        self.cells.get_mut(col)
    }

    /// Text content with trailing spaces trimmed
    pub fn text(&self) -> String {
        let s: String = self.cells.iter().map(Cell::display_char).collect();
        s.trim_end().to_string()
    }
}

/// Fixed-capacity ring of scrolled-off rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scrollback {
    lines: VecDeque<Line>,
    capacity: usize,
}

impl Scrollback {
    /// Create an empty ring holding at most `capacity` rows
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of rows stored
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the ring is empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Maximum number of rows
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a row, evicting the oldest once full
    pub fn push(&mut self, line: Line) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Get a row by index (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    /// Get a row counting back from the newest (0 = most recent)
    pub fn get_from_end(&self, index: usize) -> Option<&Line> {
        self.len()
            .checked_sub(index + 1)
            .and_then(|i| self.lines.get(i))
    }

    /// Drop all rows
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(i: usize) -> Line {
        Line::from_text(&i.to_string(), 10)
    }

    #[test]
    fn test_line_from_text() {
        let line = Line::from_text("Hi", 10);
        assert_eq!(line.len(), 10);
        assert_eq!(line.text(), "Hi");
    }

    #[test]
    fn test_line_clear_range() {
        let mut line = Line::from_text("abcdef", 6);
        line.clear_range(2, 100);
        assert_eq!(line.text(), "ab");
        line.clear_range(5, 1);
        assert_eq!(line.text(), "ab");
    }

    #[test]
    fn test_scrollback_push_and_get() {
        let mut sb = Scrollback::new(5);
        assert!(sb.is_empty());
        for i in 0..3 {
            sb.push(numbered(i));
        }
        assert_eq!(sb.len(), 3);
        assert_eq!(sb.get(0).unwrap().text(), "0");
        assert_eq!(sb.get(2).unwrap().text(), "2");
    }

    #[test]
    fn test_scrollback_ring_evicts_oldest() {
        let mut sb = Scrollback::new(3);
        for i in 0..5 {
            sb.push(numbered(i));
        }
        let texts: Vec<String> = sb.iter().map(Line::text).collect();
        assert_eq!(texts, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_scrollback_get_from_end() {
        let mut sb = Scrollback::new(5);
        for i in 0..3 {
            sb.push(numbered(i));
        }
        assert_eq!(sb.get_from_end(0).unwrap().text(), "2");
        assert_eq!(sb.get_from_end(2).unwrap().text(), "0");
        assert!(sb.get_from_end(3).is_none());
    }

    #[test]
    fn test_scrollback_zero_capacity() {
        let mut sb = Scrollback::new(0);
        sb.push(Line::new(10));
        assert!(sb.is_empty());
    }
}
