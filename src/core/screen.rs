//! Screen model implementation
//!
//! The screen is the visible 40x30 grid plus the state around it: cursor,
//! scroll region, mode flags, the alternate buffer, the scrollback ring and
//! the dirty-row set the render pipeline consumes.
//!
//! Every operation leaves the cursor inside the grid. Scroll operations
//! honour the `[scroll_top, scroll_bottom]` region, and only the primary
//! buffer feeds the scrollback ring.

use serde::{Deserialize, Serialize};

use super::cell::{line_drawing_fallback, Cell};
use super::cursor::{Cursor, SavedCursor};
use super::dirty::DirtyRows;
use super::scrollback::{Line, Scrollback};

/// Terminal mode flags
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modes {
    /// Application cursor keys (DECCKM)
    pub application_cursor: bool,
    /// Application keypad (DECKPAM/DECKPNM). Tracked, no behavioral effect.
    pub application_keypad: bool,
    /// DEC special graphics designated into G0
    pub line_drawing: bool,
}

/// Which grid is currently displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActiveBuffer {
    #[default]
    Primary,
    Alternate,
}

/// The main screen structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screen {
    cols: usize,
    rows: usize,
    primary_grid: Vec<Line>,
    alternate_grid: Vec<Line>,
    /// Scrollback ring (fed by the primary grid only)
    scrollback: Scrollback,
    cursor: Cursor,
    /// DECSC/DECRC slot
    saved_cursor: SavedCursor,
    /// Slot used by mode 1049
    alt_saved_cursor: SavedCursor,
    /// Scroll region top (0-indexed, inclusive)
    scroll_top: usize,
    /// Scroll region bottom (0-indexed, inclusive)
    scroll_bottom: usize,
    /// Terminal modes
    pub modes: Modes,
    /// Inverse attribute applied to newly written cells
    inverse: bool,
    active: ActiveBuffer,
    /// Set once the alternate grid has been entered and cleared
    alternate_initialized: bool,
    dirty: DirtyRows,
    /// Cursor position (col, row, visible) the dirty set last accounted for
    cursor_mark: (usize, usize, bool),
    /// Rows of history shown above the live screen (0 = live)
    view_offset: usize,
}

impl Screen {
    /// Create a new screen with the given dimensions
    pub fn new(cols: usize, rows: usize, scrollback_capacity: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let mut dirty = DirtyRows::new(rows);
        dirty.mark_all();

        Self {
            cols,
            rows,
            primary_grid: (0..rows).map(|_| Line::new(cols)).collect(),
            alternate_grid: (0..rows).map(|_| Line::new(cols)).collect(),
            scrollback: Scrollback::new(scrollback_capacity),
            cursor: Cursor::new(),
            saved_cursor: SavedCursor::default(),
            alt_saved_cursor: SavedCursor::default(),
            scroll_top: 0,
            scroll_bottom: rows - 1,
            modes: Modes::default(),
            inverse: false,
            active: ActiveBuffer::Primary,
            alternate_initialized: false,
            dirty,
            cursor_mark: (0, 0, true),
            view_offset: 0,
        }
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    fn grid(&self) -> &Vec<Line> {
        match self.active {
            ActiveBuffer::Primary => &self.primary_grid,
            ActiveBuffer::Alternate => &self.alternate_grid,
        }
    }

    fn grid_mut(&mut self) -> &mut Vec<Line> {
        match self.active {
            ActiveBuffer::Primary => &mut self.primary_grid,
            ActiveBuffer::Alternate => &mut self.alternate_grid,
        }
    }

    /// Current cursor
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Scrollback ring
    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    /// Scroll region as an inclusive `(top, bottom)` pair
    pub fn scroll_region(&self) -> (usize, usize) {
        (self.scroll_top, self.scroll_bottom)
    }

    /// Inverse attribute for new cells
    pub fn inverse(&self) -> bool {
        self.inverse
    }

    /// Which buffer is displayed
    pub fn active_buffer(&self) -> ActiveBuffer {
        self.active
    }

    /// Check if the alternate buffer is displayed
    pub fn is_alternate(&self) -> bool {
        self.active == ActiveBuffer::Alternate
    }

    /// The primary grid, regardless of which buffer is active
    pub fn primary_lines(&self) -> &[Line] {
        &self.primary_grid
    }

    /// Get a line of the active grid
    pub fn line(&self, row: usize) -> Option<&Line> {
        self.grid().get(row)
    }

    /// Get a cell of the active grid
    pub fn cell(&self, col: usize, row: usize) -> Option<&Cell> {
        self.grid().get(row).and_then(|line| line.get(col))
    }

    /// Dirty-row set
    pub fn dirty(&self) -> &DirtyRows {
        &self.dirty
    }

    /// Clear dirty bits for rows `start..=end` after they were refreshed
    pub fn mark_rows_clean(&mut self, start: usize, end: usize) {
        self.dirty.clear_range(start, end);
    }

    /// Set dirty bits for rows `start..=end`, e.g. after a failed refresh
    pub fn mark_rows_dirty(&mut self, start: usize, end: usize) {
        self.dirty.mark_range(start, end);
    }

    /// Clear every dirty bit
    pub fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    /// Mark every row dirty
    pub fn mark_all_dirty(&mut self) {
        self.dirty.mark_all();
    }

    fn mark_line_dirty(&mut self, row: usize) {
        self.dirty.mark(row);
    }

    /// Fold cursor movement into the dirty set.
    ///
    /// A visible cursor that moved leaves a stale image on its old row and
    /// needs drawing on its new one. A visibility change dirties the row it
    /// sits on. Hidden cursor motion dirties nothing.
    pub fn sync_cursor_dirty(&mut self) {
        let now = (self.cursor.col, self.cursor.row, self.cursor.visible);
        let (old_col, old_row, old_visible) = self.cursor_mark;
        if now == self.cursor_mark {
            return;
        }
        if old_visible {
            self.dirty.mark(old_row);
        }
        if (now.2 && (old_col, old_row) != (now.0, now.1)) || now.2 != old_visible {
            self.dirty.mark(now.1);
        }
        self.cursor_mark = now;
    }

    // ------------------------------------------------------------------
    // Printing and control characters
    // ------------------------------------------------------------------

    /// Print a printable byte at the cursor
    pub fn print(&mut self, byte: u8) {
        if !(0x20..0x7f).contains(&byte) {
            return;
        }
        if self.cursor.pending_wrap {
            self.wrap_cursor();
        }

        let ch = if self.modes.line_drawing {
            line_drawing_fallback(byte)
        } else {
            byte
        };
        let (col, row) = (self.cursor.col, self.cursor.row);
        let cell = Cell::new(ch, self.inverse);
        if let Some(slot) = self.grid_mut().get_mut(row).and_then(|l| l.get_mut(col)) {
            *slot = cell;
        }
        self.mark_line_dirty(row);

        if col + 1 >= self.cols {
            self.cursor.col = self.cols - 1;
            self.cursor.pending_wrap = true;
        } else {
            self.cursor.col = col + 1;
        }
    }

    fn wrap_cursor(&mut self) {
        self.cursor.pending_wrap = false;
        self.cursor.col = 0;
        self.index();
    }

    /// Handle linefeed (LF): back to column 0, then a margin-aware move down
    pub fn linefeed(&mut self) {
        self.cursor.carriage_return();
        self.index();
    }

    /// Handle carriage return (CR)
    pub fn carriage_return(&mut self) {
        self.cursor.carriage_return();
    }

    /// Handle backspace (BS): move left without erasing
    pub fn backspace(&mut self) {
        self.cursor.pending_wrap = false;
        self.cursor.col = self.cursor.col.saturating_sub(1);
    }

    /// Handle horizontal tab (HT): next multiple of 8, clamped to the last column
    pub fn tab(&mut self) {
        self.cursor.pending_wrap = false;
        let next = (self.cursor.col / 8 + 1) * 8;
        self.cursor.col = next.min(self.cols - 1);
    }

    /// Index (IND): move down, scrolling if at the bottom margin
    pub fn index(&mut self) {
        self.cursor.pending_wrap = false;
        let row = self.cursor.row;
        if row == self.scroll_bottom {
            self.scroll_up(1);
        } else if row + 1 < self.rows {
            self.cursor.row += 1;
        }
    }

    /// Reverse index (RI): move up, scrolling down if at the top margin
    pub fn reverse_index(&mut self) {
        self.cursor.pending_wrap = false;
        let row = self.cursor.row;
        if row == self.scroll_top {
            self.scroll_down(1);
        } else if row > 0 {
            self.cursor.row -= 1;
        }
    }

    /// Next line (NEL): index plus carriage return
    pub fn next_line(&mut self) {
        self.index();
        self.cursor.col = 0;
    }

    // ------------------------------------------------------------------
    // Scrolling
    // ------------------------------------------------------------------

    /// Scroll the region up by `n` lines (content moves up, blanks at bottom).
    ///
    /// On the primary grid each departing top row is appended to scrollback.
    pub fn scroll_up(&mut self, n: usize) {
        let top = self.scroll_top;
        let bottom = self.scroll_bottom;
        let n = n.min(bottom - top + 1);
        if n == 0 {
            return;
        }

        if self.active == ActiveBuffer::Primary {
            for row in top..top + n {
                let line = self.primary_grid[row].clone();
                self.scrollback.push(line);
                if self.view_offset > 0 {
                    self.view_offset = (self.view_offset + 1).min(self.scrollback.len());
                }
            }
        }

        let grid = self.grid_mut();
        grid[top..=bottom].rotate_left(n);
        for line in &mut grid[bottom + 1 - n..=bottom] {
            line.clear();
        }
        self.dirty.mark_range(top, bottom);
    }

    /// Scroll the region down by `n` lines (content moves down, blanks at top)
    pub fn scroll_down(&mut self, n: usize) {
        let top = self.scroll_top;
        let bottom = self.scroll_bottom;
        let n = n.min(bottom - top + 1);
        if n == 0 {
            return;
        }

        let grid = self.grid_mut();
        grid[top..=bottom].rotate_right(n);
        for line in &mut grid[top..top + n] {
            line.clear();
        }
        self.dirty.mark_range(top, bottom);
    }

    /// Set scroll region (DECSTBM) from 0-indexed inclusive rows and home the cursor.
    ///
    /// Both margins are clamped into the screen; a top past the bottom
    /// collapses onto the bottom row.
    pub fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let bottom = bottom.min(self.rows - 1);
        let top = top.min(bottom);
        self.scroll_top = top;
        self.scroll_bottom = bottom;
        self.cursor.move_to(0, 0, self.cols, self.rows);
    }

    /// Reset scroll region to full screen
    pub fn reset_scroll_region(&mut self) {
        self.scroll_top = 0;
        self.scroll_bottom = self.rows - 1;
    }

    // ------------------------------------------------------------------
    // Erasing and editing
    // ------------------------------------------------------------------

    /// Erase in display (ED). 0: cursor to end, 1: start to cursor, 2: all,
    /// 3: all plus scrollback.
    pub fn erase_in_display(&mut self, mode: u16) {
        let (col, row) = (self.cursor.col, self.cursor.row);
        let rows = self.rows;
        let cols = self.cols;
        match mode {
            0 => {
                let grid = self.grid_mut();
                grid[row].clear_range(col, cols);
                for line in &mut grid[row + 1..] {
                    line.clear();
                }
                self.dirty.mark_range(row, rows - 1);
            },
            1 => {
                let grid = self.grid_mut();
                for line in &mut grid[..row] {
                    line.clear();
                }
                grid[row].clear_range(0, col + 1);
                self.dirty.mark_range(0, row);
            },
            2 | 3 => {
                for line in self.grid_mut().iter_mut() {
                    line.clear();
                }
                if mode == 3 {
                    self.scrollback.clear();
                    self.view_offset = 0;
                }
                self.dirty.mark_all();
            },
            _ => {},
        }
    }

    /// Erase in line (EL). 0: cursor to end, 1: start to cursor, 2: whole line.
    pub fn erase_in_line(&mut self, mode: u16) {
        let (col, row) = (self.cursor.col, self.cursor.row);
        let cols = self.cols;
        let line = &mut self.grid_mut()[row];
        match mode {
            0 => line.clear_range(col, cols),
            1 => line.clear_range(0, col + 1),
            2 => line.clear(),
            _ => return,
        }
        self.mark_line_dirty(row);
    }

    /// Erase `n` characters from the cursor without shifting (ECH)
    pub fn erase_chars(&mut self, n: usize) {
        let (col, row) = (self.cursor.col, self.cursor.row);
        self.grid_mut()[row].clear_range(col, col.saturating_add(n));
        self.mark_line_dirty(row);
    }

    /// Insert `n` blank characters at the cursor, shifting right (ICH)
    pub fn insert_chars(&mut self, n: usize) {
        let (col, row) = (self.cursor.col, self.cursor.row);
        let n = n.min(self.cols - col);
        let cells = &mut self.grid_mut()[row].cells[col..];
        cells.rotate_right(n);
        cells[..n].iter_mut().for_each(Cell::clear);
        self.cursor.pending_wrap = false;
        self.mark_line_dirty(row);
    }

    /// Delete `n` characters at the cursor, shifting left (DCH)
    pub fn delete_chars(&mut self, n: usize) {
        let (col, row) = (self.cursor.col, self.cursor.row);
        let n = n.min(self.cols - col);
        let cells = &mut self.grid_mut()[row].cells[col..];
        cells.rotate_left(n);
        let len = cells.len();
        cells[len - n..].iter_mut().for_each(Cell::clear);
        self.cursor.pending_wrap = false;
        self.mark_line_dirty(row);
    }

    /// Insert `n` blank lines at the cursor row within the scroll region (IL)
    pub fn insert_lines(&mut self, n: usize) {
        let row = self.cursor.row;
        if row < self.scroll_top || row > self.scroll_bottom {
            return;
        }
        let bottom = self.scroll_bottom;
        let n = n.min(bottom - row + 1);
        let grid = self.grid_mut();
        grid[row..=bottom].rotate_right(n);
        for line in &mut grid[row..row + n] {
            line.clear();
        }
        self.cursor.pending_wrap = false;
        self.dirty.mark_range(row, bottom);
    }

    /// Delete `n` lines at the cursor row within the scroll region (DL)
    pub fn delete_lines(&mut self, n: usize) {
        let row = self.cursor.row;
        if row < self.scroll_top || row > self.scroll_bottom {
            return;
        }
        let bottom = self.scroll_bottom;
        let n = n.min(bottom - row + 1);
        let grid = self.grid_mut();
        grid[row..=bottom].rotate_left(n);
        for line in &mut grid[bottom + 1 - n..=bottom] {
            line.clear();
        }
        self.cursor.pending_wrap = false;
        self.dirty.mark_range(row, bottom);
    }

    // ------------------------------------------------------------------
    // Cursor motion
    // ------------------------------------------------------------------

    /// Move cursor to an absolute 0-indexed position (CUP)
    pub fn move_cursor_to(&mut self, row: usize, col: usize) {
        self.cursor.move_to(col, row, self.cols, self.rows);
    }

    /// Move cursor up, clamped to the top of the screen (CUU)
    ///
    /// Scroll margins do not stop the cursor.
    pub fn move_cursor_up(&mut self, n: usize) {
        self.move_cursor_to(self.cursor.row.saturating_sub(n), self.cursor.col);
    }

    /// Move cursor down, clamped to the bottom of the screen (CUD)
    pub fn move_cursor_down(&mut self, n: usize) {
        self.move_cursor_to(self.cursor.row.saturating_add(n), self.cursor.col);
    }

    /// Move cursor right (CUF)
    pub fn move_cursor_forward(&mut self, n: usize) {
        self.move_cursor_to(self.cursor.row, self.cursor.col.saturating_add(n));
    }

    /// Move cursor left (CUB)
    pub fn move_cursor_backward(&mut self, n: usize) {
        self.move_cursor_to(self.cursor.row, self.cursor.col.saturating_sub(n));
    }

    /// Move cursor to a column on the current row (CHA)
    pub fn move_cursor_to_col(&mut self, col: usize) {
        self.move_cursor_to(self.cursor.row, col);
    }

    /// Move cursor to a row, keeping the column (VPA)
    pub fn move_cursor_to_row(&mut self, row: usize) {
        self.move_cursor_to(row, self.cursor.col);
    }

    /// Save cursor (DECSC)
    pub fn save_cursor(&mut self) {
        self.saved_cursor = SavedCursor {
            col: self.cursor.col,
            row: self.cursor.row,
            inverse: self.inverse,
        };
    }

    /// Restore cursor (DECRC)
    pub fn restore_cursor(&mut self) {
        let saved = self.saved_cursor;
        self.move_cursor_to(saved.row, saved.col);
        self.inverse = saved.inverse;
    }

    /// Show or hide the cursor (DECTCEM)
    pub fn set_cursor_visible(&mut self, visible: bool) {
        self.cursor.visible = visible;
    }

    /// Set the inverse attribute for subsequently written cells
    pub fn set_inverse(&mut self, inverse: bool) {
        self.inverse = inverse;
    }

    // ------------------------------------------------------------------
    // Alternate buffer
    // ------------------------------------------------------------------

    /// Switch to the alternate grid.
    ///
    /// With `save_cursor` (mode 1049) the cursor is stored first. The grid
    /// is cleared when `clear` is set and on the very first entry.
    /// Scroll margins are shared between the two grids and left as they are.
    pub fn enter_alternate_screen(&mut self, save_cursor: bool, clear: bool) {
        if self.active == ActiveBuffer::Alternate {
            return;
        }
        if save_cursor {
            self.alt_saved_cursor = SavedCursor {
                col: self.cursor.col,
                row: self.cursor.row,
                inverse: self.inverse,
            };
        }
        self.active = ActiveBuffer::Alternate;
        if clear || !self.alternate_initialized {
            for line in &mut self.alternate_grid {
                line.clear();
            }
            self.alternate_initialized = true;
        }
        self.cursor.pending_wrap = false;
        self.dirty.mark_all();
    }

    /// Switch back to the primary grid, optionally restoring the cursor
    pub fn exit_alternate_screen(&mut self, restore_cursor: bool) {
        if self.active == ActiveBuffer::Primary {
            return;
        }
        self.active = ActiveBuffer::Primary;
        if restore_cursor {
            let saved = self.alt_saved_cursor;
            self.move_cursor_to(saved.row, saved.col);
            self.inverse = saved.inverse;
        }
        self.cursor.pending_wrap = false;
        self.dirty.mark_all();
    }

    // ------------------------------------------------------------------
    // History view
    // ------------------------------------------------------------------

    /// Rows of history currently shown (0 = live)
    pub fn view_offset(&self) -> usize {
        self.view_offset
    }

    /// Check if the view is scrolled into history
    pub fn is_viewing_history(&self) -> bool {
        self.view_offset > 0
    }

    /// Scroll the view `n` rows further into history
    pub fn scroll_view_up(&mut self, n: usize) {
        let offset = self.view_offset.saturating_add(n).min(self.scrollback.len());
        if offset != self.view_offset {
            self.view_offset = offset;
            self.dirty.mark_all();
        }
    }

    /// Scroll the view `n` rows back toward live
    pub fn scroll_view_down(&mut self, n: usize) {
        let offset = self.view_offset.saturating_sub(n);
        if offset != self.view_offset {
            self.view_offset = offset;
            self.dirty.mark_all();
        }
    }

    /// Snap back to the live view
    pub fn reset_view(&mut self) {
        if self.view_offset != 0 {
            self.view_offset = 0;
            self.dirty.mark_all();
        }
    }

    /// Line shown at display row `row`, taking the history view into account.
    ///
    /// The top `view_offset` rows come from scrollback; the remainder are
    /// the top of the live grid.
    pub fn view_line(&self, row: usize) -> Option<&Line> {
        let history = self.scrollback.len();
        let offset = self.view_offset.min(history);
        let virtual_row = history - offset + row;
        if virtual_row < history {
            self.scrollback.get(virtual_row)
        } else {
            self.grid().get(virtual_row - history)
        }
    }

    /// Full reset (RIS): clear the grid, margins, modes and attributes.
    /// Scrollback survives.
    pub fn reset(&mut self) {
        self.active = ActiveBuffer::Primary;
        for line in self.primary_grid.iter_mut().chain(self.alternate_grid.iter_mut()) {
            line.clear();
        }
        self.alternate_initialized = false;
        self.cursor = Cursor::new();
        self.saved_cursor = SavedCursor::default();
        self.alt_saved_cursor = SavedCursor::default();
        self.reset_scroll_region();
        self.modes = Modes::default();
        self.inverse = false;
        self.view_offset = 0;
        self.dirty.mark_all();
    }
}
