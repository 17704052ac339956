//! Frame composition
//!
//! Turns the terminal model, dialogs and banners into draw operations.
//! Consecutive cells sharing the inverse attribute become one glyph run;
//! inverse runs sit on a black rectangle. The cursor is drawn last.

use crate::core::{Line, Screen};

use super::frame::{
    cell_origin, Frame, Rect, CELL_HEIGHT, CELL_WIDTH, HEADER_HEIGHT, PANEL_HEIGHT, PANEL_WIDTH,
};
use super::scheduler::RefreshDecision;

/// Characters that fit across the panel
pub const TEXT_COLS: usize = (PANEL_WIDTH / CELL_WIDTH) as usize;

/// Baseline offset of text inside the header
const HEADER_TEXT_Y: u16 = (HEADER_HEIGHT - CELL_HEIGHT) / 2;
/// Height of one menu item
const ITEM_HEIGHT: u16 = 16;
/// Top of the dialog body
const BODY_TOP: u16 = HEADER_HEIGHT + 4;
/// Top of the footer hint
const FOOTER_TOP: u16 = PANEL_HEIGHT - 16;

/// Contents of the status bar
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBanner {
    pub title: String,
    pub battery_percent: Option<u8>,
    pub charging: bool,
    pub wifi: bool,
    /// Rows of history in view, 0 when live
    pub history: usize,
}

impl StatusBanner {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Right-aligned indicator block
    pub fn indicators(&self) -> String {
        let mut parts = Vec::new();
        if self.history > 0 {
            parts.push(format!("HIST {}", self.history));
        }
        if self.wifi {
            parts.push("W".to_string());
        }
        if let Some(percent) = self.battery_percent {
            let marker = if self.charging { "+" } else { "" };
            parts.push(format!("{}%{}", percent, marker));
        } else if self.charging {
            parts.push("+".to_string());
        }
        parts.join(" ")
    }
}

/// A dialog as the panel shows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuView {
    List {
        title: String,
        items: Vec<String>,
        selected: usize,
    },
    Input {
        title: String,
        /// Text as displayed, already masked when needed
        value: String,
    },
    Message {
        title: String,
        body: String,
    },
}

impl MenuView {
    pub fn title(&self) -> &str {
        match self {
            MenuView::List { title, .. }
            | MenuView::Input { title, .. }
            | MenuView::Message { title, .. } => title,
        }
    }
}

/// A maximal span of cells sharing the inverse attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphRun {
    pub start: usize,
    pub text: String,
    pub inverse: bool,
}

/// Split a line into glyph runs
pub fn row_runs(line: &Line) -> Vec<GlyphRun> {
    let mut runs: Vec<GlyphRun> = Vec::new();
    for (col, cell) in (0..line.len()).filter_map(|col| line.get(col).map(|cell| (col, cell))) {
        match runs.last_mut() {
            Some(run) if run.inverse == cell.inverse => run.text.push(cell.display_char()),
            _ => runs.push(GlyphRun {
                start: col,
                text: cell.display_char().to_string(),
                inverse: cell.inverse,
            }),
        }
    }
    runs
}

/// Compose the terminal screen for a scheduler decision
pub fn compose_terminal(screen: &Screen, decision: RefreshDecision, status: &StatusBanner) -> Frame {
    match decision {
        RefreshDecision::Full => {
            let mut frame = Frame::new(Rect::screen());
            frame.clear();
            compose_header(&mut frame, &status.title, status);
            compose_rows(&mut frame, screen, 0, screen.rows() - 1);
            frame
        },
        RefreshDecision::Partial { top, bottom } => {
            let bottom = bottom.min(screen.rows() - 1);
            let top = top.min(bottom);
            let mut frame = Frame::new(Rect::rows(top, bottom));
            compose_rows(&mut frame, screen, top, bottom);
            frame
        },
        RefreshDecision::Skip | RefreshDecision::Defer => Frame::new(Rect::new(0, 0, 0, 0)),
    }
}

fn compose_rows(frame: &mut Frame, screen: &Screen, top: usize, bottom: usize) {
    for row in top..=bottom {
        let (_, y) = cell_origin(0, row);
        frame.fill_rect(Rect::new(0, y, PANEL_WIDTH, CELL_HEIGHT), false);
        let Some(line) = screen.view_line(row) else {
            continue;
        };
        for run in row_runs(line) {
            let (x, y) = cell_origin(run.start, row);
            if run.inverse {
                frame.fill_rect(Rect::new(x, y, text_width(&run.text), CELL_HEIGHT), true);
                frame.text(x, y, run.text, true);
                continue;
            }
            let text = run.text.trim_end();
            if !text.is_empty() {
                frame.text(x, y, text, false);
            }
        }
    }

    // Cursor last, over whatever the row drew
    let cursor = screen.cursor();
    if cursor.visible && !screen.is_viewing_history() && (top..=bottom).contains(&cursor.row) {
        let (x, y) = cell_origin(cursor.col, cursor.row);
        let under = screen.cell(cursor.col, cursor.row).copied().unwrap_or_default();
        let inverse = !under.inverse;
        frame.fill_rect(Rect::new(x, y, CELL_WIDTH, CELL_HEIGHT), inverse);
        frame.text(x, y, under.display_char().to_string(), inverse);
    }
}

fn compose_header(frame: &mut Frame, title: &str, status: &StatusBanner) {
    frame.fill_rect(Rect::header(), true);
    let indicators = status.indicators();
    let room = TEXT_COLS.saturating_sub(indicators.len() + 2);
    let title = truncate(title, room);
    frame.text(CELL_WIDTH / 2, HEADER_TEXT_Y, title, true);
    if !indicators.is_empty() {
        let x = PANEL_WIDTH - CELL_WIDTH / 2 - text_width(&indicators);
        frame.text(x, HEADER_TEXT_Y, indicators, true);
    }
}

/// Compose a dialog. A partial refresh repaints the body alone; the header
/// with the dialog title is only drawn by a full one.
pub fn compose_menu(view: &MenuView, status: &StatusBanner, full: bool) -> Frame {
    let mut frame = if full {
        let mut frame = Frame::new(Rect::screen());
        frame.clear();
        compose_header(&mut frame, view.title(), status);
        frame
    } else {
        Frame::new(Rect::body())
    };
    frame.fill_rect(Rect::body(), false);

    let hint = match view {
        MenuView::List {
            items, selected, ..
        } => {
            compose_list(&mut frame, items, *selected);
            "w/s move  Enter ok  Esc back"
        },
        MenuView::Input { title, value } => {
            frame.text(CELL_WIDTH, BODY_TOP + 4, truncate(title, TEXT_COLS - 2), false);
            let shown = tail(value, TEXT_COLS - 3);
            let box_y = BODY_TOP + 4 + ITEM_HEIGHT;
            frame.fill_rect(Rect::new(2, box_y - 2, PANEL_WIDTH - 4, CELL_HEIGHT + 4), true);
            frame.fill_rect(Rect::new(3, box_y - 1, PANEL_WIDTH - 6, CELL_HEIGHT + 2), false);
            frame.text(CELL_WIDTH, box_y, format!("{}_", shown), false);
            "Enter ok  Esc cancel"
        },
        MenuView::Message { body, .. } => {
            for (i, line) in wrap(body, TEXT_COLS - 2).iter().enumerate() {
                let y = BODY_TOP + 4 + (i as u16).saturating_mul(CELL_HEIGHT + 2);
                if y + CELL_HEIGHT > FOOTER_TOP {
                    break;
                }
                frame.text(CELL_WIDTH, y, line.clone(), false);
            }
            "any key to continue"
        },
    };
    frame.text(CELL_WIDTH, FOOTER_TOP + 3, hint, false);
    frame
}

fn compose_list(frame: &mut Frame, items: &[String], selected: usize) {
    let visible = usize::from((FOOTER_TOP - BODY_TOP) / ITEM_HEIGHT);
    let first = selected.saturating_sub(visible.saturating_sub(1));
    for (slot, (index, item)) in items.iter().enumerate().skip(first).take(visible).enumerate() {
        let y = BODY_TOP + (slot as u16) * ITEM_HEIGHT;
        let chosen = index == selected;
        if chosen {
            frame.fill_rect(Rect::new(0, y, PANEL_WIDTH, ITEM_HEIGHT), true);
        }
        let text = truncate(item, TEXT_COLS - 2);
        frame.text(CELL_WIDTH, y + (ITEM_HEIGHT - CELL_HEIGHT) / 2, text, chosen);
    }
}

/// Full-screen banner: a black band with a title and a detail line
pub fn compose_banner(title: &str, detail: &str) -> Frame {
    let mut frame = Frame::new(Rect::screen());
    frame.clear();
    let band = Rect::new(0, PANEL_HEIGHT / 2 - 40, PANEL_WIDTH, 80);
    frame.fill_rect(band, true);
    let title = truncate(title, TEXT_COLS);
    frame.text(centered_x(&title), band.y + 35, title, true);
    for (i, line) in wrap(detail, TEXT_COLS).iter().enumerate() {
        let y = band.bottom() + 20 + (i as u16) * (CELL_HEIGHT + 2);
        frame.text(centered_x(line), y, line.clone(), false);
    }
    frame
}

fn text_width(text: &str) -> u16 {
    u16::try_from(text.chars().count())
        .unwrap_or(u16::MAX)
        .saturating_mul(CELL_WIDTH)
}

fn centered_x(text: &str) -> u16 {
    PANEL_WIDTH.saturating_sub(text_width(text)) / 2
}

/// First `max` characters
pub fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Last `max` characters, so the input caret stays visible
fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max)).collect()
}

/// Greedy word wrap; explicit newlines start a new line
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split(' ') {
            let mut word = word.to_string();
            while word.chars().count() > width {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let head: String = word.chars().take(width).collect();
                word = word.chars().skip(width).collect();
                lines.push(head);
            }
            let needed = line.chars().count() + word.chars().count() + usize::from(!line.is_empty());
            if needed > width && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        lines.push(line);
    }
    lines
}
