//! Frame model
//!
//! A frame is an ordered list of draw operations plus the panel window the
//! refresh covers. Panels rasterise frames themselves.

use serde::{Deserialize, Serialize};

/// Panel width in pixels (portrait)
pub const PANEL_WIDTH: u16 = 240;
/// Panel height in pixels (portrait)
pub const PANEL_HEIGHT: u16 = 320;
/// Glyph cell width
pub const CELL_WIDTH: u16 = 6;
/// Glyph cell height
pub const CELL_HEIGHT: u16 = 10;
/// Status bar height; terminal rows start below it
pub const HEADER_HEIGHT: u16 = 20;

/// Refresh waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshMode {
    /// Clear to white and redraw everything
    Full,
    /// Update a window only
    Partial,
}

/// Pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole panel
    pub const fn screen() -> Self {
        Self::new(0, 0, PANEL_WIDTH, PANEL_HEIGHT)
    }

    /// The status bar
    pub const fn header() -> Self {
        Self::new(0, 0, PANEL_WIDTH, HEADER_HEIGHT)
    }

    /// Everything below the status bar
    pub const fn body() -> Self {
        Self::new(0, HEADER_HEIGHT, PANEL_WIDTH, PANEL_HEIGHT - HEADER_HEIGHT)
    }

    /// Band covering terminal rows `top..=bottom`
    pub fn rows(top: usize, bottom: usize) -> Self {
        let top = top.min(bottom);
        let y = HEADER_HEIGHT + row_offset(top);
        let height = row_offset(bottom - top + 1);
        Self::new(0, y, PANEL_WIDTH, height)
    }

    pub fn bottom(&self) -> u16 {
        self.y.saturating_add(self.height)
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x.saturating_add(other.width) <= self.x.saturating_add(self.width)
            && other.bottom() <= self.bottom()
    }
}

fn row_offset(rows: usize) -> u16 {
    u16::try_from(rows)
        .unwrap_or(u16::MAX)
        .saturating_mul(CELL_HEIGHT)
}

/// Pixel origin of a terminal cell
pub fn cell_origin(col: usize, row: usize) -> (u16, u16) {
    let x = u16::try_from(col)
        .unwrap_or(u16::MAX)
        .saturating_mul(CELL_WIDTH);
    (x, HEADER_HEIGHT + row_offset(row))
}

/// A drawing primitive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawOp {
    /// Fill the frame window with white
    Clear,
    /// Solid rectangle, black when `black`
    FillRect { rect: Rect, black: bool },
    /// A glyph run; `inverse` draws white on black
    Text {
        x: u16,
        y: u16,
        text: String,
        inverse: bool,
    },
}

/// Everything one refresh draws
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub window: Rect,
    pub ops: Vec<DrawOp>,
}

impl Frame {
    pub fn new(window: Rect) -> Self {
        Self {
            window,
            ops: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.ops.push(DrawOp::Clear);
    }

    pub fn fill_rect(&mut self, rect: Rect, black: bool) {
        self.ops.push(DrawOp::FillRect { rect, black });
    }

    pub fn text(&mut self, x: u16, y: u16, text: impl Into<String>, inverse: bool) {
        self.ops.push(DrawOp::Text {
            x,
            y,
            text: text.into(),
            inverse,
        });
    }

    /// Concatenated text of every run, in draw order
    pub fn text_content(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_fits_panel() {
        let last = Rect::rows(29, 29);
        assert_eq!(last.bottom(), PANEL_HEIGHT);
        assert_eq!(cell_origin(39, 0), (234, HEADER_HEIGHT));
        assert!(Rect::screen().contains(&Rect::rows(0, 29)));
    }

    #[test]
    fn test_row_band_excludes_header() {
        let band = Rect::rows(3, 5);
        assert_eq!(band.y, HEADER_HEIGHT + 30);
        assert_eq!(band.height, 30);
        assert!(!band.contains(&Rect::header()));
        assert!(Rect::body().contains(&Rect::rows(0, 29)));
        assert_eq!(Rect::body().y, HEADER_HEIGHT);
    }
}
