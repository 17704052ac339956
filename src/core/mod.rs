//! Terminal Core Module
//!
//! Platform-independent terminal state. This module contains:
//! - Screen model (primary and alternate grids, scroll region, modes)
//! - Cell representation (byte plus inverse flag)
//! - Cursor state and save/restore
//! - Scrollback ring and the history view
//! - Dirty-row tracking for the e-ink render pipeline
//! - Deterministic snapshot generation
//!
//! The core is deterministic: the same byte stream always produces the
//! same state.

mod cell;
mod cursor;
mod dirty;
mod screen;
mod scrollback;
mod snapshot;

pub use cell::{line_drawing_fallback, Cell};
pub use cursor::{Cursor, SavedCursor};
pub use dirty::DirtyRows;
pub use screen::{ActiveBuffer, Modes, Screen};
pub use scrollback::{Line, Scrollback};
pub use snapshot::{CursorSnapshot, InverseSpan, ModesSnapshot, Snapshot};
