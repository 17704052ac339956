//! Terminal escape sequence parser
//!
//! A stateful parser that converts bytes into terminal actions. It covers
//! the subset a 40x30 monochrome xterm needs: C0 controls, two-byte
//! escapes, charset designation, CSI with up to 16 parameters and OSC
//! strings (whose payload is discarded).

mod actions;
mod state;

pub use actions::{Action, CsiAction, CsiMarker, EscAction, MAX_PARAMS};
pub use state::{Parser, State};
