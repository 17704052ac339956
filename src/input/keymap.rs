//! Physical keyboard layout
//!
//! The matrix controller reports 4 rows. The first three rows carry ten
//! keys each, the bottom row five. Tables list each row right-to-left,
//! matching the controller's column numbering.

/// Number of matrix rows
pub const KEY_ROWS: usize = 4;

/// Keys wired on each matrix row
pub const ROW_WIDTHS: [usize; KEY_ROWS] = [10, 10, 10, 5];

/// A key on the lower (unmodified) layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalKey {
    Char(u8),
    Backspace,
    Enter,
    Space,
    ShiftLeft,
    ShiftRight,
    Sym,
    Mic,
    Alt,
}

impl PhysicalKey {
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            PhysicalKey::ShiftLeft
                | PhysicalKey::ShiftRight
                | PhysicalKey::Sym
                | PhysicalKey::Mic
                | PhysicalKey::Alt
        )
    }
}

use PhysicalKey::{Alt, Backspace, Char, Enter, Mic, ShiftLeft, ShiftRight, Space, Sym};

const LOWER_ROW0: [PhysicalKey; 10] = [
    Char(b'p'),
    Char(b'o'),
    Char(b'i'),
    Char(b'u'),
    Char(b'y'),
    Char(b't'),
    Char(b'r'),
    Char(b'e'),
    Char(b'w'),
    Char(b'q'),
];

const LOWER_ROW1: [PhysicalKey; 10] = [
    Backspace,
    Char(b'l'),
    Char(b'k'),
    Char(b'j'),
    Char(b'h'),
    Char(b'g'),
    Char(b'f'),
    Char(b'd'),
    Char(b's'),
    Char(b'a'),
];

const LOWER_ROW2: [PhysicalKey; 10] = [
    Enter,
    Char(b'$'),
    Char(b'm'),
    Char(b'n'),
    Char(b'b'),
    Char(b'v'),
    Char(b'c'),
    Char(b'x'),
    Char(b'z'),
    Alt,
];

const LOWER_ROW3: [PhysicalKey; 5] = [ShiftRight, Sym, Space, Mic, ShiftLeft];

const LOWER: [&[PhysicalKey]; KEY_ROWS] = [&LOWER_ROW0, &LOWER_ROW1, &LOWER_ROW2, &LOWER_ROW3];

/// Symbol layer, NUL where a key has no symbol
const SYMBOL: [&[u8]; KEY_ROWS] = [
    b"@+-_)(321#",
    b"\0\"';:/654*",
    b"\0\0.,!?987\0",
    b"\0\0\0\0\0",
];

/// Lower-layer key at a matrix position
pub fn lower(row: usize, col: usize) -> Option<PhysicalKey> {
    LOWER.get(row)?.get(col).copied()
}

/// Symbol-layer byte at a matrix position
pub fn symbol(row: usize, col: usize) -> Option<u8> {
    SYMBOL
        .get(row)?
        .get(col)
        .copied()
        .filter(|&byte| byte != 0)
}

/// One decoded controller report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixEvent {
    pub row: usize,
    pub col: usize,
    pub pressed: bool,
}

/// Decode a controller keycode
///
/// The low seven bits hold a 1-based key index, bit 7 is set on press.
/// Indices that do not land on a wired key are rejected.
pub fn decode_keycode(code: u8) -> Option<MatrixEvent> {
    let index = usize::from(code & 0x7f).checked_sub(1)?;
    let row = index / 10;
    let col = index % 10;
    if row >= KEY_ROWS || col >= ROW_WIDTHS[row] {
        return None;
    }
    Some(MatrixEvent {
        row,
        col,
        pressed: code & 0x80 != 0,
    })
}

/// Controller keycode for a matrix position, the inverse of `decode_keycode`
pub fn encode_keycode(row: usize, col: usize, pressed: bool) -> u8 {
    let index = (row * 10 + col + 1) as u8;
    if pressed {
        index | 0x80
    } else {
        index
    }
}

/// Matrix position of a lower-layer key
pub fn position_of(key: PhysicalKey) -> Option<(usize, usize)> {
    LOWER.iter().enumerate().find_map(|(row, keys)| {
        keys.iter()
            .position(|&candidate| candidate == key)
            .map(|col| (row, col))
    })
}
