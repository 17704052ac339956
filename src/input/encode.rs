//! Key Encoding
//!
//! Translates decoded keys into the byte sequences a remote xterm-style
//! application expects. Arrow keys follow application cursor mode
//! (DECCKM); function keys use the xterm encodings.

/// A key after modifier processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A literal byte, including control bytes produced by Ctrl
    Char(u8),
    Enter,
    Backspace,
    Delete,
    Tab,
    Escape,
    Up,
    Down,
    Left,
    Right,
    /// Function key 1-9
    F(u8),
}

impl Key {
    /// Printable byte carried by the key, if any
    pub fn printable(self) -> Option<u8> {
        match self {
            Key::Char(byte) if (0x20..0x7f).contains(&byte) => Some(byte),
            _ => None,
        }
    }
}

/// Encode a key press for the remote side
pub fn encode_key(key: Key, application_cursor: bool) -> Vec<u8> {
    match key {
        Key::Char(byte) => vec![byte],
        Key::Enter => vec![0x0d],
        Key::Backspace => vec![0x08],
        Key::Delete => vec![0x7f],
        Key::Tab => vec![0x09],
        Key::Escape => vec![0x1b],

        Key::Up => encode_cursor_key(b'A', application_cursor),
        Key::Down => encode_cursor_key(b'B', application_cursor),
        Key::Right => encode_cursor_key(b'C', application_cursor),
        Key::Left => encode_cursor_key(b'D', application_cursor),

        Key::F(n @ 1..=4) => encode_function_key(n),
        Key::F(5) => encode_special_key(15),
        Key::F(6) => encode_special_key(17),
        Key::F(7) => encode_special_key(18),
        Key::F(8) => encode_special_key(19),
        Key::F(9) => encode_special_key(20),
        Key::F(_) => Vec::new(),
    }
}

/// Arrow keys: SS3 in application mode, CSI otherwise
fn encode_cursor_key(code: u8, application_mode: bool) -> Vec<u8> {
    if application_mode {
        vec![0x1b, b'O', code]
    } else {
        vec![0x1b, b'[', code]
    }
}

/// F5-F9: CSI number ~
fn encode_special_key(number: u8) -> Vec<u8> {
    format!("\x1b[{}~", number).into_bytes()
}

/// F1-F4: SS3 P/Q/R/S
fn encode_function_key(number: u8) -> Vec<u8> {
    let code = match number {
        1 => b'P',
        2 => b'Q',
        3 => b'R',
        4 => b'S',
        _ => return vec![],
    };
    vec![0x1b, b'O', code]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_keys_normal() {
        assert_eq!(encode_key(Key::Up, false), b"\x1b[A");
        assert_eq!(encode_key(Key::Down, false), b"\x1b[B");
        assert_eq!(encode_key(Key::Right, false), b"\x1b[C");
        assert_eq!(encode_key(Key::Left, false), b"\x1b[D");
    }

    #[test]
    fn test_cursor_keys_application() {
        assert_eq!(encode_key(Key::Up, true), b"\x1bOA");
        assert_eq!(encode_key(Key::Down, true), b"\x1bOB");
        assert_eq!(encode_key(Key::Right, true), b"\x1bOC");
        assert_eq!(encode_key(Key::Left, true), b"\x1bOD");
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(encode_key(Key::F(1), false), b"\x1bOP");
        assert_eq!(encode_key(Key::F(4), true), b"\x1bOS");
        assert_eq!(encode_key(Key::F(5), false), b"\x1b[15~");
        assert_eq!(encode_key(Key::F(6), false), b"\x1b[17~");
        assert_eq!(encode_key(Key::F(9), false), b"\x1b[20~");
        assert!(encode_key(Key::F(0), false).is_empty());
        assert!(encode_key(Key::F(10), false).is_empty());
    }

    #[test]
    fn test_editing_keys() {
        assert_eq!(encode_key(Key::Enter, false), b"\r");
        assert_eq!(encode_key(Key::Backspace, false), b"\x08");
        assert_eq!(encode_key(Key::Delete, false), b"\x7f");
        assert_eq!(encode_key(Key::Tab, false), b"\t");
        assert_eq!(encode_key(Key::Escape, false), b"\x1b");
        assert_eq!(encode_key(Key::Char(0x03), false), b"\x03");
    }

    #[test]
    fn test_printable() {
        assert_eq!(Key::Char(b'a').printable(), Some(b'a'));
        assert_eq!(Key::Char(0x03).printable(), None);
        assert_eq!(Key::Enter.printable(), None);
    }
}
