//! Dialog kinds and their key handling

use crate::input::{Gesture, InputEvent, Key};
use crate::render::MenuView;

/// What a text-input dialog accepts and how it shows it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputKind {
    #[default]
    Text,
    /// Shown as `*`, stored as typed
    Masked,
    /// Digits only
    Numeric,
}

/// One on-screen dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    List {
        title: String,
        items: Vec<String>,
        selected: usize,
    },
    Input {
        title: String,
        value: String,
        kind: InputKind,
    },
    Message {
        title: String,
        body: String,
    },
}

/// Value a dialog completes with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// List item chosen
    Index(usize),
    /// Text entered
    Text(String),
    /// Message dismissed by the user
    Dismissed,
    /// Closed by the owner's loop hook
    Closed,
}

impl Reply {
    pub fn index(&self) -> Option<usize> {
        match self {
            Reply::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Reply::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Result of feeding one event to a dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Ignored,
    Changed,
    Confirm(Reply),
    Cancel,
}

/// Esc, Ctrl-C and Ctrl-Q back out of a dialog
pub fn is_cancel_key(key: Key) -> bool {
    matches!(key, Key::Escape | Key::Char(0x03) | Key::Char(0x11))
}

impl Dialog {
    pub fn list(title: &str, items: Vec<String>) -> Self {
        Dialog::List {
            title: title.to_string(),
            items,
            selected: 0,
        }
    }

    pub fn input(title: &str, initial: &str, kind: InputKind) -> Self {
        Dialog::Input {
            title: title.to_string(),
            value: initial.to_string(),
            kind,
        }
    }

    pub fn message(title: &str, body: &str) -> Self {
        Dialog::Message {
            title: title.to_string(),
            body: body.to_string(),
        }
    }

    /// Replace a message body, e.g. from a loop hook
    pub fn set_body(&mut self, text: &str) {
        if let Dialog::Message { body, .. } = self {
            *body = text.to_string();
        }
    }

    /// What the panel shows; masked input becomes `*`
    pub fn view(&self) -> MenuView {
        match self {
            Dialog::List {
                title,
                items,
                selected,
            } => MenuView::List {
                title: title.clone(),
                items: items.clone(),
                selected: *selected,
            },
            Dialog::Input { title, value, kind } => MenuView::Input {
                title: title.clone(),
                value: match kind {
                    InputKind::Masked => "*".repeat(value.chars().count()),
                    _ => value.clone(),
                },
            },
            Dialog::Message { title, body } => MenuView::Message {
                title: title.clone(),
                body: body.clone(),
            },
        }
    }

    pub(crate) fn handle(&mut self, event: InputEvent) -> Outcome {
        match self {
            Dialog::List { items, selected, .. } => {
                let len = items.len();
                let step = |selected: &mut usize, forward: bool| {
                    if len > 0 {
                        *selected = if forward {
                            (*selected + 1) % len
                        } else {
                            (*selected + len - 1) % len
                        };
                    }
                    Outcome::Changed
                };
                match event {
                    InputEvent::Key(Key::Char(b'w')) | InputEvent::Key(Key::Up) => step(selected, false),
                    InputEvent::Key(Key::Char(b's')) | InputEvent::Key(Key::Down) => step(selected, true),
                    InputEvent::Touch(Gesture::SwipeUp) => step(selected, false),
                    InputEvent::Touch(Gesture::SwipeDown) => step(selected, true),
                    InputEvent::Key(Key::Enter) | InputEvent::Touch(Gesture::Tap { .. }) if len > 0 => {
                        Outcome::Confirm(Reply::Index(*selected))
                    },
                    InputEvent::Key(key) if is_cancel_key(key) => Outcome::Cancel,
                    _ => Outcome::Ignored,
                }
            },
            Dialog::Input { value, kind, .. } => match event {
                InputEvent::Key(Key::Enter) => Outcome::Confirm(Reply::Text(value.clone())),
                InputEvent::Key(key) if is_cancel_key(key) => Outcome::Cancel,
                InputEvent::Key(Key::Backspace) | InputEvent::Key(Key::Delete) => {
                    if value.pop().is_some() {
                        Outcome::Changed
                    } else {
                        Outcome::Ignored
                    }
                },
                InputEvent::Key(key) => match key.printable() {
                    Some(byte) if *kind != InputKind::Numeric || byte.is_ascii_digit() => {
                        value.push(char::from(byte));
                        Outcome::Changed
                    },
                    _ => Outcome::Ignored,
                },
                _ => Outcome::Ignored,
            },
            Dialog::Message { .. } => match event {
                InputEvent::Key(_) | InputEvent::Touch(Gesture::Tap { .. }) => Outcome::Confirm(Reply::Dismissed),
                _ => Outcome::Ignored,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: Key) -> InputEvent {
        InputEvent::Key(k)
    }

    #[test]
    fn test_list_wraps_both_ways() {
        let mut list = Dialog::list("Menu", vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(list.handle(key(Key::Char(b'w'))), Outcome::Changed);
        assert!(matches!(list, Dialog::List { selected: 2, .. }));
        list.handle(key(Key::Down));
        list.handle(InputEvent::Touch(Gesture::SwipeDown));
        assert!(matches!(list, Dialog::List { selected: 1, .. }));
        assert_eq!(list.handle(key(Key::Enter)), Outcome::Confirm(Reply::Index(1)));
        assert_eq!(list.handle(key(Key::Char(0x11))), Outcome::Cancel);
    }

    #[test]
    fn test_empty_list_cannot_confirm() {
        let mut list = Dialog::list("Empty", vec![]);
        assert_eq!(list.handle(key(Key::Enter)), Outcome::Ignored);
        assert_eq!(list.handle(key(Key::Escape)), Outcome::Cancel);
    }

    #[test]
    fn test_masked_input_keeps_real_text() {
        let mut input = Dialog::input("PIN", "", InputKind::Masked);
        for b in b"12a" {
            input.handle(key(Key::Char(*b)));
        }
        input.handle(key(Key::Backspace));
        assert_eq!(
            input.view(),
            MenuView::Input {
                title: "PIN".into(),
                value: "**".into()
            }
        );
        assert_eq!(input.handle(key(Key::Enter)), Outcome::Confirm(Reply::Text("12".into())));
    }

    #[test]
    fn test_numeric_input_rejects_letters() {
        let mut input = Dialog::input("Port", "22", InputKind::Numeric);
        assert_eq!(input.handle(key(Key::Char(b'x'))), Outcome::Ignored);
        input.handle(key(Key::Char(b'2')));
        assert_eq!(input.handle(key(Key::Enter)), Outcome::Confirm(Reply::Text("222".into())));
    }

    #[test]
    fn test_message_dismissed_by_any_key() {
        let mut message = Dialog::message("Info", "hello");
        assert_eq!(message.handle(key(Key::Char(b'x'))), Outcome::Confirm(Reply::Dismissed));
        assert_eq!(
            message.handle(InputEvent::System(crate::input::SystemEvent::Sleep)),
            Outcome::Ignored
        );
    }
}
