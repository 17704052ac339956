//! Menu Engine
//!
//! A stack of modal dialogs. Each frame carries the continuation to run
//! when it completes, so a flow reads as a chain of `list` / `input` /
//! `message` calls instead of a hand-rolled state machine. The engine is
//! generic over the context the continuations receive.
//!
//! Confirming pops the frame and then runs its continuation, which may
//! push the next dialog. Cancelling pops the frame and runs its
//! `on_cancel`; a frame without one idles the whole engine.

mod dialog;
mod wizard;

use tracing::trace;

pub use dialog::{is_cancel_key, Dialog, InputKind, Reply};
pub use wizard::{validate, Wizard, WizardStep};
pub(crate) use dialog::Outcome;

use crate::input::InputEvent;
use crate::render::MenuView;

/// Runs with the reply once the dialog completes
pub type ConfirmFn<C> = Box<dyn FnOnce(&mut MenuEngine<C>, &mut C, Reply)>;
/// Runs when the dialog is cancelled
pub type CancelFn<C> = Box<dyn FnOnce(&mut MenuEngine<C>, &mut C)>;
/// Runs every tick while its dialog is on top
pub type LoopFn<C> = Box<dyn FnMut(&mut C, &mut Dialog) -> LoopAction>;

/// What an `on_loop` hook asks of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    /// The hook changed the dialog
    Redraw,
    /// Complete the dialog with `Reply::Closed`
    Close,
}

struct Frame<C> {
    dialog: Dialog,
    on_confirm: Option<ConfirmFn<C>>,
    on_cancel: Option<CancelFn<C>>,
    on_loop: Option<LoopFn<C>>,
}

pub struct MenuEngine<C> {
    stack: Vec<Frame<C>>,
    redraw: bool,
}

impl<C> Default for MenuEngine<C> {
    fn default() -> Self {
        Self {
            stack: Vec::new(),
            redraw: false,
        }
    }
}

impl<C: 'static> MenuEngine<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a dialog is on screen
    pub fn is_running(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Drop every dialog without running continuations
    pub fn clear(&mut self) {
        if !self.stack.is_empty() {
            self.stack.clear();
            self.redraw = true;
        }
    }

    /// Push a dialog with a continuation receiving the raw reply
    pub fn push<F>(&mut self, dialog: Dialog, on_confirm: F)
    where
        F: FnOnce(&mut MenuEngine<C>, &mut C, Reply) + 'static,
    {
        trace!(depth = self.stack.len() + 1, "dialog pushed");
        self.stack.push(Frame {
            dialog,
            on_confirm: Some(Box::new(on_confirm)),
            on_cancel: None,
            on_loop: None,
        });
        self.redraw = true;
    }

    /// Selection list; the continuation gets the chosen index
    pub fn list<F>(&mut self, title: &str, items: Vec<String>, on_select: F)
    where
        F: FnOnce(&mut MenuEngine<C>, &mut C, usize) + 'static,
    {
        self.push(Dialog::list(title, items), move |engine, ctx, reply| {
            if let Some(index) = reply.index() {
                on_select(engine, ctx, index);
            }
        });
    }

    /// Text entry; the continuation gets the unmasked text
    pub fn input<F>(&mut self, title: &str, initial: &str, kind: InputKind, on_enter: F)
    where
        F: FnOnce(&mut MenuEngine<C>, &mut C, String) + 'static,
    {
        self.push(Dialog::input(title, initial, kind), move |engine, ctx, reply| {
            if let Reply::Text(text) = reply {
                on_enter(engine, ctx, text);
            }
        });
    }

    /// Message that runs `then` once dismissed or closed
    pub fn message_then<F>(&mut self, title: &str, body: &str, then: F)
    where
        F: FnOnce(&mut MenuEngine<C>, &mut C) + 'static,
    {
        self.push(Dialog::message(title, body), move |engine, ctx, _| then(engine, ctx));
    }

    /// Message with nothing after it
    pub fn message(&mut self, title: &str, body: &str) {
        self.stack.push(Frame {
            dialog: Dialog::message(title, body),
            on_confirm: None,
            on_cancel: None,
            on_loop: None,
        });
        self.redraw = true;
    }

    /// Attach a cancel continuation to the top dialog
    pub fn on_cancel<F>(&mut self, on_cancel: F)
    where
        F: FnOnce(&mut MenuEngine<C>, &mut C) + 'static,
    {
        if let Some(frame) = self.stack.last_mut() {
            frame.on_cancel = Some(Box::new(on_cancel));
        }
    }

    /// Attach a per-tick hook to the top dialog
    pub fn set_on_loop<F>(&mut self, on_loop: F)
    where
        F: FnMut(&mut C, &mut Dialog) -> LoopAction + 'static,
    {
        if let Some(frame) = self.stack.last_mut() {
            frame.on_loop = Some(Box::new(on_loop));
        }
    }

    /// Route one event to the top dialog. Returns false if it was not consumed.
    pub fn handle(&mut self, ctx: &mut C, event: InputEvent) -> bool {
        let Some(frame) = self.stack.last_mut() else {
            return false;
        };
        match frame.dialog.handle(event) {
            Outcome::Ignored => !matches!(event, InputEvent::System(_)),
            Outcome::Changed => {
                self.redraw = true;
                true
            },
            Outcome::Confirm(reply) => {
                self.confirm(ctx, reply);
                true
            },
            Outcome::Cancel => {
                self.cancel(ctx);
                true
            },
        }
    }

    /// Run the top dialog's `on_loop` hook, if any
    pub fn tick(&mut self, ctx: &mut C) {
        let Some(frame) = self.stack.last_mut() else {
            return;
        };
        let Some(hook) = frame.on_loop.as_mut() else {
            return;
        };
        match hook(ctx, &mut frame.dialog) {
            LoopAction::Continue => {},
            LoopAction::Redraw => self.redraw = true,
            LoopAction::Close => self.confirm(ctx, Reply::Closed),
        }
    }

    fn confirm(&mut self, ctx: &mut C, reply: Reply) {
        if let Some(frame) = self.stack.pop() {
            self.redraw = true;
            if let Some(next) = frame.on_confirm {
                next(self, ctx, reply);
            }
        }
    }

    fn cancel(&mut self, ctx: &mut C) {
        if let Some(frame) = self.stack.pop() {
            self.redraw = true;
            match frame.on_cancel {
                Some(back) => back(self, ctx),
                None => self.stack.clear(),
            }
        }
    }

    /// Top dialog as the panel shows it
    pub fn view(&self) -> Option<MenuView> {
        self.stack.last().map(|frame| frame.dialog.view())
    }

    pub fn top(&self) -> Option<&Dialog> {
        self.stack.last().map(|frame| &frame.dialog)
    }

    /// True once after anything visible changed
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }
}

impl<C> std::fmt::Debug for MenuEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuEngine")
            .field("depth", &self.stack.len())
            .field("top", &self.stack.last().map(|frame| &frame.dialog))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Gesture, Key, SystemEvent};

    type Log = Vec<String>;

    fn key(k: Key) -> InputEvent {
        InputEvent::Key(k)
    }

    fn type_text(engine: &mut MenuEngine<Log>, log: &mut Log, text: &str) {
        for b in text.bytes() {
            engine.handle(log, key(Key::Char(b)));
        }
    }

    #[test]
    fn test_chained_dialogs() {
        let mut engine = MenuEngine::<Log>::new();
        let mut log = Log::new();
        engine.list("Main", vec!["One".into(), "Two".into()], |engine, log, index| {
            log.push(format!("picked {index}"));
            engine.input("Name", "", InputKind::Text, |_, log, name| {
                log.push(format!("name {name}"));
            });
        });

        engine.handle(&mut log, key(Key::Down));
        engine.handle(&mut log, key(Key::Enter));
        assert_eq!(engine.depth(), 1);
        type_text(&mut engine, &mut log, "box");
        engine.handle(&mut log, key(Key::Enter));

        assert_eq!(log, vec!["picked 1", "name box"]);
        assert!(!engine.is_running());
    }

    #[test]
    fn test_cancel_runs_handler_or_idles() {
        let mut engine = MenuEngine::<Log>::new();
        let mut log = Log::new();
        engine.list("Settings", vec!["A".into()], |_, _, _| {});
        engine.on_cancel(|engine, log| {
            log.push("back".into());
            engine.message("Main", "shown");
        });
        engine.handle(&mut log, key(Key::Escape));
        assert_eq!(log, vec!["back"]);
        assert!(engine.is_running());

        let mut engine = MenuEngine::<Log>::new();
        engine.message("Under", "");
        engine.list("Top", vec!["A".into()], |_, _, _| {});
        engine.handle(&mut log, key(Key::Char(0x03)));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_system_events_not_consumed() {
        let mut engine = MenuEngine::<Log>::new();
        let mut log = Log::new();
        engine.message("Info", "x");
        assert!(!engine.handle(&mut log, InputEvent::System(SystemEvent::Sleep)));
        assert!(engine.is_running());
        assert!(engine.handle(&mut log, InputEvent::Touch(Gesture::Tap { x: 1, y: 1 })));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_on_loop_updates_and_closes() {
        let mut engine = MenuEngine::<Log>::new();
        let mut log = Log::new();
        engine.push(Dialog::message("Countdown", "3"), |_, log, reply| {
            log.push(format!("{reply:?}"));
        });
        let mut remaining = 3;
        engine.set_on_loop(move |_, dialog| {
            remaining -= 1;
            if remaining == 0 {
                return LoopAction::Close;
            }
            dialog.set_body(&remaining.to_string());
            LoopAction::Redraw
        });
        engine.take_redraw();

        engine.tick(&mut log);
        assert!(engine.take_redraw());
        assert_eq!(
            engine.view(),
            Some(MenuView::Message {
                title: "Countdown".into(),
                body: "2".into()
            })
        );
        engine.tick(&mut log);
        engine.tick(&mut log);
        assert_eq!(log, vec!["Closed"]);
        assert!(!engine.is_running());
    }

    #[test]
    fn test_on_loop_only_runs_on_top() {
        let mut engine = MenuEngine::<Log>::new();
        let mut log = Log::new();
        engine.push(Dialog::message("Below", ""), |_, _, _| {});
        engine.set_on_loop(|log, _| {
            log.push("tick".into());
            LoopAction::Continue
        });
        engine.message("Above", "");
        engine.tick(&mut log);
        assert!(log.is_empty());
        engine.handle(&mut log, key(Key::Enter));
        engine.tick(&mut log);
        assert_eq!(log, vec!["tick"]);
    }
}
