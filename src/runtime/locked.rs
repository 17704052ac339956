//! Locked state: PIN entry

use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{AppState, Context, Transition};
use crate::error::{InkdeckError, Result};
use crate::input::{InputEvent, SystemEvent};
use crate::menu::{Dialog, InputKind, Outcome, Reply};
use crate::services::{CredentialError, CredentialStore};

/// How long a rejection pane stays up
pub const DENIED_PAUSE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Unlock,
    /// First boot, no PIN stored yet
    Choose,
    Confirm(String),
}

impl Phase {
    fn prompt(&self) -> &'static str {
        match self {
            Phase::Unlock => "Enter PIN",
            Phase::Choose => "Set New PIN",
            Phase::Confirm(_) => "Confirm PIN",
        }
    }
}

/// Collects a PIN and unlocks the vault
#[derive(Debug)]
pub struct LockedState {
    phase: Phase,
    dialog: Dialog,
    paused_until: Option<Instant>,
    needs_draw: bool,
}

impl Default for LockedState {
    fn default() -> Self {
        Self::new()
    }
}

impl LockedState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Unlock,
            dialog: Dialog::input(Phase::Unlock.prompt(), "", InputKind::Masked),
            paused_until: None,
            needs_draw: true,
        }
    }

    fn prompt(&mut self, phase: Phase) {
        self.dialog = Dialog::input(phase.prompt(), "", InputKind::Masked);
        self.phase = phase;
        self.needs_draw = true;
    }

    /// Show a rejection pane, then re-prompt with `then`
    fn deny(&mut self, ctx: &mut Context, title: &str, detail: &str, then: Phase) {
        ctx.show_progress(title, detail);
        self.paused_until = Some(ctx.now + DENIED_PAUSE);
        self.prompt(then);
    }

    fn submit(&mut self, ctx: &mut Context, pin: String) {
        match std::mem::replace(&mut self.phase, Phase::Unlock) {
            Phase::Unlock => match ctx.vault.authenticate(&pin) {
                Ok(()) => unlocked(ctx),
                Err(CredentialError::BadPin) | Err(CredentialError::NoPin) => {
                    let err = InkdeckError::AuthDenied;
                    self.deny(ctx, err.banner(), "Wrong PIN", Phase::Unlock);
                },
                Err(e) => {
                    warn!(error = %e, "unlock failed");
                    let err = InkdeckError::from(e);
                    self.deny(ctx, err.banner(), &err.to_string(), Phase::Unlock);
                },
            },
            Phase::Choose if pin.is_empty() => {
                self.deny(ctx, "PIN Required", "The PIN cannot be empty", Phase::Choose);
            },
            Phase::Choose => self.prompt(Phase::Confirm(pin)),
            Phase::Confirm(first) if first != pin => {
                self.deny(ctx, "PIN Mismatch", "Enter a new PIN again", Phase::Choose);
            },
            Phase::Confirm(_) => match ctx.vault.authenticate(&pin) {
                Ok(()) => unlocked(ctx),
                Err(e) => {
                    warn!(error = %e, "PIN setup failed");
                    let err = InkdeckError::from(e);
                    self.deny(ctx, err.banner(), &err.to_string(), Phase::Choose);
                },
            },
        }
    }
}

fn unlocked(ctx: &mut Context) {
    info!("unlocked");
    ctx.unlock_stores();
    ctx.go(Transition::Menu);
}

impl AppState for LockedState {
    fn name(&self) -> &'static str {
        "Locked"
    }

    fn enter(&mut self, ctx: &mut Context) -> Result<()> {
        ctx.vault.lock();
        ctx.restore_backlight();
        let phase = if ctx.vault.is_provisioned() {
            Phase::Unlock
        } else {
            info!("no PIN stored, asking for a new one");
            Phase::Choose
        };
        self.prompt(phase);
        Ok(())
    }

    fn update(&mut self, ctx: &mut Context) -> Result<()> {
        if let Some(until) = self.paused_until {
            if ctx.now < until {
                ctx.input.clear();
                return Ok(());
            }
            self.paused_until = None;
            self.needs_draw = true;
        }

        for event in ctx.input.drain(ctx.config.input.key_batch) {
            match event {
                InputEvent::System(SystemEvent::Sleep) => {
                    ctx.go(Transition::Shutdown);
                    return Ok(());
                },
                InputEvent::System(SystemEvent::ToggleBacklight) => ctx.toggle_backlight(),
                _ => match self.dialog.handle(event) {
                    Outcome::Confirm(Reply::Text(pin)) => {
                        self.submit(ctx, pin);
                        if ctx.has_transition() || self.paused_until.is_some() {
                            return Ok(());
                        }
                    },
                    Outcome::Changed => self.needs_draw = true,
                    Outcome::Cancel => {
                        let phase = match &self.phase {
                            Phase::Confirm(_) => Phase::Choose,
                            other => other.clone(),
                        };
                        self.prompt(phase);
                    },
                    _ => {},
                },
            }
        }

        if self.needs_draw && ctx.draw_menu(&self.dialog.view())? {
            self.needs_draw = false;
        }
        Ok(())
    }

    fn on_refresh(&mut self, _ctx: &mut Context) -> Result<()> {
        self.needs_draw = true;
        Ok(())
    }

    fn exit(&mut self, _ctx: &mut Context) {
        self.dialog = Dialog::input(Phase::Unlock.prompt(), "", InputKind::Masked);
    }
}
