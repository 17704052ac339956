//! Terminal state: SSH session, history view and terminal refresh

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{AppState, Context, Transition};
use crate::error::Result;
use crate::input::{Gesture, InputEvent, SystemEvent};
use crate::menu::is_cancel_key;
use crate::render::{MenuView, RefreshDecision, RenderCause};
use crate::ssh::{ConnectParams, PumpResult, Session, SessionIo, SessionState, TransportError};

/// Shortcut overlay shown on Help
pub const HELP_TEXT: &str = "Mic+W/A/S/D: arrows\n\
Mic+Q: Esc  Mic+E: Tab\n\
Mic+letter: Ctrl+letter\n\
Mic+Backspace: Del\n\
Alt+1..9: F1..F9  Alt+B: light\n\
Swipe up/down: history\n\
Tap: back to live view\n\
Hold side button: sleep";

/// Redraw cadence while the connect worker runs
const CONNECTING_REDRAW: Duration = Duration::from_secs(1);

fn rank(cause: RenderCause) -> u8 {
    match cause {
        RenderCause::Data => 0,
        RenderCause::Animation => 1,
        RenderCause::Input => 2,
    }
}

#[derive(Debug)]
pub struct TerminalState {
    params: Option<ConnectParams>,
    host: String,
    session: Option<Session>,
    io: Option<SessionIo>,
    /// Strongest render cause since the last refresh
    render: Option<RenderCause>,
    last_connecting_draw: Option<Instant>,
    last_animation: Option<Instant>,
    help: bool,
    help_drawn: bool,
}

impl TerminalState {
    pub fn new(params: ConnectParams) -> Self {
        Self {
            host: params.host.clone(),
            params: Some(params),
            session: None,
            io: None,
            render: None,
            last_connecting_draw: None,
            last_animation: None,
            help: false,
            help_drawn: false,
        }
    }

    fn request(&mut self, cause: RenderCause) {
        self.render = match self.render {
            Some(current) if rank(current) >= rank(cause) => Some(current),
            _ => Some(cause),
        };
    }

    fn update_connecting(&mut self, ctx: &mut Context) {
        for event in ctx.input.drain(ctx.config.input.key_batch) {
            match event {
                InputEvent::Key(key) if is_cancel_key(key) => {
                    if let Some(session) = &self.session {
                        info!(host = %self.host, "connect cancel requested");
                        session.cancel();
                    }
                },
                InputEvent::System(SystemEvent::Sleep) => {
                    ctx.go(Transition::Shutdown);
                    return;
                },
                InputEvent::System(SystemEvent::ToggleBacklight) => ctx.toggle_backlight(),
                _ => {},
            }
        }
        let due = self
            .last_connecting_draw
            .map_or(true, |at| ctx.now.saturating_duration_since(at) >= CONNECTING_REDRAW);
        if due {
            self.last_connecting_draw = Some(ctx.now);
            self.request(RenderCause::Animation);
        }
    }

    fn update_connected(&mut self, ctx: &mut Context) {
        if self.io.is_none() {
            let (chunk, budget) = (ctx.config.ssh.read_chunk, ctx.config.ssh.read_budget);
            self.io = self.session.as_mut().and_then(|s| s.take_channel(chunk, budget));
            if self.io.is_none() {
                return;
            }
            info!(host = %self.host, "session I/O started");
            self.request(RenderCause::Input);
        }

        let application_cursor = ctx.terminal.with(|t| t.screen().modes.application_cursor);
        let page = ctx.config.rows;
        for event in ctx.input.drain(ctx.config.input.key_batch) {
            if self.help && matches!(event, InputEvent::Key(_) | InputEvent::Touch(Gesture::Tap { .. })) {
                self.close_help(ctx);
                continue;
            }
            match event {
                InputEvent::Key(key) => {
                    let was_viewing = ctx.terminal.with_mut(|t| {
                        let screen = t.screen_mut();
                        let viewing = screen.is_viewing_history();
                        screen.reset_view();
                        viewing
                    });
                    if was_viewing {
                        self.request(RenderCause::Input);
                    }
                    let Some(io) = self.io.as_mut() else {
                        break;
                    };
                    if let Err(e) = io.send_key(key, application_cursor) {
                        self.disconnect(ctx, Some(e));
                        return;
                    }
                },
                InputEvent::Touch(Gesture::SwipeUp) => {
                    ctx.terminal.with_mut(|t| t.screen_mut().scroll_view_up(page));
                    self.request(RenderCause::Input);
                },
                InputEvent::Touch(Gesture::SwipeDown) => {
                    ctx.terminal.with_mut(|t| t.screen_mut().scroll_view_down(page));
                    self.request(RenderCause::Input);
                },
                InputEvent::Touch(Gesture::Tap { .. }) => {
                    ctx.terminal.with_mut(|t| t.screen_mut().reset_view());
                    self.request(RenderCause::Input);
                },
                InputEvent::Touch(_) => {},
                InputEvent::System(SystemEvent::Help) => {
                    if self.help {
                        self.close_help(ctx);
                    } else {
                        self.help = true;
                        self.help_drawn = false;
                    }
                },
                InputEvent::System(SystemEvent::Sleep) => {
                    ctx.go(Transition::Shutdown);
                    return;
                },
                InputEvent::System(SystemEvent::ToggleBacklight) => ctx.toggle_backlight(),
            }
        }

        let Some(io) = self.io.as_mut() else {
            return;
        };
        match io.pump(&ctx.terminal) {
            PumpResult::Continue { received } if received > 0 => self.request(RenderCause::Data),
            PumpResult::Continue { .. } => {},
            PumpResult::Eof => self.disconnect(ctx, None),
            PumpResult::Error(e) => self.disconnect(ctx, Some(e)),
        }
    }

    fn close_help(&mut self, ctx: &mut Context) {
        self.help = false;
        ctx.renderer.request_full();
        self.request(RenderCause::Input);
    }

    /// I/O loop ended: back to the menu with a notice
    fn disconnect(&mut self, ctx: &mut Context, error: Option<TransportError>) {
        self.io = None;
        let detail = match &error {
            Some(e) => {
                warn!(host = %self.host, error = %e, "session ended");
                e.to_string()
            },
            None => {
                info!(host = %self.host, "remote closed the session");
                "Connection closed".to_string()
            },
        };
        if let Some(session) = &self.session {
            session.mark_disconnected(error);
        }
        ctx.notify("Session Ended", &detail);
        ctx.go(Transition::Menu);
    }

    fn charging_tick(&mut self, ctx: &mut Context) {
        if !ctx.power.is_charging() {
            return;
        }
        let every = ctx.config.display.charging_animation();
        let due = self
            .last_animation
            .map_or(true, |at| ctx.now.saturating_duration_since(at) >= every);
        if due {
            self.last_animation = Some(ctx.now);
            self.request(RenderCause::Animation);
        }
    }

    fn draw(&mut self, ctx: &mut Context) -> Result<()> {
        if self.help {
            if !self.help_drawn {
                let view = MenuView::Message {
                    title: "Help".to_string(),
                    body: HELP_TEXT.to_string(),
                };
                self.help_drawn = ctx.draw_menu(&view)?;
            }
            return Ok(());
        }
        let Some(cause) = self.render else {
            return Ok(());
        };
        let title = ctx.terminal_title(&self.host);
        let status = ctx.status(&title);
        match ctx.renderer.render_terminal(&ctx.terminal, &status, cause, ctx.now) {
            Ok(RefreshDecision::Defer) => {},
            Ok(decision) => {
                debug!(?cause, ?decision, "terminal drawn");
                self.render = None;
            },
            Err(e) => warn!(error = %e, "terminal refresh failed, will retry"),
        }
        Ok(())
    }
}

impl AppState for TerminalState {
    fn name(&self) -> &'static str {
        "Terminal"
    }

    fn enter(&mut self, ctx: &mut Context) -> Result<()> {
        ctx.terminal.with_mut(|t| t.reset());
        let Some(params) = self.params.take() else {
            return Ok(());
        };
        match Session::connect(params, ctx.transports.as_ref(), ctx.terminal.clone(), ctx.refresh.clone()) {
            Ok(session) => self.session = Some(session),
            Err(e) => {
                warn!(error = %e, "could not start connect worker");
                ctx.notify("SSH Failed", &e.to_string());
                ctx.go(Transition::Menu);
            },
        }
        self.request(RenderCause::Input);
        Ok(())
    }

    fn update(&mut self, ctx: &mut Context) -> Result<()> {
        let Some(state) = self.session.as_ref().map(Session::state) else {
            return Ok(());
        };
        match state {
            SessionState::Connecting => self.update_connecting(ctx),
            SessionState::Connected => self.update_connected(ctx),
            SessionState::Failed => {
                let detail = self
                    .session
                    .as_ref()
                    .and_then(Session::error)
                    .unwrap_or_else(|| "unknown error".to_string());
                self.session = None;
                ctx.notify("SSH Failed", &format!("SSH Failed: {}", detail));
                ctx.go(Transition::Menu);
            },
            SessionState::Disconnected => {
                let cancelled = matches!(
                    self.session.as_ref().and_then(Session::take_error),
                    Some(TransportError::Cancelled)
                );
                self.session = None;
                if cancelled {
                    ctx.notify("Cancelled", "Connection cancelled");
                }
                ctx.go(Transition::Menu);
            },
        }
        if ctx.has_transition() {
            return Ok(());
        }
        self.charging_tick(ctx);
        self.draw(ctx)
    }

    fn on_refresh(&mut self, _ctx: &mut Context) -> Result<()> {
        self.request(RenderCause::Data);
        Ok(())
    }

    fn exit(&mut self, ctx: &mut Context) {
        self.io = None;
        if let Some(session) = self.session.take() {
            session.cancel();
            drop(session);
        }
        ctx.terminal.with_mut(|t| t.screen_mut().reset_view());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_cause_keeps_strongest() {
        let mut state = TerminalState::new(ConnectParams::new("h", 22, "u", "p"));
        state.request(RenderCause::Input);
        state.request(RenderCause::Data);
        assert_eq!(state.render, Some(RenderCause::Input));

        state.render = None;
        state.request(RenderCause::Data);
        state.request(RenderCause::Animation);
        assert_eq!(state.render, Some(RenderCause::Animation));
    }
}
