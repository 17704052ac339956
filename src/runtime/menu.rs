//! Menu state: runs the user flows on the menu engine

use tracing::debug;

use super::flows::{self, Menu};
use super::{AppState, Context, Transition};
use crate::error::Result;
use crate::input::{InputEvent, SystemEvent};

#[derive(Debug, Default)]
pub struct MenuState {
    engine: Menu,
    needs_draw: bool,
}

impl MenuState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AppState for MenuState {
    fn name(&self) -> &'static str {
        "Menu"
    }

    fn enter(&mut self, ctx: &mut Context) -> Result<()> {
        self.engine.clear();
        flows::main_menu(&mut self.engine);
        if ctx.take_auto_connect() {
            flows::wifi::auto_connect(&mut self.engine, ctx);
        }
        if let Some((title, body)) = ctx.take_notice() {
            self.engine.message(&title, &body);
        }
        self.needs_draw = true;
        Ok(())
    }

    fn update(&mut self, ctx: &mut Context) -> Result<()> {
        for event in ctx.input.drain(ctx.config.input.key_batch) {
            if !self.engine.handle(ctx, event) {
                match event {
                    InputEvent::System(SystemEvent::Sleep) => ctx.go(Transition::Shutdown),
                    InputEvent::System(SystemEvent::ToggleBacklight) => ctx.toggle_backlight(),
                    other => debug!(event = ?other, "unhandled in menu"),
                }
            }
            if ctx.has_transition() {
                return Ok(());
            }
        }

        self.engine.tick(ctx);
        if ctx.has_transition() {
            return Ok(());
        }
        if !self.engine.is_running() {
            flows::main_menu(&mut self.engine);
        }

        if self.engine.take_redraw() {
            self.needs_draw = true;
        }
        if self.needs_draw {
            if let Some(view) = self.engine.view() {
                if ctx.draw_menu(&view)? {
                    self.needs_draw = false;
                }
            }
        }
        Ok(())
    }

    fn on_refresh(&mut self, _ctx: &mut Context) -> Result<()> {
        self.needs_draw = true;
        Ok(())
    }

    fn exit(&mut self, _ctx: &mut Context) {
        self.engine.clear();
    }
}
