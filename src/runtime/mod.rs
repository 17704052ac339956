//! State Runtime
//!
//! A flat state machine (Locked, Menu, Terminal) driven by one
//! cooperative UI loop. States never switch each other directly: they
//! queue a `Transition` on the context and the runtime commits it between
//! ticks, calling `exit` on the old state and `enter` on the new one.
//!
//! Background tasks cannot touch the UI; they flip a `RefreshHandle` and
//! the runtime dispatches `on_refresh` on its next tick.

mod context;
mod flows;
mod locked;
mod menu;
mod terminal;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

pub use context::{Context, Services};
pub use locked::LockedState;
pub use menu::MenuState;
pub use terminal::{TerminalState, HELP_TEXT};

use crate::error::{InkdeckError, Result};
use crate::ssh::ConnectParams;

/// Idle yield between ticks
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Redraw request from a background task
#[derive(Debug, Clone, Default)]
pub struct RefreshHandle(Arc<AtomicBool>);

impl RefreshHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume a pending request
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A foreground state
pub trait AppState {
    fn name(&self) -> &'static str;

    fn enter(&mut self, ctx: &mut Context) -> Result<()>;

    /// Called once per tick
    fn update(&mut self, ctx: &mut Context) -> Result<()>;

    /// A background task asked for a redraw
    fn on_refresh(&mut self, ctx: &mut Context) -> Result<()>;

    fn exit(&mut self, ctx: &mut Context);
}

/// Next foreground state, committed between ticks
#[derive(Debug)]
pub enum Transition {
    Locked,
    Menu,
    Terminal(ConnectParams),
    /// Banner, flush, deep sleep, halt
    Shutdown,
}

/// Owns the foreground state and the context it runs against
pub struct Runtime {
    ctx: Context,
    state: Box<dyn AppState>,
    entered: bool,
}

impl Runtime {
    /// Start in the Locked state
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            state: Box::new(LockedState::new()),
            entered: false,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn is_halted(&self) -> bool {
        self.ctx.is_halted()
    }

    /// One cooperative iteration
    pub fn tick(&mut self, now: Instant) {
        if self.ctx.is_halted() {
            return;
        }
        self.ctx.now = now;
        if !self.entered {
            self.entered = true;
            self.ctx.renderer.request_full();
            let result = self.state.enter(&mut self.ctx);
            self.check(result);
        }
        while let Some(next) = self.ctx.take_transition() {
            self.commit(next);
            if self.ctx.is_halted() {
                return;
            }
        }
        if self.ctx.refresh.take() {
            let result = self.state.on_refresh(&mut self.ctx);
            self.check(result);
        }
        self.ctx.input.poll(now);
        let result = self.state.update(&mut self.ctx);
        self.check(result);
    }

    /// Loop until halted
    pub fn run(&mut self) {
        info!("runtime started");
        while !self.ctx.is_halted() {
            self.tick(Instant::now());
            thread::sleep(TICK_INTERVAL);
        }
        info!("runtime halted");
    }

    /// Stop with an on-screen message
    pub fn halt(&mut self, err: &InkdeckError) {
        error!(error = %err, "halting");
        self.state.exit(&mut self.ctx);
        self.ctx.halt_with(err.banner(), &err.to_string());
    }

    fn commit(&mut self, next: Transition) {
        let from = self.state.name();
        self.state.exit(&mut self.ctx);
        let state: Box<dyn AppState> = match next {
            Transition::Locked => Box::new(LockedState::new()),
            Transition::Menu => Box::new(MenuState::new()),
            Transition::Terminal(params) => Box::new(TerminalState::new(params)),
            Transition::Shutdown => {
                info!(from, "shutting down");
                self.ctx.shutdown();
                return;
            },
        };
        self.state = state;
        info!(from, to = self.state.name(), "state transition");
        self.ctx.input.clear();
        self.ctx.renderer.request_full();
        let result = self.state.enter(&mut self.ctx);
        self.check(result);
    }

    fn check(&mut self, result: Result<()>) {
        if let Err(e) = result {
            if e.is_fatal() {
                self.halt(&e);
            } else {
                warn!(state = self.state.name(), error = %e, "state error");
            }
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("state", &self.state.name())
            .field("ctx", &self.ctx)
            .finish()
    }
}
