//! Render Pipeline
//!
//! Reads the terminal model through its lock, asks the scheduler what kind
//! of refresh is due, composes a frame and pushes it to the panel with the
//! display selected on the SPI bus.
//!
//! Dirty rows are cleared when the frame is composed and set again if the
//! panel rejects it, so rows written during a slow refresh are never lost.
//!
//! The renderer remembers the header it last drew along with the history
//! offset. When either differs the refresh is full, since partial windows
//! stay below the header.

pub mod compose;
pub mod frame;
pub mod panel;
pub mod scheduler;

use std::time::Instant;

use tracing::{debug, warn};

pub use compose::{compose_banner, compose_menu, compose_terminal, row_runs, MenuView, StatusBanner};
pub use frame::{DrawOp, Frame, Rect, RefreshMode};
pub use panel::{EinkPanel, PanelError, RecordingPanel};
pub use scheduler::{RefreshDecision, RefreshScheduler};

use crate::app::DisplayConfig;
use crate::bus::SpiBus;
use crate::error::InkdeckError;
use crate::terminal::SharedTerminal;

/// Why a terminal render was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderCause {
    /// Bytes from the remote side changed the model
    Data,
    /// The user acted: keys, scrolling the history view
    Input,
    /// Periodic status tick
    Animation,
}

/// Drives the panel
pub struct Renderer {
    panel: Box<dyn EinkPanel>,
    spi: SpiBus,
    scheduler: RefreshScheduler,
    /// Header and history offset on the panel, none after a banner
    drawn: Option<(StatusBanner, usize)>,
}

impl Renderer {
    pub fn new(panel: Box<dyn EinkPanel>, spi: SpiBus, config: &DisplayConfig) -> Self {
        Self {
            panel,
            spi,
            scheduler: RefreshScheduler::new(config),
            drawn: None,
        }
    }

    /// Make the next refresh full (state entry, leaving a banner)
    pub fn request_full(&mut self) {
        self.scheduler.request_full();
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    fn push(&mut self, mode: RefreshMode, frame: &Frame) -> Result<(), InkdeckError> {
        let _select = self.spi.select_display()?;
        self.panel.refresh(mode, frame)?;
        Ok(())
    }

    /// Refresh the terminal if the scheduler says so
    pub fn render_terminal(
        &mut self,
        terminal: &SharedTerminal,
        status: &StatusBanner,
        cause: RenderCause,
        now: Instant,
    ) -> Result<RefreshDecision, InkdeckError> {
        let scheduler = &self.scheduler;
        let drawn = &self.drawn;
        let (decision, offset, frame) = terminal.with_mut(|term| {
            let screen = term.screen_mut();
            let offset = screen.view_offset();
            if screen.is_viewing_history() && cause == RenderCause::Data && !scheduler.full_pending() {
                return (RefreshDecision::Skip, offset, None);
            }
            let header_changed = drawn
                .as_ref()
                .map_or(true, |(banner, at)| banner != status || *at != offset);
            let decision = scheduler.decide(screen.dirty().span(), header_changed, now);
            if !decision.draws() {
                return (decision, offset, None);
            }
            let frame = compose_terminal(screen, decision, status);
            match decision {
                RefreshDecision::Full => screen.mark_clean(),
                RefreshDecision::Partial { top, bottom } => screen.mark_rows_clean(top, bottom),
                _ => {},
            }
            (decision, offset, Some(frame))
        });

        let Some(frame) = frame else {
            return Ok(decision);
        };
        let mode = match decision {
            RefreshDecision::Full => RefreshMode::Full,
            _ => RefreshMode::Partial,
        };
        debug!(?decision, ops = frame.ops.len(), "terminal refresh");
        match self.push(mode, &frame) {
            Ok(()) => {
                self.scheduler.commit(decision, now);
                if decision == RefreshDecision::Full {
                    self.drawn = Some((status.clone(), offset));
                }
                Ok(decision)
            },
            Err(e) => {
                warn!(error = %e, ?decision, "terminal refresh failed");
                terminal.with_mut(|term| {
                    let screen = term.screen_mut();
                    match decision {
                        RefreshDecision::Partial { top, bottom } => screen.mark_rows_dirty(top, bottom),
                        RefreshDecision::Full => {
                            screen.mark_all_dirty();
                        },
                        _ => {},
                    }
                });
                if decision == RefreshDecision::Full {
                    self.scheduler.request_full();
                }
                Err(e)
            },
        }
    }

    /// Refresh a dialog. Deferred requests must be retried by the caller.
    pub fn render_menu(
        &mut self,
        view: &MenuView,
        status: &StatusBanner,
        now: Instant,
    ) -> Result<RefreshDecision, InkdeckError> {
        let header_changed = self.drawn.as_ref().map_or(true, |(banner, _)| banner != status);
        let decision = match self.scheduler.decide(Some((0, 0)), header_changed, now) {
            RefreshDecision::Partial { .. } => RefreshDecision::Partial { top: 0, bottom: 0 },
            other => other,
        };
        if !decision.draws() {
            return Ok(decision);
        }
        let full = decision == RefreshDecision::Full;
        let frame = compose_menu(view, status, full);
        let mode = if full {
            RefreshMode::Full
        } else {
            RefreshMode::Partial
        };
        self.push(mode, &frame)?;
        self.scheduler.commit(decision, now);
        if full {
            self.drawn = Some((status.clone(), 0));
        }
        Ok(decision)
    }

    /// Full-screen banner, always a full refresh
    pub fn render_banner(&mut self, title: &str, detail: &str, now: Instant) -> Result<(), InkdeckError> {
        let frame = compose_banner(title, detail);
        self.push(RefreshMode::Full, &frame)?;
        self.scheduler.commit(RefreshDecision::Full, now);
        // Whatever comes next must clear the banner
        self.scheduler.request_full();
        self.drawn = None;
        Ok(())
    }

    /// Put the panel to sleep
    pub fn hibernate(&mut self) -> Result<(), InkdeckError> {
        let _select = self.spi.select_display()?;
        self.panel.hibernate()?;
        Ok(())
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
