//! Refresh scheduling
//!
//! Partial refreshes are fast but leave ghosting behind, so every N of them
//! the scheduler substitutes a full refresh. Requests arriving inside the
//! minimum interval are deferred; the dirty bits keep them pending.
//!
//! A partial window never covers the header. Anything that changes the
//! header (status indicators, the history marker) is drawn by a full
//! refresh instead.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::app::DisplayConfig;

/// What the next refresh should be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Nothing to draw
    Skip,
    /// Too soon after the previous refresh; try again next tick
    Defer,
    /// Redraw terminal rows `top..=bottom`, header excluded
    Partial { top: usize, bottom: usize },
    /// Clear and redraw everything
    Full,
}

impl RefreshDecision {
    /// The decision draws something
    pub fn draws(&self) -> bool {
        !matches!(self, RefreshDecision::Skip | RefreshDecision::Defer)
    }
}

/// Decides between skip, partial and full refresh
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    interval: Duration,
    full_every: u32,
    partials_since_full: u32,
    last_refresh: Option<Instant>,
    full_requested: bool,
}

impl RefreshScheduler {
    pub fn new(config: &DisplayConfig) -> Self {
        Self {
            interval: config.update_interval(),
            full_every: config.full_refresh_every.max(1),
            partials_since_full: 0,
            last_refresh: None,
            full_requested: true,
        }
    }

    /// Force the next refresh to be full, regardless of the interval
    pub fn request_full(&mut self) {
        self.full_requested = true;
    }

    pub fn full_pending(&self) -> bool {
        self.full_requested
    }

    pub fn partials_since_full(&self) -> u32 {
        self.partials_since_full
    }

    /// Pick a refresh for the given dirty span.
    ///
    /// `header_changed` means the header on the panel is out of date.
    pub fn decide(
        &self,
        dirty: Option<(usize, usize)>,
        header_changed: bool,
        now: Instant,
    ) -> RefreshDecision {
        if self.full_requested {
            return RefreshDecision::Full;
        }
        if dirty.is_none() && !header_changed {
            return RefreshDecision::Skip;
        }
        if let Some(last) = self.last_refresh {
            if now.saturating_duration_since(last) < self.interval {
                return RefreshDecision::Defer;
            }
        }
        match dirty {
            Some((top, bottom)) if !header_changed && self.partials_since_full < self.full_every => {
                RefreshDecision::Partial { top, bottom }
            },
            _ => RefreshDecision::Full,
        }
    }

    /// Record a refresh the panel completed
    pub fn commit(&mut self, decision: RefreshDecision, now: Instant) {
        match decision {
            RefreshDecision::Skip | RefreshDecision::Defer => return,
            RefreshDecision::Full => {
                self.full_requested = false;
                self.partials_since_full = 0;
            },
            RefreshDecision::Partial { .. } => {
                self.partials_since_full += 1;
            },
        }
        debug!(?decision, partials = self.partials_since_full, "refresh committed");
        self.last_refresh = Some(now);
    }
}
