//! Side button

use std::time::{Duration, Instant};

use super::SystemEvent;

/// Side-button GPIO
pub trait ButtonPin: Send {
    fn is_pressed(&mut self) -> bool;
}

/// Long-hold detector: one Sleep event per hold
#[derive(Debug)]
pub struct SideButton {
    hold: Duration,
    pressed_at: Option<Instant>,
    fired: bool,
}

impl SideButton {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            pressed_at: None,
            fired: false,
        }
    }

    /// Feed the current pin level
    pub fn update(&mut self, pressed: bool, now: Instant) -> Option<SystemEvent> {
        if !pressed {
            self.pressed_at = None;
            self.fired = false;
            return None;
        }
        let since = *self.pressed_at.get_or_insert(now);
        if !self.fired && now.saturating_duration_since(since) > self.hold {
            self.fired = true;
            return Some(SystemEvent::Sleep);
        }
        None
    }
}
