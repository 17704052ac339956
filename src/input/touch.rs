//! Touch gestures
//!
//! The poller runs on its own thread at ~50 Hz so e-ink refreshes on the UI
//! task never starve it. Completed gestures land in a one-shot slot the UI
//! reads at its own pace.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::app::TouchConfig;
use crate::bus::I2cBus;

/// A completed gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Tap { x: i32, y: i32 },
    LongPress { x: i32, y: i32 },
    SwipeUp,
    SwipeDown,
    SwipeLeft,
    SwipeRight,
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    start_x: i32,
    start_y: i32,
    started: Instant,
    last_x: i32,
    last_y: i32,
}

/// Classifies raw touch samples into gestures
#[derive(Debug)]
pub struct GestureDetector {
    config: TouchConfig,
    contact: Option<Contact>,
    /// First sample without a touch, pending debounce
    lifted_at: Option<Instant>,
    /// Force-released; ignore samples until the finger actually lifts
    latched: bool,
}

impl GestureDetector {
    pub fn new(config: TouchConfig) -> Self {
        Self {
            config,
            contact: None,
            lifted_at: None,
            latched: false,
        }
    }

    /// A touch is in progress
    pub fn is_touching(&self) -> bool {
        self.contact.is_some()
    }

    /// Feed one sample; `None` means no finger on the panel
    pub fn update(&mut self, sample: Option<(i32, i32)>, now: Instant) -> Option<Gesture> {
        match sample {
            Some((x, y)) => self.on_contact(x, y, now),
            None => self.on_lift(now),
        }
    }

    fn on_contact(&mut self, x: i32, y: i32, now: Instant) -> Option<Gesture> {
        if self.latched {
            return None;
        }
        self.lifted_at = None;
        let contact = self.contact.get_or_insert(Contact {
            start_x: x,
            start_y: y,
            started: now,
            last_x: x,
            last_y: y,
        });
        contact.last_x = x;
        contact.last_y = y;

        let timeout = Duration::from_millis(self.config.inactivity_timeout_ms);
        if now.saturating_duration_since(contact.started) >= timeout {
            debug!("touch held past timeout, forcing release");
            self.latched = true;
            return self.finish(now);
        }
        None
    }

    fn on_lift(&mut self, now: Instant) -> Option<Gesture> {
        self.latched = false;
        self.contact?;

        let lifted_at = *self.lifted_at.get_or_insert(now);
        let debounce = Duration::from_millis(self.config.release_debounce_ms);
        if now.saturating_duration_since(lifted_at) < debounce {
            return None;
        }
        self.finish(lifted_at)
    }

    fn finish(&mut self, released: Instant) -> Option<Gesture> {
        let contact = self.contact.take()?;
        self.lifted_at = None;
        let dx = contact.last_x - contact.start_x;
        let dy = contact.last_y - contact.start_y;
        let held = released.saturating_duration_since(contact.started);
        let gesture = classify(&self.config, dx, dy, held, contact.last_x, contact.last_y);
        trace!(dx, dy, ?held, ?gesture, "touch released");
        gesture
    }
}

fn classify(
    config: &TouchConfig,
    dx: i32,
    dy: i32,
    held: Duration,
    x: i32,
    y: i32,
) -> Option<Gesture> {
    if dx.abs().max(dy.abs()) < config.swipe_min_distance {
        return if held < Duration::from_millis(config.tap_max_ms) {
            Some(Gesture::Tap { x, y })
        } else {
            Some(Gesture::LongPress { x, y })
        };
    }
    if held > Duration::from_millis(config.swipe_max_ms) {
        return None;
    }
    // Diagonal ties count as horizontal
    Some(if dx.abs() >= dy.abs() {
        if dx > 0 {
            Gesture::SwipeRight
        } else {
            Gesture::SwipeLeft
        }
    } else if dy > 0 {
        Gesture::SwipeDown
    } else {
        Gesture::SwipeUp
    })
}

/// Single pending gesture shared between the poller and the UI
#[derive(Debug, Clone, Default)]
pub struct GestureSlot {
    pending: Arc<Mutex<Option<Gesture>>>,
    touching: Arc<AtomicBool>,
}

impl GestureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a gesture; an unread one is replaced
    pub fn post(&self, gesture: Gesture) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(gesture);
    }

    /// Take the pending gesture, if any
    pub fn read(&self) -> Option<Gesture> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Live contact state
    pub fn is_touching(&self) -> bool {
        self.touching.load(Ordering::Acquire)
    }

    fn set_touching(&self, touching: bool) {
        self.touching.store(touching, Ordering::Release);
    }
}

/// Touch controller on the I²C bus
pub trait TouchPanel: Send {
    /// Current contact in panel coordinates, `None` when untouched
    fn read_point(&mut self) -> io::Result<Option<(i32, i32)>>;
}

/// Background thread sampling the touch panel
#[derive(Debug)]
pub struct TouchPoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TouchPoller {
    /// Spawn the poller thread
    pub fn spawn(
        mut panel: Box<dyn TouchPanel>,
        bus: I2cBus,
        config: TouchConfig,
        slot: GestureSlot,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let interval = Duration::from_millis(config.poll_interval_ms);
        let handle = thread::Builder::new()
            .name("touch-poller".into())
            .spawn(move || {
                let mut detector = GestureDetector::new(config);
                while !stop_flag.load(Ordering::Acquire) {
                    let sample = match bus.transaction(|| panel.read_point()) {
                        Ok(sample) => sample,
                        Err(e) => {
                            warn!(error = %e, "touch read failed");
                            None
                        },
                    };
                    if let Some(gesture) = detector.update(sample, Instant::now()) {
                        debug!(?gesture, "gesture");
                        slot.post(gesture);
                    }
                    slot.set_touching(detector.is_touching());
                    thread::sleep(interval);
                }
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("touch poller panicked");
            }
        }
    }
}

impl Drop for TouchPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
