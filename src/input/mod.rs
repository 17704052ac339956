//! Input Fabric
//!
//! Three producers feed one consumer:
//! - the keyboard decoder, polled on the UI task, queues keys into a bounded FIFO;
//! - the side button queues Sleep into the same FIFO;
//! - the touch poller thread posts gestures into a one-shot slot.
//!
//! The foreground state drains the FIFO in small batches through `Input`.

pub mod button;
pub mod encode;
pub mod keyboard;
pub mod keymap;
pub mod touch;

use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;

pub use button::{ButtonPin, SideButton};
pub use encode::{encode_key, Key};
pub use keyboard::{KeyMatrix, Keyboard, KeyboardDecoder, Modifiers};
pub use keymap::{decode_keycode, MatrixEvent, PhysicalKey, ROW_WIDTHS};
pub use touch::{Gesture, GestureDetector, GestureSlot, TouchPanel, TouchPoller};

use crate::app::InputConfig;
use crate::bus::I2cBus;
use crate::error::InkdeckError;

/// Events raised outside the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// Mic held alone past the help threshold
    Help,
    /// Side button held
    Sleep,
    /// Alt+B
    ToggleBacklight,
}

/// One unit of user input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key(Key),
    System(SystemEvent),
    Touch(Gesture),
}

impl InputEvent {
    pub fn key(self) -> Option<Key> {
        match self {
            InputEvent::Key(key) => Some(key),
            _ => None,
        }
    }
}

/// Consumer side of the input fabric
pub struct Input {
    keyboard: Option<Keyboard>,
    button: Option<(Box<dyn ButtonPin>, SideButton)>,
    gestures: GestureSlot,
    tx: Sender<InputEvent>,
    rx: Receiver<InputEvent>,
}

impl Input {
    pub fn new(config: &InputConfig, gestures: GestureSlot) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(config.key_fifo_depth);
        Self {
            keyboard: None,
            button: None,
            gestures,
            tx,
            rx,
        }
    }

    /// Bring up the keyboard controller and attach it to the FIFO
    pub fn attach_keyboard(
        &mut self,
        matrix: Box<dyn KeyMatrix>,
        bus: I2cBus,
        config: &InputConfig,
    ) -> Result<(), InkdeckError> {
        self.keyboard = Some(Keyboard::start(matrix, bus, config, self.tx.clone())?);
        Ok(())
    }

    pub fn attach_button(&mut self, pin: Box<dyn ButtonPin>, config: &InputConfig) {
        self.button = Some((pin, SideButton::new(config.sleep_hold())));
    }

    pub fn keyboard_mut(&mut self) -> Option<&mut Keyboard> {
        self.keyboard.as_mut()
    }

    /// Shared gesture slot, for the touch poller
    pub fn gestures(&self) -> &GestureSlot {
        &self.gestures
    }

    /// Producer handle for injected events
    pub fn sender(&self) -> Sender<InputEvent> {
        self.tx.clone()
    }

    /// Queue an event as if a producer raised it. Returns false when the FIFO is full.
    pub fn push(&self, event: InputEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                warn!(?event, "input FIFO full");
                false
            },
        }
    }

    /// Sample the hardware producers owned by the UI task
    pub fn poll(&mut self, now: Instant) {
        if let Some(keyboard) = self.keyboard.as_mut() {
            keyboard.poll(now);
        }
        if let Some((pin, button)) = self.button.as_mut() {
            if let Some(event) = button.update(pin.is_pressed(), now) {
                self.push(InputEvent::System(event));
            }
        }
    }

    /// Next event: queued keys first, then a pending gesture
    pub fn next(&mut self) -> Option<InputEvent> {
        self.rx
            .try_recv()
            .ok()
            .or_else(|| self.gestures.read().map(InputEvent::Touch))
    }

    /// Up to `max` events
    pub fn drain(&mut self, max: usize) -> Vec<InputEvent> {
        std::iter::from_fn(|| self.next()).take(max).collect()
    }

    /// Drop everything queued, e.g. on state entry
    pub fn clear(&mut self) {
        while self.rx.try_recv().is_ok() {}
        self.gestures.read();
    }
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("keyboard", &self.keyboard)
            .field("queued", &self.rx.len())
            .finish()
    }
}
