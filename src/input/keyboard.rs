//! Keyboard decoder and FIFO producer
//!
//! Modifiers are held state, not events. Output is produced on press only;
//! releases matter for modifiers and for the Mic long-hold Help gesture.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, info, warn};

use super::encode::Key;
use super::keymap::{self, MatrixEvent, PhysicalKey};
use super::{InputEvent, SystemEvent};
use crate::app::InputConfig;
use crate::bus::I2cBus;
use crate::error::InkdeckError;

/// Upper bound on keycodes drained from the controller per poll
const MAX_CODES_PER_POLL: usize = 16;

/// Modifier state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub sym: bool,
    pub alt: bool,
    /// The Mic key doubles as Ctrl
    pub ctrl: bool,
}

impl Modifiers {
    /// Check if any modifier is held
    pub fn any(&self) -> bool {
        self.shift || self.sym || self.alt || self.ctrl
    }
}

/// Turns matrix reports into input events
#[derive(Debug)]
pub struct KeyboardDecoder {
    shift_left: bool,
    shift_right: bool,
    sym: bool,
    alt: bool,
    mic: bool,
    mic_down_at: Option<Instant>,
    /// Another key was pressed during the current Mic hold
    shortcut_consumed: bool,
    help_hold: Duration,
}

impl KeyboardDecoder {
    pub fn new(help_hold: Duration) -> Self {
        Self {
            shift_left: false,
            shift_right: false,
            sym: false,
            alt: false,
            mic: false,
            mic_down_at: None,
            shortcut_consumed: false,
            help_hold,
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        Modifiers {
            shift: self.shift_left || self.shift_right,
            sym: self.sym,
            alt: self.alt,
            ctrl: self.mic,
        }
    }

    /// Process one matrix report
    pub fn on_matrix(&mut self, event: MatrixEvent, now: Instant) -> Option<InputEvent> {
        let key = keymap::lower(event.row, event.col)?;
        match key {
            PhysicalKey::ShiftLeft => {
                self.shift_left = event.pressed;
                None
            },
            PhysicalKey::ShiftRight => {
                self.shift_right = event.pressed;
                None
            },
            PhysicalKey::Sym => {
                self.sym = event.pressed;
                None
            },
            PhysicalKey::Alt => {
                self.alt = event.pressed;
                None
            },
            PhysicalKey::Mic => self.on_mic(event.pressed, now),
            _ if !event.pressed => None,
            _ => {
                if self.mic {
                    self.shortcut_consumed = true;
                }
                self.translate(key, event.row, event.col)
            },
        }
    }

    fn on_mic(&mut self, pressed: bool, now: Instant) -> Option<InputEvent> {
        if pressed {
            if self.sym {
                return Some(InputEvent::Key(Key::Char(b'0')));
            }
            self.mic = true;
            self.mic_down_at = Some(now);
            self.shortcut_consumed = false;
            return None;
        }

        self.mic = false;
        let down_at = self.mic_down_at.take()?;
        let consumed = std::mem::take(&mut self.shortcut_consumed);
        if !consumed && now.saturating_duration_since(down_at) > self.help_hold {
            debug!("mic long hold");
            return Some(InputEvent::System(SystemEvent::Help));
        }
        None
    }

    fn translate(&self, key: PhysicalKey, row: usize, col: usize) -> Option<InputEvent> {
        let symbol = keymap::symbol(row, col);

        if self.alt {
            if key == PhysicalKey::Char(b'b') {
                return Some(InputEvent::System(SystemEvent::ToggleBacklight));
            }
            if let Some(digit @ b'1'..=b'9') = symbol {
                return Some(InputEvent::Key(Key::F(digit - b'0')));
            }
        }

        let key = if self.mic {
            ctrl_key(key)
        } else if let (true, Some(byte)) = (self.sym, symbol) {
            Key::Char(byte)
        } else {
            plain_key(key, self.shift_left || self.shift_right)
        };
        Some(InputEvent::Key(key))
    }
}

fn ctrl_key(key: PhysicalKey) -> Key {
    match key {
        PhysicalKey::Char(b'w') => Key::Up,
        PhysicalKey::Char(b'a') => Key::Left,
        PhysicalKey::Char(b's') => Key::Down,
        PhysicalKey::Char(b'd') => Key::Right,
        PhysicalKey::Char(b'q') => Key::Escape,
        PhysicalKey::Char(b'e') => Key::Tab,
        PhysicalKey::Char(c) if c.is_ascii_lowercase() => Key::Char(c - b'a' + 1),
        PhysicalKey::Char(c) => Key::Char(c),
        PhysicalKey::Backspace => Key::Delete,
        PhysicalKey::Space => Key::Char(0x00),
        other => plain_key(other, false),
    }
}

fn plain_key(key: PhysicalKey, shift: bool) -> Key {
    match key {
        PhysicalKey::Char(c) if shift => Key::Char(c.to_ascii_uppercase()),
        PhysicalKey::Char(c) => Key::Char(c),
        PhysicalKey::Space => Key::Char(b' '),
        PhysicalKey::Enter => Key::Enter,
        _ => Key::Backspace,
    }
}

/// Matrix keyboard controller on the I²C bus
pub trait KeyMatrix: Send {
    /// Configure the controller; may fail while it is still powering up
    fn init(&mut self) -> io::Result<()>;

    /// Next buffered keycode, `None` when the controller FIFO is empty
    fn read_keycode(&mut self) -> io::Result<Option<u8>>;

    fn set_backlight(&mut self, on: bool) -> io::Result<()>;
}

/// Keyboard driver: controller, decoder and the FIFO it feeds
pub struct Keyboard {
    matrix: Box<dyn KeyMatrix>,
    bus: I2cBus,
    decoder: KeyboardDecoder,
    fifo: Sender<InputEvent>,
    backlight: bool,
}

impl Keyboard {
    /// Bring up the controller, retrying while it powers up
    pub fn start(
        mut matrix: Box<dyn KeyMatrix>,
        bus: I2cBus,
        config: &InputConfig,
        fifo: Sender<InputEvent>,
    ) -> Result<Self, InkdeckError> {
        let attempts = config.init_retries.max(1);
        let delay = Duration::from_millis(config.init_retry_delay_ms);
        for attempt in 1..=attempts {
            match bus.transaction(|| matrix.init()) {
                Ok(()) => {
                    info!(attempt, "keyboard controller ready");
                    return Ok(Self {
                        matrix,
                        bus,
                        decoder: KeyboardDecoder::new(config.help_hold()),
                        fifo,
                        backlight: false,
                    });
                },
                Err(e) => {
                    warn!(attempt, error = %e, "keyboard init failed");
                    if attempt < attempts {
                        thread::sleep(delay);
                    }
                },
            }
        }
        Err(InkdeckError::HardwareInitFailure(format!(
            "keyboard controller did not respond after {} attempts",
            attempts
        )))
    }

    pub fn modifiers(&self) -> Modifiers {
        self.decoder.modifiers()
    }

    /// Drain the controller into the FIFO. Returns the number of events queued.
    pub fn poll(&mut self, now: Instant) -> usize {
        let mut queued = 0;
        for _ in 0..MAX_CODES_PER_POLL {
            let code = match self.bus.transaction(|| self.matrix.read_keycode()) {
                Ok(Some(code)) => code,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "keyboard read failed");
                    break;
                },
            };
            let Some(event) = keymap::decode_keycode(code) else {
                debug!(code, "ignoring unknown keycode");
                continue;
            };
            if let Some(input) = self.decoder.on_matrix(event, now) {
                match self.fifo.try_send(input) {
                    Ok(()) => queued += 1,
                    Err(TrySendError::Full(dropped)) => {
                        warn!(?dropped, "key FIFO full, dropping event");
                    },
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }
        queued
    }

    pub fn backlight(&self) -> bool {
        self.backlight
    }

    pub fn set_backlight(&mut self, on: bool) -> io::Result<()> {
        self.bus.transaction(|| self.matrix.set_backlight(on))?;
        self.backlight = on;
        Ok(())
    }

    /// Flip the backlight, returning the new state
    pub fn toggle_backlight(&mut self) -> io::Result<bool> {
        let on = !self.backlight;
        self.set_backlight(on)?;
        Ok(on)
    }
}

impl std::fmt::Debug for Keyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyboard")
            .field("decoder", &self.decoder)
            .field("backlight", &self.backlight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::keymap::{encode_keycode, position_of};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn press(decoder: &mut KeyboardDecoder, key: PhysicalKey, now: Instant) -> Option<InputEvent> {
        let (row, col) = position_of(key).unwrap();
        decoder.on_matrix(
            MatrixEvent {
                row,
                col,
                pressed: true,
            },
            now,
        )
    }

    fn release(decoder: &mut KeyboardDecoder, key: PhysicalKey, now: Instant) -> Option<InputEvent> {
        let (row, col) = position_of(key).unwrap();
        decoder.on_matrix(
            MatrixEvent {
                row,
                col,
                pressed: false,
            },
            now,
        )
    }

    fn decoder() -> KeyboardDecoder {
        KeyboardDecoder::new(Duration::from_millis(800))
    }

    fn key(ev: Option<InputEvent>) -> Key {
        match ev {
            Some(InputEvent::Key(key)) => key,
            other => panic!("expected key, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_and_shift() {
        let mut kb = decoder();
        let now = Instant::now();
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'h'), now)), Key::Char(b'h'));
        assert_eq!(release(&mut kb, PhysicalKey::Char(b'h'), now), None);

        press(&mut kb, PhysicalKey::ShiftLeft, now);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'h'), now)), Key::Char(b'H'));
        release(&mut kb, PhysicalKey::ShiftLeft, now);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'h'), now)), Key::Char(b'h'));
        assert_eq!(key(press(&mut kb, PhysicalKey::Enter, now)), Key::Enter);
        assert_eq!(key(press(&mut kb, PhysicalKey::Space, now)), Key::Char(b' '));
        assert_eq!(key(press(&mut kb, PhysicalKey::Backspace, now)), Key::Backspace);
    }

    #[test]
    fn test_symbol_layer() {
        let mut kb = decoder();
        let now = Instant::now();
        press(&mut kb, PhysicalKey::Sym, now);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'w'), now)), Key::Char(b'1'));
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'p'), now)), Key::Char(b'@'));
        // No symbol: falls back to the lower layer
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'b'), now)), Key::Char(b'b'));
        assert_eq!(key(press(&mut kb, PhysicalKey::Mic, now)), Key::Char(b'0'));
        assert!(!kb.modifiers().ctrl);
    }

    #[test]
    fn test_mic_shortcuts() {
        let mut kb = decoder();
        let now = Instant::now();
        press(&mut kb, PhysicalKey::Mic, now);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'w'), now)), Key::Up);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'a'), now)), Key::Left);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b's'), now)), Key::Down);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'd'), now)), Key::Right);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'q'), now)), Key::Escape);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'e'), now)), Key::Tab);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'c'), now)), Key::Char(0x03));
        assert_eq!(key(press(&mut kb, PhysicalKey::Backspace, now)), Key::Delete);
    }

    #[test]
    fn test_alt_function_keys_and_backlight() {
        let mut kb = decoder();
        let now = Instant::now();
        press(&mut kb, PhysicalKey::Alt, now);
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'w'), now)), Key::F(1));
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'd'), now)), Key::F(5));
        assert_eq!(key(press(&mut kb, PhysicalKey::Char(b'c'), now)), Key::F(9));
        assert_eq!(
            press(&mut kb, PhysicalKey::Char(b'b'), now),
            Some(InputEvent::System(SystemEvent::ToggleBacklight))
        );
    }

    #[test]
    fn test_mic_long_hold_raises_help() {
        let mut kb = decoder();
        let start = Instant::now();
        press(&mut kb, PhysicalKey::Mic, start);
        assert_eq!(
            release(&mut kb, PhysicalKey::Mic, start + Duration::from_millis(900)),
            Some(InputEvent::System(SystemEvent::Help))
        );

        press(&mut kb, PhysicalKey::Mic, start);
        assert_eq!(
            release(&mut kb, PhysicalKey::Mic, start + Duration::from_millis(300)),
            None
        );
    }

    #[test]
    fn test_late_mic_release_after_shortcut_is_not_help() {
        let mut kb = decoder();
        let start = Instant::now();
        press(&mut kb, PhysicalKey::Mic, start);
        press(&mut kb, PhysicalKey::Char(b'w'), start);
        release(&mut kb, PhysicalKey::Char(b'w'), start);
        assert_eq!(
            release(&mut kb, PhysicalKey::Mic, start + Duration::from_secs(2)),
            None
        );

        // The next plain hold works again
        press(&mut kb, PhysicalKey::Mic, start);
        assert_eq!(
            release(&mut kb, PhysicalKey::Mic, start + Duration::from_secs(2)),
            Some(InputEvent::System(SystemEvent::Help))
        );
    }

    #[derive(Clone, Default)]
    struct FakeMatrix {
        codes: Arc<Mutex<VecDeque<u8>>>,
        failures: Arc<Mutex<u32>>,
        backlight: Arc<Mutex<bool>>,
    }

    impl KeyMatrix for FakeMatrix {
        fn init(&mut self) -> io::Result<()> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no ack"));
            }
            Ok(())
        }

        fn read_keycode(&mut self) -> io::Result<Option<u8>> {
            Ok(self.codes.lock().unwrap().pop_front())
        }

        fn set_backlight(&mut self, on: bool) -> io::Result<()> {
            *self.backlight.lock().unwrap() = on;
            Ok(())
        }
    }

    fn fast_config(retries: u32) -> InputConfig {
        InputConfig {
            init_retries: retries,
            init_retry_delay_ms: 0,
            ..InputConfig::default()
        }
    }

    #[test]
    fn test_start_retries_then_fails() {
        let matrix = FakeMatrix::default();
        *matrix.failures.lock().unwrap() = 2;
        let (tx, _rx) = crossbeam_channel::bounded(4);
        assert!(Keyboard::start(Box::new(matrix.clone()), I2cBus::new(), &fast_config(5), tx).is_ok());

        *matrix.failures.lock().unwrap() = 10;
        let (tx, _rx) = crossbeam_channel::bounded(4);
        let err = Keyboard::start(Box::new(matrix), I2cBus::new(), &fast_config(5), tx).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_poll_feeds_fifo_in_order() {
        let matrix = FakeMatrix::default();
        let (tx, rx) = crossbeam_channel::bounded(2);
        let mut keyboard =
            Keyboard::start(Box::new(matrix.clone()), I2cBus::new(), &fast_config(1), tx).unwrap();
        {
            let mut codes = matrix.codes.lock().unwrap();
            for key in [b'h', b'i', b'x'] {
                let (row, col) = position_of(PhysicalKey::Char(key)).unwrap();
                codes.push_back(encode_keycode(row, col, true));
                codes.push_back(encode_keycode(row, col, false));
            }
        }
        // Third key overflows the two-slot FIFO
        assert_eq!(keyboard.poll(Instant::now()), 2);
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                InputEvent::Key(Key::Char(b'h')),
                InputEvent::Key(Key::Char(b'i'))
            ]
        );
    }

    #[test]
    fn test_toggle_backlight() {
        let matrix = FakeMatrix::default();
        let (tx, _rx) = crossbeam_channel::bounded(2);
        let mut keyboard =
            Keyboard::start(Box::new(matrix.clone()), I2cBus::new(), &fast_config(1), tx).unwrap();
        assert!(keyboard.toggle_backlight().unwrap());
        assert!(*matrix.backlight.lock().unwrap());
        assert!(!keyboard.toggle_backlight().unwrap());
    }
}
