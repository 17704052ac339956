//! Shared bus capabilities
//!
//! The keyboard controller, touch panel, fuel gauge and charger share one
//! I²C bus; the display, SD card and radio share one SPI bus. Both are
//! process-wide resources, created once at boot and handed to each driver
//! constructor as a `Buses` value.
//!
//! I²C: a single mutex brackets every transaction. Holds longer than
//! `I2C_HOLD_LIMIT` are logged because they starve the touch poller.
//!
//! SPI: at most one chip select may be active. A second select while one
//! is held is refused rather than queued.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

/// Longest acceptable I²C hold
pub const I2C_HOLD_LIMIT: Duration = Duration::from_millis(50);

/// Bus errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("timed out waiting for the I2C bus after {0:?}")]
    Timeout(Duration),
    #[error("chip select for {requested:?} refused while {held:?} is selected")]
    ChipSelectConflict {
        requested: SpiDevice,
        held: SpiDevice,
    },
}

/// Mutex-guarded I²C bus handle
#[derive(Debug, Clone, Default)]
pub struct I2cBus {
    lock: Arc<Mutex<()>>,
}

impl I2cBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` as one bus transaction, blocking until the bus is free
    pub fn transaction<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.acquire();
        timed(f)
    }

    /// Run `f` as one bus transaction, giving up after `wait`
    pub fn try_transaction<R>(&self, wait: Duration, f: impl FnOnce() -> R) -> Result<R, BusError> {
        let deadline = Instant::now() + wait;
        loop {
            match self.lock.try_lock() {
                Ok(_guard) => return Ok(timed(f)),
                Err(TryLockError::Poisoned(poisoned)) => {
                    let _guard = poisoned.into_inner();
                    return Ok(timed(f));
                },
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(BusError::Timeout(wait));
                    }
                    thread::sleep(Duration::from_millis(1));
                },
            }
        }
    }
}

fn timed<R>(f: impl FnOnce() -> R) -> R {
    let start = Instant::now();
    let result = f();
    let held = start.elapsed();
    if held > I2C_HOLD_LIMIT {
        warn!(?held, "I2C transaction exceeded hold limit");
    }
    result
}

/// Devices on the SPI bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiDevice {
    Display,
    SdCard,
    Radio,
}

/// SPI chip-select arbiter
#[derive(Debug, Clone, Default)]
pub struct SpiBus {
    selected: Arc<Mutex<Option<SpiDevice>>>,
}

impl SpiBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Option<SpiDevice>> {
        self.selected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assert chip select for `device`. Released when the guard drops.
    pub fn select(&self, device: SpiDevice) -> Result<SpiSelect, BusError> {
        let mut selected = self.state();
        if let Some(held) = *selected {
            return Err(BusError::ChipSelectConflict {
                requested: device,
                held,
            });
        }
        *selected = Some(device);
        trace!(?device, "chip select asserted");
        Ok(SpiSelect {
            bus: self.clone(),
            device,
        })
    }

    /// Select the display; every other device stays deselected for the guard's lifetime
    pub fn select_display(&self) -> Result<SpiSelect, BusError> {
        self.select(SpiDevice::Display)
    }

    /// Currently selected device
    pub fn selected(&self) -> Option<SpiDevice> {
        *self.state()
    }
}

/// Active chip select
#[derive(Debug)]
pub struct SpiSelect {
    bus: SpiBus,
    device: SpiDevice,
}

impl SpiSelect {
    pub fn device(&self) -> SpiDevice {
        self.device
    }
}

impl Drop for SpiSelect {
    fn drop(&mut self) {
        *self.bus.state() = None;
        trace!(device = ?self.device, "chip select released");
    }
}

/// Process-wide bus capabilities passed to driver constructors
#[derive(Debug, Clone, Default)]
pub struct Buses {
    pub i2c: I2cBus,
    pub spi: SpiBus,
}

impl Buses {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_i2c_transactions_are_exclusive() {
        let bus = I2cBus::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..50 {
                        bus.transaction(|| {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_i2c_try_transaction_times_out() {
        let bus = I2cBus::new();
        let other = bus.clone();
        bus.transaction(|| {
            let result = other.try_transaction(Duration::from_millis(5), || ());
            assert_eq!(result, Err(BusError::Timeout(Duration::from_millis(5))));
        });
        assert_eq!(bus.try_transaction(Duration::from_millis(5), || 7), Ok(7));
    }

    #[test]
    fn test_spi_single_chip_select() {
        let bus = SpiBus::new();
        let display = bus.select_display().unwrap();
        assert_eq!(bus.selected(), Some(SpiDevice::Display));
        assert_eq!(
            bus.select(SpiDevice::SdCard).unwrap_err(),
            BusError::ChipSelectConflict {
                requested: SpiDevice::SdCard,
                held: SpiDevice::Display
            }
        );
        drop(display);
        assert_eq!(bus.selected(), None);
        let sd = bus.select(SpiDevice::SdCard).unwrap();
        assert_eq!(sd.device(), SpiDevice::SdCard);
    }
}
