//! Battery and charger readings
//!
//! The fuel gauge and the charger sit on the shared I²C bus. Reads go
//! through `try_transaction` with a short wait: when the bus is busy the
//! previous reading is returned instead of blocking the UI task.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::bus::I2cBus;

/// Longest wait for the bus before serving the cached reading
const BUS_WAIT: Duration = Duration::from_millis(5);

/// Fuel gauge registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeRegister {
    /// 0.1 K
    Temperature = 0x06,
    /// mV
    Voltage = 0x08,
    /// Average current, signed mA
    AverageCurrent = 0x14,
    /// mAh
    RemainingCapacity = 0x10,
    /// mAh
    FullChargeCapacity = 0x12,
    CycleCount = 0x2A,
    /// Percent
    StateOfCharge = 0x2C,
    /// Low byte is percent
    StateOfHealth = 0x2E,
    /// mAh
    DesignCapacity = 0x3C,
}

/// Charger registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargerRegister {
    /// VBUS_STAT in bits 7..5, CHRG_STAT in bits 4..3
    Status = 0x0B,
    /// VBUS_GD in bit 7
    Vbus = 0x11,
}

/// Register access to the gauge and charger chips
pub trait FuelGauge: Send {
    fn read_gauge(&mut self, reg: GaugeRegister) -> io::Result<u16>;

    fn read_charger(&mut self, reg: ChargerRegister) -> io::Result<u8>;
}

/// Where power is coming from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerSource {
    #[default]
    Battery,
    UsbSdp,
    UsbCdp,
    DcpAdapter,
    Otg,
    Adapter,
}

impl PowerSource {
    fn from_vbus_stat(stat: u8) -> Self {
        match stat {
            0 => PowerSource::Battery,
            1 => PowerSource::UsbSdp,
            2 => PowerSource::UsbCdp,
            3 => PowerSource::DcpAdapter,
            7 => PowerSource::Otg,
            _ => PowerSource::Adapter,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PowerSource::Battery => "Battery",
            PowerSource::UsbSdp => "USB SDP",
            PowerSource::UsbCdp => "USB CDP",
            PowerSource::DcpAdapter => "DCP Adapter",
            PowerSource::Otg => "OTG",
            PowerSource::Adapter => "Adapter",
        }
    }
}

/// One complete reading
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatteryStatus {
    pub voltage: f32,
    pub percentage: u8,
    pub current_ma: i16,
    pub temperature_c: f32,
    pub remaining_mah: u16,
    pub full_mah: u16,
    pub design_mah: u16,
    pub cycles: u16,
    pub health_percent: u8,
    pub charging: bool,
    pub plugged: bool,
    pub vbus_good: bool,
    pub source: PowerSource,
}

impl BatteryStatus {
    /// Read every register. A failed register reads as zero.
    pub fn read(chips: &mut dyn FuelGauge) -> Self {
        let mut gauge = |reg| {
            chips.read_gauge(reg).unwrap_or_else(|e| {
                debug!(?reg, error = %e, "gauge read failed");
                0
            })
        };
        let voltage_mv = gauge(GaugeRegister::Voltage);
        // The gauge reports above 100 while calibrating and 0xFFFF on a bus error
        let soc = gauge(GaugeRegister::StateOfCharge).min(100) as u8;
        let temp_dk = gauge(GaugeRegister::Temperature);
        let current = gauge(GaugeRegister::AverageCurrent) as i16;
        let remaining = gauge(GaugeRegister::RemainingCapacity);
        let full = gauge(GaugeRegister::FullChargeCapacity);
        let design = gauge(GaugeRegister::DesignCapacity);
        let cycles = gauge(GaugeRegister::CycleCount);
        let soh = (gauge(GaugeRegister::StateOfHealth) & 0x00FF) as u8;

        let stat = chips.read_charger(ChargerRegister::Status).unwrap_or(0);
        let vbus = chips.read_charger(ChargerRegister::Vbus).unwrap_or(0);
        let chrg_stat = (stat >> 3) & 0x03;
        let vbus_stat = (stat >> 5) & 0x07;

        Self {
            voltage: f32::from(voltage_mv) / 1000.0,
            percentage: soc,
            current_ma: current,
            temperature_c: f32::from(temp_dk) * 0.1 - 273.15,
            remaining_mah: remaining,
            full_mah: full,
            design_mah: design,
            cycles,
            health_percent: soh,
            // 01 pre-charge, 10 fast charge
            charging: matches!(chrg_stat, 0x01 | 0x02),
            plugged: vbus_stat != 0,
            vbus_good: vbus & 0x80 != 0,
            source: PowerSource::from_vbus_stat(vbus_stat),
        }
    }

    /// Multi-line summary for the battery info dialog
    pub fn describe(&self) -> String {
        let state = match (self.charging, self.plugged) {
            (true, _) => "Charging",
            (false, true) => "Plugged, not charging",
            (false, false) => "Discharging",
        };
        format!(
            "Voltage: {:.2} V\nCharge: {}%\nCurrent: {} mA\nTemp: {:.1} C\n\
             Capacity: {}/{} mAh\nDesign: {} mAh\nCycles: {}\nHealth: {}%\n\
             State: {}\nSource: {}",
            self.voltage,
            self.percentage,
            self.current_ma,
            self.temperature_c,
            self.remaining_mah,
            self.full_mah,
            self.design_mah,
            self.cycles,
            self.health_percent,
            state,
            self.source.label(),
        )
    }
}

/// Battery readings as seen by the UI
pub trait PowerGauge: Send {
    fn percentage(&mut self) -> u8 {
        self.status().percentage
    }

    fn voltage(&mut self) -> f32 {
        self.status().voltage
    }

    fn is_charging(&mut self) -> bool {
        self.status().charging
    }

    fn is_plugged(&mut self) -> bool {
        self.status().plugged
    }

    /// Latest reading, at most `max_age` old unless the bus stayed busy
    fn status(&mut self) -> BatteryStatus;
}

/// Low-power control
pub trait PowerControl: Send {
    /// Enter deep sleep; on hardware this does not return
    fn deep_sleep(&mut self);
}

/// `PowerGauge` over the gauge chips with a reading cache
pub struct CachedGauge {
    chips: Box<dyn FuelGauge>,
    bus: I2cBus,
    max_age: Duration,
    cached: Option<(Instant, BatteryStatus)>,
}

impl CachedGauge {
    pub fn new(chips: Box<dyn FuelGauge>, bus: I2cBus) -> Self {
        Self {
            chips,
            bus,
            max_age: Duration::from_secs(1),
            cached: None,
        }
    }

    /// Reading as of `now`
    pub fn status_at(&mut self, now: Instant) -> BatteryStatus {
        if let Some((at, status)) = &self.cached {
            if now.saturating_duration_since(*at) < self.max_age {
                return status.clone();
            }
        }
        let chips = &mut self.chips;
        match self
            .bus
            .try_transaction(BUS_WAIT, || BatteryStatus::read(chips.as_mut()))
        {
            Ok(status) => {
                self.cached = Some((now, status.clone()));
                status
            },
            Err(e) => {
                warn!(error = %e, "gauge skipped, bus busy");
                self.cached
                    .as_ref()
                    .map(|(_, status)| status.clone())
                    .unwrap_or_default()
            },
        }
    }
}

impl PowerGauge for CachedGauge {
    fn status(&mut self) -> BatteryStatus {
        self.status_at(Instant::now())
    }
}

impl std::fmt::Debug for CachedGauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedGauge")
            .field("cached", &self.cached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeChips {
        reads: Arc<AtomicUsize>,
        soc: u16,
    }

    impl FuelGauge for FakeChips {
        fn read_gauge(&mut self, reg: GaugeRegister) -> io::Result<u16> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(match reg {
                GaugeRegister::Voltage => 3950,
                GaugeRegister::StateOfCharge => self.soc,
                GaugeRegister::Temperature => 2982,
                GaugeRegister::AverageCurrent => (-120i16) as u16,
                GaugeRegister::StateOfHealth => 0x1F5F,
                GaugeRegister::CycleCount => 12,
                _ => 1400,
            })
        }

        fn read_charger(&mut self, reg: ChargerRegister) -> io::Result<u8> {
            Ok(match reg {
                // VBUS_STAT 001 (SDP), CHRG_STAT 10 (fast charge)
                ChargerRegister::Status => 0b0011_0000,
                ChargerRegister::Vbus => 0x80,
            })
        }
    }

    fn gauge(soc: u16) -> (CachedGauge, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let chips = FakeChips {
            reads: Arc::clone(&reads),
            soc,
        };
        (CachedGauge::new(Box::new(chips), I2cBus::new()), reads)
    }

    #[test]
    fn test_decodes_registers() {
        let (mut g, _) = gauge(87);
        let status = g.status();
        assert_eq!(status.percentage, 87);
        assert!((status.voltage - 3.95).abs() < 1e-6);
        assert_eq!(status.current_ma, -120);
        assert!((status.temperature_c - 25.05).abs() < 0.01);
        assert_eq!(status.health_percent, 0x5F);
        assert!(status.charging && status.plugged && status.vbus_good);
        assert_eq!(status.source, PowerSource::UsbSdp);
        assert!(status.describe().contains("Source: USB SDP"));
    }

    #[test]
    fn test_percentage_clamped() {
        let (mut g, _) = gauge(0xFFFF);
        assert_eq!(g.percentage(), 100);
    }

    #[test]
    fn test_cache_within_max_age() {
        let (mut g, reads) = gauge(50);
        let now = Instant::now();
        g.status_at(now);
        let after_first = reads.load(Ordering::SeqCst);
        g.status_at(now + Duration::from_millis(500));
        assert_eq!(reads.load(Ordering::SeqCst), after_first);
        g.status_at(now + Duration::from_millis(1500));
        assert_eq!(reads.load(Ordering::SeqCst), after_first * 2);
    }

    #[test]
    fn test_busy_bus_serves_cached_value() {
        let (mut g, _) = gauge(42);
        let now = Instant::now();
        g.status_at(now);
        let bus = g.bus.clone();
        bus.transaction(|| {
            let status = g.status_at(now + Duration::from_secs(5));
            assert_eq!(status.percentage, 42);
        });
    }
}
