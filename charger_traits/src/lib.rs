//! Trait seams between the charging supervisor core and the platform.
//!
//! The core never touches a device directly: it reads telemetry through
//! [`FuelGauge`], commands charger ICs through [`Charger`]/[`FastCharger`],
//! publishes notifications through [`EventSink`] and persists the capacity
//! calibration record through [`CapacityStore`]. Hardware backends live in
//! `charger_hardware`; tests inject in-memory fakes.
//!
//! Unit conventions: voltages in µV, currents in µA (positive while the
//! battery is being charged), temperature in tenths of a degree Celsius,
//! state of charge in ‰ (0..=1000), accumulated charge in µAh.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

use thiserror::Error;

/// Failure reading a telemetry property.
///
/// Both variants are non-fatal to the caller's cycle: keep the previous
/// value, log and continue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The backing device cannot be reached.
    #[error("sensor device unavailable")]
    Unavailable,
    /// The property is not supported by the backing device.
    #[error("sensor property not supported")]
    Invalid,
}

/// A charger IC rejected or failed a control command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("charger device unavailable")]
    Unavailable,
    #[error("charger rejected command: {0}")]
    Rejected(String),
}

/// Failure of the persisted-state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("record truncated: expected {expected} bytes, got {got}")]
    ShortRecord { expected: usize, got: usize },
}

/// Charger cable type as detected by the charger IC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChargerType {
    /// Dedicated charging port (wall adapter).
    Dcp,
    /// Standard downstream port (USB host).
    Sdp,
    /// Charging downstream port.
    Cdp,
    #[default]
    Unknown,
}

/// Charger-reported health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryHealth {
    Good,
    Overheat,
    Cold,
    OverVoltage,
    #[default]
    Unknown,
}

/// Charge-current profile applied to a charger IC.
///
/// Replaces the raw enable/disable command words of register-level drivers
/// with an exhaustive variant so an unknown command cannot be silently
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeProfile {
    /// Adapter-rated current for single-IC 5 V charging.
    Normal,
    /// Elevated current split for 9 V dual-IC fast charging.
    FastCharge,
}

/// Discrete notifications raised by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BatteryFull,
    BatteryIn,
    BatteryOut,
    Overheat,
    Cold,
    ExtPowerInOut,
    ChargeStartStop,
    Recharging,
    Discharging,
    Other,
}

impl EventKind {
    /// Human-readable default message for the event.
    pub fn default_message(self) -> &'static str {
        match self {
            EventKind::BatteryFull => "Battery Full",
            EventKind::BatteryIn => "Battery Inserted",
            EventKind::BatteryOut => "Battery Pulled Out",
            EventKind::Overheat => "Battery Overheat",
            EventKind::Cold => "Battery Cold",
            EventKind::ExtPowerInOut => "External Power Attach/Detach",
            EventKind::ChargeStartStop => "Charging Start/Stop",
            EventKind::Recharging => "Recharging",
            EventKind::Discharging => "Discharging",
            EventKind::Other => "Other battery events",
        }
    }
}

/// Read access to fuel-gauge telemetry, plus the few write-backs the
/// supervisor performs (reported capacity, learned design capacity).
pub trait FuelGauge {
    fn voltage_avg(&mut self) -> Result<i32, SensorError>;
    fn voltage_now(&mut self) -> Result<i32, SensorError>;
    fn current_avg(&mut self) -> Result<i32, SensorError>;
    fn current_now(&mut self) -> Result<i32, SensorError>;
    fn ocv(&mut self) -> Result<i32, SensorError>;
    fn boot_voltage(&mut self) -> Result<i32, SensorError>;
    /// Battery temperature in tenths of a degree Celsius.
    fn temperature(&mut self) -> Result<i32, SensorError>;
    /// Raw state of charge in ‰.
    fn capacity(&mut self) -> Result<i32, SensorError>;
    /// Coulomb counter reading in µAh.
    fn energy_now(&mut self) -> Result<i32, SensorError>;
    /// Design (total) capacity in µAh.
    fn total_capacity(&mut self) -> Result<u32, SensorError>;
    /// Learned full capacity in µAh, where the gauge supports it.
    fn charge_full(&mut self) -> Result<i32, SensorError>;
    /// Constant charge voltage currently seen by the gauge, in µV.
    fn charge_voltage(&mut self) -> Result<i32, SensorError>;
    fn present(&mut self) -> Result<bool, SensorError>;

    /// Persist the reported state of charge (‰) back into the gauge.
    fn set_capacity(&mut self, permille: i32) -> Result<(), SensorError>;
    /// Replace the design capacity (mAh) with a learned value.
    fn set_total_capacity(&mut self, mah: u32) -> Result<(), SensorError>;
    /// Nudge the gauge's internal SOC estimate to `permille`.
    fn adjust_capacity(&mut self, permille: i32) -> Result<(), SensorError>;
}

/// Control and status surface of one charger IC.
pub trait Charger {
    /// True when an external power source is attached to this charger.
    fn online(&mut self) -> Result<bool, SensorError>;
    fn health(&mut self) -> Result<BatteryHealth, SensorError>;
    fn charger_type(&mut self) -> Result<ChargerType, SensorError>;

    fn set_enabled(&mut self, enable: bool) -> Result<(), ControlError>;
    fn apply_profile(&mut self, profile: ChargeProfile) -> Result<(), ControlError>;
    fn set_current_limit(&mut self, ua: i32) -> Result<(), ControlError>;
    fn set_input_current_limit(&mut self, ua: i32) -> Result<(), ControlError>;
    fn set_termination_voltage(&mut self, uv: i32) -> Result<(), ControlError>;
    /// Kick the charger IC's hardware watchdog with the given interval (s).
    fn feed_watchdog(&mut self, interval_s: u32) -> Result<(), ControlError>;
}

/// Output-voltage negotiation path of a fast-charge capable adapter.
pub trait FastCharger {
    /// True when the attached adapter negotiated a fast-charge protocol.
    fn is_fast_capable(&mut self) -> Result<bool, SensorError>;
    /// Request a new adapter output voltage (µV), e.g. 5 V ↔ 9 V.
    fn set_output_voltage(&mut self, uv: u32) -> Result<(), ControlError>;
}

/// Consumer of supervisor notifications. Delivery is fire-and-forget;
/// dedup and suspend coalescing happen in the core before this is called.
pub trait EventSink {
    fn deliver(&mut self, kind: EventKind, message: &str);
}

/// Fixed-size persisted record for the capacity calibration result.
///
/// The record is two 32-bit words (value ^ KEY0, value ^ KEY1); encoding
/// and consistency checking are the tracker's job, the store only moves
/// the raw words.
pub trait CapacityStore {
    /// Read the record. `Ok(None)` when no record has ever been written.
    fn load(&mut self) -> Result<Option<[u32; 2]>, StoreError>;
    fn save(&mut self, words: [u32; 2]) -> Result<(), StoreError>;
}
