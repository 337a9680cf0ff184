//! Test doubles for the trait seams.
//!
//! Each mock is a cheap clone around shared state, so a test keeps a
//! handle and mutates telemetry or injects failures between poll ticks
//! while the supervisor owns the boxed instance.

use std::sync::{Arc, Mutex, MutexGuard};

use charger_traits::{
    BatteryHealth, CapacityStore, ChargeProfile, Charger, ChargerType, ControlError, EventKind,
    EventSink, FastCharger, FuelGauge, SensorError, StoreError,
};

fn lock<T>(m: &Arc<Mutex<T>>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---- fuel gauge -------------------------------------------------------

#[derive(Debug)]
pub struct GaugeState {
    pub voltage_avg_uv: i32,
    pub voltage_now_uv: i32,
    pub current_avg_ua: i32,
    pub current_now_ua: i32,
    pub ocv_uv: i32,
    pub boot_voltage_uv: i32,
    pub temperature: i32,
    pub capacity: i32,
    pub energy_now_uah: i32,
    pub total_capacity_uah: u32,
    pub charge_full_uah: i32,
    pub charge_voltage_uv: i32,
    pub present: bool,
    /// Every read fails with `SensorError::Unavailable`.
    pub fail_all: bool,

    pub capacity_writes: Vec<i32>,
    pub total_capacity_writes: Vec<u32>,
    pub adjust_writes: Vec<i32>,
}

impl Default for GaugeState {
    fn default() -> Self {
        // A healthy mid-charge battery at 25.0 °C.
        Self {
            voltage_avg_uv: 3_800_000,
            voltage_now_uv: 3_810_000,
            current_avg_ua: 200_000,
            current_now_ua: 210_000,
            ocv_uv: 3_780_000,
            boot_voltage_uv: 3_780_000,
            temperature: 250,
            capacity: 500,
            energy_now_uah: 2_000_000,
            total_capacity_uah: 4_000_000,
            charge_full_uah: 0,
            charge_voltage_uv: 5_000_000,
            present: true,
            fail_all: false,
            capacity_writes: Vec::new(),
            total_capacity_writes: Vec::new(),
            adjust_writes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockFuelGauge {
    state: Arc<Mutex<GaugeState>>,
}

impl MockFuelGauge {
    pub fn state(&self) -> MutexGuard<'_, GaugeState> {
        lock(&self.state)
    }

    fn read(&self, f: impl FnOnce(&GaugeState) -> i32) -> Result<i32, SensorError> {
        let s = lock(&self.state);
        if s.fail_all {
            return Err(SensorError::Unavailable);
        }
        Ok(f(&s))
    }
}

impl FuelGauge for MockFuelGauge {
    fn voltage_avg(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.voltage_avg_uv)
    }
    fn voltage_now(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.voltage_now_uv)
    }
    fn current_avg(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.current_avg_ua)
    }
    fn current_now(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.current_now_ua)
    }
    fn ocv(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.ocv_uv)
    }
    fn boot_voltage(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.boot_voltage_uv)
    }
    fn temperature(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.temperature)
    }
    fn capacity(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.capacity)
    }
    fn energy_now(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.energy_now_uah)
    }
    fn total_capacity(&mut self) -> Result<u32, SensorError> {
        let s = lock(&self.state);
        if s.fail_all {
            return Err(SensorError::Unavailable);
        }
        Ok(s.total_capacity_uah)
    }
    fn charge_full(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.charge_full_uah)
    }
    fn charge_voltage(&mut self) -> Result<i32, SensorError> {
        self.read(|s| s.charge_voltage_uv)
    }
    fn present(&mut self) -> Result<bool, SensorError> {
        let s = lock(&self.state);
        if s.fail_all {
            return Err(SensorError::Unavailable);
        }
        Ok(s.present)
    }

    fn set_capacity(&mut self, permille: i32) -> Result<(), SensorError> {
        lock(&self.state).capacity_writes.push(permille);
        Ok(())
    }
    fn set_total_capacity(&mut self, mah: u32) -> Result<(), SensorError> {
        let mut s = lock(&self.state);
        s.total_capacity_writes.push(mah);
        s.total_capacity_uah = mah.saturating_mul(1000);
        Ok(())
    }
    fn adjust_capacity(&mut self, permille: i32) -> Result<(), SensorError> {
        lock(&self.state).adjust_writes.push(permille);
        Ok(())
    }
}

// ---- charger ----------------------------------------------------------

#[derive(Debug)]
pub struct ChargerState {
    pub online: bool,
    pub health: BatteryHealth,
    pub charger_type: ChargerType,
    pub enabled: bool,

    pub enables: Vec<bool>,
    pub profiles: Vec<ChargeProfile>,
    pub current_limits: Vec<i32>,
    pub input_limits: Vec<i32>,
    pub term_volts: Vec<i32>,
    pub watchdog_feeds: u32,

    pub fail_enable: bool,
    pub fail_profile: bool,
    pub fail_current: bool,
    pub fail_term: bool,
    pub fail_watchdog: bool,
}

impl Default for ChargerState {
    fn default() -> Self {
        Self {
            online: false,
            health: BatteryHealth::Good,
            charger_type: ChargerType::Unknown,
            enabled: false,
            enables: Vec::new(),
            profiles: Vec::new(),
            current_limits: Vec::new(),
            input_limits: Vec::new(),
            term_volts: Vec::new(),
            watchdog_feeds: 0,
            fail_enable: false,
            fail_profile: false,
            fail_current: false,
            fail_term: false,
            fail_watchdog: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockCharger {
    state: Arc<Mutex<ChargerState>>,
}

impl MockCharger {
    pub fn online() -> Self {
        let c = Self::default();
        c.state().online = true;
        c
    }

    pub fn state(&self) -> MutexGuard<'_, ChargerState> {
        lock(&self.state)
    }
}

impl Charger for MockCharger {
    fn online(&mut self) -> Result<bool, SensorError> {
        Ok(lock(&self.state).online)
    }
    fn health(&mut self) -> Result<BatteryHealth, SensorError> {
        Ok(lock(&self.state).health)
    }
    fn charger_type(&mut self) -> Result<ChargerType, SensorError> {
        Ok(lock(&self.state).charger_type)
    }

    fn set_enabled(&mut self, enable: bool) -> Result<(), ControlError> {
        let mut s = lock(&self.state);
        if s.fail_enable {
            return Err(ControlError::Rejected("enable refused".into()));
        }
        s.enabled = enable;
        s.enables.push(enable);
        Ok(())
    }
    fn apply_profile(&mut self, profile: ChargeProfile) -> Result<(), ControlError> {
        let mut s = lock(&self.state);
        if s.fail_profile {
            return Err(ControlError::Rejected("profile refused".into()));
        }
        s.profiles.push(profile);
        Ok(())
    }
    fn set_current_limit(&mut self, ua: i32) -> Result<(), ControlError> {
        let mut s = lock(&self.state);
        if s.fail_current {
            return Err(ControlError::Rejected("current refused".into()));
        }
        s.current_limits.push(ua);
        Ok(())
    }
    fn set_input_current_limit(&mut self, ua: i32) -> Result<(), ControlError> {
        lock(&self.state).input_limits.push(ua);
        Ok(())
    }
    fn set_termination_voltage(&mut self, uv: i32) -> Result<(), ControlError> {
        let mut s = lock(&self.state);
        if s.fail_term {
            return Err(ControlError::Rejected("termination voltage refused".into()));
        }
        s.term_volts.push(uv);
        Ok(())
    }
    fn feed_watchdog(&mut self, _interval_s: u32) -> Result<(), ControlError> {
        let mut s = lock(&self.state);
        if s.fail_watchdog {
            return Err(ControlError::Rejected("watchdog refused".into()));
        }
        s.watchdog_feeds += 1;
        Ok(())
    }
}

// ---- fast charger -----------------------------------------------------

#[derive(Debug, Default)]
pub struct FastChargerState {
    pub capable: bool,
    pub voltages: Vec<u32>,
    pub fail_voltage: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockFastCharger {
    state: Arc<Mutex<FastChargerState>>,
}

impl MockFastCharger {
    pub fn capable() -> Self {
        let f = Self::default();
        f.state().capable = true;
        f
    }

    pub fn state(&self) -> MutexGuard<'_, FastChargerState> {
        lock(&self.state)
    }
}

impl FastCharger for MockFastCharger {
    fn is_fast_capable(&mut self) -> Result<bool, SensorError> {
        Ok(lock(&self.state).capable)
    }
    fn set_output_voltage(&mut self, uv: u32) -> Result<(), ControlError> {
        let mut s = lock(&self.state);
        if s.fail_voltage {
            return Err(ControlError::Rejected("voltage refused".into()));
        }
        s.voltages.push(uv);
        Ok(())
    }
}

// ---- event sink -------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MockEventSink {
    events: Arc<Mutex<Vec<(EventKind, String)>>>,
}

impl MockEventSink {
    pub fn events(&self) -> Vec<(EventKind, String)> {
        lock(&self.events).clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        lock(&self.events).iter().map(|(k, _)| *k).collect()
    }
}

impl EventSink for MockEventSink {
    fn deliver(&mut self, kind: EventKind, message: &str) {
        lock(&self.events).push((kind, message.to_string()));
    }
}

// ---- capacity store ---------------------------------------------------

#[derive(Debug, Default)]
pub struct MemStoreState {
    pub record: Option<[u32; 2]>,
    /// Remaining loads that fail before reads start succeeding.
    pub fail_loads: u32,
    /// Remaining saves that fail before writes start succeeding.
    pub fail_saves: u32,
    pub loads: u32,
    pub saves: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<MemStoreState>>,
}

impl MemStore {
    pub fn with_record(words: [u32; 2]) -> Self {
        let store = Self::default();
        store.state().record = Some(words);
        store
    }

    pub fn state(&self) -> MutexGuard<'_, MemStoreState> {
        lock(&self.state)
    }
}

impl CapacityStore for MemStore {
    fn load(&mut self) -> Result<Option<[u32; 2]>, StoreError> {
        let mut s = lock(&self.state);
        s.loads += 1;
        if s.fail_loads > 0 {
            s.fail_loads -= 1;
            return Err(StoreError::Io(std::io::Error::other("store offline")));
        }
        Ok(s.record)
    }
    fn save(&mut self, words: [u32; 2]) -> Result<(), StoreError> {
        let mut s = lock(&self.state);
        if s.fail_saves > 0 {
            s.fail_saves -= 1;
            return Err(StoreError::Io(std::io::Error::other("store offline")));
        }
        s.record = Some(words);
        s.saves += 1;
        Ok(())
    }
}
