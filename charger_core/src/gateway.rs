//! Uniform read access to fuel-gauge telemetry.
//!
//! Each poll cycle takes one [`BatteryReading`] snapshot. A property that
//! fails to read keeps its previous value: a flaky gauge must never abort
//! the poll cycle, only degrade it.

use charger_traits::{FuelGauge, SensorError};

/// Immutable telemetry snapshot for one poll cycle.
///
/// Units: µV, µA (positive while charging), tenths of °C, ‰, µAh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatteryReading {
    pub voltage_avg_uv: i32,
    pub voltage_now_uv: i32,
    pub current_avg_ua: i32,
    pub current_now_ua: i32,
    pub ocv_uv: i32,
    pub boot_voltage_uv: i32,
    pub temperature: i32,
    pub raw_capacity: i32,
    pub energy_now_uah: i32,
    pub total_capacity_uah: u32,
    pub charge_voltage_uv: i32,
}

pub struct SensorGateway {
    gauge: Box<dyn FuelGauge + Send>,
    last: BatteryReading,
}

fn keep<T>(field: &mut T, res: Result<T, SensorError>, what: &'static str) {
    match res {
        Ok(v) => *field = v,
        Err(err) => tracing::warn!(%err, what, "telemetry read failed, keeping previous value"),
    }
}

impl SensorGateway {
    pub fn new(gauge: Box<dyn FuelGauge + Send>) -> Self {
        Self {
            gauge,
            last: BatteryReading::default(),
        }
    }

    /// Take a fresh snapshot, falling back per field to the previous one.
    pub fn snapshot(&mut self) -> BatteryReading {
        let mut r = self.last;
        keep(&mut r.voltage_avg_uv, self.gauge.voltage_avg(), "voltage_avg");
        keep(&mut r.voltage_now_uv, self.gauge.voltage_now(), "voltage_now");
        keep(&mut r.current_avg_ua, self.gauge.current_avg(), "current_avg");
        keep(&mut r.current_now_ua, self.gauge.current_now(), "current_now");
        keep(&mut r.ocv_uv, self.gauge.ocv(), "ocv");
        keep(&mut r.boot_voltage_uv, self.gauge.boot_voltage(), "boot_voltage");
        keep(&mut r.temperature, self.gauge.temperature(), "temperature");
        keep(&mut r.raw_capacity, self.gauge.capacity(), "capacity");
        keep(&mut r.energy_now_uah, self.gauge.energy_now(), "energy_now");
        keep(&mut r.total_capacity_uah, self.gauge.total_capacity(), "total_capacity");
        keep(&mut r.charge_voltage_uv, self.gauge.charge_voltage(), "charge_voltage");
        self.last = r;
        r
    }

    /// Last snapshot without touching the device.
    pub fn last(&self) -> BatteryReading {
        self.last
    }

    /// Strict access for callers that must abort their own cycle on a
    /// failed read (the capacity tracker) or write back to the gauge.
    pub fn gauge_mut(&mut self) -> &mut (dyn FuelGauge + Send) {
        &mut *self.gauge
    }
}

impl core::fmt::Debug for SensorGateway {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SensorGateway").field("last", &self.last).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockFuelGauge;

    #[test]
    fn snapshot_reads_every_field() {
        let gauge = MockFuelGauge::default();
        {
            let mut s = gauge.state();
            s.voltage_avg_uv = 3_800_000;
            s.current_avg_ua = 250_000;
            s.temperature = 230;
            s.capacity = 640;
        }
        let mut gw = SensorGateway::new(Box::new(gauge));
        let r = gw.snapshot();
        assert_eq!(r.voltage_avg_uv, 3_800_000);
        assert_eq!(r.current_avg_ua, 250_000);
        assert_eq!(r.temperature, 230);
        assert_eq!(r.raw_capacity, 640);
    }

    #[test]
    fn failed_read_keeps_previous_value() {
        let gauge = MockFuelGauge::default();
        gauge.state().voltage_avg_uv = 4_000_000;
        let handle = gauge.clone();
        let mut gw = SensorGateway::new(Box::new(gauge));
        let first = gw.snapshot();
        assert_eq!(first.voltage_avg_uv, 4_000_000);

        handle.state().fail_all = true;
        let second = gw.snapshot();
        assert_eq!(second, first, "snapshot must fall back to previous values");
    }
}
