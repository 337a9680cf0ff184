//! Linux power-supply-class backends.
//!
//! Each device is a directory of attribute files (one value per file,
//! newline terminated), e.g. `/sys/class/power_supply/sc27xx-fgu`. The
//! structs here only move values between those files and the trait
//! types; every policy decision lives in `charger_core`.

use std::fs;
use std::path::{Path, PathBuf};

use charger_traits::{
    BatteryHealth, ChargeProfile, Charger, ChargerType, ControlError, FastCharger, FuelGauge,
    SensorError,
};

use crate::error::HwError;

fn read_attr(dir: &Path, attr: &str) -> Result<String, HwError> {
    let path = dir.join(attr);
    match fs::read_to_string(&path) {
        Ok(s) => Ok(s.trim().to_string()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(HwError::Missing(attr.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

fn read_int(dir: &Path, attr: &str) -> Result<i64, HwError> {
    let raw = read_attr(dir, attr)?;
    raw.parse::<i64>().map_err(|_| HwError::Parse {
        attr: attr.to_string(),
        value: raw,
    })
}

fn write_attr(dir: &Path, attr: &str, value: &str) -> Result<(), HwError> {
    let path = dir.join(attr);
    fs::write(&path, value).map_err(HwError::from)
}

fn sensor_i32(dir: &Path, attr: &str) -> Result<i32, SensorError> {
    match read_int(dir, attr) {
        Ok(v) => Ok(v as i32),
        Err(err) => {
            tracing::debug!(%err, attr, "sysfs read failed");
            Err(err.into())
        }
    }
}

fn control_write(dir: &Path, attr: &str, value: &str) -> Result<(), ControlError> {
    write_attr(dir, attr, value).map_err(|err| {
        tracing::warn!(%err, attr, value, "sysfs write failed");
        ControlError::Rejected(format!("{attr}: {err}"))
    })
}

/// Fuel gauge behind a power-supply-class directory.
#[derive(Debug, Clone)]
pub struct SysfsFuelGauge {
    dir: PathBuf,
}

impl SysfsFuelGauge {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FuelGauge for SysfsFuelGauge {
    fn voltage_avg(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "voltage_avg")
    }
    fn voltage_now(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "voltage_now")
    }
    fn current_avg(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "current_avg")
    }
    fn current_now(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "current_now")
    }
    fn ocv(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "voltage_ocv")
    }
    fn boot_voltage(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "voltage_boot")
    }
    fn temperature(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "temp")
    }
    fn capacity(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "capacity")
    }
    fn energy_now(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "energy_now")
    }
    fn total_capacity(&mut self) -> Result<u32, SensorError> {
        sensor_i32(&self.dir, "energy_full_design").map(|v| v.max(0) as u32)
    }
    fn charge_full(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "charge_full")
    }
    fn charge_voltage(&mut self) -> Result<i32, SensorError> {
        sensor_i32(&self.dir, "constant_charge_voltage")
    }
    fn present(&mut self) -> Result<bool, SensorError> {
        sensor_i32(&self.dir, "present").map(|v| v != 0)
    }

    fn set_capacity(&mut self, permille: i32) -> Result<(), SensorError> {
        write_attr(&self.dir, "capacity", &permille.to_string()).map_err(|err| {
            tracing::warn!(%err, "failed to write gauge capacity");
            err.into()
        })
    }
    fn set_total_capacity(&mut self, mah: u32) -> Result<(), SensorError> {
        let uah = u64::from(mah) * 1000;
        write_attr(&self.dir, "energy_full_design", &uah.to_string()).map_err(|err| {
            tracing::warn!(%err, "failed to write design capacity");
            err.into()
        })
    }
    fn adjust_capacity(&mut self, permille: i32) -> Result<(), SensorError> {
        write_attr(&self.dir, "calibrate", &permille.to_string()).map_err(|err| {
            tracing::warn!(%err, "failed to calibrate gauge");
            err.into()
        })
    }
}

/// One charger IC behind a power-supply-class directory.
#[derive(Debug, Clone)]
pub struct SysfsCharger {
    dir: PathBuf,
}

impl SysfsCharger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Charger for SysfsCharger {
    fn online(&mut self) -> Result<bool, SensorError> {
        sensor_i32(&self.dir, "online").map(|v| v != 0)
    }

    fn health(&mut self) -> Result<BatteryHealth, SensorError> {
        let raw = read_attr(&self.dir, "health").map_err(SensorError::from)?;
        Ok(match raw.as_str() {
            "Good" => BatteryHealth::Good,
            "Overheat" => BatteryHealth::Overheat,
            "Cold" => BatteryHealth::Cold,
            "Over voltage" => BatteryHealth::OverVoltage,
            _ => BatteryHealth::Unknown,
        })
    }

    fn charger_type(&mut self) -> Result<ChargerType, SensorError> {
        let raw = read_attr(&self.dir, "usb_type").map_err(SensorError::from)?;
        Ok(match raw.as_str() {
            "DCP" => ChargerType::Dcp,
            "SDP" => ChargerType::Sdp,
            "CDP" => ChargerType::Cdp,
            _ => ChargerType::Unknown,
        })
    }

    fn set_enabled(&mut self, enable: bool) -> Result<(), ControlError> {
        control_write(&self.dir, "charge_enabled", if enable { "1" } else { "0" })
    }

    fn apply_profile(&mut self, profile: ChargeProfile) -> Result<(), ControlError> {
        let value = match profile {
            ChargeProfile::Normal => "normal",
            ChargeProfile::FastCharge => "fast",
        };
        control_write(&self.dir, "charge_behaviour", value)
    }

    fn set_current_limit(&mut self, ua: i32) -> Result<(), ControlError> {
        control_write(&self.dir, "constant_charge_current", &ua.to_string())
    }

    fn set_input_current_limit(&mut self, ua: i32) -> Result<(), ControlError> {
        control_write(&self.dir, "input_current_limit", &ua.to_string())
    }

    fn set_termination_voltage(&mut self, uv: i32) -> Result<(), ControlError> {
        control_write(&self.dir, "constant_charge_voltage_max", &uv.to_string())
    }

    fn feed_watchdog(&mut self, interval_s: u32) -> Result<(), ControlError> {
        control_write(&self.dir, "feed_watchdog", &interval_s.to_string())
    }
}

/// Fast-charge negotiation path of the adapter-facing device.
#[derive(Debug, Clone)]
pub struct SysfsFastCharger {
    dir: PathBuf,
}

impl SysfsFastCharger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FastCharger for SysfsFastCharger {
    fn is_fast_capable(&mut self) -> Result<bool, SensorError> {
        let raw = read_attr(&self.dir, "charge_type").map_err(SensorError::from)?;
        Ok(matches!(raw.as_str(), "Fast" | "PD"))
    }

    fn set_output_voltage(&mut self, uv: u32) -> Result<(), ControlError> {
        control_write(&self.dir, "voltage_max", &uv.to_string())
    }
}
