//! Runtime charger descriptor.
//!
//! `ChargerDesc` is the validated, fixed-layout form of the TOML schema in
//! `charger_config`: jeita tables become fixed four-row arrays, the OCV
//! table becomes lookup entries, and unit suffixes are explicit. Built once
//! at startup and read-only afterwards.

use crate::error::{BuildError, Report, Result};
use crate::jeita::JeitaRow;
use crate::tracker::OcvCapEntry;
use charger_config as cfg;

/// How battery presence is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentMode {
    /// Assume the battery is always fitted.
    #[default]
    Assume,
    /// No battery is ever fitted.
    None,
    /// Ask the fuel gauge.
    FuelGauge,
    /// Ask the charger ICs.
    ChargerStat,
}

/// When the periodic monitor must keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollMode {
    Disable,
    #[default]
    Always,
    ExternalPowerOnly,
    ChargingOnly,
}

/// Which per-charger-type JEITA table is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JeitaKind {
    Dcp,
    Sdp,
    Cdp,
    #[default]
    Unknown,
    FastCharge,
}

/// The five per-charger-type tables. `None` disables thermal throttling
/// for that charger type.
#[derive(Debug, Clone, Default)]
pub struct JeitaTables {
    pub dcp: Option<[JeitaRow; 4]>,
    pub sdp: Option<[JeitaRow; 4]>,
    pub cdp: Option<[JeitaRow; 4]>,
    pub unknown: Option<[JeitaRow; 4]>,
    pub fchg: Option<[JeitaRow; 4]>,
}

impl JeitaTables {
    pub fn get(&self, kind: JeitaKind) -> Option<&[JeitaRow; 4]> {
        match kind {
            JeitaKind::Dcp => self.dcp.as_ref(),
            JeitaKind::Sdp => self.sdp.as_ref(),
            JeitaKind::Cdp => self.cdp.as_ref(),
            JeitaKind::Unknown => self.unknown.as_ref(),
            JeitaKind::FastCharge => self.fchg.as_ref(),
        }
    }
}

/// Static configuration of one supervised battery/charger set.
#[derive(Debug, Clone)]
pub struct ChargerDesc {
    pub battery_present: PresentMode,
    pub polling_mode: PollMode,
    pub polling_interval_ms: u64,

    pub fullbatt_uv: i32,
    pub fullbatt_ua: i32,
    pub first_fullbatt_ua: i32,
    pub fullbatt_soc: i32,
    pub fullbatt_full_capacity: i32,
    pub fullbatt_vchkdrop_uv: i32,
    pub shutdown_voltage_uv: i32,
    pub cap_one_time_s: u64,
    pub trickle_time_out_s: u64,

    pub measure_battery_temp: bool,
    pub temp_min: i32,
    pub temp_max: i32,
    pub temp_diff: i32,

    pub charging_max_ms: u64,
    pub discharging_max_ms: u64,

    pub normal_charge_voltage_max_uv: i32,
    pub normal_charge_voltage_drop_uv: i32,
    pub fast_charge_voltage_max_uv: i32,
    pub fast_charge_voltage_drop_uv: i32,
    pub double_ic_total_limit_ua: i32,
    pub wdt_interval_s: u32,

    pub fast_enable_uv: i32,
    pub fast_disable_uv: i32,
    pub fast_enable_count: u32,
    pub fast_disable_count: u32,

    pub jeita: JeitaTables,
    pub cap_tracking: bool,
    pub ocv_table: Vec<OcvCapEntry>,
}

impl Default for ChargerDesc {
    fn default() -> Self {
        Self {
            battery_present: PresentMode::Assume,
            polling_mode: PollMode::Always,
            polling_interval_ms: 30_000,
            fullbatt_uv: 0,
            fullbatt_ua: 0,
            first_fullbatt_ua: 0,
            fullbatt_soc: 0,
            fullbatt_full_capacity: 0,
            fullbatt_vchkdrop_uv: 0,
            shutdown_voltage_uv: 3_100_000,
            cap_one_time_s: 30,
            trickle_time_out_s: 0,
            measure_battery_temp: true,
            temp_min: 0,
            temp_max: 500,
            temp_diff: 50,
            charging_max_ms: 0,
            discharging_max_ms: 0,
            normal_charge_voltage_max_uv: 0,
            normal_charge_voltage_drop_uv: 0,
            fast_charge_voltage_max_uv: 0,
            fast_charge_voltage_drop_uv: 0,
            double_ic_total_limit_ua: 0,
            wdt_interval_s: 0,
            fast_enable_uv: 3_400_000,
            fast_disable_uv: 3_400_000,
            fast_enable_count: 2,
            fast_disable_count: 2,
            jeita: JeitaTables::default(),
            cap_tracking: false,
            ocv_table: Vec::new(),
        }
    }
}

fn convert_table(rows: &[cfg::JeitaRowCfg]) -> Result<Option<[JeitaRow; 4]>> {
    if rows.is_empty() {
        return Ok(None);
    }
    let converted: Vec<JeitaRow> = rows
        .iter()
        .map(|r| JeitaRow {
            temp: r.temp,
            recovery_temp: r.recovery_temp,
            current_ua: r.current_ua,
            term_volt_uv: r.term_volt_uv,
        })
        .collect();
    let table: [JeitaRow; 4] = converted
        .try_into()
        .map_err(|_| Report::new(BuildError::InvalidConfig("jeita table must have 4 rows")))?;
    Ok(Some(table))
}

impl ChargerDesc {
    /// Build the runtime descriptor from a validated TOML config.
    pub fn from_config(config: &cfg::Config) -> Result<Self> {
        config.validate()?;

        let jeita = JeitaTables {
            dcp: convert_table(&config.jeita.dcp)?,
            sdp: convert_table(&config.jeita.sdp)?,
            cdp: convert_table(&config.jeita.cdp)?,
            unknown: convert_table(&config.jeita.unknown)?,
            fchg: convert_table(&config.jeita.fchg)?,
        };

        let ocv_table = config
            .tracker
            .ocv_table
            .iter()
            .map(|r| OcvCapEntry {
                ocv_uv: r.ocv_uv,
                capacity: r.capacity,
            })
            .collect();

        Ok(Self {
            battery_present: match config.battery.present_mode {
                cfg::BatteryPresentMode::Assume => PresentMode::Assume,
                cfg::BatteryPresentMode::None => PresentMode::None,
                cfg::BatteryPresentMode::FuelGauge => PresentMode::FuelGauge,
                cfg::BatteryPresentMode::ChargerStat => PresentMode::ChargerStat,
            },
            polling_mode: match config.polling.mode {
                cfg::PollMode::Disable => PollMode::Disable,
                cfg::PollMode::Always => PollMode::Always,
                cfg::PollMode::ExternalPowerOnly => PollMode::ExternalPowerOnly,
                cfg::PollMode::ChargingOnly => PollMode::ChargingOnly,
            },
            polling_interval_ms: config.polling.interval_ms,
            fullbatt_uv: config.battery.fullbatt_uv,
            fullbatt_ua: config.battery.fullbatt_ua,
            first_fullbatt_ua: config.battery.first_fullbatt_ua,
            fullbatt_soc: config.battery.fullbatt_soc,
            fullbatt_full_capacity: config.battery.fullbatt_full_capacity,
            fullbatt_vchkdrop_uv: config.battery.fullbatt_vchkdrop_uv,
            shutdown_voltage_uv: config.battery.shutdown_voltage,
            cap_one_time_s: config.battery.cap_one_time,
            trickle_time_out_s: config.battery.trickle_time_out,
            measure_battery_temp: config.thermal.measure,
            temp_min: config.thermal.temp_min,
            temp_max: config.thermal.temp_max,
            temp_diff: config.thermal.temp_diff,
            charging_max_ms: config.duration.charging_max_ms,
            discharging_max_ms: config.duration.discharging_max_ms,
            normal_charge_voltage_max_uv: config.charge.voltage_max,
            normal_charge_voltage_drop_uv: config.charge.voltage_drop,
            fast_charge_voltage_max_uv: config.charge.fast_voltage_max,
            fast_charge_voltage_drop_uv: config.charge.fast_voltage_drop,
            double_ic_total_limit_ua: config.charge.double_ic_total_limit_ua,
            wdt_interval_s: config.charge.wdt_interval_s,
            fast_enable_uv: config.fastcharge.enable_uv,
            fast_disable_uv: config.fastcharge.disable_uv,
            fast_enable_count: config.fastcharge.enable_count,
            fast_disable_count: config.fastcharge.disable_count,
            jeita,
            cap_tracking: config.tracker.enabled,
            ocv_table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_converts_jeita_and_ocv_tables() {
        let toml = r#"
[battery]
fullbatt_uv = 4350000
fullbatt_ua = 120000

[jeita]
dcp = [
    [-100, -50, 0, 4100000],
    [50, 100, 500000, 4350000],
    [450, 420, 1500000, 4350000],
    [550, 520, 700000, 4100000],
]

[tracker]
enabled = true
ocv_table = [
    { ocv_uv = 4185000, capacity = 100 },
    { ocv_uv = 3650000, capacity = 5 },
]
"#;
        let config = charger_config::load_toml(toml).expect("parse");
        let desc = ChargerDesc::from_config(&config).expect("convert");
        let table = desc.jeita.get(JeitaKind::Dcp).expect("dcp table");
        assert_eq!(table[2].current_ua, 1_500_000);
        assert!(desc.jeita.get(JeitaKind::Sdp).is_none());
        assert_eq!(desc.ocv_table.len(), 2);
        assert!(desc.cap_tracking);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let toml = "[polling]\nmode = \"always\"\ninterval_ms = 0\n";
        let config = charger_config::load_toml(toml).expect("parse");
        assert!(ChargerDesc::from_config(&config).is_err());
    }
}
