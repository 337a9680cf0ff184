#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the charging supervisor.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The OCV→capacity CSV loader enforces headers and strict monotonicity
//!   before the table is trusted for SOC lookups.
//!
//! Units follow the rest of the workspace: µV, µA, tenths of °C, ‰.
use serde::Deserialize;
use serde::de::Deserializer;

/// How battery presence is decided.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BatteryPresentMode {
    /// Assume the battery is always present.
    #[default]
    Assume,
    /// No battery is ever fitted.
    None,
    /// Ask the fuel gauge.
    FuelGauge,
    /// Ask the charger ICs.
    ChargerStat,
}

/// When the periodic monitor needs to keep running.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PollMode {
    Disable,
    #[default]
    Always,
    ExternalPowerOnly,
    ChargingOnly,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingCfg {
    pub mode: PollMode,
    /// Monitor period in milliseconds.
    pub interval_ms: u64,
}

impl Default for PollingCfg {
    fn default() -> Self {
        Self {
            mode: PollMode::Always,
            interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatteryCfg {
    pub present_mode: BatteryPresentMode,
    /// Battery voltage regarded as full (µV). 0 disables voltage detection.
    pub fullbatt_uv: i32,
    /// Taper current below which the battery is full (µA). 0 disables.
    pub fullbatt_ua: i32,
    /// Early-taper current hinting at approaching full (µA). 0 disables.
    pub first_fullbatt_ua: i32,
    /// SOC (‰) treated as full. 0 disables.
    pub fullbatt_soc: i32,
    /// Learned full capacity (µAh) treated as full. 0 disables.
    pub fullbatt_full_capacity: i32,
    /// OCV drop after full that triggers a recharge (µV). 0 disables.
    pub fullbatt_vchkdrop_uv: i32,
    /// Voltage under which the platform should power down (µV).
    pub shutdown_voltage: i32,
    /// Seconds per 0.5 % reported-capacity slew step.
    pub cap_one_time: u64,
    /// Seconds spent at >=98.6 % before the display is forced to 100 %.
    pub trickle_time_out: u64,
}

impl Default for BatteryCfg {
    fn default() -> Self {
        Self {
            present_mode: BatteryPresentMode::Assume,
            fullbatt_uv: 0,
            fullbatt_ua: 0,
            first_fullbatt_ua: 0,
            fullbatt_soc: 0,
            fullbatt_full_capacity: 0,
            fullbatt_vchkdrop_uv: 0,
            shutdown_voltage: 3_100_000,
            cap_one_time: 30,
            trickle_time_out: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ThermalCfg {
    /// Whether battery temperature is measured at all.
    pub measure: bool,
    /// Lowest charge-permitting temperature (tenths of °C).
    pub temp_min: i32,
    /// Highest charge-permitting temperature (tenths of °C).
    pub temp_max: i32,
    /// Recovery hysteresis applied to both limits while stopped.
    pub temp_diff: i32,
}

impl Default for ThermalCfg {
    fn default() -> Self {
        Self {
            measure: true,
            temp_min: 0,
            temp_max: 500,
            temp_diff: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DurationCfg {
    /// Hard cap on one continuous charge (ms). 0 disables the pair.
    pub charging_max_ms: u64,
    /// Discharge time after full, with power attached, before recharging.
    pub discharging_max_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ChargeCfg {
    /// Charge-voltage ceiling while on 5 V (µV). 0 disables the guard.
    pub voltage_max: i32,
    /// Drop under the ceiling required before recharging (µV).
    pub voltage_drop: i32,
    /// Ceiling/drop pair applied while fast charging (µV). 0 keeps normal.
    pub fast_voltage_max: i32,
    pub fast_voltage_drop: i32,
    /// Total input-current budget when two ICs charge in parallel (µA).
    pub double_ic_total_limit_ua: i32,
    /// Charger watchdog feed interval (s). 0 disables feeding.
    pub wdt_interval_s: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FastChargeCfg {
    /// Battery voltage above which fast charge may engage (µV).
    pub enable_uv: i32,
    /// Battery voltage below which fast charge disengages (µV).
    pub disable_uv: i32,
    /// Consecutive qualifying samples required on each edge.
    pub enable_count: u32,
    pub disable_count: u32,
}

impl Default for FastChargeCfg {
    fn default() -> Self {
        Self {
            enable_uv: 3_400_000,
            disable_uv: 3_400_000,
            enable_count: 2,
            disable_count: 2,
        }
    }
}

/// One JEITA zone boundary row.
///
/// Accepts either an inline table
/// `{ temp = 450, recovery_temp = 420, current_ua = 1000000, term_volt_uv = 4100000 }`
/// or a bare quadruple `[450, 420, 1000000, 4100000]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JeitaRowCfg {
    pub temp: i32,
    pub recovery_temp: i32,
    pub current_ua: i32,
    pub term_volt_uv: i32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JeitaRowToml {
    Quad((i32, i32, i32, i32)),
    Table {
        temp: i32,
        recovery_temp: i32,
        current_ua: i32,
        term_volt_uv: i32,
    },
}

fn de_jeita_rows<'de, D>(deserializer: D) -> Result<Vec<JeitaRowCfg>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<JeitaRowToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for row in items {
            out.push(match row {
                JeitaRowToml::Quad((temp, recovery_temp, current_ua, term_volt_uv)) => JeitaRowCfg {
                    temp,
                    recovery_temp,
                    current_ua,
                    term_volt_uv,
                },
                JeitaRowToml::Table {
                    temp,
                    recovery_temp,
                    current_ua,
                    term_volt_uv,
                } => JeitaRowCfg {
                    temp,
                    recovery_temp,
                    current_ua,
                    term_volt_uv,
                },
            });
        }
    }
    Ok(out)
}

/// Per-charger-type JEITA tables. An empty table disables thermal
/// throttling for that charger type.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct JeitaCfg {
    #[serde(deserialize_with = "de_jeita_rows")]
    pub dcp: Vec<JeitaRowCfg>,
    #[serde(deserialize_with = "de_jeita_rows")]
    pub sdp: Vec<JeitaRowCfg>,
    #[serde(deserialize_with = "de_jeita_rows")]
    pub cdp: Vec<JeitaRowCfg>,
    #[serde(deserialize_with = "de_jeita_rows")]
    pub unknown: Vec<JeitaRowCfg>,
    #[serde(deserialize_with = "de_jeita_rows")]
    pub fchg: Vec<JeitaRowCfg>,
}

impl JeitaCfg {
    pub fn tables(&self) -> [&Vec<JeitaRowCfg>; 5] {
        [&self.dcp, &self.sdp, &self.cdp, &self.unknown, &self.fchg]
    }
}

/// One OCV→capacity lookup point.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct OcvCapRow {
    /// Open-circuit voltage in µV.
    pub ocv_uv: i32,
    /// Capacity percent (0..=100) at that OCV.
    pub capacity: i32,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TrackerCfg {
    /// Master switch for the one-shot capacity calibration.
    pub enabled: bool,
    /// OCV→capacity table, descending by voltage. May instead be loaded
    /// from CSV via [`load_ocv_table_csv`].
    pub ocv_table: Vec<OcvCapRow>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub battery: BatteryCfg,
    pub thermal: ThermalCfg,
    pub polling: PollingCfg,
    pub duration: DurationCfg,
    pub charge: ChargeCfg,
    pub fastcharge: FastChargeCfg,
    pub jeita: JeitaCfg,
    pub tracker: TrackerCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Polling
        if self.polling.mode != PollMode::Disable && self.polling.interval_ms == 0 {
            eyre::bail!("polling.interval_ms must be > 0 unless polling is disabled");
        }

        // Battery thresholds
        if self.battery.fullbatt_uv < 0 || self.battery.fullbatt_ua < 0 {
            eyre::bail!("battery.fullbatt_uv/fullbatt_ua must be >= 0");
        }
        if self.battery.fullbatt_vchkdrop_uv < 0 {
            eyre::bail!("battery.fullbatt_vchkdrop_uv must be >= 0");
        }
        if self.battery.fullbatt_soc < 0 || self.battery.fullbatt_soc > 1000 {
            eyre::bail!("battery.fullbatt_soc must be in [0, 1000] permille");
        }
        if self.battery.cap_one_time == 0 {
            eyre::bail!("battery.cap_one_time must be >= 1 second");
        }

        // Thermal
        if self.thermal.measure {
            if self.thermal.temp_min >= self.thermal.temp_max {
                eyre::bail!("thermal.temp_min must be below thermal.temp_max");
            }
            if self.thermal.temp_diff < 0 {
                eyre::bail!("thermal.temp_diff must be >= 0");
            }
            if 2 * self.thermal.temp_diff >= self.thermal.temp_max - self.thermal.temp_min {
                eyre::bail!("thermal.temp_diff leaves no recovery window");
            }
        }

        // Charge-voltage guard works only as a pair.
        if (self.charge.voltage_max == 0) != (self.charge.voltage_drop == 0) {
            eyre::bail!("charge.voltage_max and charge.voltage_drop must be set together");
        }
        if self.charge.voltage_drop < 0 || self.charge.voltage_max < 0 {
            eyre::bail!("charge voltage thresholds must be >= 0");
        }

        // Duration guard is a pair as well.
        if (self.duration.charging_max_ms == 0) != (self.duration.discharging_max_ms == 0) {
            eyre::bail!("duration.charging_max_ms and discharging_max_ms must be set together");
        }

        // Fast charge
        if self.fastcharge.enable_count == 0 || self.fastcharge.disable_count == 0 {
            eyre::bail!("fastcharge.enable_count/disable_count must be >= 1");
        }
        if self.fastcharge.enable_uv <= 0 || self.fastcharge.disable_uv <= 0 {
            eyre::bail!("fastcharge.enable_uv/disable_uv must be > 0");
        }

        // JEITA: each non-empty table needs exactly the four boundary rows
        // (five zones), ordered by ascending temperature.
        for (name, table) in [
            ("dcp", &self.jeita.dcp),
            ("sdp", &self.jeita.sdp),
            ("cdp", &self.jeita.cdp),
            ("unknown", &self.jeita.unknown),
            ("fchg", &self.jeita.fchg),
        ] {
            if table.is_empty() {
                continue;
            }
            if table.len() != 4 {
                eyre::bail!("jeita.{name} must have exactly 4 rows, got {}", table.len());
            }
            for pair in table.windows(2) {
                if pair[0].temp >= pair[1].temp {
                    eyre::bail!("jeita.{name} temperatures must be strictly increasing");
                }
            }
            for (i, row) in table.iter().enumerate() {
                if row.current_ua < 0 || row.term_volt_uv <= 0 {
                    eyre::bail!("jeita.{name} row {i} has invalid current/termination voltage");
                }
            }
        }

        // Tracker
        if self.tracker.enabled {
            if self.tracker.ocv_table.len() < 2 {
                eyre::bail!("tracker.ocv_table requires at least two points");
            }
            validate_ocv_rows(&self.tracker.ocv_table)?;
            if self.battery.fullbatt_uv == 0 || self.battery.fullbatt_ua == 0 {
                eyre::bail!("tracker requires battery.fullbatt_uv and fullbatt_ua");
            }
        }

        Ok(())
    }
}

fn validate_ocv_rows(rows: &[OcvCapRow]) -> eyre::Result<()> {
    for (i, pair) in rows.windows(2).enumerate() {
        if pair[0].ocv_uv <= pair[1].ocv_uv {
            eyre::bail!("ocv table voltages must be strictly decreasing (rows {} and {})", i, i + 1);
        }
        if pair[0].capacity < pair[1].capacity {
            eyre::bail!("ocv table capacities must be non-increasing (rows {} and {})", i, i + 1);
        }
    }
    for (i, row) in rows.iter().enumerate() {
        if !(0..=100).contains(&row.capacity) {
            eyre::bail!("ocv table row {i} capacity out of [0, 100]");
        }
    }
    Ok(())
}

/// OCV table CSV schema.
///
/// Expected headers:
/// ocv_uv,capacity
///
/// Example:
/// ocv_uv,capacity
/// 4185000,100
/// 3650000,5
pub fn load_ocv_table_csv(path: &std::path::Path) -> eyre::Result<Vec<OcvCapRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open ocv table CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["ocv_uv", "capacity"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "ocv table CSV must have headers 'ocv_uv,capacity', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<OcvCapRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    if rows.len() < 2 {
        eyre::bail!("ocv table requires at least two rows, got {}", rows.len());
    }
    validate_ocv_rows(&rows)?;
    Ok(rows)
}
