//! The charging supervisor: one instance owns one battery and its
//! charger ICs, and is the single authority for charger enable/disable.
//!
//! Each poll tick takes a telemetry snapshot and walks an ordered chain of
//! guard predicates (thermal, charge voltage, health, duration, post-full
//! recheck, full detection) with short-circuit semantics; the first
//! predicate that handles the tick wins. Anomalies latch until their
//! specific recovery condition holds, which keeps the charger from
//! chattering at threshold boundaries.

use std::sync::Arc;
use std::time::Instant;

use charger_traits::{BatteryHealth, Charger, ChargerType, Clock, EventKind, FastCharger};

use crate::config::{ChargerDesc, JeitaKind, PollMode, PresentMode};
use crate::error::{CoreError, Result};
use crate::estimator::{CAP_FULL_PERMILLE, CapacityEstimator, ChargeStatus, EstimatorSample};
use crate::events::EventPublisher;
use crate::fastcharge::FastChargeState;
use crate::gateway::{BatteryReading, SensorGateway};
use crate::jeita::{self, JeitaMonitor, ThermalDecision};
use crate::tracker::CapacityTracker;

/// Battery voltage under which the UVLO watch starts sampling (µV).
const UVLO_CALIBRATION_VOLTAGE_UV: i32 = 3_250_000;
/// Consecutive under-voltage samples before the capacity is zeroed.
const UVLO_TRIGGER_THRESHOLD: u32 = 5;

/// Latched anomaly conditions. A set bit keeps the charger disabled until
/// that condition's recovery predicate clears it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyFlags(u8);

impl AnomalyFlags {
    pub const DURATION: Self = Self(1 << 0);
    pub const VOLTAGE: Self = Self(1 << 1);
    pub const HEALTH: Self = Self(1 << 2);
    pub const TEMP_OVERHEAT: Self = Self(1 << 3);
    pub const TEMP_COLD: Self = Self(1 << 4);

    pub fn set(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    pub fn clear(&mut self, flag: Self) {
        self.0 &= !flag.0;
    }

    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Mutable charging state, owned by the guard.
///
/// Invariant: `charger_enabled` is false whenever `emergency_stop` is set
/// or a stop-implying anomaly bit is set.
#[derive(Debug, Clone, Default)]
pub struct ChargingState {
    pub charger_enabled: bool,
    pub emergency_stop: Option<EventKind>,
    pub anomaly: AnomalyFlags,
    pub charging_start_ms: u64,
    pub charging_end_ms: u64,
    pub force_full: bool,
}

impl ChargingState {
    /// True when a different anomaly than `flag` is currently latched;
    /// each guard defers while another one owns the stop.
    pub fn blocked_by_other(&self, flag: AnomalyFlags) -> bool {
        !self.anomaly.is_empty() && !self.anomaly.contains(flag)
    }
}

/// Consecutive-sample counters for full-charge detection.
#[derive(Debug, Default)]
pub(crate) struct FullDetector {
    pub(crate) trigger_cnt: u32,
    pub(crate) first_trigger_cnt: u32,
}

pub struct ChargerSupervisor {
    pub(crate) desc: ChargerDesc,
    pub(crate) gateway: SensorGateway,
    pub(crate) chargers: Vec<Box<dyn Charger + Send>>,
    pub(crate) fast: Option<Box<dyn FastCharger + Send>>,
    pub(crate) events: EventPublisher,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,

    pub(crate) state: ChargingState,
    pub(crate) reading: BatteryReading,
    pub(crate) jeita: JeitaMonitor,
    pub(crate) jeita_normal: bool,
    pub(crate) jeita_disabled: bool,
    pub(crate) active_jeita: JeitaKind,
    pub(crate) thm_adjust_ua: Option<i32>,
    pub(crate) fastchg: FastChargeState,
    /// True once the attached adapter negotiated a fast-charge protocol.
    pub(crate) is_fast_charge: bool,
    /// Charge-voltage limits currently in force (normal or fast pair).
    pub(crate) charge_voltage_max_uv: i32,
    pub(crate) charge_voltage_drop_uv: i32,

    pub(crate) estimator: CapacityEstimator,
    pub(crate) tracker: Option<CapacityTracker>,
    pub(crate) full: FullDetector,
    pub(crate) full_detected: bool,
    pub(crate) charger_type: ChargerType,
    pub(crate) uvlo_trigger_cnt: u32,
}

impl core::fmt::Debug for ChargerSupervisor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChargerSupervisor")
            .field("state", &self.state)
            .field("reading", &self.reading)
            .field("cap", &self.estimator.cap())
            .field("fast_phase", &self.fastchg.phase)
            .finish()
    }
}

impl ChargerSupervisor {
    /// Start building a supervisor.
    pub fn builder() -> crate::builder::SupervisorBuilder<
        crate::builder::Missing,
        crate::builder::Missing,
        crate::builder::Missing,
    > {
        crate::builder::SupervisorBuilder::default()
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    pub(crate) fn now_s(&self) -> u64 {
        self.clock.secs_since(self.epoch)
    }

    // ---- presence / power helpers -------------------------------------

    pub fn is_batt_present(&mut self) -> bool {
        match self.desc.battery_present {
            PresentMode::Assume => true,
            PresentMode::None => false,
            PresentMode::FuelGauge => self.gateway.gauge_mut().present().unwrap_or(false),
            PresentMode::ChargerStat => self
                .chargers
                .iter_mut()
                .any(|c| c.online().unwrap_or(false)),
        }
    }

    /// True when at least one charger has an external power source,
    /// regardless of whether it is actually charging.
    pub fn is_ext_pwr_online(&mut self) -> bool {
        self.chargers.iter_mut().any(|c| c.online().unwrap_or(false))
    }

    pub fn is_charging(&mut self) -> bool {
        self.is_batt_present()
            && self.state.emergency_stop.is_none()
            && self.state.charger_enabled
            && self.is_ext_pwr_online()
    }

    pub fn is_polling_required(&mut self) -> bool {
        match self.desc.polling_mode {
            PollMode::Disable => false,
            PollMode::Always => true,
            PollMode::ExternalPowerOnly => self.is_ext_pwr_online(),
            PollMode::ChargingOnly => self.is_charging(),
        }
    }

    pub fn polling_interval_ms(&self) -> u64 {
        self.desc.polling_interval_ms
    }

    // ---- status surface ------------------------------------------------

    pub fn charge_status(&mut self) -> ChargeStatus {
        if self.is_charging() {
            ChargeStatus::Charging
        } else if self.is_ext_pwr_online() {
            if self.full_detected || self.state.force_full {
                ChargeStatus::Full
            } else {
                ChargeStatus::NotCharging
            }
        } else {
            ChargeStatus::Discharging
        }
    }

    pub fn battery_health(&self) -> BatteryHealth {
        let s = &self.state;
        if s.emergency_stop == Some(EventKind::Overheat)
            || s.anomaly.contains(AnomalyFlags::TEMP_OVERHEAT)
        {
            BatteryHealth::Overheat
        } else if s.emergency_stop == Some(EventKind::Cold)
            || s.anomaly.contains(AnomalyFlags::TEMP_COLD)
        {
            BatteryHealth::Cold
        } else if s.anomaly.contains(AnomalyFlags::VOLTAGE) {
            BatteryHealth::OverVoltage
        } else {
            BatteryHealth::Good
        }
    }

    pub fn charging_state(&self) -> &ChargingState {
        &self.state
    }

    pub fn last_reading(&self) -> BatteryReading {
        self.reading
    }

    pub fn reported_capacity_permille(&self) -> i32 {
        self.estimator.cap()
    }

    pub fn reported_capacity_percent(&self) -> i32 {
        crate::util::permille_to_percent(self.estimator.cap())
    }

    pub fn tracker_state(&self) -> Option<crate::tracker::CapTrackState> {
        self.tracker.as_ref().map(|t| t.state())
    }

    /// External thermal-mitigation current cap (µA); `None` lifts it.
    ///
    /// The cap is applied immediately as an input-current limit (split
    /// across both ICs while fast charging, bounded by the dual-IC total
    /// budget) and additionally clamps the JEITA charge current on the
    /// following monitor ticks.
    pub fn set_thermal_limit(&mut self, ua: Option<i32>) {
        self.thm_adjust_ua = ua;
        let Some(ua) = ua else {
            return;
        };
        if !self.is_ext_pwr_online() {
            return;
        }

        let mut limit = ua;
        let dual = self.fast_active() && self.chargers.len() > 1;
        if dual {
            let budget = self.desc.double_ic_total_limit_ua;
            if budget > 0 && limit >= budget {
                limit = budget;
            }
            limit /= 2;
        }
        for charger in self.chargers.iter_mut() {
            match charger.set_input_current_limit(limit) {
                Ok(()) => {}
                Err(err) => {
                    tracing::warn!(%err, limit, "failed to apply thermal input limit");
                    if let Err(err) = charger.set_current_limit(limit) {
                        tracing::warn!(%err, limit, "failed to apply thermal charge limit");
                    }
                }
            }
            if !dual {
                break;
            }
        }
    }

    pub fn set_jeita_disabled(&mut self, disabled: bool) {
        self.jeita_disabled = disabled;
    }

    // ---- the monitor tick ---------------------------------------------

    /// One poll cycle of the guard. Returns true when the tick was fully
    /// evaluated (watchdog fed, chain walked).
    pub fn monitor_tick(&mut self) -> bool {
        if let Err(err) = self.feed_watchdog() {
            tracing::warn!(%err, "failed to feed charger watchdog");
            return false;
        }

        self.reading = self.gateway.snapshot();

        let temp_alert = self.check_thermal_status();
        if temp_alert.is_some() && self.state.emergency_stop.is_some() {
            tracing::warn!(?temp_alert, "emergency stop already latched");
            return false;
        }

        if let Err(err) = self.jeita_current_monitor() {
            tracing::warn!(%err, "error adjusting charge current for temperature");
            return false;
        }

        if let Some(kind) = temp_alert {
            self.state.emergency_stop = Some(kind);
            tracing::info!(?kind, "temperature out of range, stop charging");
            if self.try_charger_enable(false).is_ok() {
                self.events.notify_default(kind);
            }
            return true;
        }

        // Ordered guard predicates; the first one that handles the tick
        // wins and the rest are skipped.
        if self.state.emergency_stop.is_none() {
            // The full detector sees every powered sample so its
            // consecutive-sample counters keep advancing after the stop.
            self.full_detected = self.is_full_charged();
            const CHECKS: [fn(&mut ChargerSupervisor) -> bool; 5] = [
                ChargerSupervisor::check_charge_voltage,
                ChargerSupervisor::check_charge_health,
                ChargerSupervisor::check_charging_duration,
                ChargerSupervisor::check_fullbatt_recheck,
                ChargerSupervisor::check_full_charged,
            ];
            for check in CHECKS {
                if check(self) {
                    return true;
                }
            }
        }

        // No anomaly holds: clear latches and charge if power is present.
        self.state.emergency_stop = None;
        self.state.anomaly = AnomalyFlags::default();
        if self.is_ext_pwr_online() {
            tracing::debug!("no anomaly, external power present");
            if self.try_charger_enable(true).is_ok() {
                self.events.notify(EventKind::ChargeStartStop, "CHARGING");
            }
        }
        true
    }

    fn check_thermal_status(&mut self) -> Option<EventKind> {
        if !self.desc.measure_battery_temp {
            return None;
        }
        let temp = self.reading.temperature;
        let mut upper = self.desc.temp_max;
        let mut lower = self.desc.temp_min;
        // While stopped, both limits pull inward so recovery needs a real
        // margin, not a single borderline sample.
        if self.state.emergency_stop.is_some() {
            upper -= self.desc.temp_diff;
            lower += self.desc.temp_diff;
        }
        if temp > upper {
            Some(EventKind::Overheat)
        } else if temp < lower {
            Some(EventKind::Cold)
        } else {
            None
        }
    }

    // ---- JEITA integration --------------------------------------------

    fn jeita_current_monitor(&mut self) -> Result<()> {
        let Some(table) = self.desc.jeita.get(self.active_jeita).copied() else {
            return Ok(());
        };

        if !self.is_ext_pwr_online() {
            self.jeita.reset();
            return Ok(());
        }

        if self.jeita_disabled {
            if self.jeita.applied() != Some(jeita::JeitaStatus::T1ToT2) {
                tracing::info!("jeita disabled, forcing nominal zone");
                self.thm_adjust_ua = None;
                self.jeita.force(jeita::JeitaStatus::T1ToT2);
                self.jeita_normal = self.apply_jeita(jeita::JeitaStatus::T1ToT2);
            }
            return Ok(());
        }

        let temp = self.reading.temperature;
        if let Some(status) = self.jeita.observe(&table, temp) {
            tracing::debug!(?status, temp, "jeita zone applied");
            self.jeita_normal = self.apply_jeita(status);
        }
        if !self.jeita_normal {
            return Err(CoreError::State("jeita hold: charging stopped by zone".into()).report());
        }
        Ok(())
    }

    /// Push one zone's limits to the chargers. Returns false when the
    /// zone stops charging or no charger accepted the limits.
    pub(crate) fn apply_jeita(&mut self, status: jeita::JeitaStatus) -> bool {
        // Another latched anomaly owns the charger right now.
        if self
            .state
            .blocked_by_other(AnomalyFlags::TEMP_OVERHEAT.union(AnomalyFlags::TEMP_COLD))
        {
            return true;
        }
        let Some(table) = self.desc.jeita.get(self.active_jeita).copied() else {
            return true;
        };

        match jeita::adjust(&table, status, self.thm_adjust_ua) {
            ThermalDecision::Stop { cold } => {
                tracing::warn!(cold, "stop charging due to battery overheat or cold");
                self.events.notify_default(EventKind::Discharging);
                let _ = self.try_charger_enable(false);
                self.state.anomaly.set(if cold {
                    AnomalyFlags::TEMP_COLD
                } else {
                    AnomalyFlags::TEMP_OVERHEAT
                });
                false
            }
            ThermalDecision::Charge {
                current_ua,
                term_volt_uv,
            } => {
                tracing::info!(current_ua, term_volt_uv, "applying jeita charge limits");
                let mut applied = false;
                for charger in self.chargers.iter_mut() {
                    if let Err(err) = charger.set_termination_voltage(term_volt_uv) {
                        tracing::warn!(%err, "failed to set termination voltage");
                        continue;
                    }
                    if let Err(err) = charger.set_current_limit(current_ua) {
                        tracing::warn!(%err, "failed to set charge current");
                        continue;
                    }
                    applied = true;
                }
                if !applied {
                    return false;
                }
                let _ = self.try_charger_enable(true);
                self.state.anomaly.clear(AnomalyFlags::TEMP_OVERHEAT);
                self.state.anomaly.clear(AnomalyFlags::TEMP_COLD);
                true
            }
        }
    }

    /// Re-classify against the active table and apply immediately;
    /// used after a table switch.
    pub(crate) fn reapply_jeita(&mut self) {
        let Some(table) = self.desc.jeita.get(self.active_jeita).copied() else {
            return;
        };
        let status = if self.jeita_disabled {
            jeita::JeitaStatus::T1ToT2
        } else {
            self.jeita.classify_once(&table, self.reading.temperature)
        };
        self.jeita.force(status);
        self.jeita_normal = self.apply_jeita(status);
    }

    // ---- guard predicates ---------------------------------------------

    fn check_charge_voltage(&mut self) -> bool {
        let max_uv = self.charge_voltage_max_uv;
        let drop_uv = self.charge_voltage_drop_uv;
        if max_uv == 0 || drop_uv == 0 {
            return false;
        }
        if self.state.blocked_by_other(AnomalyFlags::VOLTAGE) {
            return false;
        }
        let charge_vol = match self.gateway.gauge_mut().charge_voltage() {
            Ok(v) => v,
            Err(_) => return false,
        };

        if self.state.charger_enabled && charge_vol > max_uv {
            tracing::info!(charge_vol, max_uv, "charge voltage above limit");
            self.events.notify_default(EventKind::Discharging);
            let _ = self.try_charger_enable(false);
            self.state.anomaly.set(AnomalyFlags::VOLTAGE);
            true
        } else if !self.state.charger_enabled
            && self.state.anomaly.contains(AnomalyFlags::VOLTAGE)
            && charge_vol <= max_uv - drop_uv
            && self.is_ext_pwr_online()
        {
            tracing::info!(charge_vol, "charge voltage recovered, recharging");
            self.events.notify_default(EventKind::Recharging);
            let _ = self.try_charger_enable(true);
            self.state.anomaly.clear(AnomalyFlags::VOLTAGE);
            true
        } else if self.state.anomaly.contains(AnomalyFlags::VOLTAGE) {
            tracing::debug!("charge voltage still abnormal");
            true
        } else {
            false
        }
    }

    fn check_charge_health(&mut self) -> bool {
        if self.state.blocked_by_other(AnomalyFlags::HEALTH) {
            return false;
        }
        let Some(health) = self.charge_health() else {
            return false;
        };

        if self.state.charger_enabled && health != BatteryHealth::Good {
            tracing::info!(?health, "charge health is not good");
            self.events.notify_default(EventKind::Discharging);
            let _ = self.try_charger_enable(false);
            self.state.anomaly.set(AnomalyFlags::HEALTH);
            true
        } else if !self.state.charger_enabled
            && health == BatteryHealth::Good
            && self.state.anomaly.contains(AnomalyFlags::HEALTH)
            && self.is_ext_pwr_online()
        {
            tracing::info!("charge health recovered, recharging");
            self.events.notify_default(EventKind::Recharging);
            let _ = self.try_charger_enable(true);
            self.state.anomaly.clear(AnomalyFlags::HEALTH);
            true
        } else if self.state.anomaly.contains(AnomalyFlags::HEALTH) {
            tracing::debug!("charge health still abnormal");
            true
        } else {
            false
        }
    }

    fn charge_health(&mut self) -> Option<BatteryHealth> {
        let mut health = None;
        for charger in self.chargers.iter_mut() {
            if let Ok(h) = charger.health() {
                health = Some(h);
            }
        }
        match health {
            Some(BatteryHealth::Unknown) | None => None,
            other => other,
        }
    }

    fn check_charging_duration(&mut self) -> bool {
        let charging_max_ms = self.desc.charging_max_ms;
        let discharging_max_ms = self.desc.discharging_max_ms;
        if charging_max_ms == 0 && discharging_max_ms == 0 {
            return false;
        }
        if self.state.blocked_by_other(AnomalyFlags::DURATION) {
            return false;
        }

        let now = self.now_ms();
        let fullbatt_uv = self.desc.fullbatt_uv;
        let vchkdrop_uv = self.desc.fullbatt_vchkdrop_uv;
        let mut handled = false;

        if self.state.charger_enabled {
            let duration = now.saturating_sub(self.state.charging_start_ms);
            // A configured recharge margin couples the cap to "still near
            // full": only an overlong trickle counts. With the margin
            // unset the coupling is skipped and duration alone decides.
            let near_full = if vchkdrop_uv == 0 {
                true
            } else {
                fullbatt_uv.saturating_sub(self.reading.ocv_uv) < vchkdrop_uv
            };
            if duration > charging_max_ms && near_full {
                tracing::info!(duration, charging_max_ms, "charging duration exceeded");
                self.events.notify_default(EventKind::Discharging);
                let _ = self.try_charger_enable(false);
                self.state.anomaly.set(AnomalyFlags::DURATION);
                handled = true;
            }
        } else if self.state.anomaly.contains(AnomalyFlags::DURATION) && self.is_ext_pwr_online() {
            let duration = now.saturating_sub(self.state.charging_end_ms);
            if duration > discharging_max_ms {
                tracing::info!(duration, discharging_max_ms, "discharging duration exceeded");
                self.events.notify_default(EventKind::Recharging);
                let _ = self.try_charger_enable(true);
                self.state.anomaly.clear(AnomalyFlags::DURATION);
                handled = true;
            }
        }

        if self.state.anomaly.contains(AnomalyFlags::DURATION) {
            tracing::debug!("charging duration still exceeded");
            return true;
        }
        handled
    }

    /// While powered but stopped after a full charge, re-check the
    /// post-full voltage drop. Outside that window the tick falls
    /// through so the default arm can start charging.
    fn check_fullbatt_recheck(&mut self) -> bool {
        if self.state.charger_enabled || !self.is_ext_pwr_online() {
            return false;
        }
        if self.desc.fullbatt_vchkdrop_uv == 0 || !self.state.force_full {
            return false;
        }
        tracing::debug!("checking dropped voltage of battery");
        self.fullbatt_vchk();
        true
    }

    /// Recharge when the OCV sagged more than the configured margin
    /// below the full-battery voltage.
    pub(crate) fn fullbatt_vchk(&mut self) {
        let fullbatt_uv = self.desc.fullbatt_uv;
        let drop_uv = self.desc.fullbatt_vchkdrop_uv;
        if drop_uv == 0 {
            return;
        }
        let ocv = match self.gateway.gauge_mut().ocv() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%err, "ocv read failed during full-battery recheck");
                return;
            }
        };
        let diff = fullbatt_uv - ocv;
        if diff < 0 {
            return;
        }
        tracing::info!(diff_uv = diff, "battery voltage dropped after full");
        if diff >= drop_uv && self.try_charger_restart().is_ok() {
            self.events.notify_default(EventKind::Recharging);
        }
    }

    fn check_full_charged(&mut self) -> bool {
        if !(self.full_detected && self.state.charger_enabled) {
            return false;
        }
        tracing::info!("battery fully charged");
        self.events.notify_default(EventKind::BatteryFull);
        let _ = self.try_charger_enable(false);
        self.fullbatt_vchk();
        true
    }

    /// Full-charge detection with transient rejection: the voltage dwell
    /// path needs two consecutive qualifying samples to assert full and a
    /// third before the gauge SOC is forced to 100 %.
    fn is_full_charged(&mut self) -> bool {
        if !self.is_batt_present() {
            self.full.trigger_cnt = 0;
            self.full.first_trigger_cnt = 0;
            return false;
        }

        let fullbatt_full_capacity = self.desc.fullbatt_full_capacity;
        if fullbatt_full_capacity > 0
            && let Ok(charge_full) = self.gateway.gauge_mut().charge_full()
            && charge_full > fullbatt_full_capacity
        {
            return true;
        }

        let fullbatt_uv = self.desc.fullbatt_uv;
        let fullbatt_ua = self.desc.fullbatt_ua;
        let first_fullbatt_ua = self.desc.first_fullbatt_ua;
        if fullbatt_uv > 0 && fullbatt_ua > 0 {
            let uv = self.reading.voltage_avg_uv;
            let ua = self.reading.current_avg_ua;

            // Early taper: current already between the two thresholds.
            if first_fullbatt_ua > 0 && uv >= fullbatt_uv && ua > fullbatt_ua && ua <= first_fullbatt_ua
            {
                self.full.first_trigger_cnt += 1;
                if self.full.first_trigger_cnt >= 2 {
                    self.state.force_full = true;
                }
            } else {
                self.full.first_trigger_cnt = 0;
            }

            if uv >= fullbatt_uv && (0..=fullbatt_ua).contains(&ua) {
                self.full.trigger_cnt += 1;
                if self.full.trigger_cnt == 3 {
                    // Third qualifying sample: pin the gauge to 100 %.
                    if let Err(err) = self.gateway.gauge_mut().adjust_capacity(CAP_FULL_PERMILLE) {
                        tracing::warn!(%err, "failed to force gauge capacity full");
                    }
                }
                if self.full.trigger_cnt >= 2 {
                    self.state.force_full = true;
                    return true;
                }
                return false;
            }
            self.full.trigger_cnt = 0;
            return false;
        }

        let fullbatt_soc = self.desc.fullbatt_soc;
        fullbatt_soc > 0 && self.reading.raw_capacity >= fullbatt_soc
    }

    // ---- transitions ---------------------------------------------------

    /// The only place charger enable/disable commands are issued.
    pub fn try_charger_enable(&mut self, enable: bool) -> Result<()> {
        if let Err(err) = self.try_fast_charger_enable(enable) {
            tracing::warn!(%err, "fast charge adjustment failed");
        }

        // Redundant command.
        if enable == self.state.charger_enabled {
            return Ok(());
        }

        let now = self.now_ms();
        if enable {
            if self.state.emergency_stop.is_some() {
                return Err(CoreError::State("emergency stop active".into()).report());
            }
            if !self.is_batt_present() {
                return Ok(());
            }
            // Start time bounds the maximum possible charging duration.
            self.state.charging_start_ms = now;
            self.state.charging_end_ms = 0;
        } else {
            self.state.charging_start_ms = 0;
            self.state.charging_end_ms = now;
        }

        self.set_chargers_enabled(enable)
            .map_err(|e| CoreError::Control(e).report())?;
        self.state.charger_enabled = enable;
        tracing::info!(enable, "charger state changed");
        Ok(())
    }

    /// Restart charging by turning the charger off and on.
    pub(crate) fn try_charger_restart(&mut self) -> Result<()> {
        if self.state.emergency_stop.is_some() {
            return Err(CoreError::State("emergency stop active".into()).report());
        }
        self.try_charger_enable(false)?;
        self.try_charger_enable(true)
    }

    fn set_chargers_enabled(&mut self, enable: bool) -> std::result::Result<(), charger_traits::ControlError> {
        let secondary_present = self.chargers.len() > 1;
        for charger in self.chargers.iter_mut() {
            charger.set_enabled(enable)?;
            if secondary_present {
                // The secondary IC is owned by the fast-charge sequence.
                break;
            }
        }
        Ok(())
    }

    fn feed_watchdog(&mut self) -> std::result::Result<(), charger_traits::ControlError> {
        let interval = self.desc.wdt_interval_s;
        if interval == 0 {
            return Ok(());
        }
        for charger in self.chargers.iter_mut() {
            charger.feed_watchdog(interval)?;
        }
        Ok(())
    }

    // ---- capacity cycle -------------------------------------------------

    /// Periodic reported-capacity reconciliation plus one tracker step.
    /// Runs on its own cadence, serialized with the monitor under the
    /// instance lock.
    pub fn capacity_tick(&mut self) {
        self.reading = self.gateway.snapshot();
        let now_s = self.now_s();
        let ext_online = self.is_ext_pwr_online();

        let mut status = self.charge_status();
        if self.state.force_full && ext_online {
            status = ChargeStatus::Full;
        }

        tracing::debug!(
            voltage_uv = self.reading.voltage_avg_uv,
            ocv_uv = self.reading.ocv_uv,
            current_ua = self.reading.current_avg_ua,
            raw_cap = self.reading.raw_capacity,
            ?status,
            force_full = self.state.force_full,
            temperature = self.reading.temperature,
            tracker = ?self.tracker_state(),
            fast_phase = ?self.fastchg.phase,
            "capacity cycle"
        );

        let previous = self.estimator.cap();
        let mut force_full = self.state.force_full;
        let sample = EstimatorSample::from_reading(status, &self.reading, ext_online, now_s);
        let cap = self.estimator.reconcile(sample, &mut force_full);
        self.state.force_full = force_full;

        if self.reading.voltage_avg_uv < UVLO_CALIBRATION_VOLTAGE_UV {
            self.uvlo_tick();
        }

        if cap != previous && self.uvlo_trigger_cnt < UVLO_TRIGGER_THRESHOLD {
            if let Err(err) = self.gateway.gauge_mut().set_capacity(cap) {
                tracing::warn!(%err, "failed to persist reported capacity");
            }
        }

        let present = self.is_batt_present();
        let temperature = self.reading.temperature;
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.tick(
                self.gateway.gauge_mut(),
                &self.desc.ocv_table,
                present,
                temperature,
                now_s,
            );
        }
    }

    /// Consecutive samples under the shutdown voltage zero the persisted
    /// capacity; actually powering off is the platform's decision.
    fn uvlo_tick(&mut self) {
        let shutdown_uv = self.desc.shutdown_voltage_uv;
        if self.reading.voltage_avg_uv < shutdown_uv {
            self.uvlo_trigger_cnt += 1;
        } else {
            self.uvlo_trigger_cnt = 0;
        }
        if self.uvlo_trigger_cnt >= UVLO_TRIGGER_THRESHOLD {
            tracing::error!(
                voltage_uv = self.reading.voltage_avg_uv,
                "battery under UVLO threshold, forcing empty"
            );
            if let Err(err) = self.gateway.gauge_mut().set_capacity(0) {
                tracing::warn!(%err, "failed to zero reported capacity");
            }
            self.events
                .notify(EventKind::Other, "under-voltage lockout imminent");
        }
    }

    // ---- external notifications ----------------------------------------

    /// Cable attach/detach and charging start/stop notifications from the
    /// platform. Resets latched state and re-selects the JEITA table for
    /// the detected charger type.
    pub fn cable_changed(&mut self, kind: EventKind) {
        self.state.emergency_stop = None;
        self.state.anomaly = AnomalyFlags::default();
        self.charger_type = ChargerType::Unknown;
        self.thm_adjust_ua = None;

        if self.is_ext_pwr_online() {
            let _ = self.try_charger_enable(true);
            if let Some(t) = self.detected_charger_type() {
                self.charger_type = t;
            }
            self.active_jeita = match self.charger_type {
                ChargerType::Dcp => JeitaKind::Dcp,
                ChargerType::Sdp => JeitaKind::Sdp,
                ChargerType::Cdp => JeitaKind::Cdp,
                ChargerType::Unknown => JeitaKind::Unknown,
            };
            self.charge_voltage_max_uv = self.desc.normal_charge_voltage_max_uv;
            self.charge_voltage_drop_uv = self.desc.normal_charge_voltage_drop_uv;
            self.set_fast_charge_setting();
            // An unrecognized type on a fast-capable adapter still
            // deserves the DCP profile.
            if self.is_fast_charge && self.charger_type == ChargerType::Unknown {
                self.active_jeita = JeitaKind::Dcp;
            }
            self.fastchg.enable_count = 0;
            self.reapply_jeita();
        } else {
            let _ = self.try_charger_enable(false);
            self.monitor_tick();
            self.is_fast_charge = false;
            self.fastchg = FastChargeState::default();
            self.jeita.reset();
        }

        self.state.force_full = false;
        self.events.notify_default(kind);
    }

    /// Battery inserted or pulled notification.
    pub fn battery_changed(&mut self) {
        if !self.is_batt_present() {
            tracing::error!("battery pulled out");
            let _ = self.try_charger_enable(false);
            self.events.notify_default(EventKind::BatteryOut);
        } else {
            tracing::info!("battery inserted");
            if !self.state.anomaly.is_empty() {
                tracing::warn!("charging state abnormal, staying stopped");
                let _ = self.try_charger_enable(false);
            } else {
                let _ = self.try_charger_enable(true);
            }
            self.events.notify_default(EventKind::BatteryIn);
        }
    }

    /// The charger driver reported the battery full on its own.
    pub fn battery_full_notified(&mut self) {
        tracing::info!("battery fully charged (notified)");
        self.events.notify_default(EventKind::BatteryFull);
        // The next monitor tick runs the post-full voltage recheck.
    }

    /// The adapter's fast-charge capability may have changed.
    pub fn fast_charge_capability_changed(&mut self) {
        self.detect_fast_charge();
        if !self.is_ext_pwr_online() {
            return;
        }
        self.set_fast_charge_setting();
    }

    /// Forward a free-form platform event to the sink.
    pub fn notify_misc(&mut self, message: &str) {
        self.events.notify(EventKind::Other, message);
    }

    /// Suspend/resume hook: events coalesce while suspended, and resume
    /// re-evaluates both cycles immediately.
    pub fn set_suspended(&mut self, suspended: bool) {
        self.events.set_suspended(suspended);
        if !suspended {
            self.monitor_tick();
            self.capacity_tick();
        }
    }

    pub(crate) fn detected_charger_type(&mut self) -> Option<ChargerType> {
        for charger in self.chargers.iter_mut() {
            if let Ok(t) = charger.charger_type() {
                return Some(t);
            }
        }
        None
    }

    pub(crate) fn detect_fast_charge(&mut self) {
        if let Some(fast) = self.fast.as_mut()
            && let Ok(capable) = fast.is_fast_capable()
        {
            self.is_fast_charge = capable;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_flags_set_clear_contains() {
        let mut flags = AnomalyFlags::default();
        assert!(flags.is_empty());
        flags.set(AnomalyFlags::VOLTAGE);
        flags.set(AnomalyFlags::DURATION);
        assert!(flags.contains(AnomalyFlags::VOLTAGE));
        assert!(flags.contains(AnomalyFlags::DURATION));
        assert!(!flags.contains(AnomalyFlags::HEALTH));
        flags.clear(AnomalyFlags::VOLTAGE);
        assert!(!flags.contains(AnomalyFlags::VOLTAGE));
        assert!(!flags.is_empty());
    }

    #[test]
    fn blocked_by_other_ignores_own_flag() {
        let mut state = ChargingState::default();
        assert!(!state.blocked_by_other(AnomalyFlags::VOLTAGE));
        state.anomaly.set(AnomalyFlags::VOLTAGE);
        assert!(!state.blocked_by_other(AnomalyFlags::VOLTAGE));
        assert!(state.blocked_by_other(AnomalyFlags::HEALTH));
    }
}
