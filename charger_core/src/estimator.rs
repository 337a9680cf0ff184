//! Reported-capacity estimator.
//!
//! The raw fuel-gauge SOC jumps around with load transients and gauge
//! recalibrations; the estimator slews the *reported* capacity toward it
//! under rate limits that depend on elapsed time and current direction,
//! and pins the awkward end-of-charge region so the display neither
//! sticks at 99 % forever nor snaps backwards.

use crate::gateway::BatteryReading;
use crate::util::div_round_closest_i32;

pub const CAP_FULL_PERMILLE: i32 = 1000;
/// One display percent, in ‰.
pub const CAP_ONE_PERCENT: i32 = 10;
/// Above this reported ‰ a raw-capacity drop is stepped down gently.
pub const HCAP_THRESHOLD: i32 = 955;
/// Maximum per-cycle step-down applied in the high-capacity region.
pub const HCAP_DECREASE_STEP: i32 = 8;
/// At or below this temperature (tenths of °C) a collapsing voltage is
/// treated as an empty battery.
pub const LOW_TEMP_REGION: i32 = 100;
pub const LOW_TEMP_SHUTDOWN_UV: i32 = 3_200_000;

/// Charging status as seen by the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    Charging,
    NotCharging,
    Discharging,
    Full,
}

/// One estimator cycle's inputs.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorSample {
    pub status: ChargeStatus,
    /// Raw fuel-gauge SOC (‰), unclamped.
    pub fuel_cap: i32,
    pub batt_ua: i32,
    pub batt_ocv_uv: i32,
    pub batt_uv: i32,
    pub temperature: i32,
    pub ext_pwr_online: bool,
    /// Monotonic seconds since supervisor start.
    pub now_s: u64,
}

impl EstimatorSample {
    pub fn from_reading(
        status: ChargeStatus,
        reading: &BatteryReading,
        ext_pwr_online: bool,
        now_s: u64,
    ) -> Self {
        Self {
            status,
            fuel_cap: reading.raw_capacity,
            batt_ua: reading.current_avg_ua,
            batt_ocv_uv: reading.ocv_uv,
            batt_uv: reading.voltage_avg_uv,
            temperature: reading.temperature,
            ext_pwr_online,
            now_s,
        }
    }
}

#[derive(Debug)]
pub struct CapacityEstimator {
    cap: i32,
    last_fuel_cap: Option<i32>,
    /// Last time the displayed percent changed.
    update_capacity_time_s: u64,
    last_query_time_s: u64,
    trickle_start_time_s: u64,
    trickle_time_s: u64,
    low_temp_trigger_cnt: u32,

    cap_one_time_s: u64,
    trickle_time_out_s: u64,
    fullbatt_uv: i32,
    fullbatt_vchkdrop_uv: i32,
}

impl CapacityEstimator {
    pub fn new(
        initial_cap: i32,
        cap_one_time_s: u64,
        trickle_time_out_s: u64,
        fullbatt_uv: i32,
        fullbatt_vchkdrop_uv: i32,
        now_s: u64,
    ) -> Self {
        Self {
            cap: initial_cap.clamp(0, CAP_FULL_PERMILLE),
            last_fuel_cap: None,
            update_capacity_time_s: now_s,
            last_query_time_s: now_s,
            trickle_start_time_s: now_s,
            trickle_time_s: 0,
            low_temp_trigger_cnt: 0,
            cap_one_time_s: cap_one_time_s.max(1),
            trickle_time_out_s,
            fullbatt_uv,
            fullbatt_vchkdrop_uv,
        }
    }

    /// Currently reported capacity (‰).
    pub fn cap(&self) -> i32 {
        self.cap
    }

    /// Reconcile the reported capacity against one fresh sample.
    ///
    /// `force_full` is the shared full-latch: the trickle timer can set it,
    /// and a sagging OCV after full clears it.
    pub fn reconcile(&mut self, s: EstimatorSample, force_full: &mut bool) -> i32 {
        let mut fuel_cap = s.fuel_cap;

        // A cold pack whose loaded voltage is collapsing reads empty so
        // the platform shuts down before hitting hardware UVLO.
        if s.temperature <= LOW_TEMP_REGION && s.batt_uv <= LOW_TEMP_SHUTDOWN_UV {
            self.low_temp_trigger_cnt += 1;
            if self.low_temp_trigger_cnt > 1 {
                fuel_cap = 0;
            }
        } else {
            self.low_temp_trigger_cnt = 0;
        }

        fuel_cap = fuel_cap.clamp(0, CAP_FULL_PERMILLE);
        if self.last_fuel_cap.is_none() {
            self.last_fuel_cap = Some(fuel_cap);
        }

        // Time spent trickling at the top of charge.
        if s.status == ChargeStatus::Charging {
            if self.cap >= 986 {
                self.trickle_time_s = s.now_s.saturating_sub(self.trickle_start_time_s);
            } else {
                self.trickle_start_time_s = s.now_s;
                self.trickle_time_s = 0;
            }
        } else {
            self.trickle_start_time_s = s.now_s;
            self.trickle_time_s = self.trickle_time_out_s + self.cap_one_time_s;
        }

        let flush_time = s.now_s.saturating_sub(self.update_capacity_time_s);
        let period_time = s.now_s.saturating_sub(self.last_query_time_s);
        self.last_query_time_s = s.now_s;

        // Compensation budget after a long gap (e.g. resume from sleep).
        let flush_steps = i32::try_from(flush_time / self.cap_one_time_s)
            .unwrap_or(i32::MAX / CAP_ONE_PERCENT)
            .saturating_mul(CAP_ONE_PERCENT);

        match s.status {
            ChargeStatus::Charging => {
                self.last_fuel_cap = Some(fuel_cap);
                if fuel_cap < self.cap {
                    if s.batt_ua >= 0 {
                        // Charge current is flowing in: never step backwards.
                        fuel_cap = self.cap;
                    } else {
                        if period_time < self.cap_one_time_s && self.cap - fuel_cap >= 5 {
                            fuel_cap = self.cap - 5;
                        }
                        if self.cap - fuel_cap >= flush_steps {
                            fuel_cap = self.cap - flush_steps;
                        }
                    }
                } else if fuel_cap > self.cap {
                    if period_time < self.cap_one_time_s && fuel_cap - self.cap >= 5 {
                        fuel_cap = self.cap + 5;
                    }
                    if fuel_cap - self.cap >= flush_steps {
                        fuel_cap = self.cap + flush_steps;
                    }
                }

                // Hold just under full until the guard declares full.
                if (986..=994).contains(&self.cap) && fuel_cap >= CAP_FULL_PERMILLE {
                    fuel_cap = 994;
                }
                if self.cap >= 986
                    && self.trickle_time_out_s > 0
                    && self.trickle_time_s >= self.trickle_time_out_s
                    && s.batt_ua > 0
                {
                    *force_full = true;
                }
            }
            ChargeStatus::NotCharging | ChargeStatus::Discharging => {
                // The reported capacity must not rise without charge current.
                if fuel_cap >= self.cap {
                    self.last_fuel_cap = Some(fuel_cap);
                    fuel_cap = self.cap;
                } else if self.cap >= HCAP_THRESHOLD {
                    // Near the top a gauge recalibration can drop several
                    // percent at once; walk down instead of snapping.
                    let last = self.last_fuel_cap.unwrap_or(fuel_cap);
                    if last - fuel_cap >= HCAP_DECREASE_STEP {
                        if self.cap - fuel_cap >= CAP_ONE_PERCENT {
                            fuel_cap = self.cap - CAP_ONE_PERCENT;
                        } else {
                            fuel_cap = self.cap - HCAP_DECREASE_STEP;
                        }
                        self.last_fuel_cap = Some(last - HCAP_DECREASE_STEP);
                    } else {
                        fuel_cap = self.cap;
                    }
                } else {
                    if period_time < self.cap_one_time_s && self.cap - fuel_cap >= 5 {
                        fuel_cap = self.cap - 5;
                    }
                    if self.cap - fuel_cap >= flush_steps {
                        fuel_cap = self.cap - flush_steps;
                    } else if self.cap - fuel_cap > CAP_ONE_PERCENT {
                        fuel_cap = self.cap - CAP_ONE_PERCENT;
                    }
                }
            }
            ChargeStatus::Full => {
                self.last_fuel_cap = Some(fuel_cap);
                self.update_capacity_time_s = s.now_s;
                if s.batt_ocv_uv < self.fullbatt_uv - self.fullbatt_vchkdrop_uv - 50_000
                    && s.batt_ua < 0
                {
                    *force_full = false;
                }
                if s.ext_pwr_online {
                    fuel_cap = CAP_FULL_PERMILLE;
                    if fuel_cap > self.cap {
                        fuel_cap = self.cap + 1;
                    }
                }
            }
        }

        if fuel_cap != self.cap {
            if div_round_closest_i32(fuel_cap, 10) != div_round_closest_i32(self.cap, 10) {
                self.update_capacity_time_s = s.now_s;
            }
            self.cap = fuel_cap;
        }
        self.cap
    }
}
