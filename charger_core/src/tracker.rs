//! One-shot coulomb-counting capacity calibration.
//!
//! A session arms only when the battery is nearly empty, integrates the
//! fuel gauge's coulomb counter up to a full-charge-like exit condition,
//! and replaces the design capacity when the measured value is sane. The
//! accepted value is persisted as an XOR-keyed word pair so a torn or
//! corrupted record is detected on the next boot instead of trusted.

use crate::error::Result;
use charger_traits::{CapacityStore, FuelGauge};

pub const TRACK_CAPACITY_KEY0: u32 = 0x2016_0726;
pub const TRACK_CAPACITY_KEY1: u32 = 0x1521_1517;

/// OCV ceiling for arming in powered-on mode (µV).
const TRACK_START_VOLTAGE_UV: i32 = 3_650_000;
/// Boot-voltage ceiling for arming right after a dead-battery boot (µV).
const TRACK_SHUTDOWN_START_VOLTAGE_UV: i32 = 3_500_000;
/// Current-draw ceiling for arming in powered-on mode (µA).
const TRACK_START_CURRENT_UA: i32 = 30_000;
/// End condition offsets against the full-battery thresholds.
const TRACK_VOLTAGE_OFFSET_UV: i32 = 5_000;
const TRACK_CURRENT_OFFSET_UA: i32 = 5_000;
/// Temperature window (tenths of °C) outside which a session is refused
/// or cancelled.
const TRACK_HIGH_TEMP_THRESHOLD: i32 = 450;
const TRACK_LOW_TEMP_THRESHOLD: i32 = 150;
/// Wall-clock bound on one session.
const TRACK_TIMEOUT_S: u64 = 30 * 60;
/// Sessions starting above this SOC (‰) lack a reliable zero reference.
const TRACK_START_CAP_THRESHOLD: i32 = 200;
/// Store failures tolerated before the tracker goes terminal.
const TRACK_STORE_RETRIES: u32 = 5;

/// Calibration session state. Transitions are linear:
/// Init → Idle → Updating → Done → Idle, or → Err on persistent I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapTrackState {
    Init,
    Idle,
    Updating,
    Done,
    Err,
}

/// One OCV→capacity lookup point. Tables are ordered by descending OCV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcvCapEntry {
    pub ocv_uv: i32,
    /// Capacity percent (0..=100).
    pub capacity: i32,
}

/// Linear interpolation into a descending OCV table, in percent.
pub fn ocv_to_cap(table: &[OcvCapEntry], ocv_uv: i32) -> i32 {
    let mut idx = table.len();
    for (i, row) in table.iter().enumerate() {
        if ocv_uv > row.ocv_uv {
            idx = i;
            break;
        }
    }
    if idx == 0 {
        table[0].capacity
    } else if idx == table.len() {
        table[table.len() - 1].capacity
    } else {
        let hi = table[idx - 1];
        let lo = table[idx];
        let num = i64::from(hi.capacity - lo.capacity) * i64::from(ocv_uv - lo.ocv_uv);
        let den = i64::from(hi.ocv_uv - lo.ocv_uv);
        lo.capacity + (num / den) as i32
    }
}

pub struct CapacityTracker {
    state: CapTrackState,
    store: Box<dyn CapacityStore + Send>,
    start_time_s: u64,
    start_clbcnt_uah: i32,
    /// SOC (‰) at session start, from the OCV lookup.
    start_cap: i32,
    end_voltage_uv: i32,
    end_current_ua: i32,
    /// True when booted by a charger plug on a dead battery; arming then
    /// trusts the boot voltage instead of live OCV/current.
    charger_boot_mode: bool,
    restore_retries_left: u32,
}

impl CapacityTracker {
    pub fn new(
        store: Box<dyn CapacityStore + Send>,
        fullbatt_uv: i32,
        fullbatt_ua: i32,
        charger_boot_mode: bool,
    ) -> Self {
        Self {
            state: CapTrackState::Init,
            store,
            start_time_s: 0,
            start_clbcnt_uah: 0,
            start_cap: 0,
            end_voltage_uv: fullbatt_uv - TRACK_VOLTAGE_OFFSET_UV,
            end_current_ua: fullbatt_ua + TRACK_CURRENT_OFFSET_UA,
            charger_boot_mode,
            restore_retries_left: TRACK_STORE_RETRIES,
        }
    }

    pub fn state(&self) -> CapTrackState {
        self.state
    }

    /// Drive one tracker cycle. Runs on the capacity poll period,
    /// serialized with the estimator under the supervisor lock.
    pub fn tick(
        &mut self,
        gauge: &mut (dyn FuelGauge + Send),
        ocv_table: &[OcvCapEntry],
        batt_present: bool,
        temperature: i32,
        now_s: u64,
    ) {
        if self.state == CapTrackState::Err {
            return;
        }
        if self.state == CapTrackState::Init {
            self.restore(gauge);
            return;
        }
        if !batt_present {
            tracing::debug!("battery not present, tracker idle");
            return;
        }
        if !(TRACK_LOW_TEMP_THRESHOLD..=TRACK_HIGH_TEMP_THRESHOLD).contains(&temperature) {
            tracing::debug!(temperature, "temperature out of tracking range");
            return;
        }

        // The tracker needs trustworthy numbers; a failed read skips the
        // whole cycle rather than guessing.
        let cur_now = match gauge.current_now() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%err, "tracker: current read failed");
                return;
            }
        };
        let batt_uv = match gauge.voltage_avg() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%err, "tracker: voltage read failed");
                return;
            }
        };
        let ocv = match gauge.ocv() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%err, "tracker: ocv read failed");
                return;
            }
        };
        let boot_volt = match gauge.boot_voltage() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%err, "tracker: boot voltage read failed");
                return;
            }
        };

        match self.state {
            CapTrackState::Idle => self.try_arm(gauge, ocv_table, cur_now, ocv, boot_volt, now_s),
            CapTrackState::Updating => self.update(gauge, batt_uv, cur_now, now_s),
            CapTrackState::Done => {
                // Persist already ran; nothing left this session.
                self.state = CapTrackState::Idle;
            }
            CapTrackState::Init | CapTrackState::Err => {}
        }
    }

    /// Load and apply the persisted calibration once at startup.
    fn restore(&mut self, gauge: &mut (dyn FuelGauge + Send)) {
        match self.store.load() {
            Ok(record) => {
                self.state = CapTrackState::Idle;
                let Some([w0, w1]) = record else {
                    tracing::debug!("no persisted capacity record");
                    return;
                };
                let capacity = w0 ^ TRACK_CAPACITY_KEY0;
                let check = w1 ^ TRACK_CAPACITY_KEY1;
                if capacity != check {
                    tracing::warn!("persisted capacity record corrupt, discarding");
                    return;
                }
                let total_mah = match gauge.total_capacity() {
                    Ok(uah) => (uah / 1000) as i32,
                    Err(err) => {
                        tracing::warn!(%err, "total capacity read failed during restore");
                        return;
                    }
                };
                let capacity = capacity as i32;
                if (capacity - total_mah).abs() < total_mah / 2 {
                    if let Err(err) = gauge.set_total_capacity(capacity as u32) {
                        tracing::warn!(%err, "failed to apply restored capacity");
                    } else {
                        tracing::info!(capacity_mah = capacity, "restored learned capacity");
                    }
                } else {
                    tracing::warn!(
                        capacity_mah = capacity,
                        design_mah = total_mah,
                        "restored capacity implausible, ignoring"
                    );
                }
            }
            Err(err) => {
                if self.restore_retries_left > 0 {
                    self.restore_retries_left -= 1;
                    tracing::warn!(
                        %err,
                        retries_left = self.restore_retries_left,
                        "capacity store not ready, will retry"
                    );
                } else {
                    tracing::error!(%err, "capacity store unusable, tracker disabled");
                    self.state = CapTrackState::Err;
                }
            }
        }
    }

    fn try_arm(
        &mut self,
        gauge: &mut (dyn FuelGauge + Send),
        ocv_table: &[OcvCapEntry],
        cur_now: i32,
        ocv: i32,
        boot_volt: i32,
        now_s: u64,
    ) {
        if ocv_table.len() < 2 {
            return;
        }
        // The battery has to be nearly empty for the coulomb delta to
        // reference a trustworthy zero.
        let reference_uv = if self.charger_boot_mode {
            if boot_volt > TRACK_SHUTDOWN_START_VOLTAGE_UV || ocv > TRACK_START_VOLTAGE_UV {
                tracing::debug!("shutdown-boot start condition not met");
                return;
            }
            boot_volt
        } else {
            if cur_now.abs() > TRACK_START_CURRENT_UA || ocv > TRACK_START_VOLTAGE_UV {
                tracing::debug!("powered-on start condition not met");
                return;
            }
            ocv
        };

        let start_cap = ocv_to_cap(ocv_table, reference_uv) * 10;
        if start_cap > TRACK_START_CAP_THRESHOLD {
            tracing::info!(start_cap, "battery not empty enough, session not armed");
            return;
        }

        let clbcnt = match gauge.energy_now() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%err, "coulomb counter read failed, session not armed");
                return;
            }
        };

        self.start_cap = start_cap;
        self.start_clbcnt_uah = clbcnt;
        self.start_time_s = now_s;
        self.state = CapTrackState::Updating;
        tracing::info!(start_cap, clbcnt, "capacity tracking session armed");
    }

    fn update(
        &mut self,
        gauge: &mut (dyn FuelGauge + Send),
        batt_uv: i32,
        cur_now: i32,
        now_s: u64,
    ) {
        if now_s.saturating_sub(self.start_time_s) > TRACK_TIMEOUT_S {
            self.state = CapTrackState::Idle;
            tracing::warn!("capacity tracking session timed out");
            return;
        }

        // Exit mirrors the full-charge stop condition.
        if batt_uv <= self.end_voltage_uv || cur_now >= self.end_current_ua {
            return;
        }

        let clbcnt = match gauge.energy_now() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%err, "coulomb counter read failed at session end");
                return;
            }
        };
        let total_mah = match gauge.total_capacity() {
            Ok(uah) => (uah / 1000) as i32,
            Err(err) => {
                tracing::warn!(%err, "total capacity read failed at session end");
                return;
            }
        };

        // The coulombs below start_cap were never counted; compensate
        // assuming charge and capacity are proportional.
        let measured_mah = (clbcnt - self.start_clbcnt_uah) / 1000;
        let actual = (i64::from(total_mah) * i64::from(self.start_cap) / 1000) as i32 + measured_mah;

        if (actual - total_mah).abs() >= total_mah / 2 {
            self.state = CapTrackState::Idle;
            tracing::info!(
                actual_mah = actual,
                design_mah = total_mah,
                "measured capacity deviates more than half of design, discarded"
            );
            return;
        }

        if let Err(err) = gauge.set_total_capacity(actual as u32) {
            tracing::warn!(%err, "failed to write learned capacity to gauge");
            self.state = CapTrackState::Idle;
            return;
        }
        self.state = CapTrackState::Done;
        tracing::info!(actual_mah = actual, "capacity tracking done");
        self.persist(actual as u32);
    }

    /// Write the XOR-keyed record, retrying a bounded number of times
    /// before declaring the tracker terminally broken.
    fn persist(&mut self, capacity_mah: u32) {
        let words = [
            capacity_mah ^ TRACK_CAPACITY_KEY0,
            capacity_mah ^ TRACK_CAPACITY_KEY1,
        ];
        for attempt in 1..=TRACK_STORE_RETRIES {
            match self.store.save(words) {
                Ok(()) => {
                    self.state = CapTrackState::Idle;
                    tracing::info!(capacity_mah, "learned capacity persisted");
                    return;
                }
                Err(err) => {
                    tracing::warn!(%err, attempt, "capacity record write failed");
                }
            }
        }
        tracing::error!("capacity record write failed permanently, tracker disabled");
        self.state = CapTrackState::Err;
    }
}

impl core::fmt::Debug for CapacityTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CapacityTracker")
            .field("state", &self.state)
            .field("start_cap", &self.start_cap)
            .field("start_time_s", &self.start_time_s)
            .finish()
    }
}

/// Decode a persisted record, returning the capacity only when both words
/// agree. Exposed for backends that want to sanity-check a file offline.
pub fn decode_record(words: [u32; 2]) -> Result<u32> {
    let capacity = words[0] ^ TRACK_CAPACITY_KEY0;
    let check = words[1] ^ TRACK_CAPACITY_KEY1;
    if capacity != check {
        eyre::bail!("capacity record inconsistent: {capacity} != {check}");
    }
    Ok(capacity)
}
