//! JEITA thermal-current table: temperature zone classification with
//! recovery-temperature hysteresis and a consecutive-sample debounce.
//!
//! A table has exactly four boundary rows splitting the temperature axis
//! into five zones. Rows are ordered by ascending `temp`; charging stops
//! entirely in the outermost zones.

/// One zone boundary. Temperatures are tenths of °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JeitaRow {
    pub temp: i32,
    /// Hysteresis bound that must be re-crossed before leaving the
    /// adjacent zone again.
    pub recovery_temp: i32,
    pub current_ua: i32,
    pub term_volt_uv: i32,
}

/// Temperature zone relative to the four table boundaries T0..T3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JeitaStatus {
    BelowT0 = 0,
    T0ToT1 = 1,
    T1ToT2 = 2,
    T2ToT3 = 3,
    AboveT3 = 4,
}

/// What the active zone allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermalDecision {
    /// Outermost zone: charging must stop.
    Stop { cold: bool },
    /// Charge with the zone's limits.
    Charge { current_ua: i32, term_volt_uv: i32 },
}

/// Classify `temp` against the table, honouring the hysteresis latch.
///
/// The zone whose lower bound the temperature exceeds wins, but a move
/// toward the previous zone is suppressed until the temperature clears
/// the neighbouring row's `recovery_temp`.
pub fn classify(table: &[JeitaRow; 4], temp: i32, last: JeitaStatus) -> JeitaStatus {
    let mut zone = None;
    for i in (0..table.len()).rev() {
        if (i > 0 && temp >= table[i].temp) || (i == 0 && temp > table[i].temp) {
            zone = Some(i);
            break;
        }
    }

    match zone {
        None => JeitaStatus::BelowT0,
        Some(3) => JeitaStatus::AboveT3,
        Some(2) => {
            if last != JeitaStatus::AboveT3 || temp <= table[3].recovery_temp {
                JeitaStatus::T2ToT3
            } else {
                JeitaStatus::AboveT3
            }
        }
        Some(1) => {
            if (last != JeitaStatus::T2ToT3 || temp <= table[2].recovery_temp)
                && (last != JeitaStatus::T0ToT1 || temp >= table[1].recovery_temp)
            {
                JeitaStatus::T1ToT2
            } else {
                last
            }
        }
        Some(0) => {
            if last != JeitaStatus::BelowT0 || temp >= table[0].recovery_temp {
                JeitaStatus::T0ToT1
            } else {
                JeitaStatus::BelowT0
            }
        }
        Some(_) => unreachable!("zone index bounded by table length"),
    }
}

/// Map a zone to its charge limits, clamped by an externally supplied
/// thermal-mitigation cap where one is active.
pub fn adjust(
    table: &[JeitaRow; 4],
    status: JeitaStatus,
    thermal_cap_ua: Option<i32>,
) -> ThermalDecision {
    match status {
        JeitaStatus::BelowT0 => ThermalDecision::Stop { cold: true },
        JeitaStatus::AboveT3 => ThermalDecision::Stop { cold: false },
        zone => {
            let row = table[zone as usize];
            let mut current_ua = row.current_ua;
            if let Some(cap) = thermal_cap_ua
                && cap >= 0
                && cap < current_ua
            {
                tracing::debug!(cap, current_ua, "thermal cap below jeita current");
                current_ua = cap;
            }
            ThermalDecision::Charge {
                current_ua,
                term_volt_uv: row.term_volt_uv,
            }
        }
    }
}

/// Per-instance debounce state for zone transitions.
///
/// The hysteresis latch (`hyst_last`) feeds [`classify`]; the applied
/// latch changes only after three consecutive same-direction
/// classifications, so a single noisy sample cannot move the charge
/// profile.
#[derive(Debug, Clone)]
pub struct JeitaMonitor {
    hyst_last: JeitaStatus,
    applied: Option<JeitaStatus>,
    up_trigger: u8,
    down_trigger: u8,
}

impl Default for JeitaMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl JeitaMonitor {
    pub fn new() -> Self {
        Self {
            hyst_last: JeitaStatus::BelowT0,
            applied: None,
            up_trigger: 0,
            down_trigger: 0,
        }
    }

    /// Zone currently applied to the chargers, if any.
    pub fn applied(&self) -> Option<JeitaStatus> {
        self.applied
    }

    /// Classify once and update the hysteresis latch without debouncing.
    pub fn classify_once(&mut self, table: &[JeitaRow; 4], temp: i32) -> JeitaStatus {
        let status = classify(table, temp, self.hyst_last);
        self.hyst_last = status;
        status
    }

    /// Feed one temperature sample. Returns the zone to (re)apply, or
    /// `None` while the debounce is still filtering.
    pub fn observe(&mut self, table: &[JeitaRow; 4], temp: i32) -> Option<JeitaStatus> {
        let cur = self.classify_once(table, temp);
        let Some(last) = self.applied else {
            // First sample after a reset applies immediately so a fresh
            // cable gets a charge profile without waiting out the filter.
            self.applied = Some(cur);
            self.up_trigger = 0;
            self.down_trigger = 0;
            return Some(cur);
        };

        if cur > last {
            self.down_trigger = 0;
            self.up_trigger += 1;
            if self.up_trigger > 2 {
                self.apply(cur);
                return Some(cur);
            }
        } else if cur < last {
            self.up_trigger = 0;
            self.down_trigger += 1;
            if self.down_trigger > 2 {
                self.apply(cur);
                return Some(cur);
            }
        } else {
            self.up_trigger = 0;
            self.down_trigger = 0;
        }
        None
    }

    /// Latch a zone directly (table switch, jeita-disabled override).
    pub fn force(&mut self, status: JeitaStatus) {
        self.hyst_last = status;
        self.apply(status);
    }

    /// Forget the applied zone; the next sample re-applies immediately.
    /// Called when external power detaches.
    pub fn reset(&mut self) {
        self.applied = None;
        self.up_trigger = 0;
        self.down_trigger = 0;
    }

    fn apply(&mut self, status: JeitaStatus) {
        self.applied = Some(status);
        self.up_trigger = 0;
        self.down_trigger = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Boundaries at -10.0, 5.0, 45.0, 55.0 °C with 3.0 °C recovery bands.
    fn table() -> [JeitaRow; 4] {
        [
            JeitaRow { temp: -100, recovery_temp: -70, current_ua: 0, term_volt_uv: 4_100_000 },
            JeitaRow { temp: 50, recovery_temp: 80, current_ua: 500_000, term_volt_uv: 4_350_000 },
            JeitaRow { temp: 450, recovery_temp: 420, current_ua: 1_500_000, term_volt_uv: 4_350_000 },
            JeitaRow { temp: 550, recovery_temp: 520, current_ua: 700_000, term_volt_uv: 4_100_000 },
        ]
    }

    #[test]
    fn classifies_plain_zones() {
        let t = table();
        assert_eq!(classify(&t, -200, JeitaStatus::T1ToT2), JeitaStatus::BelowT0);
        assert_eq!(classify(&t, 0, JeitaStatus::T1ToT2), JeitaStatus::T0ToT1);
        assert_eq!(classify(&t, 250, JeitaStatus::T1ToT2), JeitaStatus::T1ToT2);
        assert_eq!(classify(&t, 500, JeitaStatus::T1ToT2), JeitaStatus::T2ToT3);
        assert_eq!(classify(&t, 600, JeitaStatus::T2ToT3), JeitaStatus::AboveT3);
    }

    #[test]
    fn falling_out_of_hot_zone_requires_recovery_temp() {
        let t = table();
        // Latched AboveT3; 54.9 °C is below the 55.0 boundary but above
        // the 52.0 recovery temperature: stay latched.
        assert_eq!(classify(&t, 549, JeitaStatus::AboveT3), JeitaStatus::AboveT3);
        // At the recovery bound the zone finally drops.
        assert_eq!(classify(&t, 520, JeitaStatus::AboveT3), JeitaStatus::T2ToT3);
    }

    #[test]
    fn warming_out_of_cool_zone_requires_recovery_temp() {
        let t = table();
        // Latched T0ToT1; 6.0 °C crossed the 5.0 boundary upward but not
        // the 8.0 recovery bound: stay latched.
        assert_eq!(classify(&t, 60, JeitaStatus::T0ToT1), JeitaStatus::T0ToT1);
        assert_eq!(classify(&t, 80, JeitaStatus::T0ToT1), JeitaStatus::T1ToT2);
    }

    #[test]
    fn oscillation_at_boundary_does_not_chatter() {
        let t = table();
        let mut status = JeitaStatus::T1ToT2;
        let mut transitions = 0;
        for temp in [449, 450, 449, 450, 449, 450] {
            let next = classify(&t, temp, status);
            if next != status {
                transitions += 1;
            }
            status = next;
        }
        // One genuine crossing; the ±0.1 °C wiggle stays latched.
        assert_eq!(transitions, 1);
        assert_eq!(status, JeitaStatus::T2ToT3);
    }

    #[test]
    fn monitor_applies_first_sample_immediately() {
        let t = table();
        let mut mon = JeitaMonitor::new();
        assert_eq!(mon.observe(&t, 250), Some(JeitaStatus::T1ToT2));
        assert_eq!(mon.applied(), Some(JeitaStatus::T1ToT2));
    }

    #[test]
    fn monitor_needs_three_consecutive_samples_to_move() {
        let t = table();
        let mut mon = JeitaMonitor::new();
        mon.observe(&t, 250);
        assert_eq!(mon.observe(&t, 500), None);
        assert_eq!(mon.observe(&t, 500), None);
        assert_eq!(mon.observe(&t, 500), Some(JeitaStatus::T2ToT3));
    }

    #[test]
    fn monitor_reversal_resets_the_count() {
        let t = table();
        let mut mon = JeitaMonitor::new();
        mon.observe(&t, 250);
        assert_eq!(mon.observe(&t, 500), None);
        assert_eq!(mon.observe(&t, 500), None);
        // Dip back before the third sample: trend restarts.
        assert_eq!(mon.observe(&t, 250), None);
        assert_eq!(mon.observe(&t, 500), None);
        assert_eq!(mon.observe(&t, 500), None);
        assert_eq!(mon.observe(&t, 500), Some(JeitaStatus::T2ToT3));
    }

    #[test]
    fn adjust_stops_at_extremes() {
        let t = table();
        assert_eq!(adjust(&t, JeitaStatus::BelowT0, None), ThermalDecision::Stop { cold: true });
        assert_eq!(adjust(&t, JeitaStatus::AboveT3, None), ThermalDecision::Stop { cold: false });
    }

    #[test]
    fn adjust_returns_row_limits_with_thermal_cap() {
        let t = table();
        assert_eq!(
            adjust(&t, JeitaStatus::T1ToT2, None),
            ThermalDecision::Charge { current_ua: 1_500_000, term_volt_uv: 4_350_000 }
        );
        assert_eq!(
            adjust(&t, JeitaStatus::T1ToT2, Some(900_000)),
            ThermalDecision::Charge { current_ua: 900_000, term_volt_uv: 4_350_000 }
        );
        // A cap above the row current does not raise it.
        assert_eq!(
            adjust(&t, JeitaStatus::T1ToT2, Some(2_000_000)),
            ThermalDecision::Charge { current_ua: 1_500_000, term_volt_uv: 4_350_000 }
        );
        // The hot-side reduced zone charges at its own row's limits.
        assert_eq!(
            adjust(&t, JeitaStatus::T2ToT3, None),
            ThermalDecision::Charge { current_ua: 700_000, term_volt_uv: 4_100_000 }
        );
    }
}
