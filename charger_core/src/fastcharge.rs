//! Fast-charge negotiator: debounced escalation of the adapter output
//! voltage from 5 V to 9 V across a main + secondary charger pair, with
//! best-effort rollback when any step of the enable sequence fails.

use charger_traits::{ChargeProfile, ControlError, EventKind};

use crate::config::JeitaKind;
use crate::error::{CoreError, Result};
use crate::supervisor::ChargerSupervisor;

pub const FAST_CHARGE_VOLTAGE_9V: u32 = 9_000_000;
pub const FAST_CHARGE_VOLTAGE_5V: u32 = 5_000_000;

/// Negotiator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FastChargePhase {
    /// 5 V, single charger.
    #[default]
    Normal,
    /// Enable sequence in flight.
    Enabling,
    /// 9 V, both chargers active.
    FastActive,
    /// Teardown sequence in flight.
    Disabling,
}

#[derive(Debug, Default)]
pub struct FastChargeState {
    pub phase: FastChargePhase,
    /// Consecutive samples above the enable threshold.
    pub enable_count: u32,
    /// Consecutive samples below the disable threshold.
    pub disable_count: u32,
}

impl ChargerSupervisor {
    /// True while the 9 V path is (or may still be) engaged.
    pub(crate) fn fast_active(&self) -> bool {
        matches!(
            self.fastchg.phase,
            FastChargePhase::FastActive | FastChargePhase::Disabling
        )
    }

    pub fn fast_charge_phase(&self) -> FastChargePhase {
        self.fastchg.phase
    }

    /// Driven from every charger enable/disable transition.
    pub(crate) fn try_fast_charger_enable(&mut self, enable: bool) -> Result<()> {
        if enable {
            self.fast_charge_enable_check()?;
            self.fast_charge_disable_check()?;
        } else {
            self.fast_charge_disable()?;
        }
        Ok(())
    }

    fn fast_charge_enable_check(&mut self) -> Result<()> {
        // Never escalate into an emergency.
        if self.state.emergency_stop.is_some() {
            return Ok(());
        }
        // No fast path configured, adapter not fast-capable, or a
        // sequence already ran/is running.
        if self.fast.is_none()
            || !self.is_fast_charge
            || self.fastchg.phase != FastChargePhase::Normal
        {
            return Ok(());
        }

        let batt_uv = self.reading.voltage_avg_uv;
        if batt_uv > self.desc.fast_enable_uv {
            self.fastchg.enable_count += 1;
        } else {
            self.fastchg.enable_count = 0;
        }
        if self.fastchg.enable_count < self.desc.fast_enable_count {
            return Ok(());
        }
        self.fastchg.enable_count = 0;
        self.fastchg.phase = FastChargePhase::Enabling;
        tracing::info!(batt_uv, "fast charge enable sequence starting");

        if let Err(err) = self.main_charger_profile(ChargeProfile::FastCharge) {
            self.rollback_fast_enable();
            return Err(CoreError::Control(err).report());
        }
        if let Err(err) = self.second_charger_profile(ChargeProfile::FastCharge) {
            self.rollback_fast_enable();
            return Err(CoreError::Control(err).report());
        }
        if let Err(err) = self.adjust_fast_charge_voltage(FAST_CHARGE_VOLTAGE_9V) {
            self.rollback_fast_enable();
            return Err(CoreError::Control(err).report());
        }
        if let Err(err) = self.enable_second_charger(true) {
            self.rollback_fast_enable();
            return Err(CoreError::Control(err).report());
        }

        // Over-voltage protection follows the 9 V rail.
        if self.desc.fast_charge_voltage_max_uv != 0 {
            self.charge_voltage_max_uv = self.desc.fast_charge_voltage_max_uv;
        }
        if self.desc.fast_charge_voltage_drop_uv != 0 {
            self.charge_voltage_drop_uv = self.desc.fast_charge_voltage_drop_uv;
        }

        // Fast charging gets its own thermal table.
        self.active_jeita = JeitaKind::FastCharge;
        self.reapply_jeita();

        self.fastchg.phase = FastChargePhase::FastActive;
        tracing::info!("fast charge enabled (9V)");
        self.events.notify(EventKind::Other, "Fast charging");
        Ok(())
    }

    /// Abort a half-run enable sequence: the main charger goes back to
    /// the normal profile so the enable condition can be reached again.
    fn rollback_fast_enable(&mut self) {
        self.fastchg.phase = FastChargePhase::Normal;
        if let Err(err) = self.main_charger_profile(ChargeProfile::Normal) {
            tracing::warn!(%err, "fast-charge rollback: main profile reset failed");
        }
    }

    fn fast_charge_disable_check(&mut self) -> Result<()> {
        if !self.fast_active() {
            return Ok(());
        }
        let batt_uv = self.reading.voltage_avg_uv;
        if batt_uv < self.desc.fast_disable_uv {
            self.fastchg.disable_count += 1;
        } else {
            self.fastchg.disable_count = 0;
        }
        if self.fastchg.disable_count < self.desc.fast_disable_count {
            return Ok(());
        }
        self.fastchg.disable_count = 0;
        self.fast_charge_disable()
    }

    /// Tear the 9 V path down. Also runs against a sequence that never
    /// fully enabled (phase Enabling) as an idempotent safety reset.
    pub(crate) fn fast_charge_disable(&mut self) -> Result<()> {
        match self.fastchg.phase {
            // Nothing engaged, or the teardown is already running
            // further up the stack.
            FastChargePhase::Normal | FastChargePhase::Disabling => return Ok(()),
            FastChargePhase::Enabling | FastChargePhase::FastActive => {}
        }
        let prev = self.fastchg.phase;
        self.fastchg.phase = FastChargePhase::Disabling;

        match self.fast_charge_teardown() {
            Ok(()) => {
                self.fastchg.phase = FastChargePhase::Normal;
                tracing::info!("fast charge disabled (5V)");
                Ok(())
            }
            Err(err) => {
                // Leave the previous phase latched so the disable path
                // retries on the next cycle.
                self.fastchg.phase = prev;
                Err(err)
            }
        }
    }

    fn fast_charge_teardown(&mut self) -> Result<()> {
        self.enable_second_charger(false)
            .map_err(|e| CoreError::Control(e).report())?;
        self.adjust_fast_charge_voltage(FAST_CHARGE_VOLTAGE_5V)
            .map_err(|e| CoreError::Control(e).report())?;
        self.main_charger_profile(ChargeProfile::Normal)
            .map_err(|e| CoreError::Control(e).report())?;

        if self.desc.normal_charge_voltage_max_uv != 0 {
            self.charge_voltage_max_uv = self.desc.normal_charge_voltage_max_uv;
        }
        if self.desc.normal_charge_voltage_drop_uv != 0 {
            self.charge_voltage_drop_uv = self.desc.normal_charge_voltage_drop_uv;
        }

        self.active_jeita = JeitaKind::Dcp;
        self.reapply_jeita();
        Ok(())
    }

    /// A fast-capable adapter starts on the normal profile until the
    /// negotiator raises the rail.
    pub(crate) fn set_fast_charge_setting(&mut self) {
        if self.is_fast_charge
            && !self.fast_active()
            && let Err(err) = self.main_charger_profile(ChargeProfile::Normal)
        {
            tracing::warn!(%err, "failed to reset main charger profile");
        }
    }

    fn main_charger_profile(&mut self, profile: ChargeProfile) -> std::result::Result<(), ControlError> {
        match self.chargers.first_mut() {
            Some(charger) => charger.apply_profile(profile),
            None => Err(ControlError::Unavailable),
        }
    }

    fn second_charger_profile(&mut self, profile: ChargeProfile) -> std::result::Result<(), ControlError> {
        match self.chargers.get_mut(1) {
            Some(charger) => charger.apply_profile(profile),
            None => Ok(()),
        }
    }

    fn enable_second_charger(&mut self, enable: bool) -> std::result::Result<(), ControlError> {
        match self.chargers.get_mut(1) {
            Some(charger) => charger.set_enabled(enable),
            None => Ok(()),
        }
    }

    fn adjust_fast_charge_voltage(&mut self, uv: u32) -> std::result::Result<(), ControlError> {
        match self.fast.as_mut() {
            Some(fast) => fast.set_output_voltage(uv),
            None => Err(ControlError::Unavailable),
        }
    }
}
