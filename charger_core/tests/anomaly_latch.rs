mod common;

use charger_core::ChargerDesc;
use charger_traits::{BatteryHealth, EventKind};
use common::rig;

fn desc_voltage_guard() -> ChargerDesc {
    ChargerDesc {
        normal_charge_voltage_max_uv: 6_500_000,
        normal_charge_voltage_drop_uv: 700_000,
        ..ChargerDesc::default()
    }
}

#[test]
fn over_voltage_latches_and_recovers_at_drop_margin() {
    let mut r = rig(desc_voltage_guard());
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled);

    // Charge voltage climbs above the limit: stop and latch.
    r.gauge.state().charge_voltage_uv = 7_000_000;
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled);
    assert_eq!(r.sup.battery_health(), BatteryHealth::OverVoltage);
    assert!(r.sink.kinds().contains(&EventKind::Discharging));

    // A dip back under the max, but above max - drop, must NOT recharge.
    r.gauge.state().charge_voltage_uv = 6_100_000;
    r.sup.monitor_tick();
    assert!(
        !r.sup.charging_state().charger_enabled,
        "latched anomaly must hold inside the hysteresis band"
    );

    // At or below max - drop the latch clears and charging resumes.
    r.gauge.state().charge_voltage_uv = 5_800_000;
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled);
    assert_eq!(r.sup.battery_health(), BatteryHealth::Good);
    assert!(r.sink.kinds().contains(&EventKind::Recharging));
}

#[test]
fn bad_health_latches_until_good() {
    let mut r = rig(ChargerDesc::default());
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled);

    r.main.state().health = BatteryHealth::Overheat;
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled);

    // Still bad: stays stopped.
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled);

    r.main.state().health = BatteryHealth::Good;
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled);
    assert!(r.sink.kinds().contains(&EventKind::Recharging));
}

#[test]
fn unknown_health_is_not_an_anomaly() {
    let mut r = rig(ChargerDesc::default());
    r.sup.monitor_tick();
    r.main.state().health = BatteryHealth::Unknown;
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled, "unknown health must not stop charging");
}

#[test]
fn voltage_anomaly_blocks_other_guards() {
    let mut r = rig(desc_voltage_guard());
    r.sup.monitor_tick();
    r.gauge.state().charge_voltage_uv = 7_000_000;
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled);

    // Health goes bad while the voltage anomaly is latched; the health
    // guard defers and the stop stays attributed to the voltage.
    r.main.state().health = BatteryHealth::Overheat;
    r.sup.monitor_tick();
    assert_eq!(r.sup.battery_health(), BatteryHealth::OverVoltage);
}
