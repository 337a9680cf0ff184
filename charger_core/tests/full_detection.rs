mod common;

use charger_core::{ChargeStatus, ChargerDesc};
use charger_traits::EventKind;
use common::{desc_fullbatt, rig};

#[test]
fn single_transient_sample_does_not_assert_full() {
    let mut r = rig(desc_fullbatt());

    // Below the full voltage: charging starts.
    r.gauge.state().voltage_avg_uv = 4_349_999;
    r.gauge.state().current_avg_ua = 100_000;
    assert!(r.sup.monitor_tick());
    assert!(r.sup.charging_state().charger_enabled);

    // One qualifying sample only.
    r.gauge.state().voltage_avg_uv = 4_350_000;
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled, "one sample must not stop charging");
    assert!(!r.sink.kinds().contains(&EventKind::BatteryFull));
}

#[test]
fn full_asserts_on_second_consecutive_sample() {
    let mut r = rig(desc_fullbatt());

    // fullbatt_uV - 1, then fullbatt_uV twice with taper current.
    r.gauge.state().voltage_avg_uv = 4_349_999;
    r.gauge.state().current_avg_ua = 100_000;
    r.sup.monitor_tick();

    r.gauge.state().voltage_avg_uv = 4_350_000;
    r.sup.monitor_tick();
    r.sup.monitor_tick();

    assert!(!r.sup.charging_state().charger_enabled, "full battery stops the charger");
    assert!(r.sup.charging_state().force_full);
    assert!(r.sink.kinds().contains(&EventKind::BatteryFull));
}

#[test]
fn third_qualifying_sample_forces_gauge_capacity() {
    let mut r = rig(desc_fullbatt());
    r.gauge.state().voltage_avg_uv = 4_349_999;
    r.gauge.state().current_avg_ua = 100_000;
    r.sup.monitor_tick();

    r.gauge.state().voltage_avg_uv = 4_350_000;
    r.sup.monitor_tick();
    r.sup.monitor_tick();
    assert!(r.gauge.state().adjust_writes.is_empty(), "not yet forced at two samples");

    r.sup.monitor_tick();
    assert_eq!(r.gauge.state().adjust_writes, vec![1000]);
}

#[test]
fn interrupted_dwell_resets_the_counter() {
    let mut r = rig(desc_fullbatt());
    r.gauge.state().voltage_avg_uv = 4_350_000;
    r.gauge.state().current_avg_ua = 100_000;
    r.sup.monitor_tick(); // qualifying, cnt = 1

    // Voltage sags: counter resets.
    r.gauge.state().voltage_avg_uv = 4_200_000;
    r.sup.monitor_tick();

    r.gauge.state().voltage_avg_uv = 4_350_000;
    r.sup.monitor_tick(); // cnt = 1 again
    assert!(r.sup.charging_state().charger_enabled);
    assert!(!r.sink.kinds().contains(&EventKind::BatteryFull));
}

#[test]
fn soc_threshold_alone_declares_full() {
    let desc = ChargerDesc {
        fullbatt_soc: 950,
        ..ChargerDesc::default()
    };
    let mut r = rig(desc);
    r.gauge.state().capacity = 960;
    r.sup.monitor_tick(); // enables, then next tick sees full
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled);
    assert!(r.sink.kinds().contains(&EventKind::BatteryFull));
}

#[test]
fn full_status_is_reported_while_powered() {
    let mut r = rig(desc_fullbatt());
    r.gauge.state().voltage_avg_uv = 4_350_000;
    r.gauge.state().current_avg_ua = 100_000;
    r.sup.monitor_tick();
    r.sup.monitor_tick();
    assert_eq!(r.sup.charge_status(), ChargeStatus::Full);
}
