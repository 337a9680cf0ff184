mod common;

use std::time::Duration;

use charger_core::{ChargeStatus, ChargerDesc};
use charger_traits::EventKind;
use common::rig;
use rstest::rstest;

#[test]
fn overheat_stops_and_recovery_needs_the_temp_diff_band() {
    let mut r = rig(ChargerDesc::default()); // temp_max 500, diff 50
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled);

    // 55.1 °C: emergency stop.
    r.gauge.state().temperature = 551;
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled);
    assert!(r.sink.kinds().contains(&EventKind::Overheat));

    // 46.0 °C is under temp_max but inside the recovery band: stay stopped.
    r.gauge.state().temperature = 460;
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled);

    // 44.0 °C clears the band: charging resumes.
    r.gauge.state().temperature = 440;
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled);
    assert_eq!(r.sup.charging_state().emergency_stop, None);
}

#[rstest]
#[case::overheat(600, EventKind::Overheat)]
#[case::cold(-30, EventKind::Cold)]
fn out_of_range_temperature_raises_the_matching_event(#[case] temp: i32, #[case] kind: EventKind) {
    let mut r = rig(ChargerDesc::default()); // temp_min 0, temp_max 500
    r.gauge.state().temperature = temp;
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled);
    assert!(r.sink.kinds().contains(&kind));
    assert_eq!(r.sup.charging_state().emergency_stop, Some(kind));
}

#[test]
fn charging_duration_cap_stops_and_discharge_duration_recharges() {
    // With no recharge margin configured the duration cap acts alone.
    let desc = ChargerDesc {
        charging_max_ms: 1_000,
        discharging_max_ms: 2_000,
        fullbatt_vchkdrop_uv: 0,
        ..ChargerDesc::default()
    };
    let mut r = rig(desc);
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled);

    r.clock.advance(Duration::from_millis(1_500));
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled, "charging duration exceeded");
    assert!(r.sink.kinds().contains(&EventKind::Discharging));

    // Still latched short of the discharge duration.
    r.clock.advance(Duration::from_millis(500));
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled);

    r.clock.advance(Duration::from_millis(2_500));
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled, "discharge duration elapsed, recharging");
    assert!(r.sink.kinds().contains(&EventKind::Recharging));
}

#[test]
fn watchdog_is_fed_every_tick() {
    let desc = ChargerDesc {
        wdt_interval_s: 15,
        ..ChargerDesc::default()
    };
    let mut r = rig(desc);
    r.sup.monitor_tick();
    r.sup.monitor_tick();
    r.sup.monitor_tick();
    assert_eq!(r.main.state().watchdog_feeds, 3);
}

#[test]
fn failed_watchdog_feed_aborts_the_tick() {
    let desc = ChargerDesc {
        wdt_interval_s: 15,
        ..ChargerDesc::default()
    };
    let mut r = rig(desc);
    r.main.state().fail_watchdog = true;
    assert!(!r.sup.monitor_tick());
    assert!(!r.sup.charging_state().charger_enabled, "tick aborted before the chain");
}

#[test]
fn charging_event_is_not_repeated() {
    let mut r = rig(ChargerDesc::default());
    r.sup.monitor_tick();
    r.sup.monitor_tick();
    r.sup.monitor_tick();
    let charging_events = r
        .sink
        .events()
        .iter()
        .filter(|(_, m)| m == "CHARGING")
        .count();
    assert_eq!(charging_events, 1, "duplicate CHARGING events must be suppressed");
}

#[test]
fn no_external_power_means_discharging_and_no_enable() {
    let mut r = rig(ChargerDesc::default());
    r.main.state().online = false;
    r.sup.monitor_tick();
    assert!(!r.sup.charging_state().charger_enabled);
    assert_eq!(r.sup.charge_status(), ChargeStatus::Discharging);
}

#[test]
fn thermal_limit_is_pushed_as_input_current() {
    let mut r = rig(ChargerDesc::default());
    r.sup.monitor_tick();
    r.sup.set_thermal_limit(Some(800_000));
    assert_eq!(r.main.state().input_limits, vec![800_000]);
    // Lifting the cap issues no further commands.
    r.sup.set_thermal_limit(None);
    assert_eq!(r.main.state().input_limits, vec![800_000]);
}

#[test]
fn battery_pulled_out_stops_charging() {
    let desc = ChargerDesc {
        battery_present: charger_core::PresentMode::FuelGauge,
        ..ChargerDesc::default()
    };
    let mut r = rig(desc);
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled);

    r.gauge.state().present = false;
    r.sup.battery_changed();
    assert!(!r.sup.charging_state().charger_enabled);
    assert!(r.sink.kinds().contains(&EventKind::BatteryOut));
}

#[test]
fn cable_detach_resets_latches_and_stops() {
    let mut r = rig(ChargerDesc::default());
    r.sup.monitor_tick();
    assert!(r.sup.charging_state().charger_enabled);

    r.main.state().online = false;
    r.sup.cable_changed(EventKind::ExtPowerInOut);
    assert!(!r.sup.charging_state().charger_enabled);
    assert!(r.sink.kinds().contains(&EventKind::ExtPowerInOut));
    assert!(!r.sup.charging_state().force_full);
}
