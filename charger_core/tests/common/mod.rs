#![allow(dead_code)]
//! Shared rig for supervisor integration tests: a supervisor wired to
//! shared-handle mocks plus a deterministic clock.

use charger_core::mocks::{MemStore, MockCharger, MockEventSink, MockFastCharger, MockFuelGauge};
use charger_core::{ChargerDesc, ChargerSupervisor};
use charger_traits::clock::test_clock::TestClock;

pub struct Rig {
    pub sup: ChargerSupervisor,
    pub gauge: MockFuelGauge,
    pub main: MockCharger,
    pub second: Option<MockCharger>,
    pub fast: Option<MockFastCharger>,
    pub sink: MockEventSink,
    pub clock: TestClock,
}

/// Descriptor with the usual full-battery thresholds configured.
pub fn desc_fullbatt() -> ChargerDesc {
    ChargerDesc {
        fullbatt_uv: 4_350_000,
        fullbatt_ua: 120_000,
        fullbatt_vchkdrop_uv: 50_000,
        ..ChargerDesc::default()
    }
}

/// Single online charger, healthy mid-charge battery.
pub fn rig(desc: ChargerDesc) -> Rig {
    let gauge = MockFuelGauge::default();
    let main = MockCharger::online();
    let sink = MockEventSink::default();
    let clock = TestClock::new();

    let sup = ChargerSupervisor::builder()
        .with_fuel_gauge(gauge.clone())
        .with_charger(main.clone())
        .with_desc(desc)
        .with_event_sink(sink.clone())
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build supervisor");

    Rig {
        sup,
        gauge,
        main,
        second: None,
        fast: None,
        sink,
        clock,
    }
}

/// Dual-charger rig with a fast-charge capable adapter.
pub fn rig_fast(desc: ChargerDesc) -> Rig {
    let gauge = MockFuelGauge::default();
    let main = MockCharger::online();
    let second = MockCharger::online();
    let fast = MockFastCharger::capable();
    let sink = MockEventSink::default();
    let clock = TestClock::new();

    let sup = ChargerSupervisor::builder()
        .with_fuel_gauge(gauge.clone())
        .with_charger(main.clone())
        .with_second_charger(second.clone())
        .with_fast_charger(fast.clone())
        .with_desc(desc)
        .with_event_sink(sink.clone())
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build supervisor");

    Rig {
        sup,
        gauge,
        main,
        second: Some(second),
        fast: Some(fast),
        sink,
        clock,
    }
}

/// Tracking rig: capacity tracker armed against the given store.
pub fn rig_tracking(mut desc: ChargerDesc, store: MemStore) -> Rig {
    desc.cap_tracking = true;
    if desc.ocv_table.is_empty() {
        desc.ocv_table = ocv_table();
    }

    let gauge = MockFuelGauge::default();
    let main = MockCharger::online();
    let sink = MockEventSink::default();
    let clock = TestClock::new();

    let sup = ChargerSupervisor::builder()
        .with_fuel_gauge(gauge.clone())
        .with_charger(main.clone())
        .with_desc(desc)
        .with_event_sink(sink.clone())
        .with_capacity_store(store)
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build supervisor");

    Rig {
        sup,
        gauge,
        main,
        second: None,
        fast: None,
        sink,
        clock,
    }
}

pub fn ocv_table() -> Vec<charger_core::OcvCapEntry> {
    vec![
        charger_core::OcvCapEntry { ocv_uv: 4_185_000, capacity: 100 },
        charger_core::OcvCapEntry { ocv_uv: 3_900_000, capacity: 60 },
        charger_core::OcvCapEntry { ocv_uv: 3_650_000, capacity: 5 },
        charger_core::OcvCapEntry { ocv_uv: 3_400_000, capacity: 0 },
    ]
}
