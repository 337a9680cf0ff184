use criterion::{Criterion, criterion_group, criterion_main};

use charger_core::mocks::{MockCharger, MockEventSink, MockFuelGauge};
use charger_core::{ChargerDesc, ChargerSupervisor};

fn build_supervisor() -> ChargerSupervisor {
    let desc = ChargerDesc {
        fullbatt_uv: 4_350_000,
        fullbatt_ua: 120_000,
        fullbatt_vchkdrop_uv: 50_000,
        normal_charge_voltage_max_uv: 6_500_000,
        normal_charge_voltage_drop_uv: 700_000,
        wdt_interval_s: 15,
        ..ChargerDesc::default()
    };
    ChargerSupervisor::builder()
        .with_fuel_gauge(MockFuelGauge::default())
        .with_charger(MockCharger::online())
        .with_desc(desc)
        .with_event_sink(MockEventSink::default())
        .build()
        .expect("build supervisor")
}

fn bench_monitor_tick(c: &mut Criterion) {
    let mut sup = build_supervisor();
    c.bench_function("monitor_tick", |b| {
        b.iter(|| sup.monitor_tick());
    });
}

fn bench_capacity_tick(c: &mut Criterion) {
    let mut sup = build_supervisor();
    c.bench_function("capacity_tick", |b| {
        b.iter(|| sup.capacity_tick());
    });
}

criterion_group!(benches, bench_monitor_tick, bench_capacity_tick);
criterion_main!(benches);
