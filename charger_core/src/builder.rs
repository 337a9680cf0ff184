//! Type-state builder for [`ChargerSupervisor`].
//!
//! The builder enforces at compile time that a fuel gauge, at least one
//! charger and a descriptor are provided before `build()` is available;
//! `try_build()` stays available in any state for dynamic construction.

use std::marker::PhantomData;
use std::sync::Arc;

use charger_traits::{
    CapacityStore, Charger, ChargerType, Clock, EventSink, FastCharger, FuelGauge, MonotonicClock,
};
use eyre::WrapErr;

use crate::config::{ChargerDesc, JeitaKind, PollMode};
use crate::error::{BuildError, CoreError, Report, Result};
use crate::estimator::CapacityEstimator;
use crate::events::{EventPublisher, LogSink};
use crate::fastcharge::FastChargeState;
use crate::gateway::SensorGateway;
use crate::jeita::JeitaMonitor;
use crate::supervisor::{ChargerSupervisor, ChargingState, FullDetector};
use crate::tracker::CapacityTracker;

// Type-state markers.
pub struct Missing;
pub struct Set;

pub struct SupervisorBuilder<G, C, D> {
    gauge: Option<Box<dyn FuelGauge + Send>>,
    chargers: Vec<Box<dyn Charger + Send>>,
    fast: Option<Box<dyn FastCharger + Send>>,
    sink: Option<Box<dyn EventSink + Send>>,
    store: Option<Box<dyn CapacityStore + Send>>,
    desc: Option<ChargerDesc>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    charger_boot_mode: bool,
    _g: PhantomData<G>,
    _c: PhantomData<C>,
    _d: PhantomData<D>,
}

impl Default for SupervisorBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            gauge: None,
            chargers: Vec::new(),
            fast: None,
            sink: None,
            store: None,
            desc: None,
            clock: None,
            charger_boot_mode: false,
            _g: PhantomData,
            _c: PhantomData,
            _d: PhantomData,
        }
    }
}

impl<G, C, D> SupervisorBuilder<G, C, D> {
    fn retag<G2, C2, D2>(self) -> SupervisorBuilder<G2, C2, D2> {
        SupervisorBuilder {
            gauge: self.gauge,
            chargers: self.chargers,
            fast: self.fast,
            sink: self.sink,
            store: self.store,
            desc: self.desc,
            clock: self.clock,
            charger_boot_mode: self.charger_boot_mode,
            _g: PhantomData,
            _c: PhantomData,
            _d: PhantomData,
        }
    }
}

// Setters that advance type-state.
impl<C, D> SupervisorBuilder<Missing, C, D> {
    pub fn with_fuel_gauge(
        mut self,
        gauge: impl FuelGauge + Send + 'static,
    ) -> SupervisorBuilder<Set, C, D> {
        self.gauge = Some(Box::new(gauge));
        self.retag()
    }
}

impl<G, D> SupervisorBuilder<G, Missing, D> {
    /// The first (main) charger.
    pub fn with_charger(
        mut self,
        charger: impl Charger + Send + 'static,
    ) -> SupervisorBuilder<G, Set, D> {
        self.chargers.push(Box::new(charger));
        self.retag()
    }
}

impl<G, D> SupervisorBuilder<G, Set, D> {
    /// The secondary charger for the dual-IC fast-charge path.
    pub fn with_second_charger(mut self, charger: impl Charger + Send + 'static) -> Self {
        self.chargers.push(Box::new(charger));
        self
    }
}

impl<G, C> SupervisorBuilder<G, C, Missing> {
    pub fn with_desc(mut self, desc: ChargerDesc) -> SupervisorBuilder<G, C, Set> {
        self.desc = Some(desc);
        self.retag()
    }
}

// Chainable setters that do not affect type-state.
impl<G, C, D> SupervisorBuilder<G, C, D> {
    pub fn with_fast_charger(mut self, fast: impl FastCharger + Send + 'static) -> Self {
        self.fast = Some(Box::new(fast));
        self
    }

    pub fn with_event_sink(mut self, sink: impl EventSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_capacity_store(mut self, store: impl CapacityStore + Send + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Provide a custom clock implementation; defaults to MonotonicClock.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Mark a boot caused by plugging a charger into a dead battery; the
    /// capacity tracker then arms from the boot voltage.
    pub fn with_charger_boot_mode(mut self, on: bool) -> Self {
        self.charger_boot_mode = on;
        self
    }

    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<ChargerSupervisor> {
        let gauge = self
            .gauge
            .ok_or_else(|| Report::new(BuildError::MissingFuelGauge))?;
        if self.chargers.is_empty() {
            return Err(Report::new(BuildError::MissingCharger));
        }
        let mut desc = self.desc.ok_or_else(|| Report::new(BuildError::MissingDesc))?;

        if desc.polling_mode != PollMode::Disable && desc.polling_interval_ms == 0 {
            return Err(Report::new(BuildError::InvalidConfig(
                "polling interval must be > 0",
            )));
        }

        // Threshold pairs only work complete; half-configured pairs are
        // disabled rather than guessed at.
        if desc.charging_max_ms == 0 || desc.discharging_max_ms == 0 {
            if desc.charging_max_ms != desc.discharging_max_ms {
                tracing::info!("charging duration limits incomplete, disabling the pair");
            }
            desc.charging_max_ms = 0;
            desc.discharging_max_ms = 0;
        }
        if desc.normal_charge_voltage_max_uv == 0 || desc.normal_charge_voltage_drop_uv == 0 {
            if desc.normal_charge_voltage_max_uv != 0 || desc.normal_charge_voltage_drop_uv != 0 {
                tracing::info!("charge voltage limits incomplete, disabling the pair");
            }
            desc.normal_charge_voltage_max_uv = 0;
            desc.normal_charge_voltage_drop_uv = 0;
        }
        if desc.measure_battery_temp {
            if desc.temp_max == 0 {
                desc.temp_max = 500;
            }
            if desc.temp_diff == 0 {
                desc.temp_diff = 50;
            }
        }
        if desc.fast_enable_count == 0 || desc.fast_disable_count == 0 {
            return Err(Report::new(BuildError::InvalidConfig(
                "fast charge debounce counts must be >= 1",
            )));
        }
        if desc.cap_tracking && self.store.is_none() {
            return Err(Report::new(BuildError::InvalidConfig(
                "capacity tracking requires a store",
            )));
        }
        if desc.cap_tracking && desc.ocv_table.len() < 2 {
            return Err(Report::new(BuildError::InvalidConfig(
                "capacity tracking requires an ocv table",
            )));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let epoch = clock.now();

        let mut gateway = SensorGateway::new(gauge);
        // The supervisor cannot start blind: the boot capacity must read.
        let initial_cap = gateway
            .gauge_mut()
            .capacity()
            .map_err(|e| Report::new(CoreError::Sensor(e)))
            .wrap_err("reading initial battery capacity")?;
        let reading = gateway.snapshot();

        let estimator = CapacityEstimator::new(
            initial_cap,
            desc.cap_one_time_s,
            desc.trickle_time_out_s,
            desc.fullbatt_uv,
            desc.fullbatt_vchkdrop_uv,
            0,
        );
        let tracker = if desc.cap_tracking {
            self.store.map(|store| {
                CapacityTracker::new(store, desc.fullbatt_uv, desc.fullbatt_ua, self.charger_boot_mode)
            })
        } else {
            None
        };
        let events = EventPublisher::new(
            self.sink.unwrap_or_else(|| Box::new(LogSink)),
        );

        let charge_voltage_max_uv = desc.normal_charge_voltage_max_uv;
        let charge_voltage_drop_uv = desc.normal_charge_voltage_drop_uv;

        Ok(ChargerSupervisor {
            desc,
            gateway,
            chargers: self.chargers,
            fast: self.fast,
            events,
            clock,
            epoch,
            state: ChargingState::default(),
            reading,
            jeita: JeitaMonitor::new(),
            jeita_normal: true,
            jeita_disabled: false,
            active_jeita: JeitaKind::Unknown,
            thm_adjust_ua: None,
            fastchg: FastChargeState::default(),
            is_fast_charge: false,
            charge_voltage_max_uv,
            charge_voltage_drop_uv,
            estimator,
            tracker,
            full: FullDetector::default(),
            full_detected: false,
            charger_type: ChargerType::Unknown,
            uvlo_trigger_cnt: 0,
        })
    }
}

impl SupervisorBuilder<Set, Set, Set> {
    /// Validate and build. Only available once a gauge, a charger and a
    /// descriptor are set.
    pub fn build(self) -> Result<ChargerSupervisor> {
        self.try_build()
    }
}
