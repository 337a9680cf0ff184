#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Battery charging supervisor (hardware-agnostic).
//!
//! This crate is the decision engine of the charging stack. All device
//! interaction goes through the `charger_traits` seams.
//!
//! ## Architecture
//!
//! - **Gateway**: per-cycle telemetry snapshots with per-field fallback
//!   (`gateway` module)
//! - **JEITA**: temperature-zone charge limits with hysteresis and
//!   debounce (`jeita` module)
//! - **Guard**: ordered anomaly chain deciding charger enable/disable
//!   (`supervisor` module)
//! - **Fast charge**: debounced 5 V↔9 V negotiation with rollback
//!   (`fastcharge` module)
//! - **Capacity**: reported-SOC slew limiting and one-shot coulomb
//!   calibration (`estimator`/`tracker` modules)
//! - **Registry**: instance list plus the timer-driven pollers
//!   (`registry` module)
//!
//! ## Units
//!
//! Voltages in µV, currents in µA (positive while charging), temperature
//! in tenths of °C, state of charge in ‰, accumulated charge in µAh.

pub mod builder;
pub mod config;
pub mod error;
pub mod estimator;
pub mod events;
pub mod fastcharge;
pub mod gateway;
pub mod jeita;
pub mod mocks;
pub mod registry;
pub mod supervisor;
pub mod tracker;
pub mod util;

pub use builder::{Missing, Set, SupervisorBuilder};
pub use config::{ChargerDesc, JeitaKind, JeitaTables, PollMode, PresentMode};
pub use error::{BuildError, CoreError, Result};
pub use estimator::{CapacityEstimator, ChargeStatus, EstimatorSample};
pub use events::{EventPublisher, LogSink};
pub use fastcharge::{FAST_CHARGE_VOLTAGE_5V, FAST_CHARGE_VOLTAGE_9V, FastChargePhase};
pub use gateway::{BatteryReading, SensorGateway};
pub use jeita::{JeitaMonitor, JeitaRow, JeitaStatus, ThermalDecision};
pub use registry::{CAP_POLL_PERIOD, Poller, SupervisorHandle, SupervisorRegistry};
pub use supervisor::{AnomalyFlags, ChargerSupervisor, ChargingState};
pub use tracker::{CapTrackState, CapacityTracker, OcvCapEntry, ocv_to_cap};
