#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Hardware backends for the charging supervisor.
//!
//! Implements the `charger_traits` seams against the Linux
//! power-supply-class sysfs surface, plus the file-backed capacity
//! calibration record.

pub mod error;
pub mod store;
pub mod sysfs;

pub use error::HwError;
pub use store::FileCapacityStore;
pub use sysfs::{SysfsCharger, SysfsFastCharger, SysfsFuelGauge};
