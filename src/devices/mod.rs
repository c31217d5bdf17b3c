//! Steerable device models and the contract the coordinator drives them through.

/// Household base-load profile generator.
pub mod baseload;
/// Connection-windowed electric vehicle.
pub mod ev;
/// Heat pump with a thermal buffer and exogenous demand.
pub mod heat_pump;
pub mod types;

pub use baseload::BaseLoad;
pub use ev::{ElectricVehicle, EvParams};
pub use heat_pump::{HeatPump, HeatPumpParams};
pub use types::{Phase, PlanState, SteeringDevice};
