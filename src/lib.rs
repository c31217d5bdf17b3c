//! Privacy-preserving profile steering for fleets of flexible energy devices.
//!
//! A [`steering::Coordinator`] drives devices toward a target profile. Each
//! device keeps its own profile private and only ever hands out a
//! [`privacy::PrivateRepresentation`]; the coordinator learns nothing beyond
//! the aggregate and per-round improvement scores.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod devices;
pub mod error;
pub mod forecast;
pub mod io;
pub mod privacy;
pub mod profile;
pub mod scenario;
pub mod solver;
/// Coordinator, round log, target schedules, and KPIs.
pub mod steering;

pub use error::{ErrorKind, Result, SteeringError};
