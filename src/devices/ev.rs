use std::sync::Arc;

use crate::devices::types::{Phase, PlanState, SteeringDevice};
use crate::error::{Result, SteeringError};
use crate::privacy::{PrivacyBackend, PrivateRepresentation};
use crate::profile::Profile;
use crate::solver::{BufferPlanner, BufferRequest, PowerLimits};

/// Fixed physical parameters of one charging session.
#[derive(Debug, Clone)]
pub struct EvParams {
    /// First connected interval.
    pub arrival: usize,
    /// First interval after disconnection (exclusive end of the window).
    pub departure: usize,
    /// Battery capacity in watt-hours.
    pub capacity_wh: f64,
    /// Energy to be charged during the session in watt-hours.
    pub request_wh: f64,
    /// Charging power levels in watts.
    pub levels_w: Vec<f64>,
    /// Select from `levels_w` instead of charging continuously.
    pub discrete: bool,
}

impl EvParams {
    fn power(&self) -> PowerLimits<'_> {
        if self.discrete {
            PowerLimits::Discrete {
                levels_w: &self.levels_w,
                required_wh: self.request_wh,
            }
        } else {
            let min_w = self.levels_w.iter().copied().fold(f64::INFINITY, f64::min);
            let max_w = self
                .levels_w
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            PowerLimits::Continuous { min_w, max_w }
        }
    }

    /// Plans inside the window and pads with zeros to the full horizon.
    fn solve(&self, planner: &dyn BufferPlanner, dt_hours: f64, desired: &[f64]) -> Profile {
        let mut out = vec![0.0; desired.len()];
        let end = self.departure.min(desired.len());
        let start = self.arrival.min(end);

        let request = BufferRequest {
            desired: &desired[start..end],
            capacity_wh: self.capacity_wh,
            initial_wh: self.capacity_wh - self.request_wh,
            target_wh: self.capacity_wh,
            demand_w: &[],
            losses_w: &[],
            dt_hours,
            power: self.power(),
        };
        for (slot, value) in out[start..end].iter_mut().zip(planner.plan(&request)) {
            *slot = value;
        }
        out
    }
}

/// An electric vehicle that can only charge while connected.
///
/// The vehicle arrives with `capacity - request` stored and must leave full.
/// Outside `[arrival, departure)` its profile is exactly zero.
///
/// # Power Flow Convention
/// Returns **positive** values (consumption / load on the grid).
pub struct ElectricVehicle {
    name: String,
    params: EvParams,
    dt_hours: f64,
    planner: Arc<dyn BufferPlanner>,
    state: PlanState,
}

impl ElectricVehicle {
    /// Creates a new vehicle.
    ///
    /// # Arguments
    ///
    /// * `name` - Device name used in logs and errors
    /// * `params` - Session parameters
    /// * `dt_hours` - Interval length in hours (must be > 0)
    /// * `planner` - Feasible-profile planner
    ///
    /// # Panics
    ///
    /// Panics if the capacity is not positive, the request exceeds the
    /// capacity, the level set is empty or non-finite, or the window is
    /// reversed.
    pub fn new(
        name: impl Into<String>,
        params: EvParams,
        dt_hours: f64,
        planner: Arc<dyn BufferPlanner>,
    ) -> Self {
        assert!(params.capacity_wh > 0.0);
        assert!(params.request_wh >= 0.0 && params.request_wh <= params.capacity_wh);
        assert!(!params.levels_w.is_empty());
        assert!(params.levels_w.iter().all(|l| l.is_finite()));
        assert!(params.departure >= params.arrival);
        assert!(dt_hours > 0.0);

        Self {
            name: name.into(),
            params,
            dt_hours,
            planner,
            state: PlanState::default(),
        }
    }

    pub fn params(&self) -> &EvParams {
        &self.params
    }

    /// Committed profile, available after `init`.
    pub fn profile(&self) -> Option<&[f64]> {
        self.state.profile()
    }
}

impl SteeringDevice for ElectricVehicle {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> &'static str {
        "ElectricVehicle"
    }

    fn phase(&self) -> Phase {
        self.state.phase()
    }

    fn init(
        &mut self,
        desired: &[f64],
        backend: &dyn PrivacyBackend,
    ) -> Result<PrivateRepresentation> {
        if self.params.departure > desired.len() {
            return Err(SteeringError::WindowOutOfRange {
                device: self.name.clone(),
                start: self.params.arrival,
                end: self.params.departure,
                horizon: desired.len(),
            });
        }
        let Self {
            name,
            params,
            dt_hours,
            planner,
            state,
        } = self;
        state.init_with(name, desired, backend, |d| {
            params.solve(planner.as_ref(), *dt_hours, d)
        })
    }

    fn plan(&mut self, round: usize, difference: &[f64]) -> Result<f64> {
        let Self {
            name,
            params,
            dt_hours,
            planner,
            state,
        } = self;
        state.plan_with(name, round, difference, |d| {
            params.solve(planner.as_ref(), *dt_hours, d)
        })
    }

    fn accept(
        &mut self,
        round: usize,
        backend: &dyn PrivacyBackend,
    ) -> Result<PrivateRepresentation> {
        self.state.accept_with(&self.name, round, backend)
    }
}
