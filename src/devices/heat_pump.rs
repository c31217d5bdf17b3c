use std::sync::Arc;

use crate::devices::types::{Phase, PlanState, SteeringDevice};
use crate::error::Result;
use crate::privacy::{PrivacyBackend, PrivateRepresentation};
use crate::profile::{self, Profile};
use crate::solver::{BufferPlanner, BufferRequest, PowerLimits};

/// Fixed physical parameters of a heat pump with thermal storage.
#[derive(Debug, Clone)]
pub struct HeatPumpParams {
    /// Thermal buffer capacity in watt-hours.
    pub capacity_wh: f64,
    /// Minimum electrical power in watts.
    pub min_w: f64,
    /// Maximum electrical power in watts.
    pub max_w: f64,
    /// Initial buffer fill as a fraction of capacity (0.0 to 1.0).
    pub initial_fill: f64,
    /// Heat drawn from the buffer per interval in watts; one value per interval.
    pub demand_w: Vec<f64>,
}

impl HeatPumpParams {
    fn solve(&self, planner: &dyn BufferPlanner, dt_hours: f64, desired: &[f64]) -> Profile {
        let initial_wh = self.initial_fill * self.capacity_wh;
        planner.plan(&BufferRequest {
            desired,
            capacity_wh: self.capacity_wh,
            initial_wh,
            target_wh: initial_wh,
            demand_w: &self.demand_w,
            losses_w: &[],
            dt_hours,
            power: PowerLimits::Continuous {
                min_w: self.min_w,
                max_w: self.max_w,
            },
        })
    }
}

/// A heat pump feeding a thermal buffer that is drained by heat demand.
///
/// Active over the whole horizon. The buffer must end the horizon at the
/// level it started with.
pub struct HeatPump {
    name: String,
    params: HeatPumpParams,
    dt_hours: f64,
    planner: Arc<dyn BufferPlanner>,
    state: PlanState,
}

impl HeatPump {
    /// Creates a new heat pump.
    ///
    /// # Panics
    ///
    /// Panics if `capacity_wh` <= 0, `min_w` > `max_w`, `initial_fill` is
    /// outside `[0, 1]`, any demand is negative, or `dt_hours` <= 0.
    pub fn new(
        name: impl Into<String>,
        params: HeatPumpParams,
        dt_hours: f64,
        planner: Arc<dyn BufferPlanner>,
    ) -> Self {
        assert!(params.capacity_wh > 0.0);
        assert!(params.min_w <= params.max_w);
        assert!((0.0..=1.0).contains(&params.initial_fill));
        assert!(params.demand_w.iter().all(|d| *d >= 0.0));
        assert!(dt_hours > 0.0);

        Self {
            name: name.into(),
            params,
            dt_hours,
            planner,
            state: PlanState::default(),
        }
    }

    pub fn params(&self) -> &HeatPumpParams {
        &self.params
    }

    /// Committed profile, available after `init`.
    pub fn profile(&self) -> Option<&[f64]> {
        self.state.profile()
    }
}

impl SteeringDevice for HeatPump {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> &'static str {
        "HeatPump"
    }

    fn phase(&self) -> Phase {
        self.state.phase()
    }

    fn init(
        &mut self,
        desired: &[f64],
        backend: &dyn PrivacyBackend,
    ) -> Result<PrivateRepresentation> {
        profile::ensure_len("heat pump demand", desired.len(), self.params.demand_w.len())?;
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
