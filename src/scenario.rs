//! Config-driven fleet construction and the end-to-end steering run.

use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::info;

use crate::config::{ScenarioConfig, TargetKind};
use crate::devices::{
    BaseLoad, ElectricVehicle, EvParams, HeatPump, HeatPumpParams, SteeringDevice,
};
use crate::error::Result;
use crate::forecast::NaiveForecast;
use crate::profile::Profile;
use crate::solver::{BufferPlanner, PairwisePlanner};
use crate::steering::{Coordinator, DayAheadSchedule, Horizon, RoundRecord, SteeringReport};

/// Seed offset for the EV fleet RNG to avoid correlation with the base load.
const EV_SEED_OFFSET: u64 = 57;
/// Seed offset for the heat pump demand RNG.
const HEAT_PUMP_SEED_OFFSET: u64 = 91;

/// Everything needed to start a run, before any device is initialized.
pub struct Scenario {
    pub horizon: Horizon,
    /// Uncontrolled base load over the horizon (W).
    pub base_load: Profile,
    /// Fleet target `p` (W).
    pub target: Profile,
    pub devices: Vec<Box<dyn SteeringDevice>>,
    /// Energy the fleet consumes over the horizon (Wh).
    pub fleet_energy_wh: f64,
}

/// Result of a complete run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub horizon: Horizon,
    /// Name of the privacy backend used.
    pub backend: &'static str,
    pub target: Profile,
    pub base_load: Profile,
    /// Aggregate revealed by `init`.
    pub initial: Profile,
    /// Aggregate after the last round.
    pub profile: Profile,
    pub rounds: Vec<RoundRecord>,
    pub report: SteeringReport,
}

fn hour_to_step(hour: f64, horizon: &Horizon) -> usize {
    ((hour / horizon.dt_hours).round().max(0.0) as usize).min(horizon.len())
}

fn build_evs(
    cfg: &ScenarioConfig,
    horizon: &Horizon,
    planner: &Arc<dyn BufferPlanner>,
    devices: &mut Vec<Box<dyn SteeringDevice>>,
) -> f64 {
    let e = &cfg.ev;
    let mut rng = StdRng::seed_from_u64(cfg.horizon.seed.wrapping_add(EV_SEED_OFFSET));
    let max_level = e.power_levels_w.iter().copied().fold(0.0, f64::max);
    let mut energy_wh = 0.0;

    for i in 0..e.count {
        let arrival = rng.random_range(
            hour_to_step(e.arrival_hr_min, horizon)..=hour_to_step(e.arrival_hr_max, horizon),
        );
        let departure = rng
            .random_range(
                hour_to_step(e.departure_hr_min, horizon)
                    ..=hour_to_step(e.departure_hr_max, horizon),
            )
            .max(arrival);

        // Never ask for more than the window can deliver
        let deliverable_wh = max_level * horizon.dt_hours * (departure - arrival) as f64;
        let request_wh = rng
            .random_range(e.request_wh_min..=e.request_wh_max)
            .min(deliverable_wh);
        energy_wh += request_wh;

        devices.push(Box::new(ElectricVehicle::new(
            format!("ev-{i}"),
            EvParams {
                arrival,
                departure,
                capacity_wh: e.capacity_wh,
                request_wh,
                levels_w: e.power_levels_w.clone(),
                discrete: e.discrete,
            },
            horizon.dt_hours,
            Arc::clone(planner),
        )));
    }
    energy_wh
}

fn build_heat_pumps(
    cfg: &ScenarioConfig,
    horizon: &Horizon,
    planner: &Arc<dyn BufferPlanner>,
    devices: &mut Vec<Box<dyn SteeringDevice>>,
) -> f64 {
    let hp = &cfg.heat_pump;
    let mut rng = StdRng::seed_from_u64(cfg.horizon.seed.wrapping_add(HEAT_PUMP_SEED_OFFSET));
    let mut energy_wh = 0.0;

    for i in 0..hp.count {
        let demand_w: Vec<f64> = (0..horizon.len())
            .map(|_| hp.demand_scale * hp.max_w * rng.random::<f64>())
            .collect();
        energy_wh += demand_w.iter().sum::<f64>() * horizon.dt_hours;

        devices.push(Box::new(HeatPump::new(
            format!("hp-{i}"),
            HeatPumpParams {
                capacity_wh: hp.capacity_wh,
                min_w: hp.min_w,
                max_w: hp.max_w,
                initial_fill: hp.initial_fill,
                demand_w,
            },
            horizon.dt_hours,
            Arc::clone(planner),
        )));
    }
    energy_wh
}

/// Builds the fleet, base load, and target from a validated configuration.
///
/// # Panics
///
/// Panics on configurations that fail [`ScenarioConfig::validate`].
pub fn build_scenario(cfg: &ScenarioConfig) -> Scenario {
    let horizon = Horizon::new(cfg.horizon.steps_per_day, cfg.horizon.days);
    let planner: Arc<dyn BufferPlanner> = Arc::new(PairwisePlanner::default());

    let mut devices: Vec<Box<dyn SteeringDevice>> = Vec::new();
    let mut fleet_energy_wh = build_evs(cfg, &horizon, &planner, &mut devices);
    fleet_energy_wh += build_heat_pumps(cfg, &horizon, &planner, &mut devices);

    let t = &cfg.target;
    let base_load = BaseLoad::new(
        t.base_w,
        t.amp_w,
        t.phase_rad,
        t.noise_std,
        horizon.steps_per_day,
        cfg.horizon.seed,
    )
    .profile(horizon.len());

    let target = match t.kind {
        TargetKind::Zero => vec![0.0; horizon.len()],
        TargetKind::Flat => vec![t.level_w; horizon.len()],
        TargetKind::ValleyFill => {
            // Day-ahead: only the first observed day is known
            let forecast =
                NaiveForecast.forecast(&base_load[..horizon.steps_per_day], horizon.len());
            DayAheadSchedule::valley_fill(&forecast, fleet_energy_wh, horizon.dt_hours)
        }
    };

    Scenario {
        horizon,
        base_load,
        target,
        devices,
        fleet_energy_wh,
    }
}

/// Builds the backend and fleet, then runs `init` followed by `iterative`.
///
/// # Errors
///
/// Propagates backend setup failures and any fatal steering error.
pub fn run(cfg: &ScenarioConfig) -> Result<RunOutcome> {
    let backend = cfg.privacy.settings().build()?;
    let Scenario {
        horizon,
        base_load,
        target,
        devices,
        fleet_energy_wh,
    } = build_scenario(cfg);
    info!(
        devices = devices.len(),
        horizon = horizon.len(),
        fleet_energy_kwh = fleet_energy_wh / 1000.0,
        "scenario built"
    );

    let mut coordinator = Coordinator::new(devices, Arc::clone(&backend))
        .with_parallel_planning(cfg.horizon.parallel_planning);
    let initial = coordinator.init(&target)?;
    let profile =
        coordinator.iterative(cfg.steering.min_improvement, cfg.steering.max_iterations)?;

    let report = SteeringReport::from_run(
        coordinator.rounds(),
        coordinator.stop_reason(),
        &target,
        &initial,
        &profile,
        &base_load,
    );

    Ok(RunOutcome {
        horizon,
        backend: backend.name(),
        target,
        base_load,
        initial,
        profile,
        rounds: coordinator.rounds().to_vec(),
        report,
    })
}
