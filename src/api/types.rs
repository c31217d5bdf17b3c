//! API response and query types.
//!
//! Field names follow the CSV export columns.

use serde::{Deserialize, Serialize};

use crate::scenario::RunOutcome;
use crate::steering::{Horizon, RoundRecord, SteeringReport};

/// Horizon description.
#[derive(Debug, Serialize)]
pub struct HorizonInfo {
    pub steps_per_day: usize,
    pub days: usize,
    pub dt_hours: f64,
    /// Profile length `T`.
    pub intervals: usize,
}

impl From<&Horizon> for HorizonInfo {
    fn from(h: &Horizon) -> Self {
        Self {
            steps_per_day: h.steps_per_day,
            days: h.days,
            dt_hours: h.dt_hours,
            intervals: h.len(),
        }
    }
}

/// Combined state response.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    /// Privacy backend used for the run.
    pub backend: &'static str,
    pub horizon: HorizonInfo,
    pub report: SteeringReport,
    /// Last round of the run, if any ran.
    pub latest_round: Option<RoundRecord>,
}

/// One interval of the final profile.
#[derive(Debug, Serialize)]
pub struct ProfilePoint {
    pub interval: usize,
    pub time_hr: f64,
    pub target_w: f64,
    pub aggregate_w: f64,
    /// `aggregate_w - target_w`.
    pub difference_w: f64,
    pub base_w: f64,
}

impl ProfilePoint {
    /// Builds every point of `outcome`'s final profile.
    pub fn all(outcome: &RunOutcome) -> Vec<Self> {
        outcome
            .target
            .iter()
            .zip(&outcome.profile)
            .enumerate()
            .map(|(t, (target, x))| Self {
                interval: t,
                time_hr: outcome.horizon.time_hr(t),
                target_w: *target,
                aggregate_w: *x,
                difference_w: x - target,
                base_w: outcome.base_load.get(t).copied().unwrap_or(0.0),
            })
            .collect()
    }
}

/// Optional range query parameters for the rounds endpoint.
#[derive(Debug, Deserialize)]
pub struct RoundsQuery {
    /// First iteration (inclusive).
    pub from: Option<usize>,
    /// Last iteration (inclusive).
    pub to: Option<usize>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
