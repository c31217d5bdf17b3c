//! Post-hoc steering KPIs computed from a finished run.

use std::fmt;

use serde::Serialize;

use super::types::{RoundRecord, StopReason};

/// Summary of one steering run.
///
/// Computed from the initial and final aggregates so that the report always
/// agrees with the exported profile.
#[derive(Debug, Clone, Serialize)]
pub struct SteeringReport {
    /// Rounds executed.
    pub rounds: usize,
    /// Rounds that committed a device.
    pub accepted: usize,
    /// Why the loop ended.
    pub stop_reason: Option<StopReason>,
    /// RMSE of `x - p` after `init` (W).
    pub rmse_initial_w: f64,
    /// RMSE of `x - p` at the end (W).
    pub rmse_final_w: f64,
    /// Peak of the final fleet aggregate (W).
    pub peak_aggregate_w: f64,
    /// Peak-to-average ratio of base load plus aggregate after `init`.
    pub par_initial: f64,
    /// Peak-to-average ratio of base load plus aggregate at the end.
    pub par_final: f64,
}

fn rmse(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (sq / a.len() as f64).sqrt()
}

/// Peak over average of `base + aggregate`; `0.0` when the average is not positive.
fn peak_to_average(base: &[f64], aggregate: &[f64]) -> f64 {
    let total: Vec<f64> = aggregate
        .iter()
        .enumerate()
        .map(|(t, x)| x + base.get(t).copied().unwrap_or(0.0))
        .collect();
    let mean = crate::profile::mean(&total);
    if mean <= 0.0 {
        return 0.0;
    }
    crate::profile::peak(&total) / mean
}

impl SteeringReport {
    /// Builds the report.
    ///
    /// # Arguments
    ///
    /// * `rounds` - Round log of the run
    /// * `stop_reason` - Reason reported by the coordinator
    /// * `target` - Target profile `p`
    /// * `initial` - Aggregate revealed by `init`
    /// * `last` - Aggregate after the last round
    /// * `base` - Uncontrolled base load (may be empty)
    pub fn from_run(
        rounds: &[RoundRecord],
        stop_reason: Option<StopReason>,
        target: &[f64],
        initial: &[f64],
        last: &[f64],
        base: &[f64],
    ) -> Self {
        Self {
            rounds: rounds.len(),
            accepted: rounds.iter().filter(|r| r.winner.is_some()).count(),
            stop_reason,
            rmse_initial_w: rmse(initial, target),
            rmse_final_w: rmse(last, target),
            peak_aggregate_w: crate::profile::peak(last),
            par_initial: peak_to_average(base, initial),
            par_final: peak_to_average(base, last),
        }
    }
}

impl fmt::Display for SteeringReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Steering Report ---")?;
        writeln!(
            f,
            "Rounds:                {} ({} accepted)",
            self.rounds, self.accepted
        )?;
        match self.stop_reason {
            Some(reason) => writeln!(f, "Stopped:               {reason}")?,
            None => writeln!(f, "Stopped:               not run")?,
        }
        writeln!(
            f,
            "RMSE to target:        {:.1} W -> {:.1} W",
            self.rmse_initial_w, self.rmse_final_w
        )?;
        writeln!(f, "Peak fleet load:       {:.1} W", self.peak_aggregate_w)?;
        write!(
            f,
            "Peak/average (total):  {:.3} -> {:.3}",
            self.par_initial, self.par_final
        )
    }
}
