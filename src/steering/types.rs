//! Core steering types: horizon, round records, and stop reasons.

use std::fmt;

use serde::Serialize;

/// Discretisation of the planning horizon.
///
/// # Examples
///
/// ```
/// use profile_steer::steering::types::Horizon;
///
/// let h = Horizon::new(96, 1);
/// assert_eq!(h.dt_hours, 0.25);
/// assert_eq!(h.len(), 96);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Horizon {
    /// Number of intervals per day.
    pub steps_per_day: usize,
    /// Number of days planned.
    pub days: usize,
    /// Duration of one interval in hours, derived as `24.0 / steps_per_day`.
    pub dt_hours: f64,
}

impl Horizon {
    /// Creates a new horizon.
    ///
    /// # Panics
    ///
    /// Panics if `steps_per_day` or `days` is zero.
    pub fn new(steps_per_day: usize, days: usize) -> Self {
        assert!(steps_per_day > 0, "steps_per_day must be > 0");
        assert!(days > 0, "days must be > 0");
        Self {
            steps_per_day,
            days,
            dt_hours: 24.0 / steps_per_day as f64,
        }
    }

    /// Total number of intervals (the profile length `T`).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.steps_per_day * self.days
    }

    /// Start of interval `t` in hours.
    pub fn time_hr(&self, t: usize) -> f64 {
        t as f64 * self.dt_hours
    }
}

/// Why `iterative` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No device reported a positive improvement.
    NoWinner,
    /// The round's winner improved less than the minimum.
    BelowMinImprovement,
    /// The iteration limit was reached.
    MaxIterations,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoWinner => "no device improved",
            Self::BelowMinImprovement => "improvement below minimum",
            Self::MaxIterations => "iteration limit reached",
        };
        f.write_str(s)
    }
}

/// Diagnostic record of one coordination round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundRecord {
    /// Zero-based round index.
    pub iteration: usize,
    /// Name of the device that committed, if any.
    pub winner: Option<String>,
    /// Winning score, or `0.0` without a winner.
    pub improvement: f64,
    /// L2 distance between aggregate and target after the round.
    pub distance: f64,
    /// Wall time spent on the round in milliseconds.
    pub elapsed_ms: f64,
}

impl fmt::Display for RoundRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round {:>4} | winner={:<12} improvement={:>12.3} W  distance={:>12.3} W | {:.2} ms",
            self.iteration,
            self.winner.as_deref().unwrap_or("-"),
            self.improvement,
            self.distance,
            self.elapsed_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_basic() {
        let h = Horizon::new(24, 2);
        assert_eq!(h.len(), 48);
        assert_eq!(h.dt_hours, 1.0);
        assert_eq!(h.time_hr(5), 5.0);
    }

    #[test]
    #[should_panic]
    fn horizon_zero_steps_panics() {
        Horizon::new(0, 1);
    }

    #[test]
    fn round_record_display_shows_missing_winner() {
        let r = RoundRecord {
            iteration: 3,
            winner: None,
            improvement: 0.0,
            distance: 12.5,
            elapsed_ms: 0.4,
        };
        let s = format!("{r}");
        assert!(s.contains("winner=-"));
    }
}
