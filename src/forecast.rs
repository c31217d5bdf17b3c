//! Base-load forecasting used to shape target profiles.

/// Naive "tomorrow is today" forecaster.
///
/// Repeats one observed day of base load over the whole planning horizon.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaiveForecast;

impl NaiveForecast {
    /// Produce a naive forecast for the given horizon.
    ///
    /// # Arguments
    ///
    /// * `baseline` - Observed values used as the forecast template (W)
    /// * `horizon` - Number of intervals to forecast
    ///
    /// # Returns
    ///
    /// A vector of length `horizon`; all zeros when `baseline` is empty.
    pub fn forecast(&self, baseline: &[f64], horizon: usize) -> Vec<f64> {
        if baseline.is_empty() {
            return vec![0.0; horizon];
        }
        baseline.iter().copied().cycle().take(horizon).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::NaiveForecast;

    #[test]
    fn forecast_repeats_baseline() {
        let forecast = NaiveForecast.forecast(&[1.0, 2.0, 3.0], 7);
        assert_eq!(forecast, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn forecast_truncates_and_handles_empty() {
        assert_eq!(NaiveForecast.forecast(&[0.5, 1.0, 1.5], 2), vec![0.5, 1.0]);
        assert_eq!(NaiveForecast.forecast(&[], 3), vec![0.0; 3]);
        assert!(NaiveForecast.forecast(&[1.0], 0).is_empty());
    }
}
