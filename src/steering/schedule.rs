/// Day-ahead target generation for the steered fleet.
#[derive(Debug, Default, Clone, Copy)]
pub struct DayAheadSchedule;

impl DayAheadSchedule {
    /// Fleet target that fills the valleys of `base_forecast` with `energy_wh`.
    ///
    /// Finds the water level `L` with `sum(max(0, L - base_t)) * dt = energy_wh`
    /// and returns `max(0, L - base_t)` per interval, so that base plus fleet is
    /// as flat as the energy allows.
    ///
    /// # Arguments
    ///
    /// * `base_forecast` - Forecast of the uncontrolled load (W)
    /// * `energy_wh` - Energy the fleet has to consume over the horizon
    /// * `dt_hours` - Interval length in hours
    pub fn valley_fill(base_forecast: &[f64], energy_wh: f64, dt_hours: f64) -> Vec<f64> {
        let n = base_forecast.len();
        if n == 0 || energy_wh <= 0.0 || dt_hours <= 0.0 {
            return vec![0.0; n];
        }

        let filled = |level: f64| -> f64 {
            base_forecast
                .iter()
                .map(|b| (level - b).max(0.0))
                .sum::<f64>()
                * dt_hours
        };

        let mut lo = base_forecast.iter().copied().fold(f64::INFINITY, f64::min);
        let mut hi = base_forecast
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
            + energy_wh / (n as f64 * dt_hours);
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            if filled(mid) < energy_wh {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        base_forecast.iter().map(|b| (hi - b).max(0.0)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::DayAheadSchedule;

    #[test]
    fn valley_fill_delivers_energy_into_the_valley() {
        let base = [3000.0, 1000.0, 0.0, 2000.0];
        let target = DayAheadSchedule::valley_fill(&base, 1500.0, 1.0);

        let energy: f64 = target.iter().sum();
        assert!((energy - 1500.0).abs() < 1e-6);
        // Level settles at 1250 W: only the two lowest intervals are filled
        assert_eq!(target[0], 0.0);
        assert_eq!(target[3], 0.0);
        assert!((target[1] - 250.0).abs() < 1e-6);
        assert!((target[2] - 1250.0).abs() < 1e-6);
    }

    #[test]
    fn valley_fill_without_energy_is_zero() {
        assert_eq!(DayAheadSchedule::valley_fill(&[1.0, 2.0], 0.0, 1.0), vec![0.0, 0.0]);
    }
}
