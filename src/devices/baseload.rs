use rand::{SeedableRng, rngs::StdRng};

use crate::devices::types::gaussian_noise;

/// Household base load that the steered fleet sits on top of.
///
/// `BaseLoad` creates a sinusoidal power demand pattern with configurable baseline,
/// amplitude, phase, and random noise. It is not steerable; it only shapes
/// the target profile.
///
/// # Examples
///
/// ```
/// use profile_steer::devices::baseload::BaseLoad;
///
/// let mut load = BaseLoad::new(
///     40_000.0, // base_w - average consumption
///     20_000.0, // amp_w - daily variation
///     0.0,      // phase_rad
///     0.0,      // noise_std
///     24,       // steps_per_day - hourly resolution
///     42,       // seed
/// );
///
/// let day = load.profile(24);
/// assert_eq!(day.len(), 24);
/// assert!(day.iter().all(|w| *w >= 0.0));
/// ```
#[derive(Debug, Clone)]
pub struct BaseLoad {
    /// Baseline power consumption in watts
    pub base_w: f64,

    /// Amplitude of the sinusoidal variation in watts
    pub amp_w: f64,

    /// Phase offset of the sinusoidal pattern in radians
    pub phase_rad: f64,

    /// Standard deviation of the Gaussian noise in watts
    pub noise_std: f64,

    /// Number of time steps per simulated day
    pub steps_per_day: usize,

    rng: StdRng,
}

impl BaseLoad {
    /// Creates a new base-load generator.
    ///
    /// # Arguments
    ///
    /// * `base_w` - The baseline power consumption in watts
    /// * `amp_w` - The amplitude of sinusoidal daily variation in watts
    /// * `phase_rad` - The phase offset in radians
    /// * `noise_std` - The standard deviation of Gaussian noise in watts
    /// * `steps_per_day` - The number of time steps per simulated day
    /// * `seed` - Random seed for reproducible noise generation
    pub fn new(
        base_w: f64,
        amp_w: f64,
        phase_rad: f64,
        noise_std: f64,
        steps_per_day: usize,
        seed: u64,
    ) -> Self {
        Self {
            base_w,
            amp_w,
            phase_rad,
            noise_std,
            steps_per_day: steps_per_day.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Power demand at `timestep`, never negative.
    pub fn demand_w(&mut self, timestep: usize) -> f64 {
        let day_pos = (timestep % self.steps_per_day) as f64 / self.steps_per_day as f64; // [0,1)
        let angle = 2.0 * std::f64::consts::PI * day_pos + self.phase_rad;
        let noise = gaussian_noise(&mut self.rng, self.noise_std);

        (self.base_w + self.amp_w * angle.sin() + noise).max(0.0)
    }

    /// Demand for timesteps `0..len`.
    pub fn profile(&mut self, len: usize) -> Vec<f64> {
        (0..len).map(|t| self.demand_w(t)).collect()
    }
}
