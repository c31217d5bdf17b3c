use std::sync::Mutex;

use rand::{Rng, rngs::StdRng};

use super::{PrivacyBackend, PrivateRepresentation, lock_rng, mismatch};
use crate::error::{Result, SteeringError};
use crate::profile::{self, Profile};

const NAME: &str = "differential";

/// A profile with independent Laplace noise added to every interval.
///
/// Builds with `cfg(test)` or the `audit` feature also carry the unperturbed
/// profile so accuracy can be compared offline; production builds do not
/// have that channel at all.
#[derive(Debug, Clone)]
pub struct PerturbedProfile {
    noised: Vec<f64>,
    #[cfg(any(test, feature = "audit"))]
    exact: Vec<f64>,
}

impl PerturbedProfile {
    /// Number of intervals carried.
    pub fn len(&self) -> usize {
        self.noised.len()
    }

    /// Whether the profile is empty.
    pub fn is_empty(&self) -> bool {
        self.noised.is_empty()
    }
}

/// Samples Laplace noise with location 0 and scale `scale` (inverse CDF).
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `scale` - Diversity `b`; the standard deviation is `b * sqrt(2)`
///
/// # Returns
///
/// One sample, or `0.0` when `scale <= 0`.
pub fn laplace_noise(rng: &mut StdRng, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }

    let u: f64 = rng.random::<f64>() - 0.5; // [-0.5, 0.5)
    let tail = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
    -scale * u.signum() * tail.ln()
}

/// Backend that publishes noise-perturbed contributions.
///
/// Every call to `represent` draws fresh noise, so an aggregate built from
/// `k` representations carries the sum of `k` independent noise vectors.
pub struct DifferentialBackend {
    noise_scale: f64,
    rng: Mutex<StdRng>,
}

impl DifferentialBackend {
    /// Creates a backend with Laplace scale `noise_scale` (W).
    ///
    /// # Errors
    ///
    /// Returns [`SteeringError::InvalidParameters`] if the scale is negative
    /// or not finite.
    pub fn new(noise_scale: f64, rng: StdRng) -> Result<Self> {
        if !noise_scale.is_finite() || noise_scale < 0.0 {
            return Err(SteeringError::InvalidParameters(format!(
                "noise_scale must be finite and >= 0, got {noise_scale}"
            )));
        }
        Ok(Self {
            noise_scale,
            rng: Mutex::new(rng),
        })
    }

    /// Configured Laplace scale.
    pub fn noise_scale(&self) -> f64 {
        self.noise_scale
    }

    /// Returns the unperturbed sum carried alongside the noise.
    ///
    /// Only for offline accuracy comparison; never part of a steering run.
    #[cfg(any(test, feature = "audit"))]
    pub fn audit_exact(&self, representation: &PrivateRepresentation, len: usize) -> Result<Profile> {
        let p = self.perturbed(representation, len)?;
        Ok(p.exact[..len].to_vec())
    }

    fn perturbed<'a>(
        &self,
        representation: &'a PrivateRepresentation,
        len: usize,
    ) -> Result<&'a PerturbedProfile> {
        let PrivateRepresentation::Perturbed(p) = representation else {
            return Err(mismatch(NAME, representation));
        };
        if len > p.len() {
            return Err(SteeringError::CapacityExceeded {
                len,
                capacity: p.len(),
            });
        }
        Ok(p)
    }
}

impl PrivacyBackend for DifferentialBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn represent(&self, values: &[f64]) -> Result<PrivateRepresentation> {
        let mut rng = lock_rng(&self.rng);
        let noised = values
            .iter()
            .map(|v| v + laplace_noise(&mut rng, self.noise_scale))
            .collect();
        Ok(PrivateRepresentation::Perturbed(PerturbedProfile {
            noised,
            #[cfg(any(test, feature = "audit"))]
            exact: values.to_vec(),
        }))
    }

    fn combine(
        &self,
        a: &PrivateRepresentation,
        b: &PrivateRepresentation,
    ) -> Result<PrivateRepresentation> {
        match (a, b) {
            (PrivateRepresentation::Perturbed(x), PrivateRepresentation::Perturbed(y)) => {
                Ok(PrivateRepresentation::Perturbed(PerturbedProfile {
                    noised: profile::add("combine", &x.noised, &y.noised)?,
                    #[cfg(any(test, feature = "audit"))]
                    exact: profile::add("combine", &x.exact, &y.exact)?,
                }))
            }
            (PrivateRepresentation::Perturbed(_), other) | (other, _) => {
                Err(mismatch(NAME, other))
            }
        }
    }

    fn reveal(&self, representation: &PrivateRepresentation, len: usize) -> Result<Profile> {
        let p = self.perturbed(representation, len)?;
        Ok(p.noised[..len].to_vec())
    }
}
