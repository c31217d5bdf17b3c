//! Privacy backends that let device contributions be summed without being seen.
//!
//! A backend turns a plaintext profile into a [`PrivateRepresentation`], adds
//! representations together, and reveals only the aggregate. The coordinator
//! and devices talk to backends exclusively through [`PrivacyBackend`]; which
//! scheme runs is decided once, by [`BackendSettings::build`].

/// Laplace-perturbation backend.
pub mod differential;
/// Additively homomorphic encryption backend.
pub mod homomorphic;
pub mod rlwe;

#[cfg(test)]
mod proptests;

use std::sync::{Arc, Mutex, MutexGuard};

use rand::{SeedableRng, rngs::StdRng};

use crate::error::{Result, SteeringError};
use crate::profile::Profile;

pub use differential::{DifferentialBackend, PerturbedProfile};
pub use homomorphic::HomomorphicBackend;
pub use rlwe::{Ciphertext, HeContext, HeParams};

/// Backend-specific opaque value produced by [`PrivacyBackend::represent`].
#[derive(Debug, Clone)]
pub enum PrivateRepresentation {
    /// A single ciphertext carrying the whole (padded) profile.
    Encrypted(Ciphertext),
    /// A noise-perturbed profile.
    Perturbed(PerturbedProfile),
}

impl PrivateRepresentation {
    /// Short name of the variant, used in mismatch errors.
    pub fn variant(&self) -> &'static str {
        match self {
            Self::Encrypted(_) => "encrypted",
            Self::Perturbed(_) => "perturbed",
        }
    }
}

/// Capability shared by every privacy mechanism.
///
/// `combine` must be associative and commutative. `reveal` returns exactly
/// `len` values, dropping any internal padding.
pub trait PrivacyBackend: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    /// Maximum profile length a representation can carry, if bounded.
    fn capacity(&self) -> Option<usize> {
        None
    }

    /// Converts a plaintext profile into its private form.
    fn represent(&self, profile: &[f64]) -> Result<PrivateRepresentation>;

    /// Adds two private representations without revealing either.
    fn combine(
        &self,
        a: &PrivateRepresentation,
        b: &PrivateRepresentation,
    ) -> Result<PrivateRepresentation>;

    /// Reveals the first `len` values of an aggregate.
    fn reveal(&self, representation: &PrivateRepresentation, len: usize) -> Result<Profile>;
}

/// Folds representations left to right with [`PrivacyBackend::combine`].
///
/// Returns `None` for an empty input.
pub fn combine_all<I>(backend: &dyn PrivacyBackend, items: I) -> Result<Option<PrivateRepresentation>>
where
    I: IntoIterator<Item = PrivateRepresentation>,
{
    let mut acc: Option<PrivateRepresentation> = None;
    for item in items {
        acc = Some(match acc {
            Some(sum) => backend.combine(&sum, &item)?,
            None => item,
        });
    }
    Ok(acc)
}

/// Run-wide backend selection, resolved once at startup.
#[derive(Debug, Clone)]
pub enum BackendSettings {
    /// Encrypt contributions under a freshly generated key pair.
    Homomorphic { params: HeParams, seed: Option<u64> },
    /// Perturb contributions with Laplace noise of the given scale (W).
    Differential { noise_scale: f64, seed: Option<u64> },
}

impl BackendSettings {
    /// Creates the backend, generating key material where needed.
    ///
    /// With `seed == None` randomness is drawn from the operating system.
    pub fn build(&self) -> Result<Arc<dyn PrivacyBackend>> {
        match self {
            Self::Homomorphic { params, seed } => {
                let mut rng = seeded_rng(*seed);
                let context = Arc::new(HeContext::generate(*params, &mut rng)?);
                Ok(Arc::new(HomomorphicBackend::new(context, rng)))
            }
            Self::Differential { noise_scale, seed } => Ok(Arc::new(DifferentialBackend::new(
                *noise_scale,
                seeded_rng(*seed),
            )?)),
        }
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Locks a backend RNG, recovering the guard if a panicking thread poisoned it.
fn lock_rng(rng: &Mutex<StdRng>) -> MutexGuard<'_, StdRng> {
    rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn mismatch(backend: &'static str, found: &PrivateRepresentation) -> SteeringError {
    SteeringError::BackendMismatch {
        backend,
        found: found.variant(),
    }
}
