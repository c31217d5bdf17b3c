//! Common types and traits for steerable devices.

use std::fmt;

use rand::{Rng, rngs::StdRng};

use crate::error::{Result, SteeringError};
use crate::privacy::{PrivacyBackend, PrivateRepresentation};
use crate::profile::{self, Profile};

/// Where a device is in the plan/accept cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No candidate pending; the profile is the baseline from `init`.
    Idle,
    /// A candidate is pending from the latest `plan`.
    Planned,
    /// The profile equals the last accepted candidate.
    Committed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Planned => "planned",
            Self::Committed => "committed",
        };
        f.write_str(s)
    }
}

/// Trait implemented by every device taking part in profile steering.
///
/// The coordinator only ever sees scores and private representations; the
/// committed profile and candidate stay inside the device.
pub trait SteeringDevice: Send {
    /// Unique, human-readable device name.
    fn name(&self) -> &str;

    /// Returns a human-readable type name for the device.
    fn device_type(&self) -> &'static str;

    /// Current position in the plan/accept cycle.
    fn phase(&self) -> Phase;

    /// Commits a baseline profile and returns its private representation.
    ///
    /// # Arguments
    ///
    /// * `desired` - Target profile; only its length is binding for the device
    /// * `backend` - Run-wide privacy backend
    ///
    /// # Errors
    ///
    /// Fails if called twice, if the device does not fit the horizon, or if
    /// the backend cannot represent the baseline.
    fn init(&mut self, desired: &[f64], backend: &dyn PrivacyBackend)
    -> Result<PrivateRepresentation>;

    /// Plans a candidate against `difference = current - target`.
    ///
    /// # Returns
    ///
    /// The L2 improvement `||profile - p_m|| - ||candidate - p_m||` where
    /// `p_m = profile - difference`. Zero or negative when nothing better
    /// is feasible.
    fn plan(&mut self, round: usize, difference: &[f64]) -> Result<f64>;

    /// Commits the candidate planned in `round` and returns the private
    /// representation of `candidate - previous profile`.
    fn accept(&mut self, round: usize, backend: &dyn PrivacyBackend)
    -> Result<PrivateRepresentation>;
}

#[derive(Debug, Clone)]
struct Candidate {
    profile: Profile,
    round: usize,
}

/// Profile bookkeeping shared by all device models.
///
/// Devices keep their constraint data themselves and pass a solve closure
/// into `init_with`/`plan_with`; this type enforces the call order.
#[derive(Debug, Clone, Default)]
pub struct PlanState {
    profile: Option<Profile>,
    candidate: Option<Candidate>,
    accepted: usize,
}

impl PlanState {
    /// Committed profile, if initialized.
    pub fn profile(&self) -> Option<&[f64]> {
        self.profile.as_deref()
    }

    /// Pending candidate, if any.
    pub fn candidate(&self) -> Option<&[f64]> {
        self.candidate.as_ref().map(|c| c.profile.as_slice())
    }

    /// Number of accepted candidates so far.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn phase(&self) -> Phase {
        if self.candidate.is_some() {
            Phase::Planned
        } else if self.accepted > 0 {
            Phase::Committed
        } else {
            Phase::Idle
        }
    }

    /// Solves against a zero adjustment and commits the result as baseline.
    pub fn init_with<F>(
        &mut self,
        device: &str,
        desired: &[f64],
        backend: &dyn PrivacyBackend,
        solve: F,
    ) -> Result<PrivateRepresentation>
    where
        F: FnOnce(&[f64]) -> Profile,
    {
        if self.profile.is_some() {
            return Err(SteeringError::AlreadyInitialized {
                device: device.to_string(),
            });
        }

        let baseline = solve(&vec![0.0; desired.len()]);
        profile::ensure_len("device baseline", desired.len(), baseline.len())?;
        let representation = backend.represent(&baseline)?;
        self.profile = Some(baseline);
        Ok(representation)
    }

    /// Plans a candidate toward `profile - difference` and scores it.
    pub fn plan_with<F>(
        &mut self,
        device: &str,
        round: usize,
        difference: &[f64],
        solve: F,
    ) -> Result<f64>
    where
        F: FnOnce(&[f64]) -> Profile,
    {
        let current = self
            .profile
            .as_deref()
            .ok_or_else(|| SteeringError::NotInitialized {
                device: device.to_string(),
            })?;
        let local_target = profile::sub("difference profile", current, difference)?;

        let candidate = solve(&local_target);
        profile::ensure_len("device candidate", current.len(), candidate.len())?;
        let score = profile::distance(current, &local_target)
            - profile::distance(&candidate, &local_target);

        self.candidate = Some(Candidate {
            profile: candidate,
            round,
        });
        Ok(score)
    }

    /// Commits the candidate from `round`, returning the represented delta.
    ///
    /// The candidate is consumed even when it is rejected as stale.
    pub fn accept_with(
        &mut self,
        device: &str,
        round: usize,
        backend: &dyn PrivacyBackend,
    ) -> Result<PrivateRepresentation> {
        let candidate = self
            .candidate
            .take()
            .ok_or_else(|| SteeringError::AcceptWithoutPlan {
                device: device.to_string(),
            })?;
        if candidate.round != round {
            return Err(SteeringError::StaleCandidate {
                device: device.to_string(),
            });
        }
        let current = self
            .profile
            .as_mut()
            .ok_or_else(|| SteeringError::NotInitialized {
                device: device.to_string(),
            })?;

        let delta = profile::sub("device delta", &candidate.profile, current)?;
        let representation = backend.represent(&delta)?;
        *current = candidate.profile;
        self.accepted += 1;
        Ok(representation)
    }
}

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().max(1e-12);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}
