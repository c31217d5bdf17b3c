//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use profile_steer::config::{BackendKind, ScenarioConfig};
use profile_steer::devices::{Phase, SteeringDevice};
use profile_steer::error::{Result, SteeringError};
use profile_steer::privacy::{BackendSettings, HeParams, PrivacyBackend, PrivateRepresentation};
use profile_steer::profile::{self, Profile};

/// Differential backend with zero noise: reveals exact sums.
pub fn exact_backend() -> Arc<dyn PrivacyBackend> {
    BackendSettings::Differential {
        noise_scale: 0.0,
        seed: Some(7),
    }
    .build()
    .expect("differential backend")
}

/// Small homomorphic backend (32 slots).
pub fn small_he_backend() -> Arc<dyn PrivacyBackend> {
    BackendSettings::Homomorphic {
        params: HeParams {
            poly_degree: 32,
            modulus_bits: 60,
            scale_bits: 30,
            magnitude_bits: 26,
        },
        seed: Some(7),
    }
    .build()
    .expect("homomorphic backend")
}

/// Device that replays a fixed script of `(score, candidate)` pairs.
///
/// Round `r` uses script entry `r`; past the end it proposes its current
/// profile with score 0. Every successful `accept` bumps the shared counter.
pub struct Scripted {
    name: String,
    baseline: Profile,
    script: Vec<(f64, Profile)>,
    profile: Option<Profile>,
    pending: Option<(usize, Profile)>,
    accepted: usize,
    accepts: Arc<AtomicUsize>,
}

impl Scripted {
    pub fn new(name: &str, baseline: Vec<f64>, script: Vec<(f64, Vec<f64>)>) -> Self {
        Self {
            name: name.to_string(),
            baseline,
            script,
            profile: None,
            pending: None,
            accepted: 0,
            accepts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shares `counter` as the accept counter.
    pub fn counting(mut self, counter: &Arc<AtomicUsize>) -> Self {
        self.accepts = Arc::clone(counter);
        self
    }

    pub fn boxed(self) -> Box<dyn SteeringDevice> {
        Box::new(self)
    }
}

impl SteeringDevice for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> &'static str {
        "Scripted"
    }

    fn phase(&self) -> Phase {
        if self.pending.is_some() {
            Phase::Planned
        } else if self.accepted > 0 {
            Phase::Committed
        } else {
            Phase::Idle
        }
    }

    fn init(
        &mut self,
        desired: &[f64],
        backend: &dyn PrivacyBackend,
    ) -> Result<PrivateRepresentation> {
        if self.profile.is_some() {
            return Err(SteeringError::AlreadyInitialized {
                device: self.name.clone(),
            });
        }
        profile::ensure_len("scripted baseline", desired.len(), self.baseline.len())?;
        let rep = backend.represent(&self.baseline)?;
        self.profile = Some(self.baseline.clone());
        Ok(rep)
    }

    fn plan(&mut self, round: usize, difference: &[f64]) -> Result<f64> {
        let current = self.profile.as_ref().ok_or_else(|| SteeringError::NotInitialized {
            device: self.name.clone(),
        })?;
        profile::ensure_len("scripted difference", current.len(), difference.len())?;
        let (score, candidate) = self
            .script
            .get(round)
            .cloned()
            .unwrap_or_else(|| (0.0, current.clone()));
        self.pending = Some((round, candidate));
        Ok(score)
    }

    fn accept(
        &mut self,
        round: usize,
        backend: &dyn PrivacyBackend,
    ) -> Result<PrivateRepresentation> {
        let (planned, candidate) = self.pending.take().ok_or_else(|| {
            SteeringError::AcceptWithoutPlan {
                device: self.name.clone(),
            }
        })?;
        if planned != round {
            return Err(SteeringError::StaleCandidate {
                device: self.name.clone(),
            });
        }
        let current = self.profile.as_mut().ok_or_else(|| SteeringError::NotInitialized {
            device: self.name.clone(),
        })?;
        let delta = profile::sub("scripted delta", &candidate, current)?;
        let rep = backend.represent(&delta)?;
        *current = candidate;
        self.accepted += 1;
        self.accepts.fetch_add(1, Ordering::SeqCst);
        Ok(rep)
    }
}

/// Baseline preset shrunk to a fast run: 24 steps, few devices, fixed seeds.
pub fn small_config(backend: BackendKind) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::baseline();
    cfg.horizon.steps_per_day = 24;
    cfg.ev.count = 4;
    cfg.heat_pump.count = 2;
    cfg.steering.max_iterations = 60;
    cfg.privacy.backend = backend;
    cfg.privacy.poly_degree = 32;
    cfg.privacy.seed = Some(11);
    cfg
}

/// Asserts two profiles agree elementwise within `tol`.
pub fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (t, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol, "interval {t}: {a} vs {e} (tol {tol})");
    }
}
