//! Round-synchronous coordinator that steers the fleet aggregate toward a target.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::devices::SteeringDevice;
use crate::error::{Result, SteeringError};
use crate::privacy::{self, PrivacyBackend, PrivateRepresentation};
use crate::profile::{self, Profile};

use super::types::{RoundRecord, StopReason};

/// Picks the round winner from per-device scores.
///
/// The winner has the strictly greatest positive score; among equal scores
/// the lowest index (fleet order) wins. NaN scores never win.
///
/// # Returns
///
/// `(index, score)` of the winner, or `None` when no score is positive.
pub fn select_winner(scores: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score > best.map_or(0.0, |(_, b)| b) {
            best = Some((i, score));
        }
    }
    best
}

/// Drives devices through `init`/`plan`/`accept` and holds the private aggregate.
///
/// The coordinator never sees an individual device profile: it only handles
/// scores, opaque representations, and the revealed aggregate `x`.
pub struct Coordinator {
    devices: Vec<Box<dyn SteeringDevice>>,
    backend: Arc<dyn PrivacyBackend>,
    target: Profile,
    current: Profile,
    aggregate: Option<PrivateRepresentation>,
    iteration: usize,
    rounds: Vec<RoundRecord>,
    stop_reason: Option<StopReason>,
    parallel: bool,
    aborted: bool,
}

impl Coordinator {
    /// Creates a coordinator over a fixed fleet.
    ///
    /// Fleet order is the tie-break order for winner selection.
    pub fn new(devices: Vec<Box<dyn SteeringDevice>>, backend: Arc<dyn PrivacyBackend>) -> Self {
        Self {
            devices,
            backend,
            target: Vec::new(),
            current: Vec::new(),
            aggregate: None,
            iteration: 0,
            rounds: Vec::new(),
            stop_reason: None,
            parallel: false,
            aborted: false,
        }
    }

    /// Plans devices on the rayon thread pool instead of one by one.
    pub fn with_parallel_planning(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Initializes every device against target `p` and reveals the first aggregate.
    ///
    /// # Errors
    ///
    /// Fails on an empty fleet, a horizon beyond the backend capacity, any
    /// device init failure, or a failed combine/reveal.
    pub fn init(&mut self, target: &[f64]) -> Result<Profile> {
        if self.aborted {
            return Err(SteeringError::RunAborted);
        }
        if self.devices.is_empty() {
            return Err(SteeringError::EmptyFleet);
        }
        if let Some(capacity) = self.backend.capacity() {
            if target.len() > capacity {
                return Err(SteeringError::CapacityExceeded {
                    len: target.len(),
                    capacity,
                });
            }
        }

        let backend = self.backend.as_ref();
        let representations = self
            .devices
            .iter_mut()
            .map(|device| device.init(target, backend))
            .collect::<Result<Vec<_>>>()?;
        let aggregate =
            privacy::combine_all(backend, representations)?.ok_or(SteeringError::EmptyFleet)?;

        self.current = backend.reveal(&aggregate, target.len())?;
        self.aggregate = Some(aggregate);
        self.target = target.to_vec();
        self.iteration = 0;
        self.rounds.clear();
        self.stop_reason = None;

        info!(
            devices = self.devices.len(),
            horizon = target.len(),
            backend = backend.name(),
            distance = profile::distance(&self.current, &self.target),
            "fleet initialized"
        );
        Ok(self.current.clone())
    }

    /// Runs up to `max_iterations` rounds and returns the final aggregate `x`.
    ///
    /// Each round commits at most one device. The loop stops after the first
    /// round whose best score is below `min_improvement`, which includes
    /// rounds without a winner.
    ///
    /// # Errors
    ///
    /// Returns [`SteeringError::NotStarted`] before `init`. Device and
    /// backend failures abort the run; once a commit has failed every later
    /// call returns [`SteeringError::RunAborted`].
    pub fn iterative(&mut self, min_improvement: f64, max_iterations: usize) -> Result<Profile> {
        if self.aborted {
            return Err(SteeringError::RunAborted);
        }
        if self.aggregate.is_none() {
            return Err(SteeringError::NotStarted);
        }
        self.stop_reason = Some(StopReason::MaxIterations);

        for _ in 0..max_iterations {
            let record = self.round()?;
            let winner = record.winner.is_some();
            let improvement = record.improvement;
            self.rounds.push(record);

            if improvement < min_improvement || !winner {
                self.stop_reason = Some(if winner {
                    StopReason::BelowMinImprovement
                } else {
                    StopReason::NoWinner
                });
                break;
            }
        }

        info!(
            rounds = self.rounds.len(),
            stop = ?self.stop_reason,
            distance = profile::distance(&self.current, &self.target),
            "steering finished"
        );
        Ok(self.current.clone())
    }

    fn round(&mut self) -> Result<RoundRecord> {
        let start = Instant::now();
        let round = self.iteration;
        let difference = profile::sub("difference profile", &self.current, &self.target)?;

        let scores = self.plan_all(round, &difference)?;
        for (device, score) in self.devices.iter().zip(&scores) {
            debug!(round, device = device.name(), score, "planned");
        }

        let winner = select_winner(&scores);
        if let Some((index, _)) = winner {
            self.commit(round, index)?;
        }
        self.iteration += 1;

        let record = RoundRecord {
            iteration: round,
            winner: winner.map(|(i, _)| self.devices[i].name().to_string()),
            improvement: winner.map_or(0.0, |(_, s)| s),
            distance: profile::distance(&self.current, &self.target),
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        match &record.winner {
            Some(name) => info!(
                iteration = round,
                winner = %name,
                improvement = record.improvement,
                elapsed_ms = record.elapsed_ms,
                "round complete"
            ),
            None => warn!(iteration = round, "no device improved"),
        }
        Ok(record)
    }

    fn plan_all(&mut self, round: usize, difference: &[f64]) -> Result<Vec<f64>> {
        if self.parallel {
            self.devices
                .par_iter_mut()
                .map(|device| device.plan(round, difference))
                .collect()
        } else {
            self.devices
                .iter_mut()
                .map(|device| device.plan(round, difference))
                .collect()
        }
    }

    /// Applies the winner's delta to the aggregate; strictly serial.
    ///
    /// A failure may leave the winner committed while the aggregate lacks
    /// its delta, so the coordinator drops the aggregate and refuses further
    /// rounds.
    fn commit(&mut self, round: usize, index: usize) -> Result<()> {
        let result = self.apply_delta(round, index);
        if let Err(e) = &result {
            error!(
                round,
                device = self.devices[index].name(),
                error = %e,
                "commit failed, aborting run"
            );
            self.aggregate = None;
            self.aborted = true;
        }
        result
    }

    fn apply_delta(&mut self, round: usize, index: usize) -> Result<()> {
        let backend = self.backend.as_ref();
        let aggregate = self.aggregate.as_ref().ok_or(SteeringError::NotStarted)?;

        let delta = self.devices[index].accept(round, backend)?;
        let updated = backend.combine(aggregate, &delta)?;
        self.current = backend.reveal(&updated, self.target.len())?;
        self.aggregate = Some(updated);
        Ok(())
    }

    /// Target profile `p` given to `init`.
    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// Latest revealed aggregate `x`.
    pub fn current(&self) -> &[f64] {
        &self.current
    }

    /// Number of completed rounds since `init`.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    /// Number of rounds that committed a device.
    pub fn accepted(&self) -> usize {
        self.rounds.iter().filter(|r| r.winner.is_some()).count()
    }

    /// Whether a failed commit ended the run.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Why the last `iterative` call returned.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn devices(&self) -> &[Box<dyn SteeringDevice>] {
        &self.devices
    }

    pub fn backend(&self) -> &Arc<dyn PrivacyBackend> {
        &self.backend
    }
}
