mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{Scripted, assert_close, exact_backend, small_he_backend};
use profile_steer::devices::Phase;
use profile_steer::error::{ErrorKind, Result, SteeringError};
use profile_steer::privacy::{PrivacyBackend, PrivateRepresentation};
use profile_steer::profile::Profile;
use profile_steer::steering::{Coordinator, StopReason};

/// Exact backend whose `reveal` fails once `budget` reveals have succeeded.
struct FailingReveal {
    inner: Arc<dyn PrivacyBackend>,
    budget: AtomicUsize,
}

impl FailingReveal {
    fn after(reveals: usize) -> Arc<dyn PrivacyBackend> {
        Arc::new(Self {
            inner: exact_backend(),
            budget: AtomicUsize::new(reveals),
        })
    }
}

impl PrivacyBackend for FailingReveal {
    fn name(&self) -> &'static str {
        "failing-reveal"
    }

    fn represent(&self, profile: &[f64]) -> Result<PrivateRepresentation> {
        self.inner.represent(profile)
    }

    fn combine(
        &self,
        a: &PrivateRepresentation,
        b: &PrivateRepresentation,
    ) -> Result<PrivateRepresentation> {
        self.inner.combine(a, b)
    }

    fn reveal(&self, representation: &PrivateRepresentation, len: usize) -> Result<Profile> {
        let spent = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1));
        if spent.is_err() {
            return Err(SteeringError::InvalidParameters("reveal refused".to_string()));
        }
        self.inner.reveal(representation, len)
    }
}

fn two_device_fleet() -> Vec<Box<dyn profile_steer::devices::SteeringDevice>> {
    vec![
        Scripted::new("A", vec![0.0; 4], vec![(2.0, vec![-1.0, -1.0, 1.0, 1.0])]).boxed(),
        Scripted::new("B", vec![0.0; 4], vec![(0.0, vec![0.0; 4])]).boxed(),
    ]
}

#[test]
fn single_winner_then_no_improvement_stops() {
    let mut c = Coordinator::new(two_device_fleet(), exact_backend());

    let x0 = c.init(&[0.0; 4]).unwrap();
    assert_eq!(x0, vec![0.0; 4]);

    let x = c.iterative(0.5, 10).unwrap();
    assert_eq!(x, vec![-1.0, -1.0, 1.0, 1.0]);
    assert_eq!(c.rounds().len(), 2);
    assert_eq!(c.rounds()[0].winner.as_deref(), Some("A"));
    assert_eq!(c.rounds()[0].improvement, 2.0);
    assert!(c.rounds()[1].winner.is_none());
    assert_eq!(c.stop_reason(), Some(StopReason::NoWinner));
    assert_eq!(c.accepted(), 1);
}

#[test]
fn homomorphic_run_matches_within_tolerance() {
    let mut c = Coordinator::new(two_device_fleet(), small_he_backend());
    let x0 = c.init(&[0.0; 4]).unwrap();
    assert_close(&x0, &[0.0; 4], 1e-4);

    let x = c.iterative(0.5, 10).unwrap();
    assert_close(&x, &[-1.0, -1.0, 1.0, 1.0], 1e-4);
    assert_eq!(c.rounds().len(), 2);
}

#[test]
fn every_round_with_a_winner_accepts_exactly_once() {
    let accepts = Arc::new(AtomicUsize::new(0));
    let rounds = 6;

    // Scores per round are a permutation of {1, 2, 3}: one strict winner each round
    let candidate = |k: usize, r: usize| vec![k as f64 + 1.0, r as f64, (k * r) as f64];
    let fleet = (0..3)
        .map(|k| {
            let script = (0..rounds)
                .map(|r| (((k + r) % 3 + 1) as f64, candidate(k, r)))
                .collect();
            Scripted::new(&format!("dev-{k}"), vec![1.0, 1.0, 1.0], script)
                .counting(&accepts)
                .boxed()
        })
        .collect();

    let mut c = Coordinator::new(fleet, exact_backend());
    let initial = c.init(&[0.0; 3]).unwrap();
    assert_eq!(initial, vec![3.0, 3.0, 3.0]);

    let x = c.iterative(0.0, rounds).unwrap();
    assert_eq!(accepts.load(Ordering::SeqCst), rounds);
    assert_eq!(c.accepted(), rounds);
    assert_eq!(c.stop_reason(), Some(StopReason::MaxIterations));

    // Rebuild the aggregate from the round log: each device ends on the
    // candidate of the last round it won.
    let mut device_profiles = vec![vec![1.0, 1.0, 1.0]; 3];
    for (r, record) in c.rounds().iter().enumerate() {
        let k = (2 + 3 - r % 3) % 3;
        assert_eq!(record.winner.as_deref(), Some(format!("dev-{k}").as_str()));
        assert_eq!(record.improvement, 3.0);
        device_profiles[k] = candidate(k, r);
    }
    let expected: Vec<f64> = (0..3)
        .map(|t| device_profiles.iter().map(|p| p[t]).sum())
        .collect();
    assert_eq!(x, expected);
}

#[test]
fn stops_on_max_iterations() {
    let script = (0..10).map(|r| (10.0, vec![r as f64 + 1.0])).collect();
    let mut c = Coordinator::new(
        vec![Scripted::new("only", vec![0.0], script).boxed()],
        exact_backend(),
    );
    c.init(&[0.0]).unwrap();
    let x = c.iterative(1.0, 3).unwrap();

    assert_eq!(c.rounds().len(), 3);
    assert_eq!(c.stop_reason(), Some(StopReason::MaxIterations));
    assert_eq!(x, vec![3.0]);
}

#[test]
fn stops_after_first_round_below_min_improvement() {
    let accepts = Arc::new(AtomicUsize::new(0));
    let script = vec![
        (5.0, vec![1.0, 0.0]),
        (3.0, vec![1.0, 1.0]),
        (0.5, vec![2.0, 1.0]),
        (4.0, vec![9.0, 9.0]),
    ];
    let mut c = Coordinator::new(
        vec![Scripted::new("only", vec![0.0, 0.0], script).counting(&accepts).boxed()],
        exact_backend(),
    );
    c.init(&[0.0, 0.0]).unwrap();
    let x = c.iterative(1.0, 10).unwrap();

    // The weak round still commits its winner, then the loop ends
    assert_eq!(c.rounds().len(), 3);
    assert_eq!(accepts.load(Ordering::SeqCst), 3);
    assert_eq!(c.stop_reason(), Some(StopReason::BelowMinImprovement));
    assert_eq!(x, vec![2.0, 1.0]);
}

#[test]
fn zero_max_iterations_returns_init_aggregate() {
    let mut c = Coordinator::new(two_device_fleet(), exact_backend());
    let x0 = c.init(&[0.0; 4]).unwrap();
    let x = c.iterative(0.0, 0).unwrap();
    assert_eq!(x, x0);
    assert!(c.rounds().is_empty());
}

#[test]
fn equal_scores_resolve_by_fleet_order() {
    let fleet = vec![
        Scripted::new("low", vec![0.0; 2], vec![(1.0, vec![1.0, 0.0])]).boxed(),
        Scripted::new("first-best", vec![0.0; 2], vec![(4.0, vec![0.0, 1.0])]).boxed(),
        Scripted::new("second-best", vec![0.0; 2], vec![(4.0, vec![5.0, 5.0])]).boxed(),
    ];

    let mut c = Coordinator::new(fleet, exact_backend()).with_parallel_planning(true);
    c.init(&[0.0; 2]).unwrap();
    let x = c.iterative(0.0, 1).unwrap();

    assert_eq!(c.rounds()[0].winner.as_deref(), Some("first-best"));
    assert_eq!(x, vec![0.0, 1.0]);
    assert_eq!(c.devices()[1].phase(), Phase::Committed);
    assert_eq!(c.devices()[2].phase(), Phase::Planned);
}

#[test]
fn empty_fleet_is_a_configuration_error() {
    let mut c = Coordinator::new(Vec::new(), exact_backend());
    let err = c.init(&[0.0; 4]).unwrap_err();
    assert!(matches!(err, SteeringError::EmptyFleet));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn device_length_mismatch_fails_at_init() {
    let mut c = Coordinator::new(two_device_fleet(), exact_backend());
    let err = c.init(&[0.0; 5]).unwrap_err();
    assert!(matches!(err, SteeringError::LengthMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn iterative_before_init_is_a_precondition_error() {
    let mut c = Coordinator::new(two_device_fleet(), exact_backend());
    let err = c.iterative(0.0, 5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn horizon_beyond_backend_capacity_is_rejected() {
    let fleet = vec![Scripted::new("big", vec![0.0; 64], Vec::new()).boxed()];
    let mut c = Coordinator::new(fleet, small_he_backend());
    let err = c.init(&[0.0; 64]).unwrap_err();
    assert!(matches!(
        err,
        SteeringError::CapacityExceeded {
            len: 64,
            capacity: 32
        }
    ));
}

#[test]
fn init_aggregate_does_not_depend_on_fleet_order() {
    let baselines = [
        vec![1.5, -2.0, 30.0],
        vec![100.0, 0.25, -7.0],
        vec![-40.0, 12.0, 0.0],
    ];
    let fleet = |order: &[usize]| {
        order
            .iter()
            .map(|&i| Scripted::new(&format!("dev-{i}"), baselines[i].clone(), Vec::new()).boxed())
            .collect::<Vec<_>>()
    };

    let mut forward = Coordinator::new(fleet(&[0, 1, 2]), small_he_backend());
    let mut reversed = Coordinator::new(fleet(&[2, 1, 0]), small_he_backend());
    let a = forward.init(&[0.0; 3]).unwrap();
    let b = reversed.init(&[0.0; 3]).unwrap();

    assert_close(&a, &b, 1e-4);
    assert_close(&a, &[61.5, 10.25, 23.0], 1e-4);
}

#[test]
fn failed_commit_aborts_the_run() {
    let accepts = Arc::new(AtomicUsize::new(0));
    let script = (0..5).map(|r| (10.0, vec![r as f64 + 1.0, 0.0])).collect();
    let fleet = vec![
        Scripted::new("only", vec![0.0, 0.0], script)
            .counting(&accepts)
            .boxed(),
    ];

    // init and the first commit reveal; the second commit's reveal fails
    let mut c = Coordinator::new(fleet, FailingReveal::after(2));
    c.init(&[0.0, 0.0]).unwrap();
    let err = c.iterative(0.0, 5).unwrap_err();
    assert!(matches!(err, SteeringError::InvalidParameters(_)));

    // The device took the second candidate but the aggregate never did
    assert_eq!(accepts.load(Ordering::SeqCst), 2);
    assert_eq!(c.current(), &[1.0, 0.0]);
    assert!(c.is_aborted());

    let err = c.iterative(0.0, 5).unwrap_err();
    assert!(matches!(err, SteeringError::RunAborted));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(accepts.load(Ordering::SeqCst), 2);
    assert!(matches!(c.init(&[0.0, 0.0]), Err(SteeringError::RunAborted)));
}
