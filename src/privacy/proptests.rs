//! Property-based tests for the privacy backends
//!
//! Tests for:
//! - Order independence: any ordering or grouping of combines reveals the same sum
//! - Padding: reveal returns exactly the requested prefix
//! - Headroom: sums near the magnitude limit reveal correctly or fail loudly

use std::sync::{Arc, OnceLock};

use proptest::prelude::*;

use super::{BackendSettings, HeParams, PrivacyBackend, PrivateRepresentation, combine_all};
use crate::error::SteeringError;

const SLOTS: usize = 16;
const LEN: usize = 6;

fn homomorphic() -> &'static Arc<dyn PrivacyBackend> {
    static BACKEND: OnceLock<Arc<dyn PrivacyBackend>> = OnceLock::new();
    BACKEND.get_or_init(|| {
        BackendSettings::Homomorphic {
            params: HeParams {
                poly_degree: SLOTS,
                modulus_bits: 60,
                scale_bits: 30,
                magnitude_bits: 20,
            },
            seed: Some(5),
        }
        .build()
        .expect("keygen")
    })
}

fn exact() -> &'static Arc<dyn PrivacyBackend> {
    static BACKEND: OnceLock<Arc<dyn PrivacyBackend>> = OnceLock::new();
    BACKEND.get_or_init(|| {
        BackendSettings::Differential {
            noise_scale: 0.0,
            seed: Some(5),
        }
        .build()
        .expect("differential")
    })
}

/// Limit 2^7 = 128 W per revealed value, 256 W per encoded value.
fn tight() -> &'static Arc<dyn PrivacyBackend> {
    static BACKEND: OnceLock<Arc<dyn PrivacyBackend>> = OnceLock::new();
    BACKEND.get_or_init(|| {
        BackendSettings::Homomorphic {
            params: HeParams {
                poly_degree: SLOTS,
                modulus_bits: 40,
                scale_bits: 30,
                magnitude_bits: 7,
            },
            seed: Some(6),
        }
        .build()
        .expect("keygen")
    })
}

fn sum(profiles: &[Vec<f64>], len: usize) -> Vec<f64> {
    (0..len).map(|t| profiles.iter().map(|p| p[t]).sum()).collect()
}

fn represent_all(backend: &dyn PrivacyBackend, profiles: &[Vec<f64>]) -> Vec<PrivateRepresentation> {
    profiles
        .iter()
        .map(|p| backend.represent(p).expect("represent"))
        .collect()
}

proptest! {
    /// Folding in a rotated, reversed order and combining two partial sums
    /// reveals the same aggregate as a plain left fold.
    #[test]
    fn prop_combine_ignores_order_and_grouping(
        profiles in prop::collection::vec(prop::collection::vec(-5000.0f64..5000.0, LEN), 1..8),
        rotation in 0usize..8,
        split in 0usize..8,
    ) {
        let expected = sum(&profiles, LEN);
        let mut reordered = profiles.clone();
        reordered.rotate_left(rotation % profiles.len());
        reordered.reverse();
        let split = split % (reordered.len() + 1);

        for backend in [homomorphic(), exact()] {
            let backend = backend.as_ref();
            let forward = combine_all(backend, represent_all(backend, &profiles))
                .expect("combine")
                .expect("non-empty");

            let mut reps = represent_all(backend, &reordered);
            let right = reps.split_off(split);
            let grouped = match (
                combine_all(backend, reps).expect("left"),
                combine_all(backend, right).expect("right"),
            ) {
                (Some(l), Some(r)) => backend.combine(&l, &r).expect("combine"),
                (Some(only), None) | (None, Some(only)) => only,
                (None, None) => unreachable!("at least one profile"),
            };

            for rep in [&forward, &grouped] {
                let revealed = backend.reveal(rep, LEN).expect("reveal");
                prop_assert_eq!(revealed.len(), LEN);
                for (got, want) in revealed.iter().zip(&expected) {
                    prop_assert!((got - want).abs() < 1e-4, "{}: {} vs {}", backend.name(), got, want);
                }
            }
        }
    }

    /// Any prefix of an encrypted profile up to the slot count comes back intact.
    #[test]
    fn prop_reveal_returns_requested_prefix(
        values in prop::collection::vec(-1.0e5f64..1.0e5, 1..=SLOTS),
        take in 0usize..=SLOTS,
    ) {
        let backend = homomorphic().as_ref();
        let rep = backend.represent(&values).expect("represent");
        let take = take.min(values.len());

        let revealed = backend.reveal(&rep, take).expect("reveal");
        prop_assert_eq!(revealed.len(), take);
        for (got, want) in revealed.iter().zip(&values) {
            prop_assert!((got - want).abs() < 1e-4, "{} vs {}", got, want);
        }
    }

    /// Sums of up to three encodable values either reveal within tolerance
    /// or report the overflow; a wrapped value is never returned.
    #[test]
    fn prop_near_limit_sums_never_wrap_silently(
        profiles in prop::collection::vec(prop::collection::vec(-255.0f64..255.0, 4), 1..=3),
    ) {
        let backend = tight().as_ref();
        let expected = sum(&profiles, 4);
        let aggregate = combine_all(backend, represent_all(backend, &profiles))
            .expect("combine")
            .expect("non-empty");

        match backend.reveal(&aggregate, 4) {
            Ok(revealed) => {
                for (got, want) in revealed.iter().zip(&expected) {
                    prop_assert!((got - want).abs() < 1e-4, "{} vs {}", got, want);
                }
            }
            Err(SteeringError::AggregateOverflow { .. }) => {
                prop_assert!(
                    expected.iter().any(|v| v.abs() >= 127.0),
                    "overflow reported for in-range sums {:?}",
                    expected
                );
            }
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }
}
