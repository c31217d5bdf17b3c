use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;

use super::rlwe::HeContext;
use super::{PrivacyBackend, PrivateRepresentation, lock_rng, mismatch};
use crate::error::{Result, SteeringError};
use crate::profile::Profile;

const NAME: &str = "homomorphic";

/// Backend that encrypts each contribution and only ever decrypts sums.
///
/// `combine` works on ciphertexts alone; plaintext exists only inside
/// `represent` (on the contributing side) and `reveal` (on the key holder's
/// side). Reveals are approximate: expect deviations on the order of
/// `2^-scale_bits` times the ring noise, far below a milliwatt with the
/// default parameters.
pub struct HomomorphicBackend {
    context: Arc<HeContext>,
    rng: Mutex<StdRng>,
}

impl HomomorphicBackend {
    /// Wraps a shared context; `rng` supplies encryption randomness.
    pub fn new(context: Arc<HeContext>, rng: StdRng) -> Self {
        Self {
            context,
            rng: Mutex::new(rng),
        }
    }

    /// The shared, immutable encryption context.
    pub fn context(&self) -> &Arc<HeContext> {
        &self.context
    }
}

impl PrivacyBackend for HomomorphicBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.context.capacity())
    }

    fn represent(&self, profile: &[f64]) -> Result<PrivateRepresentation> {
        let mut rng = lock_rng(&self.rng);
        let ct = self.context.encrypt(profile, &mut rng)?;
        Ok(PrivateRepresentation::Encrypted(ct))
    }

    fn combine(
        &self,
        a: &PrivateRepresentation,
        b: &PrivateRepresentation,
    ) -> Result<PrivateRepresentation> {
        match (a, b) {
            (PrivateRepresentation::Encrypted(x), PrivateRepresentation::Encrypted(y)) => {
                Ok(PrivateRepresentation::Encrypted(self.context.add(x, y)?))
            }
            (PrivateRepresentation::Encrypted(_), other) | (other, _) => {
                Err(mismatch(NAME, other))
            }
        }
    }

    fn reveal(&self, representation: &PrivateRepresentation, len: usize) -> Result<Profile> {
        let PrivateRepresentation::Encrypted(ct) = representation else {
            return Err(mismatch(NAME, representation));
        };
        if len > self.context.capacity() {
            return Err(SteeringError::CapacityExceeded {
                len,
                capacity: self.context.capacity(),
            });
        }
        let mut plain = self.context.decrypt(ct)?;
        plain.truncate(len);
        Ok(plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privacy::rlwe::HeParams;
    use rand::SeedableRng;

    fn backend(poly_degree: usize) -> HomomorphicBackend {
        let mut rng = StdRng::seed_from_u64(21);
        let params = HeParams {
            poly_degree,
            ..HeParams::default()
        };
        let ctx = HeContext::generate(params, &mut rng).expect("keygen");
        HomomorphicBackend::new(Arc::new(ctx), rng)
    }

    #[test]
    fn reveal_truncates_padding() {
        let he = backend(32);
        let rep = he.represent(&[5.0; 7]).expect("represent");
        let revealed = he.reveal(&rep, 7).expect("reveal");
        assert_eq!(revealed.len(), 7);
        assert!(revealed.iter().all(|v| (v - 5.0).abs() < 1e-4));
    }

    #[test]
    fn round_trip_at_full_capacity() {
        let he = backend(64);
        let values: Vec<f64> = (0..64).map(|i| i as f64 * 125.5 - 4000.0).collect();
        let rep = he.represent(&values).expect("represent");
        let revealed = he.reveal(&rep, values.len()).expect("reveal");
        for (got, want) in revealed.iter().zip(&values) {
            assert!((got - want).abs() < 1e-4);
        }
    }

    #[test]
    fn too_long_profiles_are_rejected() {
        let he = backend(16);
        assert!(matches!(
            he.represent(&[0.0; 17]),
            Err(SteeringError::CapacityExceeded {
                len: 17,
                capacity: 16
            })
        ));
        let rep = he.represent(&[0.0; 4]).expect("represent");
        assert!(he.reveal(&rep, 17).is_err());
    }

    #[test]
    fn many_combines_stay_within_tolerance() {
        let he = backend(64);
        let mut acc = he.represent(&[0.0; 24]).expect("represent");
        let mut expected = vec![0.0; 24];
        for k in 0..200 {
            let delta: Vec<f64> = (0..24).map(|i| ((i * 37 + k * 11) % 1000) as f64 - 500.0).collect();
            for (e, d) in expected.iter_mut().zip(&delta) {
                *e += d;
            }
            let rep = he.represent(&delta).expect("represent");
            acc = he.combine(&acc, &rep).expect("combine");
        }
        let revealed = he.reveal(&acc, 24).expect("reveal");
        for (got, want) in revealed.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-3, "{got} vs {want}");
        }
    }
}
