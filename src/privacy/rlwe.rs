//! Ring-LWE arithmetic for the homomorphic backend.
//!
//! Polynomials live in `Z_q[X]/(X^N + 1)` with `N` a power of two and `q` a
//! prime congruent to `1 mod 2N`, so products are computed with a negacyclic
//! number-theoretic transform. Values are encoded one per coefficient as
//! fixed-point integers scaled by `2^scale_bits`; additions are exact on the
//! encoded integers and decryption adds a small noise term, which is why a
//! reveal only approximates the plaintext sum.
//!
//! Sums wrap modulo `q`. `magnitude_bits` bounds every revealed value by
//! `2^magnitude_bits` and the modulus must leave room for four times that,
//! so any sum below `3 * 2^magnitude_bits` that wrapped still decodes above
//! the bound and is reported instead of returned.

use std::fmt;

use rand::{Rng, rngs::StdRng};

use crate::error::{Result, SteeringError};

/// Centred-binomial parameter for error sampling (variance `ETA / 2`).
const CBD_ETA: u32 = 21;

/// Miller-Rabin witnesses that are deterministic for every `u64`.
const MR_WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Sizing of the encryption scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeParams {
    /// Ring degree `N`; also the number of values one ciphertext carries.
    pub poly_degree: usize,
    /// Bit length bound of the ciphertext modulus `q`.
    pub modulus_bits: u32,
    /// Fixed-point precision: values are multiplied by `2^scale_bits`.
    pub scale_bits: u32,
    /// Revealed values must stay below `2^magnitude_bits` in magnitude.
    pub magnitude_bits: u32,
}

impl Default for HeParams {
    fn default() -> Self {
        Self {
            poly_degree: 8192,
            modulus_bits: 60,
            scale_bits: 30,
            magnitude_bits: 26,
        }
    }
}

impl HeParams {
    /// Checks the ring degree, modulus size, and scale against each other.
    pub fn validate(&self) -> Result<()> {
        if self.poly_degree < 2 || !self.poly_degree.is_power_of_two() {
            return Err(SteeringError::InvalidParameters(format!(
                "poly_degree must be a power of two >= 2, got {}",
                self.poly_degree
            )));
        }
        if !(20..=62).contains(&self.modulus_bits) {
            return Err(SteeringError::InvalidParameters(format!(
                "modulus_bits must be in [20, 62], got {}",
                self.modulus_bits
            )));
        }
        if self.scale_bits == 0 || self.scale_bits.saturating_add(2) >= self.modulus_bits {
            return Err(SteeringError::InvalidParameters(format!(
                "scale_bits must be in [1, modulus_bits - 3], got {}",
                self.scale_bits
            )));
        }
        let needed = self.scale_bits.saturating_add(self.magnitude_bits).saturating_add(3);
        if self.magnitude_bits == 0 || needed > self.modulus_bits {
            return Err(SteeringError::InvalidParameters(format!(
                "scale_bits + magnitude_bits + 3 must be <= modulus_bits ({} + {} + 3 > {})",
                self.scale_bits, self.magnitude_bits, self.modulus_bits
            )));
        }
        Ok(())
    }

    /// Largest magnitude a revealed value may have.
    pub fn magnitude_limit(&self) -> f64 {
        f64::from(self.magnitude_bits).exp2()
    }
}

fn add_mod(a: u64, b: u64, q: u64) -> u64 {
    let s = a + b;
    if s >= q { s - q } else { s }
}

fn sub_mod(a: u64, b: u64, q: u64) -> u64 {
    if a >= b { a - b } else { a + q - b }
}

fn mul_mod(a: u64, b: u64, q: u64) -> u64 {
    ((a as u128 * b as u128) % q as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, q: u64) -> u64 {
    let mut acc = 1 % q;
    base %= q;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, q);
        }
        base = mul_mod(base, base, q);
        exp >>= 1;
    }
    acc
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for p in MR_WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for a in MR_WITNESSES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Largest prime `q < 2^bits` with `q ≡ 1 (mod two_n)`.
fn ntt_prime(bits: u32, two_n: u64) -> Option<u64> {
    let top = (1u64 << bits) - 1;
    let mut k = top / two_n;
    while k > 0 {
        let q = k * two_n + 1;
        if is_prime(q) {
            return Some(q);
        }
        k -= 1;
    }
    None
}

/// A primitive `two_n`-th root of unity modulo `q` (`two_n` a power of two).
fn primitive_root(q: u64, two_n: u64) -> Option<u64> {
    let exp = (q - 1) / two_n;
    (2..q.min(1 << 20))
        .map(|g| pow_mod(g, exp, q))
        .find(|&psi| pow_mod(psi, two_n / 2, q) == q - 1)
}

fn bit_reverse(a: &mut [u64]) {
    let n = a.len();
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            a.swap(i, j);
        }
    }
}

/// In-place cyclic transform with `root` a primitive `a.len()`-th root of unity.
fn transform(a: &mut [u64], root: u64, q: u64) {
    let n = a.len();
    bit_reverse(a);
    let mut len = 2;
    while len <= n {
        let step = pow_mod(root, (n / len) as u64, q);
        let half = len / 2;
        for start in (0..n).step_by(len) {
            let mut w = 1;
            for j in 0..half {
                let u = a[start + j];
                let v = mul_mod(a[start + j + half], w, q);
                a[start + j] = add_mod(u, v, q);
                a[start + j + half] = sub_mod(u, v, q);
                w = mul_mod(w, step, q);
            }
        }
        len <<= 1;
    }
}

/// Precomputed twiddles for negacyclic multiplication.
struct NttTables {
    q: u64,
    psi_pows: Vec<u64>,
    psi_inv_pows: Vec<u64>,
    omega: u64,
    omega_inv: u64,
    n_inv: u64,
}

impl NttTables {
    fn new(n: usize, q: u64, psi: u64) -> Self {
        let psi_inv = pow_mod(psi, q - 2, q);
        let mut psi_pows = Vec::with_capacity(n);
        let mut psi_inv_pows = Vec::with_capacity(n);
        let (mut p, mut pi) = (1, 1);
        for _ in 0..n {
            psi_pows.push(p);
            psi_inv_pows.push(pi);
            p = mul_mod(p, psi, q);
            pi = mul_mod(pi, psi_inv, q);
        }
        let omega = mul_mod(psi, psi, q);
        Self {
            q,
            psi_pows,
            psi_inv_pows,
            omega,
            omega_inv: pow_mod(omega, q - 2, q),
            n_inv: pow_mod(n as u64, q - 2, q),
        }
    }

    /// Product of `a` and `b` modulo `X^N + 1`.
    fn multiply(&self, a: &[u64], b: &[u64]) -> Vec<u64> {
        let q = self.q;
        let mut fa: Vec<u64> = a
            .iter()
            .zip(&self.psi_pows)
            .map(|(&x, &p)| mul_mod(x, p, q))
            .collect();
        let mut fb: Vec<u64> = b
            .iter()
            .zip(&self.psi_pows)
            .map(|(&x, &p)| mul_mod(x, p, q))
            .collect();
        transform(&mut fa, self.omega, q);
        transform(&mut fb, self.omega, q);
        for (x, y) in fa.iter_mut().zip(&fb) {
            *x = mul_mod(*x, *y, q);
        }
        transform(&mut fa, self.omega_inv, q);
        for (x, &pi) in fa.iter_mut().zip(&self.psi_inv_pows) {
            *x = mul_mod(mul_mod(*x, self.n_inv, q), pi, q);
        }
        fa
    }
}

fn add_poly(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
    a.iter().zip(b).map(|(&x, &y)| add_mod(x, y, q)).collect()
}

fn neg_poly(a: &[u64], q: u64) -> Vec<u64> {
    a.iter().map(|&x| sub_mod(0, x, q)).collect()
}

fn signed_to_mod(v: i64, q: u64) -> u64 {
    if v >= 0 {
        v as u64 % q
    } else {
        sub_mod(0, v.unsigned_abs() % q, q)
    }
}

fn sample_uniform(rng: &mut StdRng, n: usize, q: u64) -> Vec<u64> {
    (0..n).map(|_| rng.random_range(0..q)).collect()
}

fn sample_ternary(rng: &mut StdRng, n: usize, q: u64) -> Vec<u64> {
    (0..n)
        .map(|_| match rng.random_range(0..3u8) {
            0 => 0,
            1 => 1,
            _ => q - 1,
        })
        .collect()
}

fn sample_error(rng: &mut StdRng, n: usize, q: u64) -> Vec<u64> {
    let mask = (1u32 << CBD_ETA) - 1;
    (0..n)
        .map(|_| {
            let a = (rng.random::<u32>() & mask).count_ones() as i64;
            let b = (rng.random::<u32>() & mask).count_ones() as i64;
            signed_to_mod(a - b, q)
        })
        .collect()
}

/// Encrypted vector of up to [`HeContext::capacity`] values.
#[derive(Clone)]
pub struct Ciphertext {
    c0: Vec<u64>,
    c1: Vec<u64>,
    fingerprint: u64,
}

impl Ciphertext {
    /// Number of coefficients (the ring degree).
    pub fn degree(&self) -> usize {
        self.c0.len()
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ciphertext")
            .field("degree", &self.c0.len())
            .field("fingerprint", &format_args!("{:016x}", self.fingerprint))
            .finish()
    }
}

/// Keys and precomputation for one run.
///
/// Built once at startup and shared read-only (typically behind an `Arc`).
/// Holds both key halves: the public key encrypts device contributions, the
/// secret key reveals aggregates.
pub struct HeContext {
    params: HeParams,
    tables: NttTables,
    scale: f64,
    fingerprint: u64,
    secret: Vec<u64>,
    public_b: Vec<u64>,
    public_a: Vec<u64>,
}

impl fmt::Debug for HeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeContext")
            .field("params", &self.params)
            .field("modulus", &self.tables.q)
            .field("fingerprint", &format_args!("{:016x}", self.fingerprint))
            .finish_non_exhaustive()
    }
}

impl HeContext {
    /// Picks the modulus and generates a fresh key pair.
    ///
    /// # Errors
    ///
    /// Returns [`SteeringError::InvalidParameters`] if the parameters are out of
    /// range or no suitable prime exists below `2^modulus_bits`.
    pub fn generate(params: HeParams, rng: &mut StdRng) -> Result<Self> {
        params.validate()?;
        let n = params.poly_degree;
        let two_n = 2 * n as u64;

        let q = ntt_prime(params.modulus_bits, two_n).ok_or_else(|| {
            SteeringError::InvalidParameters(format!(
                "no prime q < 2^{} with q = 1 mod {two_n}",
                params.modulus_bits
            ))
        })?;
        let psi = primitive_root(q, two_n).ok_or_else(|| {
            SteeringError::InvalidParameters(format!("no primitive {two_n}-th root mod {q}"))
        })?;
        if (q / 2) >> params.scale_bits < 1u64 << (params.magnitude_bits + 1) {
            return Err(SteeringError::InvalidParameters(format!(
                "modulus {q} leaves no headroom for magnitude_bits {}",
                params.magnitude_bits
            )));
        }
        let tables = NttTables::new(n, q, psi);

        let secret = sample_ternary(rng, n, q);
        let public_a = sample_uniform(rng, n, q);
        let e = sample_error(rng, n, q);
        let a_s = tables.multiply(&public_a, &secret);
        let public_b = add_poly(&neg_poly(&a_s, q), &e, q);

        Ok(Self {
            params,
            tables,
            scale: (1u64 << params.scale_bits) as f64,
            fingerprint: rng.random(),
            secret,
            public_b,
            public_a,
        })
    }

    /// Number of values a single ciphertext can carry.
    pub fn capacity(&self) -> usize {
        self.params.poly_degree
    }

    /// The ciphertext modulus chosen at key generation.
    pub fn modulus(&self) -> u64 {
        self.tables.q
    }

    /// Parameters this context was generated with.
    pub fn params(&self) -> HeParams {
        self.params
    }

    /// Largest magnitude a single encoded value may have.
    ///
    /// Twice the reveal limit, since a delta spans the full swing of a
    /// profile.
    pub fn max_magnitude(&self) -> f64 {
        2.0 * self.params.magnitude_limit()
    }

    fn encode(&self, values: &[f64]) -> Result<Vec<u64>> {
        if values.len() > self.capacity() {
            return Err(SteeringError::CapacityExceeded {
                len: values.len(),
                capacity: self.capacity(),
            });
        }
        let q = self.tables.q;
        let limit = self.max_magnitude();
        let mut plain = vec![0u64; self.capacity()];
        for (i, &v) in values.iter().enumerate() {
            let scaled = (v * self.scale).round();
            if !v.is_finite() || v.abs() >= limit {
                return Err(SteeringError::Unencodable { index: i, value: v });
            }
            plain[i] = signed_to_mod(scaled as i64, q);
        }
        Ok(plain)
    }

    fn decode(&self, plain: &[u64]) -> Vec<f64> {
        let q = self.tables.q;
        plain
            .iter()
            .map(|&c| {
                let centred = if c > q / 2 {
                    c as i64 - q as i64
                } else {
                    c as i64
                };
                centred as f64 / self.scale
            })
            .collect()
    }

    /// Encrypts `values` under the public key, zero-padding to the capacity.
    ///
    /// # Errors
    ///
    /// Fails if `values` is longer than the capacity or holds a value that is
    /// non-finite or too large to encode without wrapping.
    pub fn encrypt(&self, values: &[f64], rng: &mut StdRng) -> Result<Ciphertext> {
        let q = self.tables.q;
        let n = self.capacity();
        let m = self.encode(values)?;

        let u = sample_ternary(rng, n, q);
        let e0 = sample_error(rng, n, q);
        let e1 = sample_error(rng, n, q);

        let c0 = add_poly(
            &add_poly(&self.tables.multiply(&self.public_b, &u), &e0, q),
            &m,
            q,
        );
        let c1 = add_poly(&self.tables.multiply(&self.public_a, &u), &e1, q);

        Ok(Ciphertext {
            c0,
            c1,
            fingerprint: self.fingerprint,
        })
    }

    /// Homomorphic addition of two ciphertexts.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check(a)?;
        self.check(b)?;
        let q = self.tables.q;
        Ok(Ciphertext {
            c0: add_poly(&a.c0, &b.c0, q),
            c1: add_poly(&a.c1, &b.c1, q),
            fingerprint: self.fingerprint,
        })
    }

    /// Decrypts every slot of `ct` (the full capacity, padding included).
    ///
    /// # Errors
    ///
    /// Returns [`SteeringError::AggregateOverflow`] if any slot reaches the
    /// magnitude limit, which is what a wrapped sum decodes to.
    pub fn decrypt(&self, ct: &Ciphertext) -> Result<Vec<f64>> {
        self.check(ct)?;
        let q = self.tables.q;
        let c1_s = self.tables.multiply(&ct.c1, &self.secret);
        let values = self.decode(&add_poly(&ct.c0, &c1_s, q));

        let limit = self.params.magnitude_limit();
        if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| v.abs() >= limit) {
            return Err(SteeringError::AggregateOverflow {
                index,
                value,
                limit,
            });
        }
        Ok(values)
    }

    fn check(&self, ct: &Ciphertext) -> Result<()> {
        if ct.fingerprint != self.fingerprint || ct.degree() != self.capacity() {
            return Err(SteeringError::ForeignCiphertext);
        }
        Ok(())
    }
}
