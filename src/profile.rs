//! Elementwise helpers over power profiles.
//!
//! A profile is one power value (W) per interval of the run horizon. All
//! helpers check lengths and report mismatches instead of truncating.

use crate::error::{Result, SteeringError};

/// Ordered power values, one per interval.
pub type Profile = Vec<f64>;

/// Fails with [`SteeringError::LengthMismatch`] unless `actual == expected`.
pub fn ensure_len(context: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(SteeringError::LengthMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Elementwise `a - b`.
pub fn sub(context: &'static str, a: &[f64], b: &[f64]) -> Result<Profile> {
    ensure_len(context, a.len(), b.len())?;
    Ok(a.iter().zip(b).map(|(x, y)| x - y).collect())
}

/// Elementwise `a + b`.
pub fn add(context: &'static str, a: &[f64], b: &[f64]) -> Result<Profile> {
    ensure_len(context, a.len(), b.len())?;
    Ok(a.iter().zip(b).map(|(x, y)| x + y).collect())
}

/// Euclidean norm.
pub fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Euclidean distance between two equal-length profiles.
pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Largest absolute elementwise deviation, used to compare approximate reveals.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Largest value of a profile, or `0.0` when empty.
pub fn peak(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(0.0)
}

/// Arithmetic mean, or `0.0` when empty.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
