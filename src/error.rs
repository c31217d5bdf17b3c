//! Error types shared by the privacy backends, devices, and coordinator.

use thiserror::Error;

/// Broad classification of a [`SteeringError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inconsistent run setup, detected before or at `init`.
    Configuration,
    /// A device or coordinator operation was called out of order.
    Precondition,
    /// A private representation reached a backend it does not belong to.
    BackendMismatch,
    /// The privacy backend itself failed (encoding, parameters).
    Backend,
}

/// Errors raised while steering a fleet toward a target profile.
#[derive(Debug, Error)]
pub enum SteeringError {
    #[error("{context}: expected profile length {expected}, got {actual}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("device {device}: window [{start}, {end}) does not fit a horizon of {horizon}")]
    WindowOutOfRange {
        device: String,
        start: usize,
        end: usize,
        horizon: usize,
    },

    #[error("coordinator has no devices")]
    EmptyFleet,

    #[error("device {device}: init called more than once")]
    AlreadyInitialized { device: String },

    #[error("device {device}: used before init")]
    NotInitialized { device: String },

    #[error("coordinator: iterative called before init")]
    NotStarted,

    #[error("coordinator: an earlier commit failed, the aggregate no longer matches the fleet")]
    RunAborted,

    #[error("device {device}: accept called without a plan in this round")]
    AcceptWithoutPlan { device: String },

    #[error("device {device}: candidate was planned against an older profile")]
    StaleCandidate { device: String },

    #[error("backend {backend} cannot handle a {found} representation")]
    BackendMismatch {
        backend: &'static str,
        found: &'static str,
    },

    #[error("ciphertext belongs to a different encryption context")]
    ForeignCiphertext,

    #[error("profile of length {len} exceeds backend capacity {capacity}")]
    CapacityExceeded { len: usize, capacity: usize },

    #[error("value {value} at index {index} cannot be encoded")]
    Unencodable { index: usize, value: f64 },

    #[error("revealed value {value} at index {index} reaches the limit {limit} (aggregate wrapped)")]
    AggregateOverflow { index: usize, value: f64, limit: f64 },

    #[error("invalid backend parameters: {0}")]
    InvalidParameters(String),
}

impl SteeringError {
    /// Returns the broad class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LengthMismatch { .. } | Self::WindowOutOfRange { .. } | Self::EmptyFleet => {
                ErrorKind::Configuration
            }
            Self::AlreadyInitialized { .. }
            | Self::NotInitialized { .. }
            | Self::NotStarted
            | Self::RunAborted
            | Self::AcceptWithoutPlan { .. }
            | Self::StaleCandidate { .. } => ErrorKind::Precondition,
            Self::BackendMismatch { .. } | Self::ForeignCiphertext => ErrorKind::BackendMismatch,
            Self::CapacityExceeded { .. }
            | Self::Unencodable { .. }
            | Self::AggregateOverflow { .. }
            | Self::InvalidParameters(_) => ErrorKind::Backend,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SteeringError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_group_variants() {
        let err = SteeringError::AcceptWithoutPlan {
            device: "ev-0".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().contains("ev-0"));

        let err = SteeringError::BackendMismatch {
            backend: "homomorphic",
            found: "perturbed",
        };
        assert_eq!(err.kind(), ErrorKind::BackendMismatch);

        let err = SteeringError::LengthMismatch {
            context: "plan",
            expected: 4,
            actual: 3,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);

        assert_eq!(SteeringError::RunAborted.kind(), ErrorKind::Precondition);
        let err = SteeringError::AggregateOverflow {
            index: 2,
            value: -130.0,
            limit: 128.0,
        };
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(err.to_string().contains("wrapped"));
    }
}
