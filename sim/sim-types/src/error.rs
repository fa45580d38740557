//! Error types for engine operations.

use thiserror::Error;

use crate::BodyId;

/// Errors that can occur while building or stepping a world.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SimError {
    /// Stale, destroyed or out-of-range body handle.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(BodyId),

    /// A fixed-capacity table is full.
    #[error("{resource} capacity exhausted ({capacity} slots)")]
    CapacityExhausted {
        /// Which table ran out.
        resource: &'static str,
        /// Its configured capacity.
        capacity: usize,
    },

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Shape parameters that cannot be simulated.
    #[error("invalid shape: {reason}")]
    InvalidShape {
        /// Description of what's wrong.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },

    /// Operation requires a dynamic body.
    #[error("{0} is static")]
    StaticBody(BodyId),

    /// Position or orientation with NaN or infinite components.
    #[error("non-finite transform for {0}")]
    NonFiniteTransform(BodyId),
}

impl SimError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid shape error.
    #[must_use]
    pub fn invalid_shape(reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Create a capacity error.
    #[must_use]
    pub fn capacity(resource: &'static str, capacity: usize) -> Self {
        Self::CapacityExhausted { resource, capacity }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }

    /// Check if this is a capacity error.
    #[must_use]
    pub fn is_capacity_error(&self) -> bool {
        matches!(self, Self::CapacityExhausted { .. })
    }

    /// Check if this is a stale or invalid handle error.
    #[must_use]
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, Self::InvalidBodyId(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::InvalidBodyId(BodyId::new(42, 1));
        assert!(err.to_string().contains("42"));

        let err = SimError::capacity("body", 10);
        assert_eq!(err.to_string(), "body capacity exhausted (10 slots)");

        let err = SimError::invalid_shape("hull needs at least 4 points");
        assert!(err.to_string().contains("4 points"));
    }

    #[test]
    fn test_error_predicates() {
        let err = SimError::invalid_config("bad value");
        assert!(err.is_config_error());
        assert!(!err.is_capacity_error());

        let err = SimError::capacity("hull", 1);
        assert!(err.is_capacity_error());
        assert!(!err.is_invalid_handle());

        assert!(SimError::InvalidBodyId(BodyId::INVALID).is_invalid_handle());

        let err = SimError::NonFiniteTransform(BodyId::new(3, 0));
        assert!(err.to_string().contains("non-finite"));
        assert!(!err.is_invalid_handle());
    }
}
