//! Surface and bulk material parameters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default density (kg/m³ in world units).
pub const DEFAULT_DENSITY: f64 = 1.0;
/// Default coefficient of restitution.
pub const DEFAULT_RESTITUTION: f64 = 0.3;
/// Default Coulomb friction coefficient.
pub const DEFAULT_FRICTION: f64 = 0.7;

/// Material of a rigid body.
///
/// Density drives mass from shape volume. Restitution and friction are
/// combined per contact pair: restitution takes the lower of the two,
/// friction the geometric mean.
///
/// # Example
///
/// ```
/// use sim_types::Material;
///
/// let rubber = Material::new(1.1, 1.7, 0.9);
/// assert_eq!(rubber.restitution, 1.0); // clamped
/// assert_eq!(Material::combine_restitution(&rubber, &Material::default()), 0.3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    /// Mass per unit volume.
    pub density: f64,
    /// Bounciness in [0, 1].
    pub restitution: f64,
    /// Coulomb friction coefficient, non-negative.
    pub friction: f64,
    /// Linear velocity damping per second.
    pub linear_damping: f64,
    /// Angular velocity damping per second.
    pub angular_damping: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self::new(DEFAULT_DENSITY, DEFAULT_RESTITUTION, DEFAULT_FRICTION)
    }
}

impl Material {
    /// Create a material, sanitising out-of-range inputs.
    ///
    /// Non-positive or non-finite density falls back to [`DEFAULT_DENSITY`],
    /// restitution is clamped to [0, 1] and friction to [0, ∞).
    #[must_use]
    pub fn new(density: f64, restitution: f64, friction: f64) -> Self {
        let density = if density.is_finite() && density > 0.0 {
            density
        } else {
            DEFAULT_DENSITY
        };
        let restitution = if restitution.is_finite() {
            restitution.clamp(0.0, 1.0)
        } else {
            DEFAULT_RESTITUTION
        };
        let friction = if friction.is_finite() {
            friction.max(0.0)
        } else {
            DEFAULT_FRICTION
        };
        Self {
            density,
            restitution,
            friction,
            linear_damping: 0.01,
            angular_damping: 0.05,
        }
    }

    /// Set damping coefficients (clamped to non-negative).
    #[must_use]
    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear.max(0.0);
        self.angular_damping = angular.max(0.0);
        self
    }

    /// Restitution used for a contact between two materials.
    #[must_use]
    pub fn combine_restitution(a: &Self, b: &Self) -> f64 {
        a.restitution.min(b.restitution)
    }

    /// Friction used for a contact between two materials.
    #[must_use]
    pub fn combine_friction(a: &Self, b: &Self) -> f64 {
        (a.friction * b.friction).sqrt()
    }
}
