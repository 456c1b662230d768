//! Common types and traits for scalar capacity arithmetic.
//!
//! Containers and item types only carry aggregate weight and volume, so every
//! capacity question in the service reduces to operations on a [`Load`].

use std::ops::{Add, AddAssign, Mul};

use serde::Serialize;
use utoipa::ToSchema;

/// A pair of scalar magnitudes: weight in kg and volume in m³.
///
/// Used both for capacities (a container's limits) and for usage
/// (what has been placed so far).
///
/// # Examples
/// ```ignore
/// let unit = Load::new(2.0, 0.1);
/// let three = unit * 3.0;
/// assert!(three.fits_within(&Load::new(10.0, 1.0)));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Load {
    pub weight_kg: f64,
    pub volume_m3: f64,
}

impl Load {
    #[inline]
    pub const fn new(weight_kg: f64, volume_m3: f64) -> Self {
        Self {
            weight_kg,
            volume_m3,
        }
    }

    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Checks both components against a capacity (component-wise `<=`).
    ///
    /// The comparison is exact: a load that fits never exceeds the limit,
    /// which keeps the capacity invariant free of tolerance drift.
    #[inline]
    pub fn fits_within(&self, capacity: &Self) -> bool {
        self.weight_kg <= capacity.weight_kg && self.volume_m3 <= capacity.volume_m3
    }

    /// Slack score of this usage against a capacity.
    ///
    /// The larger of the remaining weight ratio and the remaining volume
    /// ratio. Lower means a tighter pack. A ratio against a zero limit is 0.
    pub fn slack_against(&self, capacity: &Self) -> f64 {
        let weight = ratio(capacity.weight_kg - self.weight_kg, capacity.weight_kg);
        let volume = ratio(capacity.volume_m3 - self.volume_m3, capacity.volume_m3);
        weight.max(volume)
    }

    /// Fraction of a capacity used by this load.
    pub fn utilization_against(&self, capacity: &Self) -> Utilization {
        Utilization {
            weight_pct: ratio(self.weight_kg, capacity.weight_kg),
            volume_pct: ratio(self.volume_m3, capacity.volume_m3),
        }
    }
}

impl Add for Load {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.weight_kg + rhs.weight_kg, self.volume_m3 + rhs.volume_m3)
    }
}

impl AddAssign for Load {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Mul<f64> for Load {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.weight_kg * scalar, self.volume_m3 * scalar)
    }
}

/// Division that treats a zero denominator as "nothing to measure".
#[inline]
pub fn ratio(part: f64, whole: f64) -> f64 {
    if whole == 0.0 { 0.0 } else { part / whole }
}

/// Utilization of a container as fractions (1.0 = full).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Utilization {
    pub weight_pct: f64,
    pub volume_pct: f64,
}

/// Objects that occupy capacity per unit.
pub trait UnitLoad {
    /// Weight and volume of a single unit.
    fn unit_load(&self) -> Load;
}

/// Objects that offer capacity.
pub trait Capacity {
    /// Maximum weight and volume.
    fn capacity(&self) -> Load;
}

/// Validation functions shared by the catalog and the engine.
pub mod validation {

    /// Validates a non-negative, finite magnitude.
    ///
    /// # Parameters
    /// * `value` - The value to validate
    /// * `name` - Name of the field for error messages
    pub fn validate_non_negative(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value < 0.0 {
            return Err(format!("{} must not be negative, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates an optional magnitude; absent values are fine.
    pub fn validate_optional(value: Option<f64>, name: &str) -> Result<(), String> {
        match value {
            Some(value) => validate_non_negative(value, name),
            None => Ok(()),
        }
    }

    /// Validates a display name.
    pub fn validate_name(value: &str, name: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err(format!("{} must not be empty", name));
        }
        Ok(())
    }
}
