//! Unit newtypes for the quantities the estimator moves around.
//!
//! Phasor magnitudes arrive in device units (volts, amperes) while the linear
//! model works in per-unit. Angles are stored in radians and only shown in
//! degrees. Wrapping these in newtypes keeps a kV base from being handed to a
//! function that expects volts, or degrees from reaching a trig call.
//!
//! ```
//! use lse_core::units::{Degrees, Kilovolts, Radians};
//!
//! let base = Kilovolts(138.0);
//! assert_eq!(base.to_volts(), 138_000.0);
//!
//! let angle = Degrees(-2.0).to_radians();
//! assert!((angle.to_degrees().value() + 2.0).abs() < 1e-12);
//! assert!(Radians(0.0).cos() > 0.999);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Implements the arithmetic shared by every unit newtype.
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Check if value is finite
            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }
    };
}

/// Per-unit quantity (dimensionless, relative to a base)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PerUnit(pub f64);

impl_unit_ops!(PerUnit, "pu");

/// Line-to-line voltage level in kilovolts
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

impl Kilovolts {
    /// Convert to volts.
    #[inline]
    pub fn to_volts(self) -> f64 {
        self.0 * 1000.0
    }
}

/// Three-phase apparent power base in megavolt-amperes
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MegavoltAmperes(pub f64);

impl_unit_ops!(MegavoltAmperes, "MVA");

impl Default for MegavoltAmperes {
    fn default() -> Self {
        MegavoltAmperes(100.0)
    }
}

/// Angle in radians (canonical storage for phasor angles)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Radians(pub f64);

impl_unit_ops!(Radians, "rad");

/// Angle in degrees (display and telemetry only)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Degrees(pub f64);

impl_unit_ops!(Degrees, "°");

impl Radians {
    #[inline]
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }

    #[inline]
    pub fn sin(self) -> f64 {
        self.0.sin()
    }

    #[inline]
    pub fn cos(self) -> f64 {
        self.0.cos()
    }

    /// Wrap into (-π, π].
    pub fn normalized(self) -> Self {
        let two_pi = 2.0 * std::f64::consts::PI;
        let mut angle = self.0 % two_pi;
        if angle <= -std::f64::consts::PI {
            angle += two_pi;
        } else if angle > std::f64::consts::PI {
            angle -= two_pi;
        }
        Radians(angle)
    }
}

impl Degrees {
    #[inline]
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }
}

impl From<Degrees> for Radians {
    fn from(deg: Degrees) -> Self {
        deg.to_radians()
    }
}

impl From<Radians> for Degrees {
    fn from(rad: Radians) -> Self {
        rad.to_degrees()
    }
}
