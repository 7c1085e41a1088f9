//! Phasor values: the atomic measured or estimated quantity.
//!
//! A [`PhasorValue`] stores magnitude (device units) and angle (radians). The
//! complex and per-unit forms are derived on demand from its [`VoltageLevel`]
//! and [`PhasorKind`]:
//!
//! ```text
//! V_base = kV · 1000 / √3              (line-to-neutral volts)
//! I_base = MVA · 10⁶ / (√3 · kV · 1000)  (amperes)
//! ```

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::units::{Degrees, Kilovolts, MegavoltAmperes, Radians};

/// Whether a phasor measures a voltage or a current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhasorKind {
    Voltage,
    Current,
}

/// One of the six components a phasor group carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Zero,
    Positive,
    Negative,
    A,
    B,
    C,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Zero,
        Phase::Positive,
        Phase::Negative,
        Phase::A,
        Phase::B,
        Phase::C,
    ];

    /// The three physical phases, in the order the sequence transform expects.
    pub const PHASES: [Phase; 3] = [Phase::A, Phase::B, Phase::C];

    pub fn label(self) -> &'static str {
        match self {
            Phase::Zero => "0",
            Phase::Positive => "+",
            Phase::Negative => "-",
            Phase::A => "A",
            Phase::B => "B",
            Phase::C => "C",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Voltage level a measurement point sits on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageLevel {
    /// Nominal line-to-line voltage
    pub base_kv: Kilovolts,
    /// System power base
    #[serde(default)]
    pub base_mva: MegavoltAmperes,
}

impl VoltageLevel {
    pub fn new(base_kv: f64) -> Self {
        Self {
            base_kv: Kilovolts(base_kv),
            base_mva: MegavoltAmperes::default(),
        }
    }

    pub fn with_base_mva(mut self, mva: f64) -> Self {
        self.base_mva = MegavoltAmperes(mva);
        self
    }

    /// Per-unit base in device units for the given phasor kind.
    pub fn base_value(&self, kind: PhasorKind) -> Result<f64, ModelError> {
        let kv = self.base_kv.value();
        if kv.abs() < f64::EPSILON || !kv.is_finite() {
            return Err(ModelError::ZeroBaseVoltage(kv));
        }
        let sqrt3 = 3f64.sqrt();
        Ok(match kind {
            PhasorKind::Voltage => self.base_kv.to_volts() / sqrt3,
            PhasorKind::Current => self.base_mva.value() * 1.0e6 / (sqrt3 * self.base_kv.to_volts()),
        })
    }
}

/// A magnitude/angle pair with telemetry keys and per-frame reported flags.
///
/// The value only counts as reported once both halves arrived in the same
/// frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorValue {
    pub kind: PhasorKind,
    pub level: VoltageLevel,
    magnitude: f64,
    angle: Radians,
    #[serde(default)]
    pub magnitude_key: Option<String>,
    #[serde(default)]
    pub angle_key: Option<String>,
    #[serde(skip)]
    magnitude_reported: bool,
    #[serde(skip)]
    angle_reported: bool,
}

impl PhasorValue {
    pub fn new(kind: PhasorKind, level: VoltageLevel) -> Self {
        Self {
            kind,
            level,
            magnitude: 0.0,
            angle: Radians(0.0),
            magnitude_key: None,
            angle_key: None,
            magnitude_reported: false,
            angle_reported: false,
        }
    }

    /// Register the telemetry keys this value answers to.
    pub fn with_keys(mut self, magnitude_key: impl Into<String>, angle_key: impl Into<String>) -> Self {
        self.magnitude_key = Some(magnitude_key.into());
        self.angle_key = Some(angle_key.into());
        self
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn angle(&self) -> Radians {
        self.angle
    }

    pub fn angle_degrees(&self) -> Degrees {
        self.angle.to_degrees()
    }

    /// Store a magnitude. A negative magnitude is folded into the angle so the
    /// stored magnitude stays non-negative.
    pub fn set_magnitude(&mut self, magnitude: f64) {
        if magnitude < 0.0 {
            self.magnitude = -magnitude;
            self.angle = (self.angle + Radians(std::f64::consts::PI)).normalized();
        } else {
            self.magnitude = magnitude;
        }
    }

    pub fn set_angle(&mut self, angle: Radians) {
        self.angle = angle;
    }

    pub fn set_polar(&mut self, magnitude: f64, angle: Radians) {
        self.angle = angle;
        self.set_magnitude(magnitude);
    }

    /// Complex form in device units.
    pub fn complex(&self) -> Complex64 {
        Complex64::from_polar(self.magnitude, self.angle.value())
    }

    pub fn set_complex(&mut self, value: Complex64) {
        let (magnitude, angle) = value.to_polar();
        self.magnitude = magnitude;
        self.angle = Radians(angle);
    }

    /// Complex form in per-unit of this value's base.
    pub fn per_unit(&self) -> Result<Complex64, ModelError> {
        Ok(self.complex() / self.level.base_value(self.kind)?)
    }

    pub fn set_per_unit(&mut self, value: Complex64) -> Result<(), ModelError> {
        let base = self.level.base_value(self.kind)?;
        self.set_complex(value * base);
        Ok(())
    }

    pub fn is_reported(&self) -> bool {
        self.magnitude_reported && self.angle_reported
    }

    pub fn mark_reported(&mut self) {
        self.magnitude_reported = true;
        self.angle_reported = true;
    }

    pub fn clear_reported(&mut self) {
        self.magnitude_reported = false;
        self.angle_reported = false;
    }

    /// Offer a telemetry sample. Stores it and marks that half reported when
    /// `key` matches the registered magnitude or angle key. Angles arrive in
    /// degrees.
    pub fn insert(&mut self, key: &str, value: f64) -> bool {
        if self.magnitude_key.as_deref() == Some(key) {
            self.set_magnitude(value);
            self.magnitude_reported = true;
            true
        } else if self.angle_key.as_deref() == Some(key) {
            self.set_angle(Degrees(value).to_radians());
            self.angle_reported = true;
            true
        } else {
            false
        }
    }
}
