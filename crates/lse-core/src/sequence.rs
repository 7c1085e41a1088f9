//! Symmetrical component (Fortescue) transform.
//!
//! ```text
//! α = e^{j·2π/3}
//!
//! ⎡V0⎤       ⎡1  1   1 ⎤ ⎡Va⎤        ⎡Va⎤   ⎡1  1   1 ⎤ ⎡V0⎤
//! ⎢V+⎥ = 1/3 ⎢1  α   α²⎥ ⎢Vb⎥        ⎢Vb⎥ = ⎢1  α²  α ⎥ ⎢V+⎥
//! ⎣V-⎦       ⎣1  α²  α ⎦ ⎣Vc⎦        ⎣Vc⎦   ⎣1  α   α²⎦ ⎣V-⎦
//! ```
//!
//! The 1/3 factor belongs to the forward direction only.

use num_complex::Complex64;

/// Zero, positive and negative sequence components of a three-phase quantity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SequenceComponents {
    pub zero: Complex64,
    pub positive: Complex64,
    pub negative: Complex64,
}

impl SequenceComponents {
    /// A purely positive-sequence (balanced) set.
    pub fn balanced(positive: Complex64) -> Self {
        Self {
            zero: Complex64::new(0.0, 0.0),
            positive,
            negative: Complex64::new(0.0, 0.0),
        }
    }
}

/// Stateless phase ⇄ sequence converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceTransform;

impl SequenceTransform {
    /// The rotation operator α = e^{j·2π/3}.
    #[inline]
    pub fn alpha() -> Complex64 {
        Complex64::from_polar(1.0, 2.0 * std::f64::consts::PI / 3.0)
    }

    /// `[A, B, C]` → zero/positive/negative.
    pub fn to_sequence(phases: [Complex64; 3]) -> SequenceComponents {
        let a = Self::alpha();
        let a2 = a * a;
        let [va, vb, vc] = phases;
        let third = 1.0 / 3.0;
        SequenceComponents {
            zero: (va + vb + vc) * third,
            positive: (va + a * vb + a2 * vc) * third,
            negative: (va + a2 * vb + a * vc) * third,
        }
    }

    /// zero/positive/negative → `[A, B, C]`.
    pub fn to_phases(sequence: SequenceComponents) -> [Complex64; 3] {
        let a = Self::alpha();
        let a2 = a * a;
        let SequenceComponents {
            zero,
            positive,
            negative,
        } = sequence;
        [
            zero + positive + negative,
            zero + a2 * positive + a * negative,
            zero + a * positive + a2 * negative,
        ]
    }
}
