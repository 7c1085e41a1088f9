//! Per-frame estimation errors.

use lse_core::ModelError;
use thiserror::Error;

/// Why a frame produced no estimate.
///
/// Callers usually skip the frame on input starvation and raise an alarm on
/// numeric degeneracy; see [`EstimationError::is_input_starvation`] and
/// [`EstimationError::is_numeric_degeneracy`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EstimationError {
    #[error("estimator has no network; call initialize first")]
    Uninitialized,

    #[error("no directly observed bus voltages in this frame")]
    NoObservedVoltages,

    #[error("measurement vector is empty")]
    EmptyMeasurementVector,

    #[error("system matrix is structurally empty ({rows} rows x {columns} columns)")]
    EmptySystemMatrix { rows: usize, columns: usize },

    #[error("pseudo-inverse failed: {0}")]
    PseudoInverse(String),

    #[error("measurement vector has {measurements} entries but the system matrix has {rows} rows")]
    DimensionMismatch { measurements: usize, rows: usize },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl EstimationError {
    /// Not enough valid telemetry this frame.
    pub fn is_input_starvation(&self) -> bool {
        matches!(
            self,
            EstimationError::NoObservedVoltages | EstimationError::EmptyMeasurementVector
        )
    }

    /// The linear system could not be inverted.
    pub fn is_numeric_degeneracy(&self) -> bool {
        matches!(
            self,
            EstimationError::EmptySystemMatrix { .. }
                | EstimationError::PseudoInverse(_)
                | EstimationError::DimensionMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes_are_disjoint() {
        let starvation = EstimationError::NoObservedVoltages;
        let degenerate = EstimationError::EmptySystemMatrix {
            rows: 0,
            columns: 4,
        };
        assert!(starvation.is_input_starvation());
        assert!(!starvation.is_numeric_degeneracy());
        assert!(degenerate.is_numeric_degeneracy());
        assert!(!degenerate.is_input_starvation());
        assert_eq!(
            degenerate.to_string(),
            "system matrix is structurally empty (0 rows x 4 columns)"
        );
    }

    #[test]
    fn test_model_error_passes_through() {
        let err: EstimationError = ModelError::ZeroBaseVoltage(0.0).into();
        assert!(err.to_string().contains("non-zero base voltage"));
        assert!(!err.is_input_starvation());
        assert!(!err.is_numeric_degeneracy());
    }
}
