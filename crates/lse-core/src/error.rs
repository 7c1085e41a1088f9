//! Error types for model construction and configuration.
//!
//! [`ModelError`] covers everything that can be wrong with a network before the
//! first frame is estimated: references to buses that do not exist, branches
//! with a dangling terminal, zero impedances, zero voltage bases. These are
//! detected once, when [`crate::NetworkBuilder::build`] resolves the entity
//! arena, and abort initialisation.
//!
//! [`LseError`] is the crate-level error that also carries I/O and
//! configuration failures.
//!
//! ```
//! use lse_core::{LseError, LseResult, ModelError, BusId};
//!
//! fn check() -> LseResult<()> {
//!     Err(ModelError::UnknownBus { entity: "Breaker 7".into(), bus: BusId::new(3) })?;
//!     Ok(())
//! }
//! assert!(matches!(check(), Err(LseError::Model(_))));
//! ```

use thiserror::Error;

use crate::{BranchId, BusId, ShuntId, SwitchId};

/// Construction-time inconsistencies in the network model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("{entity} references unknown bus {bus}")]
    UnknownBus { entity: String, bus: BusId },

    #[error("phasor group '{group}' references unknown branch {branch}")]
    UnknownBranch { group: String, branch: BranchId },

    #[error("phasor group '{group}' references unknown shunt {shunt}")]
    UnknownShunt { group: String, shunt: ShuntId },

    #[error("unknown switching device {0}")]
    UnknownSwitch(SwitchId),

    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: usize },

    #[error("branch '{0}' has zero series impedance")]
    ZeroImpedance(String),

    #[error("per-unit conversion requires a non-zero base voltage (got {0} kV)")]
    ZeroBaseVoltage(f64),

    #[error("phasor group index {0} out of range")]
    UnknownGroup(usize),

    /// Initialisation aborted; carries the diagnostics summary.
    #[error("network model is inconsistent: {0}")]
    Inconsistent(String),
}

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum LseError {
    /// I/O errors (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (parse or invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network model errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using LseError.
pub type LseResult<T> = Result<T, LseError>;

impl From<toml::de::Error> for LseError {
    fn from(err: toml::de::Error) -> Self {
        LseError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LseError {
    fn from(err: toml::ser::Error) -> Self {
        LseError::Config(err.to_string())
    }
}

impl From<String> for LseError {
    fn from(s: String) -> Self {
        LseError::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::UnknownBus {
            entity: "Branch 'L1'".into(),
            bus: BusId::new(4),
        };
        assert_eq!(err.to_string(), "Branch 'L1' references unknown bus Bus#4");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LseError = io_err.into();
        assert!(matches!(err, LseError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> Result<(), ModelError> {
            Err(ModelError::ZeroBaseVoltage(0.0))
        }

        fn outer() -> LseResult<()> {
            inner()?;
            Ok(())
        }

        assert!(matches!(outer(), Err(LseError::Model(ModelError::ZeroBaseVoltage(_)))));
    }
}
