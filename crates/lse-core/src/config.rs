//! Estimator configuration.
//!
//! Stored as TOML. Partial files are accepted: anything left out takes its
//! default.
//!
//! ```toml
//! [estimator]
//! phase_selection = "three_phase"
//! use_status_flags = true
//!
//! [logging]
//! level = "debug"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LseError, LseResult};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LseConfig {
    pub estimator: EstimatorConfig,
    pub logging: LoggingConfig,
}

/// Settings for the estimation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Positive-sequence or full three-phase model.
    pub phase_selection: PhaseSelection,

    /// Gate measurement inclusion on the PMU status word.
    pub use_status_flags: bool,

    /// Only estimate currents on branches that carry an included measurement.
    pub prune_unmeasured_branches: bool,

    /// Singular values below this are treated as zero by the pseudo-inverse.
    pub pseudo_inverse_tolerance: f64,

    /// Unit telemetry angle samples arrive in.
    pub angle_unit: AngleUnit,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            phase_selection: PhaseSelection::PositiveSequence,
            use_status_flags: true,
            prune_unmeasured_branches: false,
            pseudo_inverse_tolerance: 1e-10,
            angle_unit: AngleUnit::Degrees,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseSelection {
    #[default]
    PositiveSequence,
    ThreePhase,
}

impl PhaseSelection {
    /// State-vector unknowns per observed bus.
    pub fn unknowns_per_bus(self) -> usize {
        match self {
            PhaseSelection::PositiveSequence => 1,
            PhaseSelection::ThreePhase => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleUnit {
    #[default]
    Degrees,
    Radians,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing level filter (`error`, `warn`, `info`, `debug`, `trace`)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LseConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> LseResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> LseResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> LseResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> LseResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn validate(&self) -> LseResult<()> {
        let tolerance = self.estimator.pseudo_inverse_tolerance;
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(LseError::Config(format!(
                "pseudo_inverse_tolerance must be positive (got {tolerance})"
            )));
        }
        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(LseError::Config(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}
