//! # lse-algo: Linear State Estimation Engine
//!
//! Turns a [`lse_core::Network`] and one frame of PMU telemetry into complex
//! bus voltages, branch currents and shunt injections.
//!
//! ## Cycle
//!
//! | Stage | Module |
//! |-------|--------|
//! | Change check | [`change_detector`] |
//! | Observability | [`observability`] |
//! | Matrix rebuild | [`system_matrix`] |
//! | Measurement vector, solve, scatter | [`estimator`] |
//! | Results | [`outputs`], [`counters`] |
//!
//! The linear model is rebuilt only when a switching device operates or the
//! set of included measurements changes; otherwise the cached pseudo-inverse
//! is reused and each frame costs one dense matrix-vector product.
//!
//! ## Example
//!
//! ```
//! use lse_algo::LinearStateEstimator;
//! use lse_core::*;
//!
//! let mut builder = NetworkBuilder::new();
//! builder.add_bus(Bus::new(BusId::new(1), "North", 138.0));
//! builder.add_group(
//!     PhasorGroup::voltage("North V", BusId::new(1), VoltageLevel::new(138.0))
//!         .with_keys(Phase::Positive, "PMU1:V1M", "PMU1:V1A"),
//! );
//!
//! let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
//! estimator.initialize(builder).unwrap();
//! estimator
//!     .process_frame([("PMU1:V1M", 80_000.0), ("PMU1:V1A", -3.0)])
//!     .unwrap();
//!
//! let v = estimator.bus_voltages()[0];
//! assert!((v.angle_degrees() + 3.0).abs() < 1e-9);
//! ```

pub mod change_detector;
pub mod counters;
pub mod error;
pub mod estimator;
pub mod observability;
pub mod outputs;
pub mod system_matrix;

pub use change_detector::ChangeDetector;
pub use counters::{PerformanceCounters, StageTimings};
pub use error::EstimationError;
pub use estimator::{EstimatorState, LinearStateEstimator};
pub use observability::{Observability, ObservabilityAnalysis, ObservabilityAnalyzer, ObservedBus};
pub use outputs::{BusVoltage, OutputCategory, OutputMeasurement, OutputQuantity};
pub use system_matrix::{ActiveMeasurements, MeasurementRow, RowKind, SystemMatrix};
