//! # lse-core: Synchrophasor Network Model
//!
//! Data structures for a topology-driven linear state estimator fed by phasor
//! measurement units (PMUs).
//!
//! ## Design
//!
//! The network is an **undirected multigraph** where:
//! - **Nodes**: [`Bus`]es
//! - **Edges**: [`Branch`]es (lines, transformers) and [`SwitchingDevice`]s
//!   (breakers, disconnect switches)
//!
//! Shunts and [`PhasorGroup`]s live in flat arenas next to the graph and refer
//! to buses, branches and shunts by newtype ID. All references are resolved in
//! one pass by [`NetworkBuilder::build`], which aborts on dangling references
//! and keeps warnings on the resulting [`Network`].
//!
//! ## Quick Start
//!
//! ```
//! use lse_core::*;
//!
//! let mut builder = NetworkBuilder::new();
//! builder.add_bus(Bus::new(BusId::new(1), "North", 138.0));
//! builder.add_bus(Bus::new(BusId::new(2), "South", 138.0));
//! builder.add_branch(Branch::new(
//!     BranchId::new(1),
//!     "North-South",
//!     BusId::new(1),
//!     BusId::new(2),
//!     0.01,
//!     0.1,
//! ));
//! builder.add_group(
//!     PhasorGroup::voltage("North V", BusId::new(1), VoltageLevel::new(138.0))
//!         .with_keys(Phase::Positive, "PMU1:V1M", "PMU1:V1A"),
//! );
//!
//! let network = builder.build().unwrap();
//! assert_eq!(network.stats().num_buses, 2);
//! ```
//!
//! ## Modules
//!
//! - [`units`] - Unit newtypes (per-unit, kV, MVA, radians, degrees)
//! - [`phasor`] - [`PhasorValue`] and per-unit bases
//! - [`sequence`] - Fortescue transform
//! - [`status`] - PMU STAT words and breaker status words
//! - [`phasor_group`] - Six-component measurement/estimate bundles
//! - [`network`] - [`Network`] aggregate and its builder
//! - [`mapping`] - Telemetry key to model field table
//! - [`config`] - TOML configuration
//! - [`diagnostics`] - Initialisation diagnostics

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod mapping;
pub mod network;
pub mod phasor;
pub mod phasor_group;
pub mod sequence;
pub mod status;
pub mod units;

pub use config::{AngleUnit, EstimatorConfig, LoggingConfig, LseConfig, PhaseSelection};
pub use diagnostics::{DiagnosticIssue, Diagnostics, IssueCategory, Severity};
pub use error::{LseError, LseResult, ModelError};
pub use mapping::{FrameIngestion, MeasurementField, MeasurementMap, MeasurementTarget};
pub use network::{Network, NetworkBuilder, NetworkStats};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use phasor::{Phase, PhasorKind, PhasorValue, VoltageLevel};
pub use phasor_group::{BranchEnd, GroupRole, PhasorGroup, PhasorSet};
pub use sequence::{SequenceComponents, SequenceTransform};
pub use status::{BreakerStatus, StatusWord};
pub use units::{Degrees, Kilovolts, MegavoltAmperes, PerUnit, Radians};

/// Declares a `usize` newtype ID displayed as `Prefix#N`.
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub const fn new(value: usize) -> Self {
                $name(value)
            }
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(BusId, "Bus");
define_id!(BranchId, "Branch");
define_id!(ShuntId, "Shunt");
define_id!(SwitchId, "Switch");
define_id!(GroupId, "Group");

/// A topology vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    pub base_kv: Kilovolts,
}

impl Bus {
    pub fn new(id: BusId, name: impl Into<String>, base_kv: f64) -> Self {
        Self {
            id,
            name: name.into(),
            base_kv: Kilovolts(base_kv),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    #[default]
    Line,
    Transformer,
}

/// Series element between two buses, π model in per unit on the system base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series resistance (per-unit)
    pub resistance: f64,
    /// Series reactance (per-unit)
    pub reactance: f64,
    /// Total line charging susceptance (per-unit, split half/half)
    pub charging_b: PerUnit,
    /// Off-nominal tap magnitude on the from side
    pub tap_ratio: f64,
    /// Phase shift applied from from_bus to to_bus
    pub phase_shift: Radians,
    pub kind: BranchKind,
    pub in_service: bool,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: BranchId(0),
            name: String::new(),
            from_bus: BusId(0),
            to_bus: BusId(0),
            resistance: 0.0,
            reactance: 0.0,
            charging_b: PerUnit(0.0),
            tap_ratio: 1.0,
            phase_shift: Radians(0.0),
            kind: BranchKind::Line,
            in_service: true,
        }
    }
}

/// The four entries a branch contributes to the bus admittance matrix.
///
/// ```text
/// ⎡I_from⎤   ⎡y_ff  y_ft⎤ ⎡V_from⎤
/// ⎣I_to  ⎦ = ⎣y_tf  y_tt⎦ ⎣V_to  ⎦
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchAdmittance {
    pub y_ff: Complex64,
    pub y_ft: Complex64,
    pub y_tf: Complex64,
    pub y_tt: Complex64,
}

impl Branch {
    pub fn new(
        id: BranchId,
        name: impl Into<String>,
        from_bus: BusId,
        to_bus: BusId,
        resistance: f64,
        reactance: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            from_bus,
            to_bus,
            resistance,
            reactance,
            ..Self::default()
        }
    }

    pub fn with_charging(mut self, charging_b: f64) -> Self {
        self.charging_b = PerUnit(charging_b);
        self
    }

    pub fn as_transformer(mut self, tap_ratio: f64, phase_shift: Radians) -> Self {
        self.kind = BranchKind::Transformer;
        self.tap_ratio = tap_ratio;
        self.phase_shift = phase_shift;
        self
    }

    pub fn admittance(&self) -> Result<BranchAdmittance, ModelError> {
        let z = Complex64::new(self.resistance, self.reactance);
        if z.norm() < f64::EPSILON {
            return Err(ModelError::ZeroImpedance(self.name.clone()));
        }
        let y_series = z.inv();

        let tau = if self.tap_ratio.abs() < f64::EPSILON {
            1.0
        } else {
            self.tap_ratio
        };
        let shift = Complex64::from_polar(1.0, -self.phase_shift.value());
        let y_shunt_half = Complex64::new(0.0, self.charging_b.value() / 2.0);

        Ok(BranchAdmittance {
            y_ff: y_series / (tau * tau) + y_shunt_half,
            y_ft: -y_series / tau * shift.conj(),
            y_tf: -y_series / tau * shift,
            y_tt: y_series + y_shunt_half,
        })
    }

    /// Terminal bus at the given end.
    pub fn terminal(&self, end: BranchEnd) -> BusId {
        match end {
            BranchEnd::From => self.from_bus,
            BranchEnd::To => self.to_bus,
        }
    }
}

/// Element connected between a bus and ground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shunt {
    pub id: ShuntId,
    pub name: String,
    pub bus: BusId,
    /// Conductance in per-unit
    #[serde(default)]
    pub conductance: f64,
    /// Susceptance in per-unit (positive = capacitor)
    #[serde(default)]
    pub susceptance: f64,
}

impl Shunt {
    pub fn new(id: ShuntId, name: impl Into<String>, bus: BusId, conductance: f64, susceptance: f64) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            conductance,
            susceptance,
        }
    }

    pub fn admittance(&self) -> Complex64 {
        Complex64::new(self.conductance, self.susceptance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    Open,
    Closed,
}

impl SwitchState {
    pub fn is_closed(self) -> bool {
        self == SwitchState::Closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchKind {
    #[default]
    Breaker,
    Switch,
}

/// Zero-impedance connection between two buses that can be opened.
///
/// Only the actual state matters for observability; the normal state is kept
/// for display and as the starting point before any status arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchingDevice {
    pub id: SwitchId,
    pub name: String,
    #[serde(default)]
    pub kind: SwitchKind,
    pub from_bus: BusId,
    pub to_bus: BusId,
    pub normal_state: SwitchState,
    pub actual_state: SwitchState,
    #[serde(default)]
    pub status: Option<BreakerStatus>,
}

impl SwitchingDevice {
    pub fn new(
        id: SwitchId,
        name: impl Into<String>,
        from_bus: BusId,
        to_bus: BusId,
        normal_state: SwitchState,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind: SwitchKind::Breaker,
            from_bus,
            to_bus,
            normal_state,
            actual_state: normal_state,
            status: None,
        }
    }

    pub fn with_status(mut self, status: BreakerStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn as_disconnect_switch(mut self) -> Self {
        self.kind = SwitchKind::Switch;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.actual_state.is_closed()
    }

    /// Operator override of the actual state.
    pub fn set_actual_state(&mut self, state: SwitchState) {
        self.actual_state = state;
    }

    /// Raw status word last seen, zero when the device has no telemetry.
    pub fn raw_status(&self) -> u16 {
        self.status.as_ref().map_or(0, BreakerStatus::binary_value)
    }

    /// Offer a telemetry sample to the breaker status; a match moves the
    /// actual state to the reported position.
    pub fn insert(&mut self, key: &str, value: f64) -> bool {
        let Some(status) = self.status.as_mut() else {
            return false;
        };
        if !status.insert(key, value) {
            return false;
        }
        self.actual_state = if status.is_closed() {
            SwitchState::Closed
        } else {
            SwitchState::Open
        };
        true
    }

    pub fn clear_reported(&mut self) {
        if let Some(status) = self.status.as_mut() {
            status.clear_reported();
        }
    }
}

/// Edges of the topology graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Edge {
    Branch(Branch),
    Switch(SwitchingDevice),
}

impl Edge {
    pub fn label(&self) -> &str {
        match self {
            Edge::Branch(branch) => &branch.name,
            Edge::Switch(device) => &device.name,
        }
    }
}
