//! Phasor groups: the six-component measurement/estimate bundle for one
//! measurement point.
//!
//! A single [`PhasorGroup`] type covers bus voltages, branch current flows and
//! shunt current injections; what it measures is carried by its [`GroupRole`].
//! The group decides from its own flags whether it takes part in the current
//! frame's estimate:
//!
//! - [`PhasorGroup::include_in_estimator`] for three-phase estimation
//! - [`PhasorGroup::include_in_positive_sequence_estimator`] for sequence mode
//!
//! Both predicates are evaluated fresh from the reported flags, the validity
//! floor and (optionally) the PMU status word; neither has side effects.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::phasor::{Phase, PhasorKind, PhasorValue, VoltageLevel};
use crate::sequence::{SequenceComponents, SequenceTransform};
use crate::status::StatusWord;
use crate::{BranchId, BusId, GroupId, ShuntId};

/// Voltage readings below this fraction of `baseKV × 1000` are treated as missing.
pub const VOLTAGE_FLOOR_FRACTION: f64 = 0.2;

/// Current readings below this many amperes are treated as missing.
pub const CURRENT_FLOOR_AMPS: f64 = 10.0;

/// Terminal of a branch a current flow is measured at. Flow is positive out of
/// that terminal into the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchEnd {
    From,
    To,
}

/// What a phasor group measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum GroupRole {
    Voltage { bus: BusId },
    CurrentFlow { branch: BranchId, end: BranchEnd },
    CurrentInjection { shunt: ShuntId },
}

impl GroupRole {
    pub fn kind(&self) -> PhasorKind {
        match self {
            GroupRole::Voltage { .. } => PhasorKind::Voltage,
            GroupRole::CurrentFlow { .. } | GroupRole::CurrentInjection { .. } => {
                PhasorKind::Current
            }
        }
    }

    pub fn is_voltage(&self) -> bool {
        matches!(self, GroupRole::Voltage { .. })
    }
}

/// Six phasor values sharing one kind and voltage level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorSet {
    pub zero: PhasorValue,
    pub positive: PhasorValue,
    pub negative: PhasorValue,
    pub a: PhasorValue,
    pub b: PhasorValue,
    pub c: PhasorValue,
}

impl PhasorSet {
    pub fn new(kind: PhasorKind, level: VoltageLevel) -> Self {
        let value = PhasorValue::new(kind, level);
        Self {
            zero: value.clone(),
            positive: value.clone(),
            negative: value.clone(),
            a: value.clone(),
            b: value.clone(),
            c: value,
        }
    }

    pub fn get(&self, phase: Phase) -> &PhasorValue {
        match phase {
            Phase::Zero => &self.zero,
            Phase::Positive => &self.positive,
            Phase::Negative => &self.negative,
            Phase::A => &self.a,
            Phase::B => &self.b,
            Phase::C => &self.c,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut PhasorValue {
        match phase {
            Phase::Zero => &mut self.zero,
            Phase::Positive => &mut self.positive,
            Phase::Negative => &mut self.negative,
            Phase::A => &mut self.a,
            Phase::B => &mut self.b,
            Phase::C => &mut self.c,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, &PhasorValue)> {
        Phase::ALL.into_iter().map(move |phase| (phase, self.get(phase)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PhasorValue> {
        [
            &mut self.zero,
            &mut self.positive,
            &mut self.negative,
            &mut self.a,
            &mut self.b,
            &mut self.c,
        ]
        .into_iter()
    }

    /// Phase values in device units.
    pub fn phases(&self) -> [Complex64; 3] {
        [self.a.complex(), self.b.complex(), self.c.complex()]
    }

    pub fn sequence(&self) -> SequenceComponents {
        SequenceComponents {
            zero: self.zero.complex(),
            positive: self.positive.complex(),
            negative: self.negative.complex(),
        }
    }

    fn set_phases(&mut self, phases: [Complex64; 3]) {
        self.a.set_complex(phases[0]);
        self.b.set_complex(phases[1]);
        self.c.set_complex(phases[2]);
    }

    fn set_sequence(&mut self, sequence: SequenceComponents) {
        self.zero.set_complex(sequence.zero);
        self.positive.set_complex(sequence.positive);
        self.negative.set_complex(sequence.negative);
    }
}

/// Measurement/estimate bundle for one measurement point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorGroup {
    /// Arena index, assigned by [`crate::NetworkBuilder::add_group`]
    #[serde(default)]
    pub id: GroupId,
    pub name: String,
    #[serde(flatten)]
    pub role: GroupRole,
    pub enabled: bool,
    /// Gate inclusion on the PMU status word
    #[serde(default)]
    pub filter_by_status: bool,
    #[serde(default)]
    pub status: StatusWord,
    pub measurement: PhasorSet,
    pub estimate: PhasorSet,
    /// Prefix for published output keys
    pub output_key: String,
}

impl PhasorGroup {
    pub fn new(name: impl Into<String>, role: GroupRole, level: VoltageLevel) -> Self {
        let name = name.into();
        let kind = role.kind();
        Self {
            id: GroupId::default(),
            output_key: name.clone(),
            name,
            role,
            enabled: true,
            filter_by_status: true,
            status: StatusWord::new(),
            measurement: PhasorSet::new(kind, level),
            estimate: PhasorSet::new(kind, level),
        }
    }

    pub fn voltage(name: impl Into<String>, bus: BusId, level: VoltageLevel) -> Self {
        Self::new(name, GroupRole::Voltage { bus }, level)
    }

    pub fn current_flow(
        name: impl Into<String>,
        branch: BranchId,
        end: BranchEnd,
        level: VoltageLevel,
    ) -> Self {
        Self::new(name, GroupRole::CurrentFlow { branch, end }, level)
    }

    pub fn current_injection(name: impl Into<String>, shunt: ShuntId, level: VoltageLevel) -> Self {
        Self::new(name, GroupRole::CurrentInjection { shunt }, level)
    }

    /// Register telemetry keys for one component's measurement.
    pub fn with_keys(
        mut self,
        phase: Phase,
        magnitude_key: impl Into<String>,
        angle_key: impl Into<String>,
    ) -> Self {
        let value = self.measurement.get_mut(phase);
        value.magnitude_key = Some(magnitude_key.into());
        value.angle_key = Some(angle_key.into());
        self
    }

    pub fn with_status_key(mut self, key: impl Into<String>) -> Self {
        self.status.key = Some(key.into());
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn kind(&self) -> PhasorKind {
        self.role.kind()
    }

    pub fn level(&self) -> VoltageLevel {
        self.measurement.positive.level
    }

    /// True when a reading is large enough to be taken at face value.
    pub fn above_floor(&self, value: &PhasorValue) -> bool {
        match self.kind() {
            PhasorKind::Voltage => {
                value.magnitude() >= VOLTAGE_FLOOR_FRACTION * self.level().base_kv.to_volts()
            }
            PhasorKind::Current => value.magnitude() >= CURRENT_FLOOR_AMPS,
        }
    }

    fn usable(&self, phase: Phase) -> bool {
        let value = self.measurement.get(phase);
        value.is_reported() && self.above_floor(value)
    }

    /// Three-phase inclusion: A, B and C all fresh and above the floor, and the
    /// status word free of data-invalid, PMU-error and sync-invalid bits.
    pub fn include_in_estimator(&self) -> bool {
        if !self.enabled || !Phase::PHASES.iter().all(|&phase| self.usable(phase)) {
            return false;
        }
        !self.filter_by_status
            || (self.status.data_is_valid()
                && !self.status.pmu_error()
                && self.status.synchronization_is_valid())
    }

    /// Sequence-mode inclusion: positive sequence fresh and above the floor,
    /// and the status word free of data-invalid and sync-invalid bits. The
    /// PMU-error bit is not consulted here.
    pub fn include_in_positive_sequence_estimator(&self) -> bool {
        if !self.enabled || !self.usable(Phase::Positive) {
            return false;
        }
        !self.filter_by_status
            || (self.status.data_is_valid() && self.status.synchronization_is_valid())
    }

    /// Fill the sequence measurements from the phases when the device only
    /// reported phase values this frame.
    pub fn reconcile_sequence_measurements(&mut self) {
        let phases_reported = Phase::PHASES
            .iter()
            .all(|&phase| self.measurement.get(phase).is_reported());
        if !phases_reported || self.measurement.positive.is_reported() {
            return;
        }
        let sequence = SequenceTransform::to_sequence(self.measurement.phases());
        self.measurement.set_sequence(sequence);
        self.measurement.zero.mark_reported();
        self.measurement.positive.mark_reported();
        self.measurement.negative.mark_reported();
    }

    pub fn measured_per_unit(&self, phase: Phase) -> Result<Complex64, ModelError> {
        self.measurement.get(phase).per_unit()
    }

    pub fn estimated_per_unit(&self, phase: Phase) -> Result<Complex64, ModelError> {
        self.estimate.get(phase).per_unit()
    }

    /// Store a three-phase estimate and derive its sequence components.
    pub fn set_estimated_phases_per_unit(&mut self, phases: [Complex64; 3]) -> Result<(), ModelError> {
        let base = self.level().base_value(self.kind())?;
        let phases = phases.map(|value| value * base);
        self.estimate.set_phases(phases);
        self.estimate
            .set_sequence(SequenceTransform::to_sequence(phases));
        Ok(())
    }

    /// Store a positive-sequence estimate; phases are reconstructed as a
    /// balanced set.
    pub fn set_estimated_positive_sequence_per_unit(
        &mut self,
        positive: Complex64,
    ) -> Result<(), ModelError> {
        let base = self.level().base_value(self.kind())?;
        let sequence = SequenceComponents::balanced(positive * base);
        self.estimate.set_sequence(sequence);
        self.estimate.set_phases(SequenceTransform::to_phases(sequence));
        Ok(())
    }

    /// Measurement minus estimate, in device units.
    pub fn residual(&self, phase: Phase) -> Complex64 {
        self.measurement.get(phase).complex() - self.estimate.get(phase).complex()
    }

    pub fn clear_estimates(&mut self) {
        for value in self.estimate.iter_mut() {
            value.set_complex(Complex64::new(0.0, 0.0));
        }
    }

    /// Forget last frame's reported flags.
    pub fn clear_reported(&mut self) {
        for value in self.measurement.iter_mut() {
            value.clear_reported();
        }
        self.status.clear_reported();
    }

    /// Offer a telemetry sample to the status word and every measurement.
    pub fn insert(&mut self, key: &str, value: f64) -> bool {
        let mut matched = self.status.insert(key, value);
        for phasor in self.measurement.iter_mut() {
            matched |= phasor.insert(key, value);
        }
        matched
    }
}
