//! The estimation cycle.
//!
//! ```text
//! Uninitialized ──initialize──▶ Initialized
//!                                   │ per frame
//!                                   ▼
//!      ChangeCheck ──changed or no matrix──▶ Rebuild
//!           │                                  │
//!           ▼                                  ▼
//!      AssembleMeasurementVector ◀─────────────┘
//!           ▼
//!         Solve
//!           ▼
//!      ScatterState ──next frame──▶ ChangeCheck
//! ```
//!
//! One call to [`LinearStateEstimator::compute_system_state`] runs one pass to
//! completion. A failed frame leaves no estimate behind and drops the system
//! matrix so the next frame rebuilds from scratch.

use lse_core::{
    BranchEnd, EstimatorConfig, FrameIngestion, GroupId, GroupRole, MeasurementMap, Network,
    NetworkBuilder, Phase, PhaseSelection, PhasorGroup, SequenceComponents, SequenceTransform,
};
use nalgebra::DVector;
use num_complex::Complex64;
use tracing::{debug, info, warn};

use crate::change_detector::ChangeDetector;
use crate::counters::{PerformanceCounters, StageTimer};
use crate::error::EstimationError;
use crate::observability::{
    group_included, Observability, ObservabilityAnalysis, ObservabilityAnalyzer,
};
use crate::outputs::{publish, BusVoltage, OutputCategory, OutputMeasurement};
use crate::system_matrix::SystemMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    Uninitialized,
    Initialized,
    ChangeCheck,
    Rebuild,
    AssembleMeasurementVector,
    Solve,
    ScatterState,
}

/// Topology-driven linear state estimator for one network.
#[derive(Debug)]
pub struct LinearStateEstimator {
    config: EstimatorConfig,
    network: Option<Network>,
    map: MeasurementMap,
    analysis: Option<ObservabilityAnalysis>,
    matrix: Option<SystemMatrix>,
    detector: ChangeDetector,
    counters: PerformanceCounters,
    state: EstimatorState,
    bus_voltages: Vec<BusVoltage>,
    outputs: Vec<OutputMeasurement>,
}

impl LinearStateEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            network: None,
            map: MeasurementMap::default(),
            analysis: None,
            matrix: None,
            detector: ChangeDetector::new(),
            counters: PerformanceCounters::default(),
            state: EstimatorState::Uninitialized,
            bus_voltages: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Resolve the model and get ready for the first frame.
    pub fn initialize(&mut self, builder: NetworkBuilder) -> Result<(), EstimationError> {
        let network = builder.build()?;
        self.attach(network);
        Ok(())
    }

    /// Use an already initialised network.
    pub fn attach(&mut self, mut network: Network) {
        network.set_status_filtering(self.config.use_status_flags);
        self.map = MeasurementMap::from_network(&network).with_angle_unit(self.config.angle_unit);
        info!(
            stats = %network.stats(),
            keys = self.map.len(),
            selection = ?self.config.phase_selection,
            "estimator initialised"
        );
        self.network = Some(network);
        self.analysis = None;
        self.matrix = None;
        self.detector.reset();
        self.bus_voltages.clear();
        self.outputs.clear();
        self.state = EstimatorState::Initialized;
    }

    /// Replace the model. The next frame always rebuilds.
    pub fn reload(&mut self, builder: NetworkBuilder) -> Result<(), EstimationError> {
        info!("reloading network model");
        self.initialize(builder)
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    pub fn network_mut(&mut self) -> Option<&mut Network> {
        self.network.as_mut()
    }

    pub fn measurement_map(&self) -> &MeasurementMap {
        &self.map
    }

    pub fn observability(&self) -> Option<&ObservabilityAnalysis> {
        self.analysis.as_ref()
    }

    pub fn system_matrix(&self) -> Option<&SystemMatrix> {
        self.matrix.as_ref()
    }

    pub fn counters(&self) -> &PerformanceCounters {
        &self.counters
    }

    pub fn rebuild_count(&self) -> u64 {
        self.detector.rebuild_count()
    }

    /// Voltages of every bus in the state, from the last successful frame.
    pub fn bus_voltages(&self) -> &[BusVoltage] {
        &self.bus_voltages
    }

    pub fn outputs(&self) -> &[OutputMeasurement] {
        &self.outputs
    }

    /// Clear the previous frame, apply this frame's samples and estimate.
    pub fn process_frame<I, K>(&mut self, samples: I) -> Result<FrameIngestion, EstimationError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let network = self.network.as_mut().ok_or(EstimationError::Uninitialized)?;
        let timer = StageTimer::start();
        network.begin_frame();
        let ingestion = self.map.apply_frame(network, samples);
        let parsing = timer.stop();

        self.compute_system_state()?;
        self.counters.timings.parsing = parsing;
        Ok(ingestion)
    }

    /// Run one estimation pass over the telemetry already applied.
    pub fn compute_system_state(&mut self) -> Result<(), EstimationError> {
        if self.network.is_none() {
            return Err(EstimationError::Uninitialized);
        }
        self.counters.frames += 1;
        self.counters.timings = Default::default();

        match self.run_cycle() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.counters.failed_frames += 1;
                self.matrix = None;
                self.bus_voltages.clear();
                self.outputs.clear();
                self.state = EstimatorState::Initialized;
                if err.is_input_starvation() {
                    warn!(%err, "frame skipped: insufficient telemetry");
                } else {
                    warn!(%err, "frame failed");
                }
                Err(err)
            }
        }
    }

    fn run_cycle(&mut self) -> Result<(), EstimationError> {
        let selection = self.config.phase_selection;
        let Self {
            config,
            network,
            analysis,
            matrix,
            detector,
            counters,
            state,
            bus_voltages,
            outputs,
            ..
        } = self;
        let network = network.as_mut().ok_or(EstimationError::Uninitialized)?;

        *state = EstimatorState::ChangeCheck;
        let timer = StageTimer::start();
        network.reconcile_measurements();
        let rebuild = detector.should_rebuild(network, selection, matrix.is_some());
        let mut mapping = timer.stop();

        if rebuild {
            *state = EstimatorState::Rebuild;
            let timer = StageTimer::start();
            *matrix = None;
            let fresh = ObservabilityAnalyzer::analyze(network, selection);
            counters.observed_buses = fresh.state_bus_count();
            fresh.require_observed()?;
            let built = SystemMatrix::build(network, &fresh, config.pseudo_inverse_tolerance)?;
            detector.record_rebuild();

            let active = built.active_measurements();
            counters.active_voltages = active.voltages;
            counters.active_current_flows = active.current_flows;
            counters.active_injections = active.injections;
            counters.rebuilds = detector.rebuild_count();
            info!(
                rows = built.row_count(),
                columns = built.column_count(),
                observed_buses = fresh.state_bus_count(),
                rebuilds = detector.rebuild_count(),
                "system matrix rebuilt"
            );
            *analysis = Some(fresh);
            *matrix = Some(built);
            counters.timings.observability = timer.stop();
        }

        let (Some(current_analysis), Some(current_matrix)) = (analysis.as_ref(), matrix.as_ref())
        else {
            return Err(EstimationError::EmptySystemMatrix {
                rows: 0,
                columns: 0,
            });
        };

        *state = EstimatorState::AssembleMeasurementVector;
        let timer = StageTimer::start();
        let z = current_matrix.assemble_measurements(network)?;
        mapping += timer.stop();
        counters.timings.mapping = mapping;

        *state = EstimatorState::Solve;
        let timer = StageTimer::start();
        let x = current_matrix.solve(&z)?;
        counters.timings.solve = timer.stop();

        *state = EstimatorState::ScatterState;
        let timer = StageTimer::start();
        scatter(
            network,
            current_analysis,
            &x,
            config,
            bus_voltages,
            outputs,
        )?;
        counters.timings.output = timer.stop();
        debug!(outputs = outputs.len(), "state scattered");
        Ok(())
    }
}

/// Voltages of one bus from the state vector, per unit.
fn bus_state(x: &DVector<Complex64>, first: usize, selection: PhaseSelection) -> (Complex64, [Complex64; 3]) {
    match selection {
        PhaseSelection::PositiveSequence => {
            let positive = x[first];
            (positive, SequenceTransform::to_phases(SequenceComponents::balanced(positive)))
        }
        PhaseSelection::ThreePhase => {
            let phases = [x[first], x[first + 1], x[first + 2]];
            (SequenceTransform::to_sequence(phases).positive, phases)
        }
    }
}

fn set_estimate(
    group: &mut PhasorGroup,
    selection: PhaseSelection,
    positive: Complex64,
    phases: [Complex64; 3],
) -> Result<(), EstimationError> {
    match selection {
        PhaseSelection::PositiveSequence => group.set_estimated_positive_sequence_per_unit(positive)?,
        PhaseSelection::ThreePhase => group.set_estimated_phases_per_unit(phases)?,
    }
    Ok(())
}

fn published_phases(selection: PhaseSelection) -> &'static [Phase] {
    match selection {
        PhaseSelection::PositiveSequence => &[Phase::Positive],
        PhaseSelection::ThreePhase => &Phase::ALL,
    }
}

fn scatter(
    network: &mut Network,
    analysis: &ObservabilityAnalysis,
    x: &DVector<Complex64>,
    config: &EstimatorConfig,
    bus_voltages: &mut Vec<BusVoltage>,
    outputs: &mut Vec<OutputMeasurement>,
) -> Result<(), EstimationError> {
    let selection = config.phase_selection;
    let width = selection.unknowns_per_bus();
    let publish_phases = published_phases(selection);

    bus_voltages.clear();
    outputs.clear();

    let mut voltage_updates: Vec<(GroupId, Option<(Complex64, [Complex64; 3])>)> = Vec::new();
    for (_, bus) in network.buses() {
        let solved = analysis.state_index(bus.id).map(|index| {
            let (positive, phases) = bus_state(x, index * width, selection);
            bus_voltages.push(BusVoltage {
                bus: bus.id,
                observability: analysis
                    .classification(bus.id)
                    .unwrap_or(Observability::Unobserved),
                positive_sequence: positive,
                phases,
            });
            (positive, phases)
        });
        if let Some(group) = network.voltage_group_id(bus.id) {
            voltage_updates.push((group, solved));
        }
    }

    for (id, solved) in voltage_updates {
        let Some(group) = network.group_mut(id) else {
            continue;
        };
        match solved {
            Some((positive, phases)) => {
                set_estimate(group, selection, positive, phases)?;
                publish(outputs, group, OutputCategory::VoltageEstimate, publish_phases);
                // A residual needs this frame's measurement
                if group_included(group, selection) {
                    publish(outputs, group, OutputCategory::VoltageResidual, publish_phases);
                }
            }
            None => group.clear_estimates(),
        }
    }

    // Branch currents and shunt injections follow from the solved voltages
    let voltage_of = |bus| {
        analysis
            .state_index(bus)
            .map(|index| bus_state(x, index * width, selection))
    };

    let mut current_updates: Vec<(GroupId, Option<(Complex64, [Complex64; 3])>, OutputCategory)> =
        Vec::new();
    for index in 0..network.groups().len() {
        let group = &network.groups()[index];
        let included = group_included(group, selection);
        let current = match group.role {
            GroupRole::Voltage { .. } => continue,
            GroupRole::CurrentFlow { branch, end } => {
                let estimate = if config.prune_unmeasured_branches && !included {
                    None
                } else {
                    match network.branch(branch) {
                        Some(branch) if branch.in_service => {
                            match (voltage_of(branch.from_bus), voltage_of(branch.to_bus)) {
                                (Some(from), Some(to)) => {
                                    let y = branch.admittance()?;
                                    let (y_from, y_to) = match end {
                                        BranchEnd::From => (y.y_ff, y.y_ft),
                                        BranchEnd::To => (y.y_tf, y.y_tt),
                                    };
                                    Some((
                                        y_from * from.0 + y_to * to.0,
                                        [0, 1, 2].map(|k| y_from * from.1[k] + y_to * to.1[k]),
                                    ))
                                }
                                _ => None,
                            }
                        }
                        _ => None,
                    }
                };
                (estimate, OutputCategory::CurrentFlowEstimate)
            }
            GroupRole::CurrentInjection { shunt } => {
                let estimate = network.shunt(shunt).and_then(|shunt| {
                    let y = shunt.admittance();
                    voltage_of(shunt.bus).map(|(positive, phases)| (y * positive, phases.map(|v| y * v)))
                });
                (estimate, OutputCategory::CurrentInjectionEstimate)
            }
        };
        current_updates.push((group.id, current.0, current.1));
    }

    for (id, estimate, category) in current_updates {
        let Some(group) = network.group_mut(id) else {
            continue;
        };
        match estimate {
            Some((positive, phases)) => {
                set_estimate(group, selection, positive, phases)?;
                publish(outputs, group, category, publish_phases);
            }
            None => group.clear_estimates(),
        }
    }
    Ok(())
}
