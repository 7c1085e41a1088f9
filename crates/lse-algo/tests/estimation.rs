//! End-to-end estimation cycles on small networks.

use lse_algo::{EstimationError, EstimatorState, LinearStateEstimator, Observability};
use lse_core::*;
use num_complex::Complex64;

const KV: f64 = 138.0;

fn v_base() -> f64 {
    KV * 1000.0 / 3f64.sqrt()
}

fn i_base() -> f64 {
    100.0e6 / (3f64.sqrt() * KV * 1000.0)
}

fn polar_deg(magnitude: f64, degrees: f64) -> Complex64 {
    Complex64::from_polar(magnitude, degrees.to_radians())
}

/// Magnitude/angle samples for a device-unit phasor.
fn samples(prefix: &str, suffix: &str, value: Complex64) -> [(String, f64); 2] {
    [
        (format!("{prefix}:{suffix}M"), value.norm()),
        (format!("{prefix}:{suffix}A"), value.arg().to_degrees()),
    ]
}

fn close(a: Complex64, b: Complex64, tol: f64) -> bool {
    (a - b).norm() <= tol
}

/// Bus 1 ── Line 1-2 (r=0.01, x=0.1) ── Bus 2, PMUs at both buses and a
/// current measurement at the from end.
fn create_2bus_builder() -> NetworkBuilder {
    let level = VoltageLevel::new(KV);
    let mut builder = NetworkBuilder::new();
    builder.add_bus(Bus::new(BusId::new(1), "Bus 1", KV));
    builder.add_bus(Bus::new(BusId::new(2), "Bus 2", KV));
    builder.add_branch(Branch::new(
        BranchId::new(1),
        "Line 1-2",
        BusId::new(1),
        BusId::new(2),
        0.01,
        0.1,
    ));
    for (bus, prefix) in [(1, "PMU1"), (2, "PMU2")] {
        let mut group = PhasorGroup::voltage(format!("{prefix} V"), BusId::new(bus), level)
            .with_keys(Phase::Positive, format!("{prefix}:V1M"), format!("{prefix}:V1A"))
            .with_status_key(format!("{prefix}:STAT"))
            .with_output_key(format!("Bus{bus}"));
        for (phase, tag) in [(Phase::A, "VA"), (Phase::B, "VB"), (Phase::C, "VC")] {
            group = group.with_keys(phase, format!("{prefix}:{tag}M"), format!("{prefix}:{tag}A"));
        }
        builder.add_group(group);
    }
    builder.add_group(
        PhasorGroup::current_flow("PMU1 I12", BranchId::new(1), BranchEnd::From, level)
            .with_keys(Phase::Positive, "PMU1:I1M", "PMU1:I1A")
            .with_output_key("Line12"),
    );
    builder
}

fn fixed_point() -> (Complex64, Complex64, Complex64) {
    let v1 = polar_deg(1.00, 0.0);
    let v2 = polar_deg(0.98, -2.0);
    let y = Complex64::new(0.01, 0.1).inv();
    (v1, v2, (v1 - v2) * y)
}

fn positive_frame() -> Vec<(String, f64)> {
    let (v1, v2, i12) = fixed_point();
    let mut frame = Vec::new();
    frame.extend(samples("PMU1", "V1", v1 * v_base()));
    frame.extend(samples("PMU2", "V1", v2 * v_base()));
    frame.extend(samples("PMU1", "I1", i12 * i_base()));
    frame.push(("PMU1:STAT".to_string(), 0.0));
    frame.push(("PMU2:STAT".to_string(), 0.0));
    frame
}

#[test]
fn test_two_bus_fixed_point() {
    let (v1, v2, i12) = fixed_point();
    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(create_2bus_builder()).unwrap();

    let ingestion = estimator.process_frame(positive_frame()).unwrap();
    assert_eq!(ingestion.unmapped, 0);

    let voltages = estimator.bus_voltages();
    assert_eq!(voltages.len(), 2);
    assert!(close(voltages[0].positive_sequence, v1, 1e-9));
    assert!(close(voltages[1].positive_sequence, v2, 1e-9));
    assert!((voltages[1].angle_degrees() + 2.0).abs() < 1e-7);

    let network = estimator.network().unwrap();
    let bus2 = network.voltage_group(BusId::new(2)).unwrap();
    assert!((bus2.estimate.positive.magnitude() - 0.98 * v_base()).abs() < 1e-5);
    assert!(bus2.residual(Phase::Positive).norm() < 1e-5);

    let flow = network.group(GroupId::new(2)).unwrap();
    assert!(close(flow.estimated_per_unit(Phase::Positive).unwrap(), i12, 1e-9));

    let counters = estimator.counters();
    assert_eq!(counters.active_voltages, 2);
    assert_eq!(counters.active_current_flows, 1);
    assert_eq!(counters.observed_buses, 2);
    assert_eq!(estimator.rebuild_count(), 1);
}

#[test]
fn test_outputs_carry_keys_and_categories() {
    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(create_2bus_builder()).unwrap();
    estimator.process_frame(positive_frame()).unwrap();

    let outputs = estimator.outputs();
    let magnitude = outputs
        .iter()
        .find(|o| o.key == "Bus2:voltage_estimate:+:magnitude")
        .unwrap();
    assert!((magnitude.value - 0.98 * v_base()).abs() < 1e-5);

    let angle = outputs
        .iter()
        .find(|o| o.key == "Bus2:voltage_estimate:+:angle")
        .unwrap();
    assert!((angle.value + 2.0).abs() < 1e-7);

    assert!(outputs
        .iter()
        .any(|o| o.key == "Bus1:voltage_residual:+:magnitude" && o.value < 1e-5));
    assert!(outputs
        .iter()
        .any(|o| o.key == "Line12:current_flow_estimate:+:magnitude"));
}

#[test]
fn test_rebuild_only_on_change() {
    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(create_2bus_builder()).unwrap();

    estimator.process_frame(positive_frame()).unwrap();
    estimator.process_frame(positive_frame()).unwrap();
    estimator.process_frame(positive_frame()).unwrap();
    assert_eq!(estimator.rebuild_count(), 1);
    assert_eq!(estimator.counters().frames, 3);

    // Current measurement drops out
    let frame: Vec<_> = positive_frame()
        .into_iter()
        .filter(|(key, _)| !key.starts_with("PMU1:I1"))
        .collect();
    estimator.process_frame(frame).unwrap();
    assert_eq!(estimator.rebuild_count(), 2);
    assert_eq!(estimator.counters().active_current_flows, 0);

    // ...and comes back
    estimator.process_frame(positive_frame()).unwrap();
    assert_eq!(estimator.rebuild_count(), 3);
}

#[test]
fn test_status_word_excludes_pmu() {
    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(create_2bus_builder()).unwrap();

    let mut frame = positive_frame();
    for (key, value) in &mut frame {
        if key.as_str() == "PMU2:STAT" {
            *value = f64::from(StatusWord::DATA_INVALID);
        }
    }
    estimator.process_frame(frame.clone()).unwrap();

    let analysis = estimator.observability().unwrap();
    assert_eq!(
        analysis.classification(BusId::new(2)),
        Some(Observability::Unobserved)
    );
    assert_eq!(estimator.counters().active_voltages, 1);
    // The flow row needs both terminals in the state
    assert_eq!(estimator.counters().active_current_flows, 0);

    // With status filtering off the same frame is fully used
    let config = EstimatorConfig {
        use_status_flags: false,
        ..EstimatorConfig::default()
    };
    let mut unfiltered = LinearStateEstimator::new(config);
    unfiltered.initialize(create_2bus_builder()).unwrap();
    unfiltered.process_frame(frame).unwrap();
    assert_eq!(unfiltered.counters().active_voltages, 2);
}

#[test]
fn test_status_word_change_forces_rebuild() {
    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(create_2bus_builder()).unwrap();
    estimator.process_frame(positive_frame()).unwrap();
    assert_eq!(estimator.rebuild_count(), 1);

    // Trigger bit leaves every group included
    let mut frame = positive_frame();
    for (key, value) in &mut frame {
        if key.as_str() == "PMU1:STAT" {
            *value = f64::from(StatusWord::TRIGGER_DETECTED);
        }
    }
    estimator.process_frame(frame.clone()).unwrap();
    assert_eq!(estimator.rebuild_count(), 2);
    assert_eq!(estimator.counters().active_voltages, 2);

    estimator.process_frame(frame).unwrap();
    assert_eq!(estimator.rebuild_count(), 2);
}

#[test]
fn test_magnitude_without_angle_excludes_group() {
    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(create_2bus_builder()).unwrap();
    estimator.process_frame(positive_frame()).unwrap();

    let frame: Vec<_> = positive_frame()
        .into_iter()
        .filter(|(key, _)| key.as_str() != "PMU2:V1A")
        .collect();
    estimator.process_frame(frame).unwrap();

    assert_eq!(estimator.counters().active_voltages, 1);
    assert_eq!(
        estimator.observability().unwrap().classification(BusId::new(2)),
        Some(Observability::Unobserved)
    );
    assert_eq!(estimator.bus_voltages().len(), 1);
    assert!(!estimator
        .outputs()
        .iter()
        .any(|o| o.key.starts_with("Bus2:")));
}

#[test]
fn test_shunt_injection_fixed_point() {
    let level = VoltageLevel::new(KV);
    let mut builder = NetworkBuilder::new();
    builder.add_bus(Bus::new(BusId::new(1), "Bus 1", KV));
    let shunt = builder.add_shunt(Shunt::new(ShuntId::new(1), "Cap 1", BusId::new(1), 0.01, 0.3));
    builder.add_group(
        PhasorGroup::voltage("PMU1 V", BusId::new(1), level)
            .with_keys(Phase::Positive, "PMU1:V1M", "PMU1:V1A")
            .with_output_key("Bus1"),
    );
    builder.add_group(
        PhasorGroup::current_injection("PMU1 Icap", shunt, level)
            .with_keys(Phase::Positive, "PMU1:I1M", "PMU1:I1A")
            .with_output_key("Cap1"),
    );

    let v = polar_deg(1.01, 5.0);
    let injection = Complex64::new(0.01, 0.3) * v;
    let mut frame = Vec::new();
    frame.extend(samples("PMU1", "V1", v * v_base()));
    frame.extend(samples("PMU1", "I1", injection * i_base()));

    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(builder).unwrap();
    estimator.process_frame(frame).unwrap();

    assert_eq!(estimator.counters().active_injections, 1);
    assert!(close(estimator.bus_voltages()[0].positive_sequence, v, 1e-9));

    let outputs = estimator.outputs();
    let magnitude = outputs
        .iter()
        .find(|o| o.key == "Cap1:current_injection_estimate:+:magnitude")
        .unwrap();
    assert!((magnitude.value - injection.norm() * i_base()).abs() < 1e-6);
    let angle = outputs
        .iter()
        .find(|o| o.key == "Cap1:current_injection_estimate:+:angle")
        .unwrap();
    assert!((angle.value - injection.arg().to_degrees()).abs() < 1e-7);
}

#[test]
fn test_no_residual_for_excluded_voltage_group() {
    // A bypass breaker keeps bus 2 in the state through bus 1
    let mut builder = create_2bus_builder();
    builder.add_switch(SwitchingDevice::new(
        SwitchId::new(1),
        "Bypass",
        BusId::new(1),
        BusId::new(2),
        SwitchState::Closed,
    ));
    let frame: Vec<_> = positive_frame()
        .into_iter()
        .filter(|(key, _)| !key.starts_with("PMU1:I1"))
        .map(|(key, value)| {
            if key.as_str() == "PMU2:STAT" {
                (key, f64::from(StatusWord::DATA_INVALID))
            } else {
                (key, value)
            }
        })
        .collect();

    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(builder).unwrap();
    estimator.process_frame(frame).unwrap();

    assert_eq!(
        estimator.observability().unwrap().classification(BusId::new(2)),
        Some(Observability::IndirectlyObserved)
    );
    let keys: Vec<&str> = estimator.outputs().iter().map(|o| o.key.as_str()).collect();
    assert!(keys.contains(&"Bus2:voltage_estimate:+:magnitude"));
    assert!(keys.contains(&"Bus1:voltage_residual:+:magnitude"));
    assert!(!keys.iter().any(|key| key.starts_with("Bus2:voltage_residual")));
}

#[test]
fn test_no_observed_voltages_is_input_starvation() {
    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(create_2bus_builder()).unwrap();

    let frame: Vec<_> = positive_frame()
        .into_iter()
        .filter(|(key, _)| key.contains(":I1"))
        .collect();
    let err = estimator.process_frame(frame).unwrap_err();
    assert_eq!(err, EstimationError::NoObservedVoltages);
    assert!(err.is_input_starvation());
    assert!(estimator.bus_voltages().is_empty());
    assert_eq!(estimator.counters().failed_frames, 1);

    // Recovers on the next complete frame
    estimator.process_frame(positive_frame()).unwrap();
    assert_eq!(estimator.state(), EstimatorState::ScatterState);
    assert_eq!(estimator.bus_voltages().len(), 2);
}

#[test]
fn test_phase_only_pmu_feeds_positive_sequence() {
    let (v1, v2, _) = fixed_point();
    let a = SequenceTransform::alpha();
    let mut frame = Vec::new();
    for (prefix, v) in [("PMU1", v1), ("PMU2", v2)] {
        let v = v * v_base();
        frame.extend(samples(prefix, "VA", v));
        frame.extend(samples(prefix, "VB", v * a * a));
        frame.extend(samples(prefix, "VC", v * a));
    }

    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(create_2bus_builder()).unwrap();
    estimator.process_frame(frame).unwrap();

    assert!(close(estimator.bus_voltages()[1].positive_sequence, v2, 1e-9));
}

#[test]
fn test_three_phase_unbalanced_fixed_point() {
    let phases1 = [polar_deg(1.00, 0.0), polar_deg(0.97, -121.0), polar_deg(1.02, 119.5)];
    let phases2 = [polar_deg(0.98, -2.0), polar_deg(0.95, -123.0), polar_deg(1.00, 117.0)];
    let mut frame = Vec::new();
    for (prefix, phases) in [("PMU1", phases1), ("PMU2", phases2)] {
        for (tag, v) in ["VA", "VB", "VC"].into_iter().zip(phases) {
            frame.extend(samples(prefix, tag, v * v_base()));
        }
    }

    let config = EstimatorConfig {
        phase_selection: PhaseSelection::ThreePhase,
        ..EstimatorConfig::default()
    };
    let mut estimator = LinearStateEstimator::new(config);
    estimator.initialize(create_2bus_builder()).unwrap();
    estimator.process_frame(frame).unwrap();

    let solved = estimator.bus_voltages()[1];
    for (estimate, expected) in solved.phases.iter().zip(phases2) {
        assert!(close(*estimate, expected, 1e-9));
    }
    let sequence = SequenceTransform::to_sequence(phases2);
    assert!(close(solved.positive_sequence, sequence.positive, 1e-9));

    let group = estimator
        .network()
        .unwrap()
        .voltage_group(BusId::new(2))
        .unwrap();
    let negative = group.estimated_per_unit(Phase::Negative).unwrap();
    assert!(close(negative, sequence.negative, 1e-9));
    assert!(negative.norm() > 1e-3);

    // Three-phase outputs cover all six components
    assert!(estimator
        .outputs()
        .iter()
        .any(|o| o.key == "Bus2:voltage_estimate:0:magnitude"));
}

#[test]
fn test_three_phase_requires_all_phases() {
    let config = EstimatorConfig {
        phase_selection: PhaseSelection::ThreePhase,
        ..EstimatorConfig::default()
    };
    let mut estimator = LinearStateEstimator::new(config);
    estimator.initialize(create_2bus_builder()).unwrap();

    // Positive sequence only: no three-phase voltage is usable
    let err = estimator.process_frame(positive_frame()).unwrap_err();
    assert!(err.is_input_starvation());
}

#[test]
fn test_pruning_limits_current_estimates() {
    let mut builder = create_2bus_builder();
    builder.add_group(
        PhasorGroup::current_flow(
            "PMU2 I21",
            BranchId::new(1),
            BranchEnd::To,
            VoltageLevel::new(KV),
        )
        .with_keys(Phase::Positive, "PMU2:I1M", "PMU2:I1A")
        .with_output_key("Line21"),
    );

    let (_, _, i12) = fixed_point();
    let has_line21 = |estimator: &LinearStateEstimator| {
        estimator
            .outputs()
            .iter()
            .any(|o| o.key.starts_with("Line21:current_flow_estimate"))
    };

    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(builder.clone()).unwrap();
    estimator.process_frame(positive_frame()).unwrap();
    assert!(has_line21(&estimator));
    // No line charging, so the to-end current mirrors the from-end flow
    let to_end = estimator
        .network()
        .unwrap()
        .group(GroupId::new(3))
        .unwrap()
        .estimated_per_unit(Phase::Positive)
        .unwrap();
    assert!(close(to_end, -i12, 1e-9));

    let config = EstimatorConfig {
        prune_unmeasured_branches: true,
        ..EstimatorConfig::default()
    };
    let mut pruned = LinearStateEstimator::new(config);
    pruned.initialize(builder).unwrap();
    pruned.process_frame(positive_frame()).unwrap();
    assert!(!has_line21(&pruned));
    assert!(pruned
        .outputs()
        .iter()
        .any(|o| o.key.starts_with("Line12:current_flow_estimate")));
}

#[test]
fn test_reload_forces_rebuild() {
    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    estimator.initialize(create_2bus_builder()).unwrap();
    estimator.process_frame(positive_frame()).unwrap();
    assert_eq!(estimator.rebuild_count(), 1);

    let builder = estimator.network().unwrap().to_builder();
    estimator.reload(builder).unwrap();
    assert_eq!(estimator.state(), EstimatorState::Initialized);
    assert!(estimator.system_matrix().is_none());

    estimator.process_frame(positive_frame()).unwrap();
    assert_eq!(estimator.rebuild_count(), 2);
}

#[test]
fn test_initialize_rejects_dangling_reference() {
    let mut builder = create_2bus_builder();
    builder.add_branch(Branch::new(
        BranchId::new(2),
        "Line 2-7",
        BusId::new(2),
        BusId::new(7),
        0.01,
        0.1,
    ));
    let mut estimator = LinearStateEstimator::new(EstimatorConfig::default());
    let err = estimator.initialize(builder).unwrap_err();
    assert!(matches!(
        err,
        EstimationError::Model(ModelError::Inconsistent(_))
    ));
    assert_eq!(estimator.state(), EstimatorState::Uninitialized);
}

#[test]
fn test_estimator_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LinearStateEstimator>();
    assert_send::<Network>();
    assert_send::<MeasurementMap>();
}
