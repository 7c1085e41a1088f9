//! Linear measurement model `z = H·x` and its pseudo-inverse.
//!
//! The state `x` holds one complex voltage per observed bus (three in
//! three-phase mode), in per unit. Each row of `H` predicts one included
//! measurement:
//!
//! ```text
//! voltage at bus k:            z = V_k
//! current flow, from end:      z = y_ff·V_from + y_ft·V_to
//! current flow, to end:        z = y_tf·V_from + y_tt·V_to
//! shunt injection at bus k:    z = (g + jb)·V_k
//! ```
//!
//! Buses merged into the same observed bus share a column, so a flow row
//! whose terminals were merged collapses to a single `y_ff + y_ft` entry.
//!
//! `H` is stored like the bus admittance matrix: real and imaginary parts as
//! separate CSR matrices. The pseudo-inverse is dense; it is computed once
//! per rebuild and reused until the inclusion set or topology changes.

use lse_core::{
    BranchEnd, BranchId, BusId, GroupId, GroupRole, Network, Phase, PhaseSelection, ShuntId,
};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use tracing::debug;

use crate::error::EstimationError;
use crate::observability::{group_included, ObservabilityAnalysis};

/// Components that form the state, in column order within one observed bus.
pub fn state_phases(selection: PhaseSelection) -> &'static [Phase] {
    match selection {
        PhaseSelection::PositiveSequence => &[Phase::Positive],
        PhaseSelection::ThreePhase => &Phase::PHASES,
    }
}

/// What a row of the system matrix measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Voltage { bus: BusId },
    CurrentFlow { branch: BranchId, end: BranchEnd },
    CurrentInjection { shunt: ShuntId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementRow {
    pub group: GroupId,
    pub phase: Phase,
    pub kind: RowKind,
}

/// Included groups by role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveMeasurements {
    pub voltages: usize,
    pub current_flows: usize,
    pub injections: usize,
}

#[derive(Debug, Clone)]
pub struct SystemMatrix {
    selection: PhaseSelection,
    rows: Vec<MeasurementRow>,
    columns: usize,
    /// Real part of H
    h_real: CsMat<f64>,
    /// Imaginary part of H
    h_imag: CsMat<f64>,
    pseudo_inverse: DMatrix<Complex64>,
    active: ActiveMeasurements,
}

impl SystemMatrix {
    /// Build `H` for the current inclusion set and invert it.
    pub fn build(
        network: &Network,
        analysis: &ObservabilityAnalysis,
        tolerance: f64,
    ) -> Result<Self, EstimationError> {
        let selection = analysis.selection();
        let phases = state_phases(selection);
        let width = selection.unknowns_per_bus();
        let columns = analysis.state_bus_count() * width;
        let column = |bus: BusId, offset: usize| {
            analysis.state_index(bus).map(|index| index * width + offset)
        };

        let mut entries: Vec<(usize, usize, Complex64)> = Vec::new();
        let mut rows: Vec<MeasurementRow> = Vec::new();
        let mut active = ActiveMeasurements::default();

        // Voltages first, in bus order
        for (_, bus) in network.buses() {
            let Some(group) = network.voltage_group(bus.id) else {
                continue;
            };
            if !group_included(group, selection) {
                continue;
            }
            for (offset, &phase) in phases.iter().enumerate() {
                let Some(col) = column(bus.id, offset) else {
                    continue;
                };
                entries.push((rows.len(), col, Complex64::new(1.0, 0.0)));
                rows.push(MeasurementRow {
                    group: group.id,
                    phase,
                    kind: RowKind::Voltage { bus: bus.id },
                });
            }
            active.voltages += 1;
        }

        for group in network.groups() {
            if !group_included(group, selection) {
                continue;
            }
            match group.role {
                GroupRole::Voltage { .. } => {}
                GroupRole::CurrentFlow { branch: branch_id, end } => {
                    let Some(branch) = network.branch(branch_id) else {
                        continue;
                    };
                    if !branch.in_service {
                        continue;
                    }
                    if column(branch.from_bus, 0).is_none() || column(branch.to_bus, 0).is_none() {
                        continue;
                    }
                    let y = branch.admittance()?;
                    let (y_from, y_to) = match end {
                        BranchEnd::From => (y.y_ff, y.y_ft),
                        BranchEnd::To => (y.y_tf, y.y_tt),
                    };
                    for (offset, &phase) in phases.iter().enumerate() {
                        let (Some(from_col), Some(to_col)) =
                            (column(branch.from_bus, offset), column(branch.to_bus, offset))
                        else {
                            continue;
                        };
                        entries.push((rows.len(), from_col, y_from));
                        entries.push((rows.len(), to_col, y_to));
                        rows.push(MeasurementRow {
                            group: group.id,
                            phase,
                            kind: RowKind::CurrentFlow {
                                branch: branch_id,
                                end,
                            },
                        });
                    }
                    active.current_flows += 1;
                }
                GroupRole::CurrentInjection { shunt: shunt_id } => {
                    let Some(shunt) = network.shunt(shunt_id) else {
                        continue;
                    };
                    if column(shunt.bus, 0).is_none() {
                        continue;
                    }
                    for (offset, &phase) in phases.iter().enumerate() {
                        let Some(col) = column(shunt.bus, offset) else {
                            continue;
                        };
                        entries.push((rows.len(), col, shunt.admittance()));
                        rows.push(MeasurementRow {
                            group: group.id,
                            phase,
                            kind: RowKind::CurrentInjection { shunt: shunt_id },
                        });
                    }
                    active.injections += 1;
                }
            }
        }

        if rows.is_empty() || columns == 0 {
            return Err(EstimationError::EmptySystemMatrix {
                rows: rows.len(),
                columns,
            });
        }

        let mut real_triplet = TriMat::new((rows.len(), columns));
        let mut imag_triplet = TriMat::new((rows.len(), columns));
        for (row, col, value) in entries {
            real_triplet.add_triplet(row, col, value.re);
            imag_triplet.add_triplet(row, col, value.im);
        }
        let h_real: CsMat<f64> = real_triplet.to_csr();
        let h_imag: CsMat<f64> = imag_triplet.to_csr();

        let dense = dense_from_parts(&h_real, &h_imag, rows.len(), columns);
        if dense.iter().all(|value| value.norm() == 0.0) {
            return Err(EstimationError::EmptySystemMatrix {
                rows: rows.len(),
                columns,
            });
        }
        let pseudo_inverse = dense
            .pseudo_inverse(tolerance)
            .map_err(|msg| EstimationError::PseudoInverse(msg.to_string()))?;
        if pseudo_inverse.iter().any(|value| !value.is_finite()) {
            return Err(EstimationError::PseudoInverse(
                "pseudo-inverse contains non-finite entries".to_string(),
            ));
        }

        debug!(
            rows = rows.len(),
            columns,
            nnz = h_real.nnz() + h_imag.nnz(),
            "system matrix built"
        );

        Ok(Self {
            selection,
            rows,
            columns,
            h_real,
            h_imag,
            pseudo_inverse,
            active,
        })
    }

    pub fn selection(&self) -> PhaseSelection {
        self.selection
    }

    pub fn rows(&self) -> &[MeasurementRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns
    }

    pub fn active_measurements(&self) -> ActiveMeasurements {
        self.active
    }

    /// H[i,j]
    pub fn h(&self, i: usize, j: usize) -> Complex64 {
        Complex64::new(
            self.h_real.get(i, j).copied().unwrap_or(0.0),
            self.h_imag.get(i, j).copied().unwrap_or(0.0),
        )
    }

    pub fn pseudo_inverse(&self) -> &DMatrix<Complex64> {
        &self.pseudo_inverse
    }

    /// Gather this frame's per-unit measurements in row order.
    pub fn assemble_measurements(&self, network: &Network) -> Result<DVector<Complex64>, EstimationError> {
        if self.rows.is_empty() {
            return Err(EstimationError::EmptyMeasurementVector);
        }
        let mut z = DVector::from_element(self.rows.len(), Complex64::new(0.0, 0.0));
        for (i, row) in self.rows.iter().enumerate() {
            let group = network
                .group(row.group)
                .ok_or(lse_core::ModelError::UnknownGroup(row.group.value()))?;
            z[i] = group.measured_per_unit(row.phase)?;
        }
        Ok(z)
    }

    /// `x = H⁺·z`
    pub fn solve(&self, z: &DVector<Complex64>) -> Result<DVector<Complex64>, EstimationError> {
        if z.is_empty() {
            return Err(EstimationError::EmptyMeasurementVector);
        }
        if z.len() != self.rows.len() {
            return Err(EstimationError::DimensionMismatch {
                measurements: z.len(),
                rows: self.rows.len(),
            });
        }
        Ok(&self.pseudo_inverse * z)
    }
}

fn dense_from_parts(
    real: &CsMat<f64>,
    imag: &CsMat<f64>,
    rows: usize,
    columns: usize,
) -> DMatrix<Complex64> {
    let mut dense = DMatrix::from_element(rows, columns, Complex64::new(0.0, 0.0));
    for (&value, (i, j)) in real.iter() {
        dense[(i, j)].re += value;
    }
    for (&value, (i, j)) in imag.iter() {
        dense[(i, j)].im += value;
    }
    dense
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::ObservabilityAnalyzer;
    use lse_core::{
        Branch, Bus, NetworkBuilder, PhasorGroup, Radians, Shunt, SwitchId, SwitchState,
        SwitchingDevice, VoltageLevel,
    };

    fn report(network: &mut Network, group: GroupId, magnitude: f64, phases: &[Phase]) {
        let group = network.group_mut(group).unwrap();
        for &phase in phases {
            let value = group.measurement.get_mut(phase);
            value.set_polar(magnitude, Radians(0.0));
            value.mark_reported();
        }
    }

    fn create_2bus_network() -> (Network, GroupId, GroupId, GroupId) {
        let level = VoltageLevel::new(138.0);
        let mut builder = NetworkBuilder::new();
        builder.add_bus(Bus::new(BusId::new(1), "Bus 1", 138.0));
        builder.add_bus(Bus::new(BusId::new(2), "Bus 2", 138.0));
        builder.add_branch(Branch::new(
            BranchId::new(1),
            "Line 1-2",
            BusId::new(1),
            BusId::new(2),
            0.01,
            0.1,
        ));
        let v1 = builder.add_group(PhasorGroup::voltage("V1", BusId::new(1), level));
        let v2 = builder.add_group(PhasorGroup::voltage("V2", BusId::new(2), level));
        let i12 = builder.add_group(PhasorGroup::current_flow(
            "I12",
            BranchId::new(1),
            BranchEnd::From,
            level,
        ));
        (builder.build().unwrap(), v1, v2, i12)
    }

    #[test]
    fn test_rows_and_entries() {
        let (mut network, v1, v2, i12) = create_2bus_network();
        report(&mut network, v1, 79_000.0, &[Phase::Positive]);
        report(&mut network, v2, 79_000.0, &[Phase::Positive]);
        report(&mut network, i12, 200.0, &[Phase::Positive]);

        let analysis = ObservabilityAnalyzer::analyze(&network, PhaseSelection::PositiveSequence);
        let matrix = SystemMatrix::build(&network, &analysis, 1e-10).unwrap();

        assert_eq!(matrix.row_count(), 3);
        assert_eq!(matrix.column_count(), 2);
        assert_eq!(
            matrix.active_measurements(),
            ActiveMeasurements {
                voltages: 2,
                current_flows: 1,
                injections: 0
            }
        );

        let y = Complex64::new(0.01, 0.1).inv();
        assert_eq!(matrix.h(0, 0), Complex64::new(1.0, 0.0));
        assert_eq!(matrix.h(0, 1), Complex64::new(0.0, 0.0));
        assert!((matrix.h(2, 0) - y).norm() < 1e-12);
        assert!((matrix.h(2, 1) + y).norm() < 1e-12);
    }

    #[test]
    fn test_flow_row_dropped_when_terminal_unobserved() {
        let (mut network, v1, _, i12) = create_2bus_network();
        report(&mut network, v1, 79_000.0, &[Phase::Positive]);
        report(&mut network, i12, 200.0, &[Phase::Positive]);

        let analysis = ObservabilityAnalyzer::analyze(&network, PhaseSelection::PositiveSequence);
        let matrix = SystemMatrix::build(&network, &analysis, 1e-10).unwrap();
        assert_eq!(matrix.row_count(), 1);
        assert_eq!(matrix.active_measurements().current_flows, 0);
    }

    #[test]
    fn test_merged_terminals_share_a_column() {
        let level = VoltageLevel::new(138.0);
        let mut builder = NetworkBuilder::new();
        builder.add_bus(Bus::new(BusId::new(1), "Bus 1", 138.0));
        builder.add_bus(Bus::new(BusId::new(2), "Bus 2", 138.0));
        builder.add_branch(Branch::new(
            BranchId::new(1),
            "Line 1-2",
            BusId::new(1),
            BusId::new(2),
            0.01,
            0.1,
        ));
        builder.add_switch(SwitchingDevice::new(
            SwitchId::new(1),
            "Bypass",
            BusId::new(1),
            BusId::new(2),
            SwitchState::Closed,
        ));
        let v1 = builder.add_group(PhasorGroup::voltage("V1", BusId::new(1), level));
        let i12 = builder.add_group(PhasorGroup::current_flow(
            "I12",
            BranchId::new(1),
            BranchEnd::From,
            level,
        ));
        let mut network = builder.build().unwrap();
        report(&mut network, v1, 79_000.0, &[Phase::Positive]);
        report(&mut network, i12, 50.0, &[Phase::Positive]);

        let analysis = ObservabilityAnalyzer::analyze(&network, PhaseSelection::PositiveSequence);
        let matrix = SystemMatrix::build(&network, &analysis, 1e-10).unwrap();
        assert_eq!(matrix.column_count(), 1);
        // y_ff + y_ft cancel for a line without charging
        assert!(matrix.h(1, 0).norm() < 1e-12);
    }

    #[test]
    fn test_injection_row_uses_shunt_admittance() {
        let level = VoltageLevel::new(138.0);
        let mut builder = NetworkBuilder::new();
        builder.add_bus(Bus::new(BusId::new(1), "Bus 1", 138.0));
        let shunt = builder.add_shunt(Shunt::new(ShuntId::new(1), "Cap 1", BusId::new(1), 0.02, 0.3));
        let v1 = builder.add_group(PhasorGroup::voltage("V1", BusId::new(1), level));
        let inj = builder.add_group(PhasorGroup::current_injection("Cap 1 I", shunt, level));
        let mut network = builder.build().unwrap();
        report(&mut network, v1, 79_000.0, &Phase::PHASES);
        report(&mut network, inj, 120.0, &Phase::PHASES);

        let analysis = ObservabilityAnalyzer::analyze(&network, PhaseSelection::ThreePhase);
        let matrix = SystemMatrix::build(&network, &analysis, 1e-10).unwrap();
        assert_eq!(matrix.row_count(), 6);
        assert_eq!(matrix.column_count(), 3);
        assert_eq!(
            matrix.active_measurements(),
            ActiveMeasurements {
                voltages: 1,
                current_flows: 0,
                injections: 1
            }
        );

        // Injection rows follow the voltage rows, one per phase
        let y = Complex64::new(0.02, 0.3);
        for (offset, &phase) in Phase::PHASES.iter().enumerate() {
            let row = 3 + offset;
            assert_eq!(matrix.rows()[row].phase, phase);
            assert_eq!(
                matrix.rows()[row].kind,
                RowKind::CurrentInjection { shunt }
            );
            assert_eq!(matrix.h(row, offset), y);
            assert_eq!(matrix.h(row, (offset + 1) % 3), Complex64::new(0.0, 0.0));
        }
    }

    #[test]
    fn test_three_phase_layout() {
        let (mut network, v1, v2, _) = create_2bus_network();
        report(&mut network, v1, 79_000.0, &Phase::PHASES);
        report(&mut network, v2, 79_000.0, &Phase::PHASES);

        let analysis = ObservabilityAnalyzer::analyze(&network, PhaseSelection::ThreePhase);
        let matrix = SystemMatrix::build(&network, &analysis, 1e-10).unwrap();
        assert_eq!(matrix.row_count(), 6);
        assert_eq!(matrix.column_count(), 6);
        assert_eq!(matrix.rows()[4].phase, Phase::B);
        assert_eq!(matrix.h(4, 4), Complex64::new(1.0, 0.0));
    }

    #[test]
    fn test_empty_matrix_fails_fast() {
        let (network, _, _, _) = create_2bus_network();
        let analysis = ObservabilityAnalyzer::analyze(&network, PhaseSelection::PositiveSequence);
        let err = SystemMatrix::build(&network, &analysis, 1e-10).unwrap_err();
        assert_eq!(
            err,
            EstimationError::EmptySystemMatrix {
                rows: 0,
                columns: 0
            }
        );
        assert!(err.is_numeric_degeneracy());
    }

    #[test]
    fn test_solve_checks_dimensions() {
        let (mut network, v1, _, _) = create_2bus_network();
        report(&mut network, v1, 79_000.0, &[Phase::Positive]);
        let analysis = ObservabilityAnalyzer::analyze(&network, PhaseSelection::PositiveSequence);
        let matrix = SystemMatrix::build(&network, &analysis, 1e-10).unwrap();

        let z = DVector::from_element(3, Complex64::new(1.0, 0.0));
        assert_eq!(
            matrix.solve(&z),
            Err(EstimationError::DimensionMismatch {
                measurements: 3,
                rows: 1
            })
        );
        let empty = DVector::<Complex64>::zeros(0);
        assert_eq!(matrix.solve(&empty), Err(EstimationError::EmptyMeasurementVector));
    }
}
