//! Observability analysis over the switching topology.
//!
//! Buses joined by closed switching devices are electrically one node; they
//! are merged with a union-find into *observed buses*. Each observed bus with
//! at least one directly observed member becomes one state-vector unknown
//! (three in three-phase mode).
//!
//! ```text
//!   Bus1 ──CB(closed)── Bus2 ──CB(open)── Bus3
//!   [PMU]
//!
//!   observed bus 0 = {Bus1, Bus2}   Bus1 direct, Bus2 indirect
//!   observed bus 1 = {Bus3}         unobserved
//! ```
//!
//! Only the actual state of a switching device is consulted; the normal state
//! has no influence.

use std::collections::HashMap;

use lse_core::{BusId, Edge, Network, PhaseSelection, PhasorGroup};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::debug;

use crate::error::EstimationError;

/// How a bus's voltage is known this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Observability {
    /// The bus's own voltage group is included
    DirectlyObserved,
    /// Joined by closed switches to a directly observed bus
    IndirectlyObserved,
    Unobserved,
}

/// A maximal set of buses joined by closed switching devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedBus {
    /// Member buses in network order
    pub members: Vec<BusId>,
    /// Members whose voltage group is included
    pub directly_observed: Vec<BusId>,
    /// Position in the state vector, `None` when no member is directly observed
    pub state_index: Option<usize>,
}

impl ObservedBus {
    pub fn is_observed(&self) -> bool {
        self.state_index.is_some()
    }
}

/// Result of one observability pass.
#[derive(Debug, Clone)]
pub struct ObservabilityAnalysis {
    selection: PhaseSelection,
    observed_buses: Vec<ObservedBus>,
    /// Observed-bus index per bus, by graph position
    bus_to_observed: Vec<usize>,
    classes: Vec<Observability>,
    positions: HashMap<BusId, usize>,
    state_bus_count: usize,
}

/// Group inclusion under the active phase selection.
pub fn group_included(group: &PhasorGroup, selection: PhaseSelection) -> bool {
    match selection {
        PhaseSelection::PositiveSequence => group.include_in_positive_sequence_estimator(),
        PhaseSelection::ThreePhase => group.include_in_estimator(),
    }
}

pub struct ObservabilityAnalyzer;

impl ObservabilityAnalyzer {
    pub fn analyze(network: &Network, selection: PhaseSelection) -> ObservabilityAnalysis {
        let graph = network.graph();
        let n = graph.node_count();

        let mut union_find = UnionFind::<usize>::new(n);
        for edge in graph.edge_references() {
            if let Edge::Switch(device) = edge.weight() {
                if device.is_closed() {
                    union_find.union(edge.source().index(), edge.target().index());
                }
            }
        }
        let labels = union_find.into_labeling();

        let mut label_to_observed: HashMap<usize, usize> = HashMap::new();
        let mut observed_buses: Vec<ObservedBus> = Vec::new();
        let mut bus_to_observed = Vec::with_capacity(n);
        let mut direct = Vec::with_capacity(n);
        let mut positions = HashMap::with_capacity(n);

        for (node, bus) in network.buses() {
            let position = node.index();
            positions.insert(bus.id, position);

            let observed = *label_to_observed.entry(labels[position]).or_insert_with(|| {
                observed_buses.push(ObservedBus {
                    members: Vec::new(),
                    directly_observed: Vec::new(),
                    state_index: None,
                });
                observed_buses.len() - 1
            });
            bus_to_observed.push(observed);

            let is_direct = network
                .voltage_group(bus.id)
                .is_some_and(|group| group_included(group, selection));
            direct.push(is_direct);

            observed_buses[observed].members.push(bus.id);
            if is_direct {
                observed_buses[observed].directly_observed.push(bus.id);
            }
        }

        let mut state_bus_count = 0;
        for observed in &mut observed_buses {
            if !observed.directly_observed.is_empty() {
                observed.state_index = Some(state_bus_count);
                state_bus_count += 1;
            }
        }

        let classes = bus_to_observed
            .iter()
            .zip(&direct)
            .map(|(&observed, &is_direct)| {
                if is_direct {
                    Observability::DirectlyObserved
                } else if observed_buses[observed].is_observed() {
                    Observability::IndirectlyObserved
                } else {
                    Observability::Unobserved
                }
            })
            .collect();

        debug!(
            buses = n,
            observed_buses = observed_buses.len(),
            state_buses = state_bus_count,
            "observability analysed"
        );

        ObservabilityAnalysis {
            selection,
            observed_buses,
            bus_to_observed,
            classes,
            positions,
            state_bus_count,
        }
    }
}

impl ObservabilityAnalysis {
    pub fn selection(&self) -> PhaseSelection {
        self.selection
    }

    pub fn observed_buses(&self) -> &[ObservedBus] {
        &self.observed_buses
    }

    /// Observed buses that carry a state unknown.
    pub fn state_bus_count(&self) -> usize {
        self.state_bus_count
    }

    pub fn directly_observed_count(&self) -> usize {
        self.classes
            .iter()
            .filter(|&&class| class == Observability::DirectlyObserved)
            .count()
    }

    pub fn classification(&self, bus: BusId) -> Option<Observability> {
        self.positions.get(&bus).map(|&position| self.classes[position])
    }

    pub fn observed_bus_of(&self, bus: BusId) -> Option<&ObservedBus> {
        let position = *self.positions.get(&bus)?;
        self.observed_buses.get(self.bus_to_observed[position])
    }

    /// Index of the observed bus's first unknown, if it has one.
    pub fn state_index(&self, bus: BusId) -> Option<usize> {
        self.observed_bus_of(bus)?.state_index
    }

    /// Fails when no bus is directly observed, so no state vector exists.
    pub fn require_observed(&self) -> Result<(), EstimationError> {
        if self.state_bus_count == 0 {
            return Err(EstimationError::NoObservedVoltages);
        }
        Ok(())
    }
}
