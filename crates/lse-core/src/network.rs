//! The [`Network`] aggregate and the [`NetworkBuilder`] that initialises it.
//!
//! Entities are collected into a builder and frozen by
//! [`NetworkBuilder::build`], which resolves every ID reference in a single
//! pass and builds the reverse indexes the estimator needs (bus → voltage
//! group, branch → flow groups, shunt → injection groups). A network can be
//! turned back into a builder with [`Network::to_builder`] for persistence
//! or a full reload.

use std::collections::HashMap;

use petgraph::graph::{EdgeIndex, Graph, NodeIndex};
use petgraph::Undirected;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::diagnostics::{Diagnostics, IssueCategory};
use crate::error::ModelError;
use crate::phasor_group::{GroupRole, PhasorGroup};
use crate::{
    Branch, BranchId, BranchKind, Bus, BusId, Edge, GroupId, Shunt, ShuntId, SwitchId,
    SwitchState, SwitchingDevice,
};

/// Unresolved entity lists. Serialisable so a collaborator can persist a
/// model and re-initialise it later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkBuilder {
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    pub switches: Vec<SwitchingDevice>,
    pub shunts: Vec<Shunt>,
    pub groups: Vec<PhasorGroup>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bus(&mut self, bus: Bus) -> BusId {
        let id = bus.id;
        self.buses.push(bus);
        id
    }

    pub fn add_branch(&mut self, branch: Branch) -> BranchId {
        let id = branch.id;
        self.branches.push(branch);
        id
    }

    pub fn add_switch(&mut self, device: SwitchingDevice) -> SwitchId {
        let id = device.id;
        self.switches.push(device);
        id
    }

    pub fn add_shunt(&mut self, shunt: Shunt) -> ShuntId {
        let id = shunt.id;
        self.shunts.push(shunt);
        id
    }

    /// Add a phasor group. Its ID is its position in the group arena.
    pub fn add_group(&mut self, mut group: PhasorGroup) -> GroupId {
        let id = GroupId::new(self.groups.len());
        group.id = id;
        self.groups.push(group);
        id
    }

    /// Resolve all references and freeze the model.
    ///
    /// Every problem found is recorded before giving up, so the returned
    /// [`ModelError::Inconsistent`] lists all of them.
    pub fn build(self) -> Result<Network, ModelError> {
        let mut diag = Diagnostics::new();
        let mut graph: Graph<Bus, Edge, Undirected> = Graph::new_undirected();

        let mut bus_nodes = HashMap::with_capacity(self.buses.len());
        for bus in self.buses {
            if bus_nodes.contains_key(&bus.id) {
                let err = ModelError::DuplicateId {
                    kind: "bus",
                    id: bus.id.value(),
                };
                diag.error(IssueCategory::Duplicate, &format!("Bus '{}'", bus.name), &err.to_string());
                continue;
            }
            if !(bus.base_kv.value() > 0.0) {
                let err = ModelError::ZeroBaseVoltage(bus.base_kv.value());
                diag.error(IssueCategory::Electrical, &bus.id.to_string(), &err.to_string());
            }
            let id = bus.id;
            bus_nodes.insert(id, graph.add_node(bus));
        }

        let mut branch_edges = HashMap::with_capacity(self.branches.len());
        for branch in self.branches {
            let entity = format!("Branch '{}'", branch.name);
            if branch_edges.contains_key(&branch.id) {
                let err = ModelError::DuplicateId {
                    kind: "branch",
                    id: branch.id.value(),
                };
                diag.error(IssueCategory::Duplicate, &entity, &err.to_string());
                continue;
            }
            if let Err(err) = branch.admittance() {
                diag.error(IssueCategory::Electrical, &entity, &err.to_string());
            }
            if branch.from_bus == branch.to_bus {
                diag.warning(IssueCategory::Electrical, &entity, "branch terminals coincide");
            }
            let from = resolve_bus(&bus_nodes, branch.from_bus, &entity, &mut diag);
            let to = resolve_bus(&bus_nodes, branch.to_bus, &entity, &mut diag);
            if let (Some(from), Some(to)) = (from, to) {
                let id = branch.id;
                branch_edges.insert(id, graph.add_edge(from, to, Edge::Branch(branch)));
            }
        }

        let mut switch_edges = HashMap::with_capacity(self.switches.len());
        for device in self.switches {
            let entity = format!("Switch '{}'", device.name);
            if switch_edges.contains_key(&device.id) {
                let err = ModelError::DuplicateId {
                    kind: "switching device",
                    id: device.id.value(),
                };
                diag.error(IssueCategory::Duplicate, &entity, &err.to_string());
                continue;
            }
            if device.from_bus == device.to_bus {
                diag.warning(IssueCategory::Electrical, &entity, "switch terminals coincide");
            }
            let from = resolve_bus(&bus_nodes, device.from_bus, &entity, &mut diag);
            let to = resolve_bus(&bus_nodes, device.to_bus, &entity, &mut diag);
            if let (Some(from), Some(to)) = (from, to) {
                let id = device.id;
                switch_edges.insert(id, graph.add_edge(from, to, Edge::Switch(device)));
            }
        }

        let mut shunt_slots = HashMap::with_capacity(self.shunts.len());
        let mut shunts = Vec::with_capacity(self.shunts.len());
        for shunt in self.shunts {
            let entity = format!("Shunt '{}'", shunt.name);
            if shunt_slots.contains_key(&shunt.id) {
                let err = ModelError::DuplicateId {
                    kind: "shunt",
                    id: shunt.id.value(),
                };
                diag.error(IssueCategory::Duplicate, &entity, &err.to_string());
                continue;
            }
            resolve_bus(&bus_nodes, shunt.bus, &entity, &mut diag);
            shunt_slots.insert(shunt.id, shunts.len());
            shunts.push(shunt);
        }

        let mut voltage_groups: HashMap<BusId, GroupId> = HashMap::new();
        let mut flow_groups: HashMap<BranchId, Vec<GroupId>> = HashMap::new();
        let mut injection_groups: HashMap<ShuntId, Vec<GroupId>> = HashMap::new();
        let mut groups = Vec::with_capacity(self.groups.len());
        for (index, mut group) in self.groups.into_iter().enumerate() {
            let id = GroupId::new(index);
            group.id = id;
            let entity = format!("Group '{}'", group.name);

            if let Err(err) = group.level().base_value(group.kind()) {
                diag.error(IssueCategory::Electrical, &entity, &err.to_string());
            }

            match group.role {
                GroupRole::Voltage { bus } => {
                    if let Some(node) = resolve_bus(&bus_nodes, bus, &entity, &mut diag) {
                        if voltage_groups.insert(bus, id).is_some() {
                            diag.error(
                                IssueCategory::Reference,
                                &entity,
                                &format!("{bus} already has a voltage group"),
                            );
                        }
                        let bus_kv = graph[node].base_kv;
                        if (bus_kv.value() - group.level().base_kv.value()).abs() > 1e-6 {
                            diag.warning(
                                IssueCategory::Electrical,
                                &entity,
                                &format!("voltage level differs from {bus} base ({bus_kv})"),
                            );
                        }
                    }
                }
                GroupRole::CurrentFlow { branch, .. } => {
                    if branch_edges.contains_key(&branch) {
                        flow_groups.entry(branch).or_default().push(id);
                    } else {
                        let err = ModelError::UnknownBranch {
                            group: group.name.clone(),
                            branch,
                        };
                        diag.error(IssueCategory::Reference, &entity, &err.to_string());
                    }
                }
                GroupRole::CurrentInjection { shunt } => {
                    if shunt_slots.contains_key(&shunt) {
                        injection_groups.entry(shunt).or_default().push(id);
                    } else {
                        let err = ModelError::UnknownShunt {
                            group: group.name.clone(),
                            shunt,
                        };
                        diag.error(IssueCategory::Reference, &entity, &err.to_string());
                    }
                }
            }
            groups.push(group);
        }

        for bus in graph.node_weights() {
            if !voltage_groups.contains_key(&bus.id) {
                diag.warning(
                    IssueCategory::Observability,
                    &bus.id.to_string(),
                    "bus has no voltage measurement",
                );
            }
        }

        if diag.has_errors() {
            return Err(ModelError::Inconsistent(diag.error_report()));
        }

        let network = Network {
            graph,
            shunts,
            groups,
            bus_nodes,
            branch_edges,
            switch_edges,
            shunt_slots,
            voltage_groups,
            flow_groups,
            injection_groups,
            diagnostics: diag,
        };

        if network.diagnostics.warning_count() > 0 {
            for issue in network.diagnostics.warnings() {
                debug!(%issue, "initialisation warning");
            }
            warn!(summary = %network.diagnostics.summary(), "network initialised with warnings");
        }
        info!(stats = %network.stats(), "network initialised");
        Ok(network)
    }
}

fn resolve_bus(
    bus_nodes: &HashMap<BusId, NodeIndex>,
    bus: BusId,
    entity: &str,
    diag: &mut Diagnostics,
) -> Option<NodeIndex> {
    let node = bus_nodes.get(&bus).copied();
    if node.is_none() {
        let err = ModelError::UnknownBus {
            entity: entity.to_string(),
            bus,
        };
        diag.error(IssueCategory::Reference, entity, &err.to_string());
    }
    node
}

/// Root aggregate: topology graph, shunts and the phasor group arena.
#[derive(Debug, Clone)]
pub struct Network {
    graph: Graph<Bus, Edge, Undirected>,
    shunts: Vec<Shunt>,
    groups: Vec<PhasorGroup>,
    bus_nodes: HashMap<BusId, NodeIndex>,
    branch_edges: HashMap<BranchId, EdgeIndex>,
    switch_edges: HashMap<SwitchId, EdgeIndex>,
    shunt_slots: HashMap<ShuntId, usize>,
    voltage_groups: HashMap<BusId, GroupId>,
    flow_groups: HashMap<BranchId, Vec<GroupId>>,
    injection_groups: HashMap<ShuntId, Vec<GroupId>>,
    diagnostics: Diagnostics,
}

impl Network {
    pub fn graph(&self) -> &Graph<Bus, Edge, Undirected> {
        &self.graph
    }

    /// Warnings recorded while initialising.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn bus_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Buses in insertion order with their dense graph index.
    pub fn buses(&self) -> impl Iterator<Item = (NodeIndex, &Bus)> {
        self.graph
            .node_indices()
            .map(move |node| (node, &self.graph[node]))
    }

    pub fn bus_node(&self, bus: BusId) -> Option<NodeIndex> {
        self.bus_nodes.get(&bus).copied()
    }

    pub fn bus(&self, bus: BusId) -> Option<&Bus> {
        self.bus_node(bus).map(|node| &self.graph[node])
    }

    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.graph.edge_weights().filter_map(|edge| match edge {
            Edge::Branch(branch) => Some(branch),
            Edge::Switch(_) => None,
        })
    }

    pub fn branch(&self, id: BranchId) -> Option<&Branch> {
        let edge = self.branch_edges.get(&id)?;
        match self.graph.edge_weight(*edge)? {
            Edge::Branch(branch) => Some(branch),
            Edge::Switch(_) => None,
        }
    }

    pub fn switches(&self) -> impl Iterator<Item = &SwitchingDevice> {
        self.graph.edge_weights().filter_map(|edge| match edge {
            Edge::Switch(device) => Some(device),
            Edge::Branch(_) => None,
        })
    }

    pub fn switches_mut(&mut self) -> impl Iterator<Item = &mut SwitchingDevice> {
        self.graph.edge_weights_mut().filter_map(|edge| match edge {
            Edge::Switch(device) => Some(device),
            Edge::Branch(_) => None,
        })
    }

    pub fn switch(&self, id: SwitchId) -> Option<&SwitchingDevice> {
        let edge = self.switch_edges.get(&id)?;
        match self.graph.edge_weight(*edge)? {
            Edge::Switch(device) => Some(device),
            Edge::Branch(_) => None,
        }
    }

    pub fn switch_mut(&mut self, id: SwitchId) -> Option<&mut SwitchingDevice> {
        let edge = self.switch_edges.get(&id)?;
        match self.graph.edge_weight_mut(*edge)? {
            Edge::Switch(device) => Some(device),
            Edge::Branch(_) => None,
        }
    }

    /// Operator override of a switching device's actual state.
    pub fn set_switch_state(&mut self, id: SwitchId, state: SwitchState) -> Result<(), ModelError> {
        let device = self.switch_mut(id).ok_or(ModelError::UnknownSwitch(id))?;
        device.set_actual_state(state);
        Ok(())
    }

    pub fn shunts(&self) -> &[Shunt] {
        &self.shunts
    }

    pub fn shunt(&self, id: ShuntId) -> Option<&Shunt> {
        self.shunt_slots.get(&id).map(|&slot| &self.shunts[slot])
    }

    pub fn groups(&self) -> &[PhasorGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [PhasorGroup] {
        &mut self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&PhasorGroup> {
        self.groups.get(id.value())
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut PhasorGroup> {
        self.groups.get_mut(id.value())
    }

    pub fn voltage_group_id(&self, bus: BusId) -> Option<GroupId> {
        self.voltage_groups.get(&bus).copied()
    }

    pub fn voltage_group(&self, bus: BusId) -> Option<&PhasorGroup> {
        self.voltage_group_id(bus).and_then(|id| self.group(id))
    }

    pub fn flow_group_ids(&self, branch: BranchId) -> &[GroupId] {
        self.flow_groups.get(&branch).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn injection_group_ids(&self, shunt: ShuntId) -> &[GroupId] {
        self.injection_groups.get(&shunt).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Turn status-word gating on or off for every group.
    pub fn set_status_filtering(&mut self, enabled: bool) {
        for group in &mut self.groups {
            group.filter_by_status = enabled;
        }
    }

    /// Forget the previous frame's reported flags before applying new telemetry.
    pub fn begin_frame(&mut self) {
        for group in &mut self.groups {
            group.clear_reported();
        }
        for device in self.switches_mut() {
            device.clear_reported();
        }
    }

    /// Derive sequence measurements for groups that only reported phases.
    pub fn reconcile_measurements(&mut self) {
        for group in &mut self.groups {
            group.reconcile_sequence_measurements();
        }
    }

    /// Entity lists in their original order, with current switch states and
    /// group settings.
    pub fn to_builder(&self) -> NetworkBuilder {
        let mut builder = NetworkBuilder::new();
        builder.buses = self.graph.node_weights().cloned().collect();
        builder.branches = self.branches().cloned().collect();
        builder.switches = self.switches().cloned().collect();
        builder.shunts = self.shunts.clone();
        builder.groups = self.groups.clone();
        builder
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            num_buses: self.graph.node_count(),
            num_shunts: self.shunts.len(),
            ..NetworkStats::default()
        };
        for edge in self.graph.edge_weights() {
            match edge {
                Edge::Branch(branch) => {
                    stats.num_branches += 1;
                    if branch.kind == BranchKind::Transformer {
                        stats.num_transformers += 1;
                    }
                }
                Edge::Switch(device) => {
                    stats.num_switches += 1;
                    if device.is_closed() {
                        stats.num_closed_switches += 1;
                    }
                }
            }
        }
        for group in &self.groups {
            match group.role {
                GroupRole::Voltage { .. } => stats.num_voltage_groups += 1,
                GroupRole::CurrentFlow { .. } | GroupRole::CurrentInjection { .. } => {
                    stats.num_current_groups += 1
                }
            }
        }
        stats
    }
}

/// Size of a network model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_branches: usize,
    pub num_transformers: usize,
    pub num_switches: usize,
    pub num_closed_switches: usize,
    pub num_shunts: usize,
    pub num_voltage_groups: usize,
    pub num_current_groups: usize,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} branches ({} transformers), {} switches ({} closed), {} shunts, {} voltage / {} current groups",
            self.num_buses,
            self.num_branches,
            self.num_transformers,
            self.num_switches,
            self.num_closed_switches,
            self.num_shunts,
            self.num_voltage_groups,
            self.num_current_groups
        )
    }
}
