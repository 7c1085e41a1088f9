//! Single authority on whether the system matrix must be rebuilt.
//!
//! Compares each phasor group's inclusion flag and PMU status word, and each
//! switching device's raw status word and actual state, with the previous
//! frame. The snapshot is updated on every call. Before the first frame all
//! groups count as previously included and all status words as zero.

use lse_core::{Network, PhaseSelection, SwitchState};
use tracing::debug;

use crate::observability::group_included;

#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    inclusion: Vec<bool>,
    status_words: Vec<u16>,
    raw_status: Vec<u16>,
    switch_states: Vec<Option<SwitchState>>,
    rebuilds: u64,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the snapshot, e.g. after a network reload.
    pub fn reset(&mut self) {
        self.inclusion.clear();
        self.status_words.clear();
        self.raw_status.clear();
        self.switch_states.clear();
    }

    fn ensure_sized(&mut self, groups: usize, switches: usize) {
        if self.inclusion.len() != groups {
            self.inclusion = vec![true; groups];
            self.status_words = vec![0; groups];
        }
        if self.raw_status.len() != switches {
            self.raw_status = vec![0; switches];
            self.switch_states = vec![None; switches];
        }
    }

    /// Compare this frame against the snapshot and update it.
    pub fn detect(&mut self, network: &Network, selection: PhaseSelection) -> bool {
        let switch_count = network.switches().count();
        self.ensure_sized(network.groups().len(), switch_count);

        let mut changed = false;
        let group_snapshots = self.inclusion.iter_mut().zip(self.status_words.iter_mut());
        for ((previous, word), group) in group_snapshots.zip(network.groups()) {
            let included = group_included(group, selection);
            if *previous != included {
                debug!(group = %group.name, included, "inclusion changed");
                *previous = included;
                changed = true;
            }
            let current_word = group.status.binary_value();
            if *word != current_word {
                debug!(group = %group.name, stat = current_word, "status word changed");
                *word = current_word;
                changed = true;
            }
        }

        let snapshots = self.raw_status.iter_mut().zip(self.switch_states.iter_mut());
        for ((raw, state), device) in snapshots.zip(network.switches()) {
            let current_raw = device.raw_status();
            if *raw != current_raw {
                *raw = current_raw;
                changed = true;
            }
            if *state != Some(device.actual_state) {
                if state.is_some() {
                    debug!(switch = %device.name, state = ?device.actual_state, "switching device operated");
                }
                *state = Some(device.actual_state);
                changed = true;
            }
        }
        changed
    }

    /// Rebuild iff something changed or there is no matrix yet.
    pub fn should_rebuild(
        &mut self,
        network: &Network,
        selection: PhaseSelection,
        has_matrix: bool,
    ) -> bool {
        let changed = self.detect(network, selection);
        changed || !has_matrix
    }

    pub fn record_rebuild(&mut self) {
        self.rebuilds += 1;
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}
