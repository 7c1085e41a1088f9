//! Telemetry key → model field table.
//!
//! Built once from an initialised [`Network`] by scanning every registered
//! key, then used for every frame. A key may feed several fields (a PMU STAT
//! word is usually shared by all groups of that PMU).

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::AngleUnit;
use crate::network::Network;
use crate::phasor::Phase;
use crate::{GroupId, SwitchId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementField {
    Magnitude(Phase),
    Angle(Phase),
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementTarget {
    Group {
        group: GroupId,
        field: MeasurementField,
    },
    Switch(SwitchId),
}

/// Outcome of applying one frame's samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameIngestion {
    /// Samples that reached at least one field
    pub applied: usize,
    /// Samples whose key is not registered anywhere
    pub unmapped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MeasurementMap {
    targets: HashMap<String, Vec<MeasurementTarget>>,
    angle_unit: AngleUnit,
}

impl MeasurementMap {
    pub fn from_network(network: &Network) -> Self {
        let mut map = Self::default();
        for group in network.groups() {
            for (phase, value) in group.measurement.iter() {
                if let Some(key) = &value.magnitude_key {
                    map.register(key, MeasurementTarget::Group {
                        group: group.id,
                        field: MeasurementField::Magnitude(phase),
                    });
                }
                if let Some(key) = &value.angle_key {
                    map.register(key, MeasurementTarget::Group {
                        group: group.id,
                        field: MeasurementField::Angle(phase),
                    });
                }
            }
            if let Some(key) = &group.status.key {
                map.register(key, MeasurementTarget::Group {
                    group: group.id,
                    field: MeasurementField::Status,
                });
            }
        }
        for device in network.switches() {
            if let Some(status) = &device.status {
                map.register(&status.key, MeasurementTarget::Switch(device.id));
            }
        }
        debug!(keys = map.len(), "measurement map built");
        map
    }

    pub fn with_angle_unit(mut self, angle_unit: AngleUnit) -> Self {
        self.angle_unit = angle_unit;
        self
    }

    fn register(&mut self, key: &str, target: MeasurementTarget) {
        self.targets.entry(key.to_string()).or_default().push(target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.targets.contains_key(key)
    }

    pub fn targets(&self, key: &str) -> &[MeasurementTarget] {
        self.targets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Route one sample to every field registered under `key`.
    pub fn apply(&self, network: &mut Network, key: &str, value: f64) -> bool {
        let Some(targets) = self.targets.get(key) else {
            return false;
        };
        let mut applied = false;
        for target in targets {
            applied |= match *target {
                MeasurementTarget::Group { group, field } => {
                    let Some(group) = network.group_mut(group) else {
                        continue;
                    };
                    match field {
                        MeasurementField::Magnitude(phase) => {
                            group.measurement.get_mut(phase).insert(key, value)
                        }
                        MeasurementField::Angle(phase) => {
                            let degrees = match self.angle_unit {
                                AngleUnit::Degrees => value,
                                AngleUnit::Radians => value.to_degrees(),
                            };
                            group.measurement.get_mut(phase).insert(key, degrees)
                        }
                        MeasurementField::Status => group.status.insert(key, value),
                    }
                }
                MeasurementTarget::Switch(id) => network
                    .switch_mut(id)
                    .is_some_and(|device| device.insert(key, value)),
            };
        }
        applied
    }

    /// Apply all samples of one frame.
    pub fn apply_frame<I, K>(&self, network: &mut Network, samples: I) -> FrameIngestion
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut ingestion = FrameIngestion::default();
        for (key, value) in samples {
            let key = key.as_ref();
            if self.apply(network, key, value) {
                ingestion.applied += 1;
            } else {
                debug!(key, "unmapped telemetry key");
                ingestion.unmapped += 1;
            }
        }
        if ingestion.unmapped > 0 {
            warn!(
                unmapped = ingestion.unmapped,
                applied = ingestion.applied,
                "frame carried unmapped telemetry keys"
            );
        }
        ingestion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phasor::VoltageLevel;
    use crate::phasor_group::PhasorGroup;
    use crate::status::BreakerStatus;
    use crate::{Bus, BusId, NetworkBuilder, SwitchState, SwitchingDevice};

    fn network() -> Network {
        let mut builder = NetworkBuilder::new();
        builder.add_bus(Bus::new(BusId::new(1), "A", 230.0));
        builder.add_bus(Bus::new(BusId::new(2), "B", 230.0));
        builder.add_switch(
            SwitchingDevice::new(
                SwitchId::new(1),
                "CB-AB",
                BusId::new(1),
                BusId::new(2),
                SwitchState::Closed,
            )
            .with_status(BreakerStatus::new("SUB:CB", 2)),
        );
        for (bus, prefix) in [(1, "PMU1"), (2, "PMU2")] {
            builder.add_group(
                PhasorGroup::voltage(
                    format!("{prefix} V"),
                    BusId::new(bus),
                    VoltageLevel::new(230.0),
                )
                .with_keys(
                    Phase::Positive,
                    format!("{prefix}:V1M"),
                    format!("{prefix}:V1A"),
                )
                .with_status_key("SUB:STAT"),
            );
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_shared_status_key_reaches_all_groups() {
        let mut network = network();
        let map = MeasurementMap::from_network(&network);
        assert_eq!(map.targets("SUB:STAT").len(), 2);

        assert!(map.apply(&mut network, "SUB:STAT", 32768.0));
        assert!(network.groups().iter().all(|g| !g.status.data_is_valid()));
    }

    #[test]
    fn test_apply_frame_counts() {
        let mut network = network();
        let map = MeasurementMap::from_network(&network);
        let frame = [
            ("PMU1:V1M", 132_000.0),
            ("PMU1:V1A", -1.5),
            ("PMU3:V1M", 1.0),
            ("SUB:CB", 0.0),
        ];
        let ingestion = map.apply_frame(&mut network, frame);
        assert_eq!(ingestion, FrameIngestion { applied: 3, unmapped: 1 });

        let group = network.voltage_group(BusId::new(1)).unwrap();
        assert_eq!(group.measurement.positive.magnitude(), 132_000.0);
        assert!((group.measurement.positive.angle_degrees().value() + 1.5).abs() < 1e-12);
        assert!(!network.switch(SwitchId::new(1)).unwrap().is_closed());
    }

    #[test]
    fn test_radian_angles_are_converted() {
        let mut network = network();
        let map = MeasurementMap::from_network(&network).with_angle_unit(AngleUnit::Radians);
        map.apply(&mut network, "PMU2:V1A", 0.5);
        let group = network.voltage_group(BusId::new(2)).unwrap();
        assert!((group.measurement.positive.angle().value() - 0.5).abs() < 1e-12);
    }
}
