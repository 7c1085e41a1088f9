//! Published estimator results.
//!
//! Every output is one scalar tagged with a key built from the group's output
//! key, its category, the phase and whether it is a magnitude or an angle:
//!
//! ```text
//! {output_key}:{category}:{phase}:{quantity}
//! SUB1 V:voltage_estimate:+:magnitude
//! ```
//!
//! Magnitudes are in device units (volts, amperes), angles in degrees.

use lse_core::{BusId, Phase, PhasorGroup};
use num_complex::Complex64;
use serde::Serialize;

use crate::observability::Observability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCategory {
    VoltageEstimate,
    VoltageResidual,
    CurrentFlowEstimate,
    CurrentInjectionEstimate,
}

impl OutputCategory {
    pub fn tag(self) -> &'static str {
        match self {
            OutputCategory::VoltageEstimate => "voltage_estimate",
            OutputCategory::VoltageResidual => "voltage_residual",
            OutputCategory::CurrentFlowEstimate => "current_flow_estimate",
            OutputCategory::CurrentInjectionEstimate => "current_injection_estimate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputQuantity {
    Magnitude,
    Angle,
}

impl OutputQuantity {
    pub fn tag(self) -> &'static str {
        match self {
            OutputQuantity::Magnitude => "magnitude",
            OutputQuantity::Angle => "angle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputMeasurement {
    pub key: String,
    pub category: OutputCategory,
    pub quantity: OutputQuantity,
    pub phase: Phase,
    pub value: f64,
}

pub fn output_key(prefix: &str, category: OutputCategory, phase: Phase, quantity: OutputQuantity) -> String {
    format!("{prefix}:{}:{}:{}", category.tag(), phase.label(), quantity.tag())
}

/// Solved voltage of one bus, in per unit of its base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusVoltage {
    pub bus: BusId,
    pub observability: Observability,
    pub positive_sequence: Complex64,
    /// A, B, C; balanced in positive-sequence mode
    pub phases: [Complex64; 3],
}

impl BusVoltage {
    pub fn magnitude(&self) -> f64 {
        self.positive_sequence.norm()
    }

    pub fn angle_degrees(&self) -> f64 {
        self.positive_sequence.arg().to_degrees()
    }
}

/// Append magnitude and angle outputs for the given phases of a group.
pub(crate) fn publish(
    outputs: &mut Vec<OutputMeasurement>,
    group: &PhasorGroup,
    category: OutputCategory,
    phases: &[Phase],
) {
    for &phase in phases {
        let value = match category {
            OutputCategory::VoltageResidual => group.residual(phase),
            _ => group.estimate.get(phase).complex(),
        };
        for (quantity, scalar) in [
            (OutputQuantity::Magnitude, value.norm()),
            (OutputQuantity::Angle, value.arg().to_degrees()),
        ] {
            outputs.push(OutputMeasurement {
                key: output_key(&group.output_key, category, phase, quantity),
                category,
                quantity,
                phase,
                value: scalar,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lse_core::{Radians, VoltageLevel};

    #[test]
    fn test_output_key_format() {
        assert_eq!(
            output_key(
                "SUB1 V",
                OutputCategory::VoltageEstimate,
                Phase::Positive,
                OutputQuantity::Magnitude
            ),
            "SUB1 V:voltage_estimate:+:magnitude"
        );
    }

    #[test]
    fn test_publish_residual() {
        let mut group = PhasorGroup::voltage("V", BusId::new(1), VoltageLevel::new(138.0))
            .with_output_key("SUB1 V");
        group.measurement.positive.set_polar(80_000.0, Radians(0.0));
        group.estimate.positive.set_polar(79_000.0, Radians(0.0));

        let mut outputs = Vec::new();
        publish(&mut outputs, &group, OutputCategory::VoltageResidual, &[Phase::Positive]);

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].key, "SUB1 V:voltage_residual:+:magnitude");
        assert!((outputs[0].value - 1_000.0).abs() < 1e-6);
        assert_eq!(outputs[1].quantity, OutputQuantity::Angle);
        assert!(outputs[1].value.abs() < 1e-9);

        let json = serde_json::to_string(&outputs[0]).unwrap();
        assert!(json.contains("\"category\":\"voltage_residual\""));
    }
}
