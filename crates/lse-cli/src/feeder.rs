//! A small synthetic feeder with telemetry generated from a known state.
//!
//! ```text
//!  Source ──L12── Mid ──L23── End
//!   (PMU)          │          (PMU)
//!                CB-24
//!                  │
//!                 Tap ── capacitor
//!                (PMU)
//! ```
//!
//! Mid has no voltage measurement of its own and is only observed through
//! the closed tap breaker.

use std::collections::BTreeMap;

use anyhow::Result;
use lse_core::*;
use num_complex::Complex64;

/// One frame of telemetry, keyed by measurement key.
pub type Frame = BTreeMap<String, f64>;

const BASE_KV: f64 = 138.0;

/// Bit carrying CB-24 in the `MID:DIG` word.
const TAP_BREAKER_BIT: u8 = 0;

pub fn feeder_model() -> NetworkBuilder {
    let level = VoltageLevel::new(BASE_KV);
    let mut builder = NetworkBuilder::new();
    builder.add_bus(Bus::new(BusId::new(1), "Source", BASE_KV));
    builder.add_bus(Bus::new(BusId::new(2), "Mid", BASE_KV));
    builder.add_bus(Bus::new(BusId::new(3), "End", BASE_KV));
    builder.add_bus(Bus::new(BusId::new(4), "Tap", BASE_KV));

    builder.add_branch(line_12());
    builder.add_branch(
        Branch::new(BranchId::new(23), "L23", BusId::new(2), BusId::new(3), 0.02, 0.15)
            .with_charging(0.01),
    );
    builder.add_switch(
        SwitchingDevice::new(
            SwitchId::new(24),
            "CB-24",
            BusId::new(2),
            BusId::new(4),
            SwitchState::Closed,
        )
        .with_status(BreakerStatus::new("MID:DIG", TAP_BREAKER_BIT)),
    );
    builder.add_shunt(Shunt::new(ShuntId::new(4), "C4", BusId::new(4), 0.0, 0.05));

    builder.add_group(
        PhasorGroup::voltage("Source V", BusId::new(1), level)
            .with_keys(Phase::Positive, "SRC:V1M", "SRC:V1A")
            .with_status_key("SRC:STAT")
            .with_output_key("SRC"),
    );
    builder.add_group(
        PhasorGroup::current_flow("Source I12", BranchId::new(12), BranchEnd::From, level)
            .with_keys(Phase::Positive, "SRC:I1M", "SRC:I1A")
            .with_status_key("SRC:STAT")
            .with_output_key("L12"),
    );
    builder.add_group(
        PhasorGroup::voltage("End V", BusId::new(3), level)
            .with_keys(Phase::Positive, "END:V1M", "END:V1A")
            .with_status_key("END:STAT")
            .with_output_key("END"),
    );
    builder.add_group(
        PhasorGroup::voltage("Tap V", BusId::new(4), level)
            .with_keys(Phase::Positive, "TAP:V1M", "TAP:V1A")
            .with_status_key("TAP:STAT")
            .with_output_key("TAP"),
    );
    builder.add_group(
        PhasorGroup::current_injection("C4 I", ShuntId::new(4), level).with_output_key("C4"),
    );
    builder
}

fn line_12() -> Branch {
    Branch::new(BranchId::new(12), "L12", BusId::new(1), BusId::new(2), 0.01, 0.1)
        .with_charging(0.02)
}

/// Generate `count` frames. The whole system drifts slowly in angle. From
/// frame `trip_at` on, CB-24 reports open and the tap PMU sees a dead bus.
pub fn feeder_frames(count: usize, trip_at: Option<usize>) -> Result<Vec<Frame>> {
    let level = VoltageLevel::new(BASE_KV);
    let v_base = level.base_value(PhasorKind::Voltage)?;
    let i_base = level.base_value(PhasorKind::Current)?;
    let y = line_12().admittance()?;

    let v1 = Complex64::from_polar(1.0, 0.0);
    let v2 = Complex64::from_polar(0.985, (-1.5f64).to_radians());
    let v3 = Complex64::from_polar(0.97, (-3.0f64).to_radians());
    let i12 = y.y_ff * v1 + y.y_ft * v2;

    let frames = (0..count)
        .map(|k| {
            let drift = Complex64::from_polar(1.0, (0.05 * k as f64).to_radians());
            let mut frame = Frame::new();
            push_phasor(&mut frame, "SRC:V1", v1 * drift * v_base);
            push_phasor(&mut frame, "SRC:I1", i12 * drift * i_base);
            push_phasor(&mut frame, "END:V1", v3 * drift * v_base);
            let closed = trip_at.map_or(true, |trip| k < trip);
            let tap = if closed { v2 } else { Complex64::new(0.0, 0.0) };
            push_phasor(&mut frame, "TAP:V1", tap * drift * v_base);
            for stat in ["SRC:STAT", "END:STAT", "TAP:STAT"] {
                frame.insert(stat.into(), 0.0);
            }
            let word = if closed { 1u16 << TAP_BREAKER_BIT } else { 0 };
            frame.insert("MID:DIG".into(), f64::from(word));
            frame
        })
        .collect();
    Ok(frames)
}

fn push_phasor(frame: &mut Frame, prefix: &str, value: Complex64) {
    frame.insert(format!("{prefix}M"), value.norm());
    frame.insert(format!("{prefix}A"), value.arg().to_degrees());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feeder_model_builds() {
        let network = feeder_model().build().unwrap();
        let stats = network.stats();
        assert_eq!(stats.num_buses, 4);
        assert_eq!(stats.num_closed_switches, 1);
        assert_eq!(stats.num_voltage_groups, 3);
        // Mid carries no voltage measurement
        assert_eq!(network.diagnostics().warning_count(), 1);
    }

    #[test]
    fn test_trip_clears_breaker_bit() {
        let frames = feeder_frames(4, Some(2)).unwrap();
        let words: Vec<f64> = frames.iter().map(|f| f["MID:DIG"]).collect();
        assert_eq!(words, vec![1.0, 1.0, 0.0, 0.0]);
    }
}
