//! Performance counters for the estimation cycle.

use std::fmt;

use serde::Serialize;
use web_time::{Duration, Instant};

/// Wall-clock time spent per stage of the last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTimings {
    /// Applying telemetry samples to model fields
    pub parsing: Duration,
    /// Change check and measurement vector assembly
    pub mapping: Duration,
    /// Observability analysis and matrix rebuild
    pub observability: Duration,
    pub solve: Duration,
    /// Scattering the state and building outputs
    pub output: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.parsing + self.mapping + self.observability + self.solve + self.output
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceCounters {
    pub active_voltages: usize,
    pub active_current_flows: usize,
    pub active_injections: usize,
    pub observed_buses: usize,
    pub frames: u64,
    pub failed_frames: u64,
    pub rebuilds: u64,
    pub timings: StageTimings,
}

impl fmt::Display for PerformanceCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} voltages, {} flows, {} injections, {} observed buses | frames {} (failed {}), rebuilds {} | {:.3} ms",
            self.active_voltages,
            self.active_current_flows,
            self.active_injections,
            self.observed_buses,
            self.frames,
            self.failed_frames,
            self.rebuilds,
            self.timings.total().as_secs_f64() * 1e3
        )
    }
}

/// Measures one stage.
pub(crate) struct StageTimer(Instant);

impl StageTimer {
    pub(crate) fn start() -> Self {
        Self(Instant::now())
    }

    pub(crate) fn stop(self) -> Duration {
        self.0.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_sums_stages() {
        let timings = StageTimings {
            parsing: Duration::from_micros(10),
            mapping: Duration::from_micros(20),
            observability: Duration::from_micros(30),
            solve: Duration::from_micros(40),
            output: Duration::from_micros(50),
        };
        assert_eq!(timings.total(), Duration::from_micros(150));
    }

    #[test]
    fn test_display() {
        let counters = PerformanceCounters {
            active_voltages: 2,
            observed_buses: 2,
            frames: 5,
            rebuilds: 1,
            ..PerformanceCounters::default()
        };
        assert!(counters
            .to_string()
            .starts_with("2 voltages, 0 flows, 0 injections, 2 observed buses | frames 5 (failed 0), rebuilds 1"));
    }
}
