//! Step execution reports
//!
//! Both steppers report how long a full-grid pass took. The CPU stepper can
//! only measure wall clock; the device stepper prefers kernel-side
//! timestamps so host overhead (submission, readback) is excluded.

/// Where a step duration was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingSource {
    /// Host wall clock around the full-grid pass.
    HostWallClock,
    /// Device timestamp queries around the kernel dispatch.
    DeviceTimestamp,
}

/// Outcome of one completed generation step.
#[derive(Debug, Clone, Copy)]
pub struct StepReport {
    /// Duration of the pass in milliseconds.
    pub duration_ms: f64,
    pub source: TimingSource,
}

impl StepReport {
    pub fn host(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            source: TimingSource::HostWallClock,
        }
    }

    pub fn device(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            source: TimingSource::DeviceTimestamp,
        }
    }
}
