//! Generation-advance engine
//!
//! The core of the crate: a CPU reference stepper, a wgpu compute stepper
//! with ping-pong device buffers and gated readback, and the controller
//! that owns the host double buffer and playback state.

pub mod controller;
pub mod cpu;
pub mod gpu;
pub mod stepper;

pub use controller::GenerationController;
pub use cpu::CpuStepper;
pub use gpu::DeviceStepper;
pub use stepper::{StepReport, TimingSource};
