// src/lib.rs
//! gridlife
//!
//! Conway's Game of Life with a wgpu compute stepper and a CPU reference
//! stepper behind one controller, displayed in a winit window. The library
//! half holds everything testable (grid, rules, pattern parsing, steppers,
//! controller); the binary wires it to a window.

pub mod app;
pub mod config;
pub mod error;
pub mod gfx;
pub mod grid;
pub mod pattern;
pub mod rules;
pub mod simulation;

// Re-export main types for convenience
pub use app::GridLifeApp;
pub use config::{Cli, ExecMode, ReadbackMode, SimulationConfig};
pub use grid::Grid;
pub use pattern::Pattern;
pub use rules::RuleSet;
pub use simulation::GenerationController;
