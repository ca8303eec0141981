//! Display glue
//!
//! Thin wgpu adapter between the controller's RGBA image and a window
//! surface. Contains no simulation logic.

pub mod render_engine;

pub use render_engine::RenderEngine;
