//! Error taxonomy for the simulation
//!
//! Setup-time failures (configuration, pattern files, device bring-up) are
//! separated from runtime step failures so the binary can report them before
//! any window is shown.

use thiserror::Error;

/// Invalid configuration detected before the simulation is constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("board dimensions must be positive, got {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    #[error("population density must be in (0, 1], got {0}")]
    InvalidDensity(f64),

    #[error("malformed rule string {0:?} (expected e.g. \"23/3\" or \"B3/S23\")")]
    InvalidRule(String),
}

/// Malformed pattern file. No partial grid is ever produced.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read pattern file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed header line (expected \"x = W, y = H[, rule = B../S..]\")")]
    BadHeader,

    #[error("missing '!' terminator")]
    MissingTerminator,

    #[error("disallowed character {0:?} in pattern body")]
    BadCharacter(char),

    #[error("pattern body exceeds declared {0} of {1}")]
    Overflow(&'static str, u32),

    #[error("invalid rule in header: {0}")]
    BadRule(String),
}

/// Pattern bounding box does not fit on the board.
#[derive(Debug, Error)]
#[error("pattern {}x{} does not fit on a {}x{} board", .pattern.0, .pattern.1, .board.0, .board.1)]
pub struct SizeError {
    pub pattern: (u32, u32),
    pub board: (u32, u32),
}

/// Fatal device bring-up failure. There is no automatic CPU fallback;
/// selecting CPU mode is an explicit user action.
#[derive(Debug, Error)]
pub enum DeviceSetupError {
    #[error("no compatible GPU adapter available: {0}")]
    AdapterUnavailable(String),

    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("compute kernel failed to build:\n{log}")]
    KernelBuild { log: String },
}

/// Runtime failure during a generation step. The previous generation's
/// buffer is preserved until a step fully commits, so the error carries the
/// last generation known to be intact.
#[derive(Debug, Error)]
#[error("generation step failed after generation {last_good_generation}: {reason}")]
pub struct StepError {
    pub last_good_generation: u64,
    pub reason: String,
}

/// Any failure that can abort simulation setup.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Size(#[from] SizeError),

    #[error(transparent)]
    Device(#[from] DeviceSetupError),
}
