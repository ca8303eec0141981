//! Command-line surface and validated simulation configuration
//!
//! The clap struct is the raw flag surface; [`SimulationConfig`] is the
//! validated form the rest of the crate consumes. All validation failures
//! are [`ConfigError`]s and abort before any window is shown.

use std::path::PathBuf;

use clap::Parser;

use crate::error::ConfigError;
use crate::rules::RuleSet;

/// Default population density, the original demo's spawn chance.
pub const DEFAULT_DENSITY: f64 = 0.04;
/// Default RNG seed for `--random` populations.
pub const DEFAULT_SEED: u64 = 123;

#[derive(Parser, Debug)]
#[command(
    name = "gridlife",
    version,
    about = "Conway's Game of Life on the GPU, with a CPU reference stepper"
)]
pub struct Cli {
    /// Board width in cells.
    #[arg(value_name = "WIDTH", default_value_t = 512)]
    pub width: u32,

    /// Board height in cells (defaults to WIDTH).
    #[arg(value_name = "HEIGHT")]
    pub height: Option<u32>,

    /// Seed the board from an RLE pattern file.
    #[arg(long, value_name = "PATH", conflicts_with = "random")]
    pub file: Option<PathBuf>,

    /// Seed the board randomly with the given live-cell density (0, 1].
    #[arg(long, value_name = "DENSITY")]
    pub random: Option<f64>,

    /// Rule string, survival/birth ("23/3") or RLE form ("B3/S23").
    /// A rule from a pattern-file header is used unless this is given.
    #[arg(long, value_name = "S/B")]
    pub rule: Option<String>,

    /// Start with the CPU stepper instead of the GPU.
    #[arg(long)]
    pub cpu: bool,

    /// Use blocking device readback instead of polled asynchronous readback.
    #[arg(long)]
    pub sync: bool,

    /// Minimum milliseconds between generations (0 = every tick).
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub interval: u64,

    /// RNG seed for --random populations, for reproducible runs.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Compute-kernel workgroup size.
    #[arg(long, num_args = 2, value_names = ["X", "Y"], default_values_t = [8u32, 8u32])]
    pub workgroup: Vec<u32>,

    /// Fade dead cells out over a few frames instead of blanking them.
    #[arg(long)]
    pub fade: bool,
}

/// Where the initial population comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum PopulationSource {
    Random { density: f64, seed: u64 },
    File(PathBuf),
}

/// Which stepper advances generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Cpu,
    Device,
}

/// How device results come back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadbackMode {
    /// Block the host until the transfer completes.
    Blocking,
    /// Fire the transfer and poll for completion on later ticks.
    Polled,
}

/// Validated configuration consumed by the controller and the app.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub width: u32,
    pub height: u32,
    pub source: PopulationSource,
    /// Rule from `--rule`; `None` means "default, pattern header may override".
    pub rule: Option<RuleSet>,
    pub mode: ExecMode,
    pub readback: ReadbackMode,
    pub interval_ms: u64,
    pub workgroup: (u32, u32),
    pub fade: bool,
}

impl SimulationConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let width = cli.width;
        let height = cli.height.unwrap_or(width);
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroDimension { width, height });
        }

        let source = match (cli.file, cli.random) {
            (Some(path), None) => PopulationSource::File(path),
            (None, density) => {
                let density = density.unwrap_or(DEFAULT_DENSITY);
                if !(density > 0.0 && density <= 1.0) {
                    return Err(ConfigError::InvalidDensity(density));
                }
                PopulationSource::Random {
                    density,
                    seed: cli.seed,
                }
            }
            // clap's conflicts_with already rejects --file with --random.
            (Some(_), Some(density)) => return Err(ConfigError::InvalidDensity(density)),
        };

        let rule = cli.rule.as_deref().map(RuleSet::parse).transpose()?;

        let (wx, wy) = (cli.workgroup[0], cli.workgroup[1]);
        if wx == 0 || wy == 0 {
            return Err(ConfigError::ZeroDimension {
                width: wx,
                height: wy,
            });
        }

        Ok(Self {
            width,
            height,
            source,
            rule,
            mode: if cli.cpu { ExecMode::Cpu } else { ExecMode::Device },
            readback: if cli.sync {
                ReadbackMode::Blocking
            } else {
                ReadbackMode::Polled
            },
            interval_ms: cli.interval,
            workgroup: (wx, wy),
            fade: cli.fade,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<SimulationConfig, ConfigError> {
        let mut argv = vec!["gridlife"];
        argv.extend_from_slice(args);
        SimulationConfig::from_cli(Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn defaults() {
        let cfg = parse(&[]).unwrap();
        assert_eq!((cfg.width, cfg.height), (512, 512));
        assert_eq!(
            cfg.source,
            PopulationSource::Random {
                density: DEFAULT_DENSITY,
                seed: DEFAULT_SEED
            }
        );
        assert_eq!(cfg.rule, None);
        assert_eq!(cfg.mode, ExecMode::Device);
        assert_eq!(cfg.readback, ReadbackMode::Polled);
        assert_eq!(cfg.workgroup, (8, 8));
    }

    #[test]
    fn height_defaults_to_width() {
        let cfg = parse(&["200"]).unwrap();
        assert_eq!((cfg.width, cfg.height), (200, 200));
        let cfg = parse(&["200", "100"]).unwrap();
        assert_eq!((cfg.width, cfg.height), (200, 100));
    }

    #[test]
    fn zero_dimension_rejected() {
        assert!(matches!(
            parse(&["0"]),
            Err(ConfigError::ZeroDimension { .. })
        ));
        assert!(matches!(
            parse(&["100", "0"]),
            Err(ConfigError::ZeroDimension { .. })
        ));
    }

    #[test]
    fn density_validated() {
        assert!(matches!(
            parse(&["--random", "0.0"]),
            Err(ConfigError::InvalidDensity(_))
        ));
        assert!(matches!(
            parse(&["--random", "1.5"]),
            Err(ConfigError::InvalidDensity(_))
        ));
        assert!(parse(&["--random", "1.0"]).is_ok());
    }

    #[test]
    fn file_conflicts_with_random() {
        let argv = ["gridlife", "--file", "p.rle", "--random", "0.1"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn rule_parsed() {
        let cfg = parse(&["--rule", "23/3"]).unwrap();
        assert_eq!(cfg.rule, Some(RuleSet::conway()));
        assert!(matches!(
            parse(&["--rule", "9/3"]),
            Err(ConfigError::InvalidRule(_))
        ));
    }

    #[test]
    fn mode_flags() {
        assert_eq!(parse(&["--cpu"]).unwrap().mode, ExecMode::Cpu);
        assert_eq!(
            parse(&["--sync"]).unwrap().readback,
            ReadbackMode::Blocking
        );
    }

    #[test]
    fn workgroup_override() {
        let cfg = parse(&["--workgroup", "16", "16"]).unwrap();
        assert_eq!(cfg.workgroup, (16, 16));
        assert!(parse(&["--workgroup", "0", "8"]).is_err());
    }
}
