use anyhow::Context;
use clap::Parser;

use gridlife::{Cli, GenerationController, GridLifeApp, SimulationConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = SimulationConfig::from_cli(cli).context("invalid configuration")?;
    let controller =
        GenerationController::new(&config).context("failed to seed the simulation")?;

    let app = GridLifeApp::new(config, controller).context("failed to create the event loop")?;
    app.run()
}
