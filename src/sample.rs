//! Writes reconstructions, interpolation sweeps and sample grids from a
//! trained checkpoint into `<model_dir>/test`.

use anyhow::{Context, Result};
use clap::Parser;

use began::cli::{ConfigArgs, Mode, init_tracing, run};

#[derive(Parser, Debug)]
#[command(author, version, about = "BEGAN sampling and interpolation")]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = args
        .config
        .resolve()
        .context("failed to resolve configuration")?;
    config.is_train = false;

    run(config, Mode::Test).context("sampling failed")
}
