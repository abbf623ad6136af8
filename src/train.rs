//! Trains a BEGAN model on a folder of images.
//!
//! ```text
//! train --data-dir data/celeba --model-dir logs/celeba
//! train --data-dir data/celeba --model-dir logs/reverse --load-path logs/celeba --reverse
//! ```

use anyhow::{Context, Result};
use clap::Parser;

use began::cli::{ConfigArgs, Mode, init_tracing, run};

#[derive(Parser, Debug)]
#[command(author, version, about = "BEGAN trainer with a reverse generator")]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    /// Write test artifacts from the restored checkpoint instead of training.
    #[arg(long)]
    test: bool,
}

// --- MAIN EXECUTION ---

/// 1. Parse flags and resolve the run configuration
/// 2. Pick the backend (`Wgpu` unless `--cpu`)
/// 3. Load the image folder and restore any checkpoint
/// 4. Run the adversarial loop, the reverse pretraining loop or the test pass
fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = args
        .config
        .resolve()
        .context("failed to resolve configuration")?;
    if args.test {
        config.is_train = false;
    }

    let mode = Mode::from_config(&config);
    run(config, mode).with_context(|| format!("{mode:?} run failed"))
}
