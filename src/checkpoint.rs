//! Wall-clock checkpointing of networks, optimizer state and `TrainerState`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::{
    module::Module,
    optim::Optimizer,
    record::{BinFileRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::AutodiffBackend,
};
use tracing::{debug, info};

use crate::config::BeganConfig;
use crate::error::Result;
use crate::model::BeganNetworks;
use crate::optim::BeganOptimizers;
use crate::state::TrainerState;

const CHECKPOINT_DIR: &str = "checkpoint";
const STATE_FILE: &str = "state.json";

/// What a restore brings back from disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreScope {
    /// Every network, optimizer and scalar.
    All,
    /// Generator, discriminator and their scalars. The reverse generator,
    /// its optimizer and `g_r_lr` keep their fresh values.
    Adversarial,
}

/// Decides when the next periodic save is due.
#[derive(Debug)]
pub struct Checkpointer {
    interval: Duration,
    last_save: Instant,
}

impl Checkpointer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_save: Instant::now(),
        }
    }

    pub fn from_config(config: &BeganConfig) -> Self {
        Self::new(Duration::from_secs(config.save_model_secs))
    }

    pub fn is_due(&self) -> bool {
        self.last_save.elapsed() >= self.interval
    }

    pub fn mark_saved(&mut self) {
        self.last_save = Instant::now();
    }
}

pub fn checkpoint_dir(root: &Path) -> PathBuf {
    root.join(CHECKPOINT_DIR)
}

pub fn has_checkpoint(root: &Path) -> bool {
    checkpoint_dir(root).join(STATE_FILE).exists()
}

/// Writes all three networks, their optimizers and the scalar state under
/// `<root>/checkpoint`.
pub fn save_checkpoint<B: AutodiffBackend>(
    root: &Path,
    networks: &BeganNetworks<B>,
    optimizers: &BeganOptimizers<B>,
    state: &TrainerState,
) -> Result<()> {
    let dir = checkpoint_dir(root);
    std::fs::create_dir_all(&dir)?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

    networks
        .generator
        .clone()
        .save_file(dir.join("generator"), &recorder)?;
    networks
        .discriminator
        .clone()
        .save_file(dir.join("discriminator"), &recorder)?;
    networks
        .reverse
        .clone()
        .save_file(dir.join("reverse"), &recorder)?;

    recorder.record(optimizers.generator.to_record(), dir.join("optim_g"))?;
    recorder.record(optimizers.discriminator.to_record(), dir.join("optim_d"))?;
    recorder.record(optimizers.reverse.to_record(), dir.join("optim_r"))?;

    std::fs::write(dir.join(STATE_FILE), serde_json::to_string_pretty(state)?)?;
    debug!(step = state.step, dir = %dir.display(), "checkpoint written");
    Ok(())
}

/// Restores a checkpoint from `<root>/checkpoint` if one exists.
///
/// Returns `false` and leaves everything untouched when there is nothing
/// to restore.
pub fn load_checkpoint<B: AutodiffBackend>(
    root: &Path,
    scope: RestoreScope,
    device: &B::Device,
    networks: &mut BeganNetworks<B>,
    optimizers: &mut BeganOptimizers<B>,
    state: &mut TrainerState,
) -> Result<bool> {
    if !has_checkpoint(root) {
        return Ok(false);
    }
    let dir = checkpoint_dir(root);
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

    networks.generator = networks
        .generator
        .clone()
        .load_file(dir.join("generator"), &recorder, device)?;
    networks.discriminator = networks
        .discriminator
        .clone()
        .load_file(dir.join("discriminator"), &recorder, device)?;

    let record = recorder.load(dir.join("optim_g"), device)?;
    optimizers.generator = optimizers.generator.clone().load_record(record);
    let record = recorder.load(dir.join("optim_d"), device)?;
    optimizers.discriminator = optimizers.discriminator.clone().load_record(record);

    let saved: TrainerState =
        serde_json::from_str(&std::fs::read_to_string(dir.join(STATE_FILE))?)?;

    match scope {
        RestoreScope::All => {
            networks.reverse = networks
                .reverse
                .clone()
                .load_file(dir.join("reverse"), &recorder, device)?;
            let record = recorder.load(dir.join("optim_r"), device)?;
            optimizers.reverse = optimizers.reverse.clone().load_record(record);
            *state = saved;
        }
        RestoreScope::Adversarial => {
            *state = TrainerState {
                g_r_lr: state.g_r_lr,
                ..saved
            };
        }
    }

    info!(step = state.step, k_t = state.k_t, ?scope, "restored checkpoint from {}", dir.display());
    Ok(true)
}
