//! Command-line plumbing shared by the `train` and `sample` binaries.

use std::path::{Path, PathBuf};

use burn::{
    backend::{Autodiff, NdArray, ndarray::NdArrayDevice},
    config::Config,
    tensor::backend::AutodiffBackend,
};
use burn_wgpu::{Wgpu, WgpuDevice};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{BeganConfig, DataFormat};
use crate::data::{ImageBatcher, ImageFolderDataset, ImageLoader};
use crate::error::{BeganError, Result};
use crate::trainer::Trainer;

/// Configuration flags. Values start from `--config` (or the defaults) and
/// every flag given on the command line overrides them.
#[derive(clap::Args, Debug, Default)]
pub struct ConfigArgs {
    /// JSON config file to start from.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory with training images.
    #[arg(long)]
    pub data_dir: Option<String>,
    /// Output directory for summaries, samples and checkpoints.
    #[arg(long)]
    pub model_dir: Option<String>,
    /// Checkpoint root to warm start from.
    #[arg(long)]
    pub load_path: Option<String>,

    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub input_scale_size: Option<usize>,
    #[arg(long)]
    pub channels: Option<usize>,
    #[arg(long)]
    pub z_num: Option<usize>,
    #[arg(long)]
    pub conv_hidden_num: Option<usize>,
    #[arg(long, value_enum)]
    pub data_format: Option<DataFormat>,

    #[arg(long)]
    pub g_lr: Option<f64>,
    #[arg(long)]
    pub d_lr: Option<f64>,
    #[arg(long)]
    pub g_r_lr: Option<f64>,
    #[arg(long)]
    pub lr_lower_boundary: Option<f64>,
    #[arg(long)]
    pub gamma: Option<f64>,
    #[arg(long)]
    pub lambda_k: Option<f64>,
    #[arg(long)]
    pub optimizer: Option<String>,

    #[arg(long)]
    pub max_step: Option<usize>,
    #[arg(long)]
    pub log_step: Option<usize>,
    #[arg(long)]
    pub lr_update_step: Option<usize>,
    #[arg(long)]
    pub save_model_secs: Option<u64>,
    #[arg(long)]
    pub interp_fit_epochs: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,

    /// Pretrain the reverse generator against a trained generator.
    #[arg(long)]
    pub reverse: bool,
    /// Run on the CPU backend.
    #[arg(long)]
    pub cpu: bool,
}

macro_rules! override_fields {
    ($config:ident, $args:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $args.$field.clone() {
                $config.$field = value;
            }
        )+
    };
}

impl ConfigArgs {
    pub fn resolve(&self) -> Result<BeganConfig> {
        let mut config = match &self.config {
            Some(path) => BeganConfig::load(path).map_err(|err| {
                BeganError::InvalidConfig(format!("cannot load {}: {err:?}", path.display()))
            })?,
            None => BeganConfig::new(),
        };

        let args = self;
        override_fields!(
            config,
            args,
            data_dir,
            model_dir,
            batch_size,
            input_scale_size,
            channels,
            z_num,
            conv_hidden_num,
            data_format,
            g_lr,
            d_lr,
            g_r_lr,
            lr_lower_boundary,
            gamma,
            lambda_k,
            optimizer,
            max_step,
            log_step,
            lr_update_step,
            save_model_secs,
            interp_fit_epochs,
            seed,
        );
        if self.load_path.is_some() {
            config.load_path = self.load_path.clone();
        }
        if self.reverse {
            config.reverse = true;
        }
        if self.cpu {
            config.use_gpu = false;
        }

        Ok(config)
    }
}

/// Which entry point a run executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Train,
    TrainReverse,
    Test,
}

impl Mode {
    pub fn from_config(config: &BeganConfig) -> Self {
        match (config.is_train, config.reverse) {
            (false, _) => Mode::Test,
            (true, true) => Mode::TrainReverse,
            (true, false) => Mode::Train,
        }
    }
}

/// Installs the global `fmt` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Runs `mode` on the GPU or the CPU backend, as `use_gpu` says.
pub fn run(config: BeganConfig, mode: Mode) -> Result<()> {
    if config.use_gpu {
        run_on::<Autodiff<Wgpu>>(config, WgpuDevice::default(), mode)
    } else {
        run_on::<Autodiff<NdArray>>(config, NdArrayDevice::Cpu, mode)
    }
}

pub fn run_on<B: AutodiffBackend>(config: BeganConfig, device: B::Device, mode: Mode) -> Result<()> {
    config.validate()?;
    info!(?mode, ?device, "starting");

    let model_dir = PathBuf::from(&config.model_dir);
    std::fs::create_dir_all(&model_dir)?;
    config.save(model_dir.join("config.json"))?;

    let dataset = ImageFolderDataset::new(
        Path::new(&config.data_dir),
        config.input_scale_size as u32,
        config.channels,
    )?;
    let batcher = ImageBatcher::new(config.input_scale_size, config.channels, config.data_format);
    let loader = ImageLoader::<B>::new(
        dataset,
        batcher,
        config.batch_size,
        config.seed,
        device.clone(),
    )?;

    let mut trainer = Trainer::new(config, Box::new(loader), device)?;
    match mode {
        Mode::Train | Mode::TrainReverse => {
            let report = if mode == Mode::Train {
                trainer.train()?
            } else {
                trainer.train_reverse()?
            };
            info!(
                step = report.final_state.step,
                k_t = report.final_state.k_t,
                decays = report.decay_steps.len(),
                "training finished"
            );
        }
        Mode::Test => {
            let dir = trainer.test()?;
            info!("test artifacts in {}", dir.display());
        }
    }
    Ok(())
}
