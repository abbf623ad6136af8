use std::path::PathBuf;

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::error::BeganError;

/// Memory layout of image batches handed to and returned from the trainer.
///
/// The networks always run channels-first; this only controls what the
/// data source yields.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DataFormat {
    #[serde(rename = "NCHW")]
    #[value(name = "NCHW")]
    Nchw,
    #[serde(rename = "NHWC")]
    #[value(name = "NHWC")]
    Nhwc,
}

/// Hyperparameters and run settings for a BEGAN training run.
///
/// Created once at process start and read-only afterwards. Saved next to
/// the checkpoints as `config.json` so a run can be resumed or sampled
/// with the exact same architecture.
#[derive(Config, Debug)]
pub struct BeganConfig {
    /// Generator learning rate.
    #[config(default = 8e-5)]
    pub g_lr: f64,
    /// Discriminator learning rate.
    #[config(default = 8e-5)]
    pub d_lr: f64,
    /// Reverse generator learning rate.
    #[config(default = 8e-5)]
    pub g_r_lr: f64,
    /// Floor for every learning-rate decay.
    #[config(default = 2e-5)]
    pub lr_lower_boundary: f64,
    /// Diversity ratio between fake and real reconstruction losses.
    #[config(default = 0.7)]
    pub gamma: f64,
    /// Proportional gain for the `k_t` update.
    #[config(default = 0.001)]
    pub lambda_k: f64,
    /// Adam first-moment decay.
    #[config(default = 0.5)]
    pub beta1: f32,
    #[config(default = 0.999)]
    pub beta2: f32,
    /// Optimizer name. Only `adam` is accepted.
    #[config(default = "String::from(\"adam\")")]
    pub optimizer: String,

    #[config(default = 16)]
    pub batch_size: usize,
    /// Latent dimension.
    #[config(default = 64)]
    pub z_num: usize,
    /// Base channel width of every convolution stack.
    #[config(default = 128)]
    pub conv_hidden_num: usize,
    /// Side length of the square training images.
    #[config(default = 64)]
    pub input_scale_size: usize,
    /// Image channels (1 for grayscale, 3 for RGB).
    #[config(default = 3)]
    pub channels: usize,
    #[config(default = "DataFormat::Nchw")]
    pub data_format: DataFormat,

    /// Steps between scalar summaries. Images are sampled every 40 logs.
    #[config(default = 50)]
    pub log_step: usize,
    #[config(default = 500000)]
    pub max_step: usize,
    /// Kept for config compatibility; checkpoints follow `save_model_secs`.
    #[config(default = 5000)]
    pub save_step: usize,
    /// Wall-clock interval between checkpoints.
    #[config(default = 300)]
    pub save_model_secs: u64,
    /// Learning rates are halved at the end of every window of this length.
    #[config(default = 100000)]
    pub lr_update_step: usize,
    /// Inner Adam iterations used to fit latents to real images before
    /// generator interpolation.
    #[config(default = 0)]
    pub interp_fit_epochs: usize,
    /// Seeds latent sampling and data shuffling.
    #[config(default = 123)]
    pub seed: u64,

    #[config(default = true)]
    pub use_gpu: bool,
    /// Run the reverse generator pretraining loop instead of the main loop.
    #[config(default = false)]
    pub reverse: bool,
    #[config(default = true)]
    pub is_train: bool,

    /// Output directory for summaries, samples and checkpoints.
    #[config(default = "String::from(\"logs\")")]
    pub model_dir: String,
    /// Checkpoint root to warm start from. Falls back to `model_dir`.
    pub load_path: Option<String>,
    /// Directory with training images.
    #[config(default = "String::from(\"data\")")]
    pub data_dir: String,
}

impl BeganConfig {
    /// Checks the settings the trainer relies on before anything is built.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.optimizer != "adam" {
            return Err(BeganError::UnsupportedOptimizer(self.optimizer.clone()));
        }

        for (name, value) in [
            ("batch_size", self.batch_size),
            ("z_num", self.z_num),
            ("conv_hidden_num", self.conv_hidden_num),
            ("channels", self.channels),
            ("log_step", self.log_step),
            ("lr_update_step", self.lr_update_step),
        ] {
            if value == 0 {
                return Err(BeganError::InvalidConfig(format!("{name} must be positive")));
            }
        }

        if self.input_scale_size < 8 || !self.input_scale_size.is_power_of_two() {
            return Err(BeganError::InvalidConfig(format!(
                "input_scale_size must be a power of two of at least 8, got {}",
                self.input_scale_size
            )));
        }

        for (name, lr) in [("g_lr", self.g_lr), ("d_lr", self.d_lr), ("g_r_lr", self.g_r_lr)] {
            if lr < self.lr_lower_boundary {
                return Err(BeganError::InvalidConfig(format!(
                    "{name} ({lr}) is below lr_lower_boundary ({})",
                    self.lr_lower_boundary
                )));
            }
        }

        Ok(())
    }

    /// Number of up/down-sampling blocks for the configured image size.
    pub fn repeat_num(&self) -> usize {
        repeat_num(self.input_scale_size)
    }

    /// Root directory checkpoints are restored from.
    pub fn restore_dir(&self) -> PathBuf {
        PathBuf::from(self.load_path.as_deref().unwrap_or(&self.model_dir))
    }
}

/// `floor(log2(height)) - 2`, i.e. the number of 2x steps from the 8x8 base.
pub fn repeat_num(height: usize) -> usize {
    (height.max(8).ilog2() as usize) - 2
}
