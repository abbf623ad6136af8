//! BEGAN image generation with a reverse generator for cycle consistency.
//!
//! The [`trainer::Trainer`] owns a generator, an autoencoding discriminator
//! and a reverse generator, three Adam optimizers and the scalar training
//! state (`k_t`, learning rates, step), and drives the adversarial loop,
//! the reverse pretraining loop and the sampling passes.

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod image_ops;
pub mod model;
pub mod optim;
pub mod state;
pub mod summary;
pub mod trainer;

pub use config::{BeganConfig, DataFormat};
pub use error::{BeganError, Result};
pub use model::{BeganModelConfig, BeganNetworks};
pub use state::TrainerState;
pub use trainer::{GeneratorPath, Trainer, TrainingReport};
