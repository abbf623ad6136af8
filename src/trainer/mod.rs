//! Training loop controller.

mod sampling;

pub use sampling::{
    GeneratorPath, SWEEP_STEPS, autoencode, decode, encode, fit_latents, generate, interpolate_d,
    interpolate_live_g, latent_tensor, save_reconstructions, sweep_grid,
};

use std::path::{Path, PathBuf};

use burn::{
    module::{AutodiffModule, Module},
    tensor::{ElementConversion, Tensor, backend::AutodiffBackend, backend::Backend},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info, info_span};

use crate::checkpoint::{self, Checkpointer, RestoreScope};
use crate::config::{BeganConfig, DataFormat};
use crate::data::BatchSource;
use crate::error::Result;
use crate::image_ops::{denorm_img, norm_img, save_image, to_network_layout, to_nhwc};
use crate::model::BeganNetworks;
use crate::model::loss::{cycle_loss, discriminator_loss, l1, reconstruction_losses, reverse_losses};
use crate::optim::{BeganOptimizers, StepGradients, gradients_for, minimize};
use crate::state::{BalanceUpdate, Schedule, TrainerState};
use crate::summary::SummaryWriter;

/// What a finished loop did, step by step.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub logged_steps: Vec<usize>,
    pub decay_steps: Vec<usize>,
    pub sample_steps: Vec<usize>,
    pub final_state: TrainerState,
}

struct StepImages<B: Backend> {
    generated: Tensor<B, 4>,
    cycled: Tensor<B, 4>,
    ae_fake: Tensor<B, 4>,
    ae_real: Tensor<B, 4>,
}

struct StepOutcome<B: Backend> {
    d_loss: f64,
    d_loss_real: f64,
    d_loss_fake: f64,
    g_loss: f64,
    g_rr_loss: f64,
    balance: BalanceUpdate,
    images: Option<StepImages<B>>,
}

/// Owns the networks, their optimizers and the scalar training state, and
/// drives the adversarial and reverse pretraining loops.
pub struct Trainer<B: AutodiffBackend> {
    config: BeganConfig,
    device: B::Device,
    source: Box<dyn BatchSource<B>>,
    networks: BeganNetworks<B>,
    optimizers: BeganOptimizers<B>,
    state: TrainerState,
    schedule: Schedule,
    summary: SummaryWriter,
    checkpointer: Checkpointer,
    rng: StdRng,
    model_dir: PathBuf,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Validates `config`, builds the networks and optimizers and restores
    /// the latest checkpoint under `load_path` (or `model_dir`) if present.
    ///
    /// With `reverse` set only the adversarial half is restored; the reverse
    /// generator starts fresh.
    pub fn new(
        config: BeganConfig,
        source: Box<dyn BatchSource<B>>,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;

        let model_dir = PathBuf::from(&config.model_dir);
        let mut networks = config.model_config().init::<B>(&device);
        let mut optimizers = BeganOptimizers::new(&config);
        let mut state = TrainerState::new(&config);

        let scope = if config.reverse {
            RestoreScope::Adversarial
        } else {
            RestoreScope::All
        };
        let restored = checkpoint::load_checkpoint(
            &config.restore_dir(),
            scope,
            &device,
            &mut networks,
            &mut optimizers,
            &mut state,
        )?;
        if !restored {
            info!("no checkpoint found, starting from scratch");
        }

        let summary = SummaryWriter::new(&model_dir)?;
        info!(
            repeat_num = config.repeat_num(),
            params = networks.num_params(),
            start_step = state.step,
            "trainer ready"
        );

        Ok(Self {
            schedule: Schedule::from_config(&config),
            checkpointer: Checkpointer::from_config(&config),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            device,
            source,
            networks,
            optimizers,
            state,
            summary,
            model_dir,
        })
    }

    pub fn config(&self) -> &BeganConfig {
        &self.config
    }

    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    pub fn networks(&self) -> &BeganNetworks<B> {
        &self.networks
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Runs the adversarial loop from the current step to `max_step`.
    pub fn train(&mut self) -> Result<TrainingReport> {
        let _span = info_span!("train", max_step = self.config.max_step).entered();

        let z_fixed = self.random_latents(self.config.batch_size);
        let x_fixed = self.get_image_from_loader();
        save_image(x_fixed.clone(), &self.model_dir.join("x_fixed.png"), 8)?;

        let mut logged_steps = Vec::new();
        let mut decay_steps = Vec::new();
        let mut sample_steps = Vec::new();

        for step in self.state.step..self.config.max_step {
            let log = self.schedule.should_log(step);
            let outcome = self.train_step(log)?;
            self.state.step = step + 1;

            if log {
                self.write_summary(step, outcome)?;
                logged_steps.push(step);
            }

            if self.schedule.should_sample(step) {
                self.sample_progress(step, &z_fixed, x_fixed.clone())?;
                sample_steps.push(step);
            }

            if self.schedule.should_decay(step) {
                self.state.decay_adversarial(self.config.lr_lower_boundary);
                decay_steps.push(step);
                info!(step, g_lr = self.state.g_lr, d_lr = self.state.d_lr, "learning rates decayed");
            }

            self.poll_checkpoint()?;
        }

        self.save_checkpoint()?;
        Ok(TrainingReport {
            logged_steps,
            decay_steps,
            sample_steps,
            final_state: self.state.clone(),
        })
    }

    /// Trains only the reverse generator to recover `z` from `G(z)`, over
    /// `0..max_step` independently of the adversarial step counter.
    pub fn train_reverse(&mut self) -> Result<TrainingReport> {
        let _span = info_span!("train_reverse", max_step = self.config.max_step).entered();

        let mut logged_steps = Vec::new();
        let mut decay_steps = Vec::new();

        for step in 0..self.config.max_step {
            let z = self.latents(self.config.batch_size);
            let generated = self.networks.generator.forward(z.clone()).detach();
            let (l2_loss, l1_loss) = reverse_losses(self.networks.reverse.forward(generated), z);
            let g_r_loss = scalar(l2_loss);
            let g_r_lossl1 = scalar(l1_loss.clone());

            let reverse = self.networks.reverse.clone();
            self.networks.reverse =
                minimize(&mut self.optimizers.reverse, self.state.g_r_lr, reverse, l1_loss);

            if self.schedule.should_log(step) {
                self.summary.add_scalars(
                    step,
                    &[
                        ("loss/g_r_loss", g_r_loss),
                        ("loss/g_r_lossl1", g_r_lossl1),
                        ("misc/g_r_lr", self.state.g_r_lr),
                    ],
                )?;
                self.summary.flush()?;
                info!(
                    "[{}/{}] Loss_G_r: {:.6} Loss_G_r_l1 {:.6}",
                    step, self.config.max_step, g_r_loss, g_r_lossl1
                );
                logged_steps.push(step);
            }

            if self.schedule.should_decay(step) {
                self.state.decay_reverse(self.config.lr_lower_boundary);
                decay_steps.push(step);
                info!(step, g_r_lr = self.state.g_r_lr, "reverse learning rate decayed");
            }

            self.poll_checkpoint()?;
        }

        self.save_checkpoint()?;
        Ok(TrainingReport {
            logged_steps,
            decay_steps,
            sample_steps: Vec::new(),
            final_state: self.state.clone(),
        })
    }

    /// One simultaneous update of all three networks followed by the `k_t`
    /// commit. Every gradient is taken against the parameters as they were
    /// at the start of the step.
    fn train_step(&mut self, capture: bool) -> Result<StepOutcome<B::InnerBackend>> {
        let x = norm_img(to_network_layout(
            self.source.next_batch(),
            self.config.data_format,
        ));
        let [batch, ..] = x.dims();
        let z = self.latents(batch);

        let generated = self.networks.generator.forward(z);
        let fixed = generated.clone().detach();

        // 1. Discriminator: reconstruct detached fakes and the real batch
        let recon = reconstruction_losses(&self.networks.discriminator, fixed.clone(), x);
        let d_loss = discriminator_loss(
            recon.d_loss_real.clone(),
            recon.d_loss_fake.clone(),
            self.state.k_t,
        );
        let d_loss_value = scalar(d_loss.clone());
        let d_loss_real = scalar(recon.d_loss_real);
        let d_loss_fake = scalar(recon.d_loss_fake);
        let d_grads = gradients_for(d_loss, &self.networks.discriminator);

        // 2. Generator: gradient flows through D into G, only G's part is kept
        let (ae_generated, _) = self.networks.discriminator.forward(generated.clone());
        let g_loss = l1(ae_generated, generated);
        let g_loss_value = scalar(g_loss.clone());
        let g_grads = gradients_for(g_loss, &self.networks.generator);

        // 3. Reverse generator: cycle loss on the detached fakes
        let cycled = self.networks.cycle(fixed.clone());
        let g_rr_loss = cycle_loss(fixed.clone(), cycled.clone());
        let g_rr_loss_value = scalar(g_rr_loss.clone());
        let r_grads = gradients_for(g_rr_loss, &self.networks.reverse);

        let images = capture.then(|| StepImages {
            generated: fixed.inner(),
            cycled: cycled.inner(),
            ae_fake: recon.ae_fake.inner(),
            ae_real: recon.ae_real.inner(),
        });

        // 4. Apply all three updates, then commit k_t
        let networks = self.networks.clone();
        self.networks = self.optimizers.step(
            networks,
            StepGradients {
                discriminator: d_grads,
                generator: g_grads,
                reverse: r_grads,
            },
            &self.state,
        );

        let balance = BalanceUpdate::compute(
            self.state.k_t,
            self.config.gamma,
            d_loss_real,
            g_loss_value,
            self.config.lambda_k,
        );
        self.state.commit_balance(&balance);

        Ok(StepOutcome {
            d_loss: d_loss_value,
            d_loss_real,
            d_loss_fake,
            g_loss: g_loss_value,
            g_rr_loss: g_rr_loss_value,
            balance,
            images,
        })
    }

    fn write_summary(&mut self, step: usize, outcome: StepOutcome<B::InnerBackend>) -> Result<()> {
        let state = &self.state;
        self.summary.add_scalars(
            step,
            &[
                ("loss/d_loss", outcome.d_loss),
                ("loss/d_loss_real", outcome.d_loss_real),
                ("loss/d_loss_fake", outcome.d_loss_fake),
                ("loss/g_loss", outcome.g_loss),
                ("loss/g_rr_loss", outcome.g_rr_loss),
                ("misc/measure", outcome.balance.measure),
                ("misc/k_t", state.k_t),
                ("misc/d_lr", state.d_lr),
                ("misc/g_lr", state.g_lr),
                ("misc/g_r_lr", state.g_r_lr),
                ("misc/balance", outcome.balance.balance),
            ],
        )?;

        if let Some(images) = outcome.images {
            for (tag, tensor) in [
                ("G", images.generated),
                ("G2", images.cycled),
                ("AE_G", images.ae_fake),
                ("AE_x", images.ae_real),
            ] {
                self.summary
                    .add_images(step, tag, denorm_img(tensor, DataFormat::Nchw))?;
            }
        }
        self.summary.flush()?;

        info!(
            "[{}/{}] Loss_D: {:.6} Loss_G: {:.6} Loss_G_r: {:.6} measure: {:.4}, k_t: {:.4}",
            step,
            self.config.max_step,
            outcome.d_loss,
            outcome.g_loss,
            outcome.g_rr_loss,
            outcome.balance.measure,
            self.state.k_t
        );
        Ok(())
    }

    fn poll_checkpoint(&mut self) -> Result<()> {
        if self.checkpointer.is_due() {
            self.save_checkpoint()?;
        }
        Ok(())
    }

    /// Writes a checkpoint to `model_dir` now.
    pub fn save_checkpoint(&mut self) -> Result<()> {
        checkpoint::save_checkpoint(
            &self.model_dir,
            &self.networks,
            &self.optimizers,
            &self.state,
        )?;
        self.checkpointer.mark_saved();
        debug!(step = self.state.step, "checkpoint saved");
        Ok(())
    }

    /// Uniform `[-1, 1)` latent rows from the trainer's seeded generator.
    fn random_latents(&mut self, n: usize) -> Vec<Vec<f32>> {
        let z_num = self.config.z_num;
        (0..n)
            .map(|_| (0..z_num).map(|_| self.rng.gen_range(-1.0f32..1.0)).collect())
            .collect()
    }

    fn latents(&mut self, n: usize) -> Tensor<B, 2> {
        let values = self.random_latents(n).concat();
        latent_tensor(values, self.config.z_num, &self.device)
    }

    /// Next real batch as NHWC `[0, 255]` pixels.
    pub fn get_image_from_loader(&mut self) -> Tensor<B::InnerBackend, 4> {
        to_nhwc(self.source.next_batch().inner(), self.config.data_format)
    }

    /// Generator samples from the current parameters as NHWC `[0, 255]`.
    pub fn generate(&self, path: GeneratorPath, z: Tensor<B::InnerBackend, 2>) -> Tensor<B::InnerBackend, 4> {
        generate(&self.networks.valid(), path, z)
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}
