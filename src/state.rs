//! Scalar training state and the pure update rules applied to it.
//!
//! The trainer computes new values with the functions here and commits
//! them in one place, after all three optimizer updates of a step.

use serde::{Deserialize, Serialize};

use crate::config::BeganConfig;

/// Step counter, learning rates and the equilibrium coefficient.
///
/// Persisted as `state.json` alongside every checkpoint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrainerState {
    pub step: usize,
    pub g_lr: f64,
    pub d_lr: f64,
    pub g_r_lr: f64,
    /// Weight of the fake reconstruction loss in the discriminator loss,
    /// always in `[0, 1]`.
    pub k_t: f64,
}

impl TrainerState {
    /// Step 0, the configured learning rates and `k_t = 0`.
    pub fn new(config: &BeganConfig) -> Self {
        Self {
            step: 0,
            g_lr: config.g_lr,
            d_lr: config.d_lr,
            g_r_lr: config.g_r_lr,
            k_t: 0.0,
        }
    }

    /// Halves the generator and discriminator learning rates.
    pub fn decay_adversarial(&mut self, lower_bound: f64) {
        self.g_lr = decay_lr(self.g_lr, lower_bound);
        self.d_lr = decay_lr(self.d_lr, lower_bound);
    }

    /// Halves the reverse generator learning rate.
    pub fn decay_reverse(&mut self, lower_bound: f64) {
        self.g_r_lr = decay_lr(self.g_r_lr, lower_bound);
    }

    /// Adopts the clipped `k_t` of a finished step.
    pub fn commit_balance(&mut self, update: &BalanceUpdate) {
        self.k_t = update.k_t;
    }
}

/// `max(lr * 0.5, lower_bound)`
pub fn decay_lr(lr: f64, lower_bound: f64) -> f64 {
    (lr * 0.5).max(lower_bound)
}

/// Result of one proportional-control step on `k_t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BalanceUpdate {
    /// `gamma * d_loss_real - g_loss`
    pub balance: f64,
    /// Convergence measure `d_loss_real + |balance|`.
    pub measure: f64,
    /// New coefficient, clipped into `[0, 1]`.
    pub k_t: f64,
}

impl BalanceUpdate {
    /// One proportional-control step of the equilibrium coefficient.
    ///
    /// # Arguments
    /// * `k_t` – coefficient used by the step that produced the losses
    /// * `gamma` – target ratio `L(G(z)) / L(x)`
    /// * `d_loss_real` – discriminator reconstruction loss on real images
    /// * `g_loss` – generator loss `L(G(z))`
    /// * `lambda_k` – proportional gain
    ///
    /// # Returns
    /// The balance, the convergence measure and the next `k_t`, clipped
    /// into `[0, 1]`.
    pub fn compute(k_t: f64, gamma: f64, d_loss_real: f64, g_loss: f64, lambda_k: f64) -> Self {
        let balance = gamma * d_loss_real - g_loss;
        Self {
            balance,
            measure: d_loss_real + balance.abs(),
            k_t: (k_t + lambda_k * balance).clamp(0.0, 1.0),
        }
    }
}

/// Which periodic side effects fire on a given step.
#[derive(Clone, Copy, Debug)]
pub struct Schedule {
    log_step: usize,
    sample_step: usize,
    lr_update_step: usize,
    max_step: usize,
}

impl Schedule {
    /// Image grids are written every 40 log intervals.
    pub const SAMPLE_EVERY_LOGS: usize = 40;

    /// # Arguments
    /// * `log_step` – interval of summaries; sampling runs every
    ///   [`Self::SAMPLE_EVERY_LOGS`] of them
    /// * `lr_update_step` – length of one learning-rate window
    /// * `max_step` – exclusive end of the run
    pub fn new(log_step: usize, lr_update_step: usize, max_step: usize) -> Self {
        Self {
            log_step,
            sample_step: log_step * Self::SAMPLE_EVERY_LOGS,
            lr_update_step,
            max_step,
        }
    }

    pub fn from_config(config: &BeganConfig) -> Self {
        Self::new(config.log_step, config.lr_update_step, config.max_step)
    }

    /// Scalars and the progress line are written every `log_step` steps.
    pub fn should_log(&self, step: usize) -> bool {
        step % self.log_step == 0
    }

    /// Samples from an untrained step 0 model carry no information and are skipped.
    pub fn should_sample(&self, step: usize) -> bool {
        step > 0 && step % self.sample_step == 0
    }

    /// Last step of each `lr_update_step` window, except the final step of
    /// the run where the new rate would never be used.
    pub fn should_decay(&self, step: usize) -> bool {
        step % self.lr_update_step == self.lr_update_step - 1 && step + 1 < self.max_step
    }
}
