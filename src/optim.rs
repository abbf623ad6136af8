//! Optimizers for the three parameter groups.

use burn::{
    module::AutodiffModule,
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    tensor::{Tensor, backend::AutodiffBackend},
};

use crate::config::BeganConfig;
use crate::model::{BeganNetworks, Discriminator, Generator, ReverseGenerator};
use crate::state::TrainerState;

/// Adam bound to a single module type.
pub type AdamOptimizer<M, B> = OptimizerAdaptor<Adam, M, B>;

/// Gradients of `loss` restricted to the parameters of `module`.
pub fn gradients_for<B, M>(loss: Tensor<B, 1>, module: &M) -> GradientsParams
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    GradientsParams::from_grads(loss.backward(), module)
}

/// One gradient-descent update of `module` on `loss`.
pub fn minimize<B, M, O>(optim: &mut O, lr: f64, module: M, loss: Tensor<B, 1>) -> M
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let grads = gradients_for(loss, &module);
    optim.step(lr, module, grads)
}

/// Gradients for one adversarial step, all taken before any parameter moves.
pub struct StepGradients {
    pub discriminator: GradientsParams,
    pub generator: GradientsParams,
    pub reverse: GradientsParams,
}

/// Adam state for the generator, discriminator and reverse generator.
#[derive(Clone)]
pub struct BeganOptimizers<B: AutodiffBackend> {
    pub generator: AdamOptimizer<Generator<B>, B>,
    pub discriminator: AdamOptimizer<Discriminator<B>, B>,
    pub reverse: AdamOptimizer<ReverseGenerator<B>, B>,
}

impl<B: AutodiffBackend> BeganOptimizers<B> {
    /// Creates one Adam optimizer per network.
    ///
    /// # Arguments
    /// * `config` – supplies `beta1` and `beta2`; learning rates are passed
    ///   per step from [`TrainerState`] so decay never touches the optimizers
    pub fn new(config: &BeganConfig) -> Self {
        let adam = adam_config(config);
        Self {
            generator: adam.init(),
            discriminator: adam.init(),
            reverse: adam.init(),
        }
    }

    /// Fresh Adam state for the reverse generator only.
    pub fn reset_reverse(&mut self, config: &BeganConfig) {
        self.reverse = adam_config(config).init();
    }

    /// Applies the discriminator, generator and reverse generator updates,
    /// each at its own learning rate from `state`.
    pub fn step(
        &mut self,
        networks: BeganNetworks<B>,
        grads: StepGradients,
        state: &TrainerState,
    ) -> BeganNetworks<B> {
        // Each group only sees its own gradients, so the order of the three
        // updates below does not matter.
        let BeganNetworks {
            generator,
            discriminator,
            reverse,
        } = networks;

        BeganNetworks {
            discriminator: self
                .discriminator
                .step(state.d_lr, discriminator, grads.discriminator),
            generator: self.generator.step(state.g_lr, generator, grads.generator),
            reverse: self.reverse.step(state.g_r_lr, reverse, grads.reverse),
        }
    }
}

fn adam_config(config: &BeganConfig) -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(config.beta1)
        .with_beta_2(config.beta2)
        .with_epsilon(1e-8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_ops::tensor_to_vec;
    use crate::model::BeganModelConfig;
    use crate::model::loss::l1;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = Autodiff<NdArray>;

    fn outputs(nets: &BeganNetworks<TestBackend>, z: &Tensor<TestBackend, 2>) -> [Vec<f32>; 3] {
        let generated = nets.generator.forward(z.clone());
        let (recon, _) = nets.discriminator.forward(generated.clone());
        [
            tensor_to_vec(generated.clone()).unwrap(),
            tensor_to_vec(recon).unwrap(),
            tensor_to_vec(nets.reverse.forward(generated)).unwrap(),
        ]
    }

    #[test]
    fn minimize_moves_the_module() {
        let device = Default::default();
        let config = BeganConfig::new();
        let nets = BeganModelConfig::new(4, 4, 3, 1).init::<TestBackend>(&device);
        let mut optims = BeganOptimizers::<TestBackend>::new(&config);

        let z = Tensor::random([2, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let target = Tensor::ones([2, 3, 8, 8], &device);
        let before = tensor_to_vec(nets.generator.forward(z.clone())).unwrap();

        let loss = l1(nets.generator.forward(z.clone()), target);
        let generator = minimize(&mut optims.generator, 1e-2, nets.generator, loss);

        assert_ne!(tensor_to_vec(generator.forward(z)).unwrap(), before);
    }

    #[test]
    fn step_updates_every_group() {
        let device = Default::default();
        let config = BeganConfig::new();
        let state = TrainerState::new(&config);
        let nets = BeganModelConfig::new(4, 4, 3, 1).init::<TestBackend>(&device);
        let mut optims = BeganOptimizers::<TestBackend>::new(&config);

        let z = Tensor::random([2, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let before = outputs(&nets, &z);

        let fake = nets.generator.forward(z.clone()).detach();
        let (recon, _) = nets.discriminator.forward(fake.clone());
        let grads = StepGradients {
            discriminator: gradients_for(l1(recon, fake.clone()), &nets.discriminator),
            generator: gradients_for(
                l1(nets.generator.forward(z.clone()), Tensor::ones([2, 3, 8, 8], &device)),
                &nets.generator,
            ),
            reverse: gradients_for(l1(nets.reverse.forward(fake), z.clone()), &nets.reverse),
        };
        let nets = optims.step(nets, grads, &state);
        let after = outputs(&nets, &z);

        for (b, a) in before.iter().zip(&after) {
            assert_ne!(b, a);
        }
    }
}
