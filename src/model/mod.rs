//! BEGAN networks: forward generator, autoencoding discriminator and the
//! reverse generator used for cycle consistency.

pub mod blocks;
pub mod discriminator;
pub mod generator;
pub mod loss;
pub mod reverse;

use burn::{
    config::Config,
    module::Module,
    tensor::{Tensor, backend::Backend},
};

pub use discriminator::Discriminator;
pub use generator::Generator;
pub use reverse::ReverseGenerator;

use crate::config::BeganConfig;

/// Architecture settings shared by all three networks.
#[derive(Config, Debug)]
pub struct BeganModelConfig {
    pub z_num: usize,
    pub hidden_num: usize,
    pub channels: usize,
    /// `floor(log2(height)) - 2`
    pub repeat_num: usize,
}

impl BeganModelConfig {
    pub fn init_generator<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        Generator::new(
            self.z_num,
            self.hidden_num,
            self.channels,
            self.repeat_num,
            device,
        )
    }

    pub fn init_discriminator<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        Discriminator::new(
            self.channels,
            self.z_num,
            self.repeat_num,
            self.hidden_num,
            device,
        )
    }

    pub fn init_reverse<B: Backend>(&self, device: &B::Device) -> ReverseGenerator<B> {
        ReverseGenerator::new(
            self.channels,
            self.z_num,
            self.repeat_num,
            self.hidden_num,
            device,
        )
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BeganNetworks<B> {
        BeganNetworks {
            generator: self.init_generator(device),
            discriminator: self.init_discriminator(device),
            reverse: self.init_reverse(device),
        }
    }
}

impl BeganConfig {
    pub fn model_config(&self) -> BeganModelConfig {
        BeganModelConfig::new(
            self.z_num,
            self.conv_hidden_num,
            self.channels,
            self.repeat_num(),
        )
    }
}

/// The three trainable networks. Each field is its own parameter group and
/// gets its own optimizer.
#[derive(Module, Debug)]
pub struct BeganNetworks<B: Backend> {
    pub generator: Generator<B>,
    pub discriminator: Discriminator<B>,
    pub reverse: ReverseGenerator<B>,
}

impl<B: Backend> BeganNetworks<B> {
    /// `G2 = G(R(G(z)))`: the reverse-then-forward re-generation of `G(z)`.
    pub fn cycle(&self, generated: Tensor<B, 4>) -> Tensor<B, 4> {
        self.generator.forward(self.reverse.forward(generated))
    }
}
