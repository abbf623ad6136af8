use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use super::blocks::Encoder;

/// Reverse generator: maps a generated image back to the latent code that
/// produced it.
#[derive(Module, Debug)]
pub struct ReverseGenerator<B: Backend> {
    encoder: Encoder<B>,
}

impl<B: Backend> ReverseGenerator<B> {
    pub fn new(
        channels: usize,
        z_num: usize,
        repeat_num: usize,
        hidden_num: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            encoder: Encoder::new(channels, hidden_num, z_num, repeat_num, device),
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.encoder.forward(images)
    }
}
