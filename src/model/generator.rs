use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use super::blocks::Decoder;

/// Forward generator: latent `[N, z_num]` → normalised image `[N, C, H, W]`.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    decoder: Decoder<B>,
}

impl<B: Backend> Generator<B> {
    pub fn new(
        z_num: usize,
        hidden_num: usize,
        channels: usize,
        repeat_num: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            decoder: Decoder::new(z_num, hidden_num, channels, repeat_num, device),
        }
    }

    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        self.decoder.forward(z)
    }
}
