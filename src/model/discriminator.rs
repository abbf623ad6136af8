use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use super::blocks::{Decoder, Encoder};

/// BEGAN discriminator: an autoencoder that scores images by how well it
/// reconstructs them.
///
/// The encoder and decoder halves are exposed separately so callers can
/// move around in the discriminator's own latent space.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    encoder: Encoder<B>,
    decoder: Decoder<B>,
}

impl<B: Backend> Discriminator<B> {
    pub fn new(
        channels: usize,
        z_num: usize,
        repeat_num: usize,
        hidden_num: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            encoder: Encoder::new(channels, hidden_num, z_num, repeat_num, device),
            decoder: Decoder::new(z_num, hidden_num, channels, repeat_num, device),
        }
    }

    /// Returns `(reconstruction, code)` for a normalised NCHW batch.
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 2>) {
        let z = self.encode(x);
        (self.decode(z.clone()), z)
    }

    pub fn encode(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.encoder.forward(x)
    }

    pub fn decode(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        self.decoder.forward(z)
    }
}
