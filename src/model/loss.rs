use burn::tensor::{Tensor, backend::Backend};

use super::Discriminator;

/// Mean absolute difference between two tensors.
///
/// # Arguments
/// * `a`, `b` – tensors of identical shape
///
/// # Returns
/// A `[1]` tensor holding `mean|a - b|`.
pub fn l1<B: Backend, const D: usize>(a: Tensor<B, D>, b: Tensor<B, D>) -> Tensor<B, 1> {
    (a - b).abs().mean()
}

/// Transposes height and width, then flips the height axis.
///
/// For square NCHW images this is a 90 degree rotation; the cycle loss
/// compares the generator output against the rotated re-generation to probe
/// orientation symmetry.
pub fn flip_transpose<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    images.swap_dims(2, 3).flip([2])
}

/// Reconstruction losses of the discriminator on one fake and one real batch.
pub struct ReconstructionLosses<B: Backend> {
    /// `mean|AE(x) - x|`
    pub d_loss_real: Tensor<B, 1>,
    /// `mean|AE(G) - G|`
    pub d_loss_fake: Tensor<B, 1>,
    /// Reconstruction of the fake batch.
    pub ae_fake: Tensor<B, 4>,
    /// Reconstruction of the real batch.
    pub ae_real: Tensor<B, 4>,
}

/// Runs the fake and real batches through the discriminator in one pass and
/// splits the reconstructions back apart.
///
/// Both batches must be normalised NCHW tensors of the same shape.
pub fn reconstruction_losses<B: Backend>(
    discriminator: &Discriminator<B>,
    fake: Tensor<B, 4>,
    real: Tensor<B, 4>,
) -> ReconstructionLosses<B> {
    let [batch, ..] = fake.dims();
    let (d_out, _) = discriminator.forward(Tensor::cat(vec![fake.clone(), real.clone()], 0));

    let ae_fake = d_out.clone().narrow(0, 0, batch);
    let ae_real = d_out.narrow(0, batch, batch);

    ReconstructionLosses {
        d_loss_real: l1(ae_real.clone(), real),
        d_loss_fake: l1(ae_fake.clone(), fake),
        ae_fake,
        ae_real,
    }
}

/// Discriminator objective `L(x) - k_t * L(G(z))`.
///
/// # Arguments
/// * `d_loss_real` – reconstruction loss on real images, `L(x)`
/// * `d_loss_fake` – reconstruction loss on detached fakes, `L(G(z))`
/// * `k_t` – current equilibrium coefficient
pub fn discriminator_loss<B: Backend>(
    d_loss_real: Tensor<B, 1>,
    d_loss_fake: Tensor<B, 1>,
    k_t: f64,
) -> Tensor<B, 1> {
    d_loss_real - d_loss_fake.mul_scalar(k_t)
}

/// `mean|G - flip_transpose(G2)|`, where `G2` is the reverse-then-forward
/// re-generation of `G`.
pub fn cycle_loss<B: Backend>(generated: Tensor<B, 4>, cycled: Tensor<B, 4>) -> Tensor<B, 1> {
    l1(generated, flip_transpose(cycled))
}

/// Reverse generator losses against the latent codes that produced the images.
///
/// Returns `(mean((z_rec - z)^2) / 2, mean|z_rec - z|)`. Only the L1 term is
/// optimised; the squared term is reported.
pub fn reverse_losses<B: Backend>(
    reconstructed: Tensor<B, 2>,
    z: Tensor<B, 2>,
) -> (Tensor<B, 1>, Tensor<B, 1>) {
    let diff = reconstructed - z;
    let l2 = diff.clone().powf_scalar(2.0).mean().div_scalar(2.0);
    let l1 = diff.abs().mean();
    (l2, l1)
}
