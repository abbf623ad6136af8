//! Visualisation passes: sample grids, reconstructions and latent sweeps.
//!
//! Everything here runs on a non-differentiable copy of the networks and
//! takes or returns NHWC batches of `[0, 255]` pixels, except
//! [`fit_latents`] which needs gradients through the generator.

use std::path::{Path, PathBuf};

use burn::{
    module::{AutodiffModule, Module, Param},
    optim::AdamConfig,
    tensor::{Tensor, TensorData, backend::AutodiffBackend, backend::Backend},
};
use tracing::{debug, info, info_span, warn};

use super::Trainer;
use crate::config::DataFormat;
use crate::error::Result;
use crate::image_ops::{
    denorm_img, latent_rows, linspace, norm_img, save_image, slerp_rows, to_nchw,
};
use crate::model::loss::l1;
use crate::model::{BeganNetworks, Generator};
use crate::optim::minimize;

/// Frames per interpolation sweep.
pub const SWEEP_STEPS: usize = 10;
/// Latent batches concatenated into one progress grid.
const PROGRESS_BATCHES: usize = 6;
const TEST_ROUNDS: usize = 3;
const LATENT_FIT_LR: f64 = 1e-4;

/// Which generator output to render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorPath {
    /// `G(z)`
    Forward,
    /// `G(R(G(z)))`
    Cycled,
}

/// Builds a `[N, z_num]` latent batch from row-major host values.
pub fn latent_tensor<B: Backend>(values: Vec<f32>, z_num: usize, device: &B::Device) -> Tensor<B, 2> {
    let n = values.len() / z_num.max(1);
    Tensor::from_data(TensorData::new(values, [n, z_num]), device)
}

pub fn generate<B: Backend>(
    networks: &BeganNetworks<B>,
    path: GeneratorPath,
    z: Tensor<B, 2>,
) -> Tensor<B, 4> {
    let generated = networks.generator.forward(z);
    let images = match path {
        GeneratorPath::Forward => generated,
        GeneratorPath::Cycled => networks.cycle(generated),
    };
    denorm_img(images, DataFormat::Nchw)
}

/// Discriminator reconstruction of an image batch.
pub fn autoencode<B: Backend>(networks: &BeganNetworks<B>, images: Tensor<B, 4>) -> Tensor<B, 4> {
    let (recon, _) = networks
        .discriminator
        .forward(norm_img(to_nchw(images)));
    denorm_img(recon, DataFormat::Nchw)
}

pub fn encode<B: Backend>(networks: &BeganNetworks<B>, images: Tensor<B, 4>) -> Tensor<B, 2> {
    networks
        .discriminator
        .encode(norm_img(to_nchw(images)))
}

pub fn decode<B: Backend>(networks: &BeganNetworks<B>, z: Tensor<B, 2>) -> Tensor<B, 4> {
    denorm_img(networks.discriminator.decode(z), DataFormat::Nchw)
}

/// Lays out per-ratio frames `[N, H, W, C]` as `N` consecutive sweeps.
pub fn sweep_grid<B: Backend>(frames: Vec<Tensor<B, 4>>) -> Tensor<B, 4> {
    let stacked = Tensor::<B, 4>::stack::<5>(frames, 1);
    let [n, steps, h, w, c] = stacked.dims();
    stacked.reshape([n * steps, h, w, c])
}

/// Renders `render(slerp(ratio, low, high))` for every sweep ratio.
fn sweep<B, F>(low: &[Vec<f32>], high: &[Vec<f32>], device: &B::Device, render: F) -> Tensor<B, 4>
where
    B: Backend,
    F: Fn(Tensor<B, 2>) -> Tensor<B, 4>,
{
    let z_num = low.first().map_or(0, Vec::len);
    let frames = linspace(0.0, 1.0, SWEEP_STEPS)
        .into_iter()
        .map(|ratio| render(latent_tensor(slerp_rows(ratio, low, high), z_num, device)))
        .collect();
    sweep_grid(frames)
}

/// Saves the discriminator reconstructions of `real` (and `fake`, when
/// given) as `{prefix}_D_real.png` / `{prefix}_D_fake.png`.
pub fn save_reconstructions<B: Backend>(
    networks: &BeganNetworks<B>,
    real: Tensor<B, 4>,
    fake: Option<Tensor<B, 4>>,
    dir: &Path,
    prefix: &str,
) -> Result<()> {
    for (key, images) in [("real", Some(real)), ("fake", fake)] {
        let Some(images) = images else { continue };
        let path = dir.join(format!("{prefix}_D_{key}.png"));
        save_image(autoencode(networks, images), &path, 8)?;
        info!("samples saved: {}", path.display());
    }
    Ok(())
}

/// Generator sweep from `z_fixed` to `z_flex`, one row per latent pair.
pub fn interpolate_live_g<B: Backend>(
    networks: &BeganNetworks<B>,
    z_fixed: &[Vec<f32>],
    z_flex: &[Vec<f32>],
    device: &B::Device,
    dir: &Path,
    idx: usize,
) -> Result<()> {
    let grid = sweep(z_fixed, z_flex, device, |z| {
        generate(networks, GeneratorPath::Forward, z)
    });
    save_image(grid, &dir.join(format!("test{idx}_interp_G.png")), SWEEP_STEPS)
}

/// Discriminator-space sweep between two real batches. Each row is saved
/// with its two endpoint images on either side.
pub fn interpolate_d<B: Backend>(
    networks: &BeganNetworks<B>,
    real1: Tensor<B, 4>,
    real2: Tensor<B, 4>,
    step: usize,
    dir: &Path,
) -> Result<()> {
    let device = real1.device();
    let z1 = latent_rows(encode(networks, real1.clone()))?;
    let z2 = latent_rows(encode(networks, real2.clone()))?;
    let pairs = z1.len().min(z2.len());

    let grid = sweep(&z1[..pairs], &z2[..pairs], &device, |z| decode(networks, z));
    for idx in 0..pairs {
        let row = Tensor::cat(
            vec![
                real1.clone().narrow(0, idx, 1),
                grid.clone().narrow(0, idx * SWEEP_STEPS, SWEEP_STEPS),
                real2.clone().narrow(0, idx, 1),
            ],
            0,
        );
        let path = dir.join(format!("test{step}_interp_D_{idx}.png"));
        save_image(row, &path, SWEEP_STEPS + 2)?;
    }
    Ok(())
}

#[derive(Module, Debug)]
struct LatentCode<B: Backend> {
    z: Param<Tensor<B, 2>>,
}

/// Fits latent codes so that `G(z)` reproduces `target` (normalised NCHW),
/// starting from `init`. Only the codes move; the generator is left alone.
pub fn fit_latents<B: AutodiffBackend>(
    generator: &Generator<B>,
    init: Tensor<B, 2>,
    target: Tensor<B, 4>,
    epochs: usize,
) -> Tensor<B::InnerBackend, 2> {
    let mut code = LatentCode {
        z: Param::from_tensor(init),
    };
    let mut optim = AdamConfig::new().init::<B, LatentCode<B>>();

    for epoch in 0..epochs {
        let loss = l1(target.clone(), generator.forward(code.z.val()));
        if epoch % 100 == 0 {
            debug!(epoch, loss = %loss.clone().into_data(), "latent fit");
        }
        code = minimize(&mut optim, LATENT_FIT_LR, code, loss);
    }

    code.valid().z.val()
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Progress artifacts written every `log_step * 40` steps into `model_dir`.
    pub(super) fn sample_progress(
        &mut self,
        step: usize,
        z_fixed: &[Vec<f32>],
        x_fixed: Tensor<B::InnerBackend, 4>,
    ) -> Result<()> {
        let _span = info_span!("sample", step).entered();
        let networks = self.networks.valid();
        let z_num = self.config.z_num;

        let mut forward = Vec::with_capacity(PROGRESS_BATCHES);
        let mut cycled = Vec::with_capacity(PROGRESS_BATCHES);
        let mut rows = z_fixed.to_vec();
        for _ in 0..PROGRESS_BATCHES {
            let z = latent_tensor::<B::InnerBackend>(rows.concat(), z_num, &self.device);
            forward.push(generate(&networks, GeneratorPath::Forward, z.clone()));
            cycled.push(generate(&networks, GeneratorPath::Cycled, z));
            rows = self.random_latents(z_fixed.len());
        }
        let x_fake = forward.last().cloned();

        for (name, images) in [("G", forward), ("G2", cycled)] {
            let path = self.model_dir.join(format!("{step}_{name}.png"));
            save_image(Tensor::cat(images, 0), &path, 8)?;
            info!("samples saved: {}", path.display());
        }

        save_reconstructions(&networks, x_fixed, x_fake, &self.model_dir, &step.to_string())?;

        let z_flex = self.random_latents(z_fixed.len());
        interpolate_live_g(&networks, z_fixed, &z_flex, &self.device, &self.model_dir, step)
    }

    /// Fits latents to `real`, then sweeps the generator between the codes
    /// of its first and second half.
    pub fn interpolate_g(
        &mut self,
        networks: &BeganNetworks<B::InnerBackend>,
        real: Tensor<B::InnerBackend, 4>,
        step: usize,
        dir: &Path,
    ) -> Result<()> {
        let [batch, ..] = real.dims();
        let half = batch / 2;
        if half == 0 {
            warn!(batch, "batch too small to interpolate between halves");
            return Ok(());
        }

        let init = latent_tensor::<B>(self.random_latents(batch).concat(), self.config.z_num, &self.device);
        let target = norm_img(to_nchw(Tensor::<B, 4>::from_inner(real)));
        let fitted = fit_latents(
            &self.networks.generator,
            init,
            target,
            self.config.interp_fit_epochs,
        );

        let rows = latent_rows(fitted)?;
        let (z1, z2) = rows.split_at(half);
        let grid = sweep(z1, &z2[..half], &self.device, |z| {
            generate(networks, GeneratorPath::Forward, z)
        });

        for idx in 0..half {
            let path = dir.join(format!("test{step}_interp_G_{idx}.png"));
            save_image(
                grid.clone().narrow(0, idx * SWEEP_STEPS, SWEEP_STEPS),
                &path,
                SWEEP_STEPS,
            )?;
        }
        save_image(grid, &dir.join(format!("test{step}_interp_G.png")), SWEEP_STEPS)
    }

    /// Writes reconstructions, interpolation sweeps and sample grids from the
    /// current networks to `model_dir/test`, returning that directory.
    pub fn test(&mut self) -> Result<PathBuf> {
        let _span = info_span!("test").entered();
        let dir = self.model_dir.join("test");
        std::fs::create_dir_all(&dir)?;

        let networks = self.networks.valid();
        let batch_size = self.config.batch_size;
        let mut all_g_z = Vec::with_capacity(TEST_ROUNDS);

        for round in 0..TEST_ROUNDS {
            let real1 = self.get_image_from_loader();
            let real2 = self.get_image_from_loader();
            save_image(real1.clone(), &dir.join(format!("test{round}_real1.png")), 8)?;
            save_image(real2.clone(), &dir.join(format!("test{round}_real2.png")), 8)?;

            save_reconstructions(&networks, real1.clone(), None, &dir, &format!("test{round}_real1"))?;
            save_reconstructions(&networks, real2.clone(), None, &dir, &format!("test{round}_real2"))?;

            self.interpolate_g(&networks, real1.clone(), round, &dir)?;
            interpolate_d(&networks, real1, real2, round, &dir)?;

            let z = latent_tensor(
                self.random_latents(batch_size).concat(),
                self.config.z_num,
                &self.device,
            );
            let g_z = generate(&networks, GeneratorPath::Forward, z);
            save_image(g_z.clone(), &dir.join(format!("test{round}_G_z.png")), 8)?;
            all_g_z.push(g_z);
            save_image(
                Tensor::cat(all_g_z.clone(), 0),
                &dir.join(format!("G_z{round}.png")),
                8,
            )?;
        }

        save_image(Tensor::cat(all_g_z, 0), &dir.join("all_G_z.png"), 16)?;
        info!("test artifacts written to {}", dir.display());
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_ops::tensor_to_vec;
    use crate::model::BeganModelConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn networks() -> BeganNetworks<TestBackend> {
        BeganModelConfig::new(4, 4, 3, 1).init(&Default::default())
    }

    fn pixels(n: usize) -> Tensor<TestBackend, 4> {
        Tensor::random([n, 8, 8, 3], Distribution::Uniform(0.0, 255.0), &Default::default())
    }

    #[test]
    fn generate_returns_nhwc_pixels() {
        let nets = networks();
        let z = Tensor::random([16, 4], Distribution::Uniform(-1.0, 1.0), &Default::default());

        for path in [GeneratorPath::Forward, GeneratorPath::Cycled] {
            let images = generate(&nets, path, z.clone());
            assert_eq!(images.dims(), [16, 8, 8, 3]);
            assert!(tensor_to_vec(images)
                .unwrap()
                .iter()
                .all(|v| (0.0..=255.0).contains(v)));
        }
    }

    #[test]
    fn encode_decode_shapes() {
        let nets = networks();
        let z = encode(&nets, pixels(3));
        assert_eq!(z.dims(), [3, 4]);
        assert_eq!(decode(&nets, z).dims(), [3, 8, 8, 3]);
        assert_eq!(autoencode(&nets, pixels(3)).dims(), [3, 8, 8, 3]);
    }

    #[test]
    fn sweep_grid_groups_frames_per_row() {
        let device = Default::default();
        let frames = (0..SWEEP_STEPS)
            .map(|i| Tensor::<TestBackend, 4>::full([2, 1, 1, 1], i as f32, &device))
            .collect();

        let grid = sweep_grid(frames);

        assert_eq!(grid.dims(), [2 * SWEEP_STEPS, 1, 1, 1]);
        let values = tensor_to_vec(grid).unwrap();
        let expected: Vec<f32> = (0..SWEEP_STEPS).map(|i| i as f32).collect();
        assert_eq!(&values[..SWEEP_STEPS], expected.as_slice());
        assert_eq!(&values[SWEEP_STEPS..], expected.as_slice());
    }

    #[test]
    fn latent_tensor_shapes_rows() {
        let z = latent_tensor::<TestBackend>(vec![0.0; 12], 4, &Default::default());
        assert_eq!(z.dims(), [3, 4]);
    }

    #[test]
    fn interpolation_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let nets = networks();
        let z_fixed = vec![vec![0.5; 4]; 2];
        let z_flex = vec![vec![-0.5; 4]; 2];

        interpolate_live_g(&nets, &z_fixed, &z_flex, &Default::default(), dir.path(), 7).unwrap();
        interpolate_d(&nets, pixels(2), pixels(2), 1, dir.path()).unwrap();
        save_reconstructions(&nets, pixels(2), Some(pixels(2)), dir.path(), "7").unwrap();

        for name in [
            "test7_interp_G.png",
            "test1_interp_D_0.png",
            "test1_interp_D_1.png",
            "7_D_real.png",
            "7_D_fake.png",
        ] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }
    }

    #[test]
    fn fitting_reduces_reconstruction_error() {
        type Ad = Autodiff<NdArray>;
        let device = Default::default();
        let generator = BeganModelConfig::new(4, 4, 3, 1).init_generator::<Ad>(&device);
        let target = generator
            .forward(Tensor::random([2, 4], Distribution::Uniform(-1.0, 1.0), &device))
            .detach();
        let init = Tensor::<Ad, 2>::zeros([2, 4], &device);

        let error = |z: Tensor<NdArray, 2>| {
            let inner = generator.valid();
            tensor_to_vec(l1(inner.forward(z), target.clone().inner())).unwrap()[0]
        };
        let before = error(init.clone().inner());
        let fitted = fit_latents(&generator, init, target.clone(), 200);

        assert_eq!(fitted.dims(), [2, 4]);
        assert!(error(fitted) < before);
    }
}
