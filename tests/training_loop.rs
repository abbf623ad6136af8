use std::path::Path;

use approx::assert_abs_diff_eq;
use burn::backend::{Autodiff, NdArray};
use burn::data::dataset::InMemDataset;
use burn::module::AutodiffModule;
use burn::tensor::{Distribution, ElementConversion, Tensor};
use rand::{Rng, SeedableRng, rngs::StdRng};

use began::data::{BatchSource, ImageBatcher, ImageItem, ImageLoader};
use began::image_ops::{norm_img, tensor_to_vec, to_network_layout};
use began::model::loss::{cycle_loss, l1, reconstruction_losses};
use began::state::BalanceUpdate;
use began::summary::read_scalars;
use began::trainer::latent_tensor;
use began::{BeganConfig, BeganError, DataFormat, GeneratorPath, Trainer};

type TestBackend = Autodiff<NdArray>;

const SIZE: usize = 8;

fn tiny_config(model_dir: &Path) -> BeganConfig {
    BeganConfig::new()
        .with_input_scale_size(SIZE)
        .with_conv_hidden_num(4)
        .with_z_num(4)
        .with_batch_size(2)
        .with_max_step(100)
        .with_log_step(10)
        .with_lr_update_step(50)
        .with_use_gpu(false)
        .with_model_dir(model_dir.to_string_lossy().into_owned())
}

fn loader(config: &BeganConfig) -> Box<ImageLoader<TestBackend>> {
    let mut rng = StdRng::seed_from_u64(7);
    let items = (0..6)
        .map(|_| ImageItem {
            pixels: (0..SIZE * SIZE * config.channels)
                .map(|_| rng.gen_range(0..=255u8))
                .collect(),
        })
        .collect();

    Box::new(
        ImageLoader::new(
            InMemDataset::new(items),
            ImageBatcher::new(SIZE, config.channels, config.data_format),
            config.batch_size,
            config.seed,
            Default::default(),
        )
        .unwrap(),
    )
}

fn trainer(config: BeganConfig) -> Trainer<TestBackend> {
    let source = loader(&config);
    Trainer::new(config, source, Default::default()).unwrap()
}

/// Serves the same batch forever.
struct FixedBatch(Tensor<TestBackend, 4>);

impl BatchSource<TestBackend> for FixedBatch {
    fn next_batch(&mut self) -> Tensor<TestBackend, 4> {
        self.0.clone()
    }
}

#[test]
fn short_run_logs_decays_and_never_samples() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = tiny_config(dir.path());
    let mut trainer = trainer(config.clone());

    let report = trainer.train().unwrap();

    assert_eq!(report.logged_steps, (0..100).step_by(10).collect::<Vec<_>>());
    assert_eq!(report.decay_steps, vec![49]);
    assert!(report.sample_steps.is_empty());

    let state = &report.final_state;
    assert_eq!(state.step, 100);
    assert_eq!(state.g_lr, config.g_lr * 0.5);
    assert_eq!(state.d_lr, config.d_lr * 0.5);
    assert_eq!(state.g_r_lr, config.g_r_lr);
    assert!((0.0..=1.0).contains(&state.k_t));

    let events = read_scalars(&dir.path().join("summaries")).unwrap();
    assert_eq!(events.len(), 10 * 11);
    assert!(events.iter().all(|e| e.value.is_finite()));
    assert!(dir.path().join("summaries/images/90_AE_x.png").exists());

    assert!(dir.path().join("x_fixed.png").exists());
    assert!(!dir.path().join("0_G.png").exists());
    assert!(dir.path().join("checkpoint/state.json").exists());
}

#[test]
fn sampling_writes_progress_grids() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = tiny_config(dir.path()).with_log_step(1).with_max_step(41);
    let mut trainer = trainer(config);

    let report = trainer.train().unwrap();

    assert_eq!(report.sample_steps, vec![40]);
    for name in [
        "40_G.png",
        "40_G2.png",
        "40_D_real.png",
        "40_D_fake.png",
        "test40_interp_G.png",
    ] {
        assert!(dir.path().join(name).exists(), "missing {name}");
    }
}

#[test]
fn generate_returns_nhwc_pixel_batch() {
    let dir = tempfile::TempDir::new().unwrap();
    for data_format in [DataFormat::Nchw, DataFormat::Nhwc] {
        let config = tiny_config(dir.path()).with_data_format(data_format);
        let trainer = trainer(config);
        let z = Tensor::random([16, 4], Distribution::Uniform(-1.0, 1.0), &Default::default());

        let images = trainer.generate(GeneratorPath::Forward, z);

        assert_eq!(images.dims(), [16, SIZE, SIZE, 3]);
        let pixels = tensor_to_vec(images).unwrap();
        assert!(pixels.iter().all(|p| (0.0..=255.0).contains(p)));
    }
}

#[test]
fn unsupported_optimizer_is_fatal_before_anything_is_built() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = tiny_config(dir.path()).with_optimizer("rmsprop".to_string());
    let source = loader(&config);

    let err = Trainer::<TestBackend>::new(config, source, Default::default())
        .err()
        .unwrap();

    assert!(matches!(err, BeganError::UnsupportedOptimizer(ref name) if name == "rmsprop"));
    assert!(!dir.path().join("summaries").exists());
}

#[test]
fn resumes_from_the_restored_step() {
    let dir = tempfile::TempDir::new().unwrap();
    let first = trainer(tiny_config(dir.path()).with_max_step(20))
        .train()
        .unwrap();
    assert_eq!(first.final_state.step, 20);

    let mut resumed = trainer(tiny_config(dir.path()).with_max_step(30));
    assert_eq!(resumed.state(), &first.final_state);

    let report = resumed.train().unwrap();
    assert_eq!(report.logged_steps, vec![20]);
    assert_eq!(report.final_state.step, 30);
}

#[test]
fn reverse_pretraining_keeps_adversarial_state() {
    let adversarial = tempfile::TempDir::new().unwrap();
    let first = trainer(tiny_config(adversarial.path()).with_max_step(20))
        .train()
        .unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let config = tiny_config(dir.path())
        .with_reverse(true)
        .with_load_path(Some(adversarial.path().to_string_lossy().into_owned()))
        .with_max_step(20)
        .with_lr_update_step(10);
    let mut trainer = trainer(config.clone());
    assert_eq!(trainer.state().step, first.final_state.step);
    assert_eq!(trainer.state().k_t, first.final_state.k_t);

    let report = trainer.train_reverse().unwrap();

    assert_eq!(report.logged_steps, vec![0, 10]);
    assert_eq!(report.decay_steps, vec![9]);
    assert_eq!(report.final_state.g_r_lr, config.g_r_lr * 0.5);
    assert_eq!(report.final_state.g_lr, first.final_state.g_lr);
    assert_eq!(report.final_state.step, first.final_state.step);

    let events = read_scalars(&dir.path().join("summaries")).unwrap();
    assert_eq!(events.len(), 2 * 3);
    assert!(events.iter().any(|e| e.tag == "loss/g_r_lossl1"));
}

#[test]
fn test_pass_writes_artifacts() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut trainer = trainer(tiny_config(dir.path()).with_interp_fit_epochs(2));

    let test_dir = trainer.test().unwrap();

    assert_eq!(test_dir, trainer.model_dir().join("test"));
    assert_eq!(test_dir, dir.path().join("test"));
    for name in [
        "test0_real1.png",
        "test0_real2.png",
        "test0_real1_D_real.png",
        "test1_interp_G.png",
        "test1_interp_G_0.png",
        "test2_interp_D_1.png",
        "test2_G_z.png",
        "G_z2.png",
        "all_G_z.png",
    ] {
        assert!(test_dir.join(name).exists(), "missing {name}");
    }
}

#[test]
fn one_step_uses_the_parameters_from_before_the_step() {
    let dir = tempfile::TempDir::new().unwrap();
    let device = Default::default();
    let config = tiny_config(dir.path())
        .with_data_format(DataFormat::Nhwc)
        .with_max_step(1)
        .with_log_step(1);
    let batch = Tensor::<TestBackend, 4>::random(
        [config.batch_size, SIZE, SIZE, config.channels],
        Distribution::Uniform(0.0, 255.0),
        &device,
    );
    let mut trainer =
        Trainer::new(config, Box::new(FixedBatch(batch.clone())), Default::default()).unwrap();
    let config = trainer.config().clone();
    let before = trainer.networks().valid();

    let report = trainer.train().unwrap();

    // The first draw of the trainer's generator is `z_fixed`; the step's
    // latents come right after it.
    let mut rng = StdRng::seed_from_u64(config.seed);
    let draws: Vec<f32> = (0..2 * config.batch_size * config.z_num)
        .map(|_| rng.gen_range(-1.0f32..1.0))
        .collect();
    let z = latent_tensor::<NdArray>(
        draws[config.batch_size * config.z_num..].to_vec(),
        config.z_num,
        &device,
    );
    let x = norm_img(to_network_layout(batch.inner(), config.data_format));

    let generated = before.generator.forward(z);
    let recon = reconstruction_losses(&before.discriminator, generated.clone(), x);
    let (ae_generated, _) = before.discriminator.forward(generated.clone());
    let scalar = |t: Tensor<NdArray, 1>| t.into_scalar().elem::<f64>();
    let d_loss_real = scalar(recon.d_loss_real);
    let g_loss = scalar(l1(ae_generated, generated.clone()));
    let g_rr_loss = scalar(cycle_loss(generated.clone(), before.cycle(generated)));

    let events = read_scalars(&dir.path().join("summaries")).unwrap();
    let logged = |tag: &str| {
        events
            .iter()
            .find(|e| e.step == 0 && e.tag == tag)
            .map(|e| e.value)
            .unwrap()
    };
    assert_abs_diff_eq!(logged("loss/d_loss_real"), d_loss_real, epsilon = 1e-5);
    assert_abs_diff_eq!(logged("loss/g_loss"), g_loss, epsilon = 1e-5);
    assert_abs_diff_eq!(logged("loss/g_rr_loss"), g_rr_loss, epsilon = 1e-5);

    let expected = BalanceUpdate::compute(0.0, config.gamma, d_loss_real, g_loss, config.lambda_k);
    assert_abs_diff_eq!(report.final_state.k_t, expected.k_t, epsilon = 1e-6);
    assert_abs_diff_eq!(logged("misc/k_t"), expected.k_t, epsilon = 1e-6);

    // The step did move the parameters.
    let after = trainer.networks().valid();
    let z_zero = Tensor::<NdArray, 2>::zeros([1, config.z_num], &device);
    assert_ne!(
        tensor_to_vec(after.generator.forward(z_zero.clone())).unwrap(),
        tensor_to_vec(before.generator.forward(z_zero)).unwrap()
    );
}
