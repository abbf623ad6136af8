use std::marker::PhantomData;
use std::path::Path;

use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::{Dataset, InMemDataset},
    },
    tensor::{Tensor, TensorData, backend::Backend},
};
use image::imageops::FilterType;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::config::DataFormat;
use crate::error::{BeganError, Result};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// A single square training image, stored row-major as `[H, W, C]` bytes.
#[derive(Clone, Debug)]
pub struct ImageItem {
    pub pixels: Vec<u8>,
}

// --- Dataset ---

/// Every image in a directory, centre-cropped to a square and resized to
/// `size × size`. Images are decoded once, up front.
pub struct ImageFolderDataset {
    inner: InMemDataset<ImageItem>,
}

impl ImageFolderDataset {
    /// Loads all png/jpg/bmp files directly under `dir`, in file-name order.
    pub fn new(dir: &Path, size: u32, channels: usize) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(BeganError::EmptyDataset(dir.to_path_buf()));
        }

        let items = paths
            .iter()
            .map(|path| load_item(path, size, channels))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("loaded {} images from {}", items.len(), dir.display());

        Ok(Self {
            inner: InMemDataset::new(items),
        })
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.inner.get(index)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

fn load_item(path: &Path, size: u32, channels: usize) -> Result<ImageItem> {
    let img = image::open(path)?;
    let side = img.width().min(img.height());
    let img = img
        .crop_imm((img.width() - side) / 2, (img.height() - side) / 2, side, side)
        .resize_exact(size, size, FilterType::Triangle);

    let pixels = match channels {
        1 => img.to_luma8().into_raw(),
        3 => img.to_rgb8().into_raw(),
        other => {
            return Err(BeganError::InvalidConfig(format!(
                "unsupported channel count {other}"
            )));
        }
    };

    Ok(ImageItem { pixels })
}

// --- Batching ---

/// Packs [`ImageItem`]s into a pixel tensor in the configured layout.
///
/// Values stay in `[0, 255]`; normalisation happens inside the trainer.
#[derive(Clone)]
pub struct ImageBatcher<B: Backend> {
    size: usize,
    channels: usize,
    data_format: DataFormat,
    _b: PhantomData<B>,
}

impl<B: Backend> ImageBatcher<B> {
    /// # Arguments
    /// * `size` – side length every item was resized to
    /// * `channels` – bytes per pixel in [`ImageItem::pixels`]
    /// * `data_format` – layout of the produced batches
    pub fn new(size: usize, channels: usize, data_format: DataFormat) -> Self {
        Self {
            size,
            channels,
            data_format,
            _b: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, Tensor<B, 4>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> Tensor<B, 4> {
        let batch_size = items.len();
        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.pixels.iter().map(|&p| p as f32))
            .collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, self.size, self.size, self.channels]),
            device,
        );

        match self.data_format {
            DataFormat::Nchw => images.permute([0, 3, 1, 2]),
            DataFormat::Nhwc => images,
        }
    }
}

// --- Loading ---

/// An endless stream of image batches.
pub trait BatchSource<B: Backend> {
    /// Next batch of `[0, 255]` pixels in the configured data format.
    fn next_batch(&mut self) -> Tensor<B, 4>;
}

/// Cycles over a dataset forever, reshuffling at the start of every pass.
pub struct ImageLoader<B: Backend> {
    dataset: Box<dyn Dataset<ImageItem>>,
    batcher: ImageBatcher<B>,
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
    device: B::Device,
}

impl<B: Backend> ImageLoader<B> {
    /// Creates a loader that yields `batch_size` images per call.
    ///
    /// # Arguments
    /// * `dataset` – source items, must not be empty
    /// * `batcher` – turns items into a pixel tensor
    /// * `batch_size` – images per batch; batches wrap across passes
    /// * `seed` – seeds the shuffle so runs are reproducible
    /// * `device` – where batches are allocated
    ///
    /// # Returns
    /// An error if the dataset is empty.
    pub fn new(
        dataset: impl Dataset<ImageItem> + 'static,
        batcher: ImageBatcher<B>,
        batch_size: usize,
        seed: u64,
        device: B::Device,
    ) -> Result<Self> {
        if dataset.is_empty() {
            return Err(BeganError::InvalidConfig("dataset is empty".to_string()));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        order.shuffle(&mut rng);

        Ok(Self {
            dataset: Box::new(dataset),
            batcher,
            batch_size,
            order,
            cursor: 0,
            rng,
            device,
        })
    }
}

impl<B: Backend> BatchSource<B> for ImageLoader<B> {
    fn next_batch(&mut self) -> Tensor<B, 4> {
        let mut items = Vec::with_capacity(self.batch_size);
        while items.len() < self.batch_size {
            // End of a pass: reshuffle and start over.
            if self.cursor == self.order.len() {
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
            }
            if let Some(item) = self.dataset.get(self.order[self.cursor]) {
                items.push(item);
            }
            self.cursor += 1;
        }
        self.batcher.batch(items, &self.device)
    }
}
