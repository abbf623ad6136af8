//! Pixel-range and layout transforms, latent interpolation and image grids.

use std::path::Path;

use burn::tensor::{Tensor, backend::Backend};
use image::{Rgb, RgbImage};

use crate::config::DataFormat;
use crate::error::{BeganError, Result};

/// Padding between cells of a saved image grid, in pixels.
pub const GRID_PADDING: u32 = 2;

/// Below this `|sin(omega)|` the slerp weights blow up, so lerp takes over.
const SLERP_EPSILON: f64 = 1e-6;

/// Maps pixels from `[0, 255]` to `[-1, 1]`.
pub fn norm_img<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 4> {
    image.div_scalar(127.5).sub_scalar(1.0)
}

/// Maps network output from `[-1, 1]` back to `[0, 255]` in NHWC layout,
/// clipping anything the network pushed out of range.
pub fn denorm_img<B: Backend>(norm: Tensor<B, 4>, data_format: DataFormat) -> Tensor<B, 4> {
    to_nhwc(norm.add_scalar(1.0).mul_scalar(127.5), data_format).clamp(0.0, 255.0)
}

/// Converts a batch stored in `data_format` to NHWC.
pub fn to_nhwc<B: Backend>(image: Tensor<B, 4>, data_format: DataFormat) -> Tensor<B, 4> {
    match data_format {
        DataFormat::Nchw => image.permute([0, 2, 3, 1]),
        DataFormat::Nhwc => image,
    }
}

/// Converts a batch stored in `data_format` to the NCHW layout the networks use.
pub fn to_network_layout<B: Backend>(image: Tensor<B, 4>, data_format: DataFormat) -> Tensor<B, 4> {
    match data_format {
        DataFormat::Nchw => image,
        DataFormat::Nhwc => image.permute([0, 3, 1, 2]),
    }
}

/// Converts an NHWC batch to NCHW.
///
/// A batch whose last axis is not a plausible channel count (1 or 3) is
/// assumed to be channels-first already and returned untouched.
pub fn to_nchw<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 4> {
    match image.dims()[3] {
        1 | 3 => image.permute([0, 3, 1, 2]),
        _ => image,
    }
}

/// Spherical linear interpolation between two latent vectors.
///
/// `val = 0` yields `low` and `val = 1` yields `high`. When the vectors are
/// (nearly) parallel or anti-parallel, so that `sin(omega)` vanishes, or one
/// of them has zero length, this falls back to linear interpolation.
pub fn slerp(val: f32, low: &[f32], high: &[f32]) -> Vec<f32> {
    let val = val as f64;
    let norm = |v: &[f32]| v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let (low_norm, high_norm) = (norm(low), norm(high));

    let omega = if low_norm == 0.0 || high_norm == 0.0 {
        0.0
    } else {
        low.iter()
            .zip(high)
            .map(|(l, h)| (*l as f64 / low_norm) * (*h as f64 / high_norm))
            .sum::<f64>()
            .clamp(-1.0, 1.0)
            .acos()
    };
    let so = omega.sin();

    let (w_low, w_high) = if so.abs() < SLERP_EPSILON {
        (1.0 - val, val)
    } else {
        (((1.0 - val) * omega).sin() / so, (val * omega).sin() / so)
    };

    low.iter()
        .zip(high)
        .map(|(l, h)| (w_low * *l as f64 + w_high * *h as f64) as f32)
        .collect()
}

/// Applies [`slerp`] row by row to two equally sized latent batches.
pub fn slerp_rows(val: f32, low: &[Vec<f32>], high: &[Vec<f32>]) -> Vec<f32> {
    low.iter()
        .zip(high)
        .flat_map(|(l, h)| slerp(val, l, h))
        .collect()
}

/// `n` evenly spaced values from `start` to `end`, both inclusive.
pub fn linspace(start: f32, end: f32, n: usize) -> Vec<f32> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..n)
            .map(|i| start + (end - start) * i as f32 / (n - 1) as f32)
            .collect(),
    }
}

/// Copies a tensor to host memory as `f32`.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| BeganError::Data(format!("{e:?}")))
}

/// Splits a `[N, Z]` latent tensor into host rows.
pub fn latent_rows<B: Backend>(latents: Tensor<B, 2>) -> Result<Vec<Vec<f32>>> {
    let [_, z_num] = latents.dims();
    Ok(tensor_to_vec(latents)?
        .chunks(z_num)
        .map(<[f32]>::to_vec)
        .collect())
}

/// Tiles an NHWC batch of `[0, 255]` pixels into one image, `nrow` cells per row.
pub fn make_grid(pixels: &[f32], dims: [usize; 4], nrow: usize, padding: u32) -> Result<RgbImage> {
    let [n, h, w, c] = dims;
    if c != 1 && c != 3 {
        return Err(BeganError::InvalidConfig(format!(
            "cannot tile images with {c} channels"
        )));
    }

    let xmaps = nrow.clamp(1, n.max(1));
    let ymaps = n.div_ceil(xmaps);
    let cell_h = h as u32 + padding;
    let cell_w = w as u32 + padding;
    let mut grid = RgbImage::new(
        cell_w * xmaps as u32 + padding,
        cell_h * ymaps as u32 + padding,
    );

    for (idx, image) in pixels.chunks(h * w * c).take(n).enumerate() {
        let x0 = (idx % xmaps) as u32 * cell_w + padding;
        let y0 = (idx / xmaps) as u32 * cell_h + padding;
        for (p, px) in image.chunks(c).enumerate() {
            let to_u8 = |v: f32| v.clamp(0.0, 255.0) as u8;
            let rgb = match px {
                [v] => [to_u8(*v); 3],
                [r, g, b] => [to_u8(*r), to_u8(*g), to_u8(*b)],
                _ => unreachable!("channel count checked above"),
            };
            grid.put_pixel(x0 + (p % w) as u32, y0 + (p / w) as u32, Rgb(rgb));
        }
    }

    Ok(grid)
}

/// Saves an NHWC batch of `[0, 255]` pixels as a single PNG grid.
pub fn save_image<B: Backend>(images: Tensor<B, 4>, path: &Path, nrow: usize) -> Result<()> {
    let dims = images.dims();
    let pixels = tensor_to_vec(images)?;
    let grid = make_grid(&pixels, dims, nrow, GRID_PADDING)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    grid.save(path)?;
    Ok(())
}
