use burn::{
    module::Module,
    nn::{
        Linear, LinearConfig, PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
    },
    tensor::{
        Tensor,
        activation::relu,
        backend::Backend,
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

/// Spatial side length of the innermost feature map.
pub const BASE_SIZE: usize = 8;

/// Exponential linear unit: `x` for `x > 0`, `exp(x) - 1` otherwise.
pub fn elu<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().clamp_max(0.0).exp().sub_scalar(1.0) + relu(x)
}

/// Nearest-neighbour 2x upsampling of an NCHW tensor.
pub fn upscale<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, h, w] = x.dims();
    interpolate(
        x,
        [h * 2, w * 2],
        InterpolateOptions::new(InterpolateMode::Nearest),
    )
}

fn conv3x3<B: Backend>(
    channels_in: usize,
    channels_out: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([channels_in, channels_out], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

// --- ENCODER ---

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    /// Stride-2 convolution; absent on the innermost block.
    down: Option<Conv2d<B>>,
}

/// Convolutional encoder: image `[N, C, H, W]` → code `[N, z_num]`.
///
/// Widens by `hidden_num` channels per block and halves the resolution
/// between blocks until it reaches 8×8.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    conv_in: Conv2d<B>,
    blocks: Vec<EncoderBlock<B>>,
    fc: Linear<B>,
}

impl<B: Backend> Encoder<B> {
    pub fn new(
        channels: usize,
        hidden_num: usize,
        z_num: usize,
        repeat_num: usize,
        device: &B::Device,
    ) -> Self {
        let conv_in = conv3x3(channels, hidden_num, 1, device);

        let mut blocks = Vec::with_capacity(repeat_num);
        let mut prev_channels = hidden_num;
        for idx in 0..repeat_num {
            let channel_num = hidden_num * (idx + 1);
            let down = (idx < repeat_num - 1)
                .then(|| conv3x3(channel_num, channel_num, 2, device));
            blocks.push(EncoderBlock {
                conv1: conv3x3(prev_channels, channel_num, 1, device),
                conv2: conv3x3(channel_num, channel_num, 1, device),
                down,
            });
            prev_channels = channel_num;
        }

        let fc = LinearConfig::new(BASE_SIZE * BASE_SIZE * prev_channels, z_num).init(device);

        Self {
            conv_in,
            blocks,
            fc,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = elu(self.conv_in.forward(x));
        for block in &self.blocks {
            x = elu(block.conv1.forward(x));
            x = elu(block.conv2.forward(x));
            if let Some(down) = &block.down {
                x = elu(down.forward(x));
            }
        }
        self.fc.forward(x.flatten::<2>(1, 3))
    }
}

// --- DECODER ---

#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
}

/// Convolutional decoder: code `[N, z_num]` → image `[N, C, H, W]`.
///
/// Output is unbounded; callers treat it as normalised pixels in `[-1, 1]`.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    fc: Linear<B>,
    blocks: Vec<DecoderBlock<B>>,
    conv_out: Conv2d<B>,
    hidden_num: usize,
}

impl<B: Backend> Decoder<B> {
    pub fn new(
        z_num: usize,
        hidden_num: usize,
        channels: usize,
        repeat_num: usize,
        device: &B::Device,
    ) -> Self {
        let fc = LinearConfig::new(z_num, BASE_SIZE * BASE_SIZE * hidden_num).init(device);
        let blocks = (0..repeat_num)
            .map(|_| DecoderBlock {
                conv1: conv3x3(hidden_num, hidden_num, 1, device),
                conv2: conv3x3(hidden_num, hidden_num, 1, device),
            })
            .collect();
        let conv_out = conv3x3(hidden_num, channels, 1, device);

        Self {
            fc,
            blocks,
            conv_out,
            hidden_num,
        }
    }

    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, _] = z.dims();
        let mut x = self
            .fc
            .forward(z)
            .reshape([batch, self.hidden_num, BASE_SIZE, BASE_SIZE]);

        let last = self.blocks.len().saturating_sub(1);
        for (idx, block) in self.blocks.iter().enumerate() {
            x = elu(block.conv1.forward(x));
            x = elu(block.conv2.forward(x));
            if idx < last {
                x = upscale(x);
            }
        }
        self.conv_out.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_ops::tensor_to_vec;
    use approx::assert_abs_diff_eq;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray;

    #[test]
    fn elu_matches_definition() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_data(TensorData::from([-2.0f32, 0.0, 1.5]), &device);

        let y = tensor_to_vec(elu(x)).unwrap();

        assert_abs_diff_eq!(y[0], (-2.0f32).exp() - 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y[1], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y[2], 1.5, epsilon = 1e-6);
    }

    #[test]
    fn upscale_repeats_pixels() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [1, 1, 2, 2]),
            &device,
        );

        let y = upscale(x);

        assert_eq!(y.dims(), [1, 1, 4, 4]);
        let y = tensor_to_vec(y).unwrap();
        assert_eq!(&y[..4], &[1.0, 1.0, 2.0, 2.0]);
        assert_eq!(&y[12..], &[3.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn decoder_reaches_image_size() {
        let device = Default::default();
        let decoder = Decoder::<TestBackend>::new(6, 4, 3, 3, &device);
        let z = Tensor::random([2, 6], Distribution::Uniform(-1.0, 1.0), &device);

        assert_eq!(decoder.forward(z).dims(), [2, 3, 32, 32]);
    }

    #[test]
    fn encoder_reduces_to_code() {
        let device = Default::default();
        let encoder = Encoder::<TestBackend>::new(1, 4, 5, 2, &device);
        let x = Tensor::random([3, 1, 16, 16], Distribution::Default, &device);

        assert_eq!(encoder.forward(x).dims(), [3, 5]);
    }

    #[test]
    fn single_block_stays_at_base_size() {
        let device = Default::default();
        let encoder = Encoder::<TestBackend>::new(3, 4, 5, 1, &device);
        let decoder = Decoder::<TestBackend>::new(5, 4, 3, 1, &device);
        let x = Tensor::random([2, 3, 8, 8], Distribution::Default, &device);

        assert_eq!(decoder.forward(encoder.forward(x)).dims(), [2, 3, 8, 8]);
    }
}
