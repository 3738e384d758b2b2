//! Gaussian smoothing of vector fields.

use burn::tensor::backend::Backend;
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Shape, Tensor, TensorData};

use crate::error::{MorphError, Result};

/// Fixed-weight depthwise Gaussian low-pass filter.
///
/// The 2-D kernel is built once at construction, normalized to sum 1 and
/// replicated per channel, then applied as a channel-independent
/// convolution with same-size padding. The weights are plain tensors and
/// never tracked by autodiff, so smoothing contributes no gradient of its
/// own.
pub struct GaussianSmoother<B: Backend> {
    weight: Tensor<B, 4>,
    channels: usize,
    kernel_size: usize,
}

impl<B: Backend> GaussianSmoother<B> {
    /// Build a smoother for `channels`-channel fields.
    ///
    /// If `kernel_size < 2 * floor(3.5 * sigma) + 1` the kernel is enlarged
    /// to that value so it covers at least 3.5 standard deviations.
    pub fn new(
        kernel_size: usize,
        sigma: f64,
        channels: usize,
        device: &B::Device,
    ) -> Result<Self> {
        if sigma <= 0.0 {
            return Err(MorphError::invalid_configuration(format!(
                "sigma must be positive, got {sigma}"
            )));
        }
        if channels == 0 {
            return Err(MorphError::invalid_configuration(
                "channels must be >= 1",
            ));
        }

        let min_size = 2 * (3.5 * sigma).floor() as usize + 1;
        let kernel_size = kernel_size.max(min_size);
        if kernel_size % 2 == 0 {
            return Err(MorphError::invalid_configuration(format!(
                "kernel_size must be odd for same-size padding, got {kernel_size}"
            )));
        }

        let kernel = Self::gaussian_kernel_2d(kernel_size, sigma);
        let weight = Tensor::<B, 1>::from_data(
            TensorData::new(kernel, Shape::new([kernel_size * kernel_size])),
            device,
        )
        .reshape([1, 1, kernel_size, kernel_size])
        .repeat(&[channels, 1, 1, 1]);

        Ok(Self {
            weight,
            channels,
            kernel_size,
        })
    }

    /// Kernel side length actually in use (after the coverage enlargement).
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Apply the filter `iterations` times to a `[N, C, H, W]` field.
    pub fn apply(&self, field: Tensor<B, 4>, iterations: usize) -> Result<Tensor<B, 4>> {
        if iterations == 0 {
            return Err(MorphError::invalid_configuration(
                "smoothing iterations must be >= 1",
            ));
        }
        let dims = field.dims();
        if dims[1] != self.channels {
            return Err(MorphError::shape_mismatch(
                format!("[N, {}, H, W]", self.channels),
                &dims,
            ));
        }

        let padding = self.kernel_size / 2;
        let options = ConvOptions::new([1, 1], [padding, padding], [1, 1], self.channels);

        let mut field = field;
        for _ in 0..iterations {
            field = conv2d(field, self.weight.clone(), None, options.clone());
        }
        Ok(field)
    }

    fn gaussian_kernel_2d(size: usize, sigma: f64) -> Vec<f32> {
        let mean = (size - 1) as f64 / 2.0;
        let two_sigma2 = 2.0 * sigma * sigma;

        let mut kernel = Vec::with_capacity(size * size);
        let mut sum = 0.0;
        for y in 0..size {
            for x in 0..size {
                let dx = x as f64 - mean;
                let dy = y as f64 - mean;
                let val = (-(dx * dx + dy * dy) / two_sigma2).exp();
                kernel.push(val);
                sum += val;
            }
        }

        kernel.into_iter().map(|v| (v / sum) as f32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_kernel_enlarged_to_cover_sigma() {
        let device = Default::default();
        // floor(3.5 * 2) * 2 + 1 = 15.
        let smoother = GaussianSmoother::<TestBackend>::new(3, 2.0, 2, &device).unwrap();
        assert_eq!(smoother.kernel_size(), 15);
    }

    #[test]
    fn test_kernel_sums_to_one() {
        let kernel = GaussianSmoother::<TestBackend>::gaussian_kernel_2d(7, 1.0);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_constant_interior_preserved() {
        let device = Default::default();
        let smoother = GaussianSmoother::<TestBackend>::new(3, 0.5, 1, &device).unwrap();
        let ones = Tensor::<TestBackend, 4>::ones([1, 1, 9, 9], &device);
        let smoothed = smoother.apply(ones, 1).unwrap();

        // Away from the zero-padded border the normalized kernel keeps a
        // constant field constant.
        let center = smoothed.slice([0..1, 0..1, 3..6, 3..6]).into_data();
        assert!(center
            .as_slice::<f32>()
            .unwrap()
            .iter()
            .all(|v| (v - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let device = Default::default();
        let smoother = GaussianSmoother::<TestBackend>::new(3, 1.0, 1, &device).unwrap();
        let field = Tensor::<TestBackend, 4>::ones([1, 1, 4, 4], &device);
        assert!(smoother.apply(field, 0).is_err());
    }

    #[test]
    fn test_rejects_channel_mismatch() {
        let device = Default::default();
        let smoother = GaussianSmoother::<TestBackend>::new(3, 1.0, 2, &device).unwrap();
        let field = Tensor::<TestBackend, 4>::ones([1, 1, 4, 4], &device);
        assert!(matches!(
            smoother.apply(field, 1),
            Err(MorphError::ShapeMismatch { .. })
        ));
    }
}
