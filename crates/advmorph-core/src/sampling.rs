//! 2-D grid sampling, deformation-field composition and resolution
//! resampling.
//!
//! Two coordinate-alignment conventions coexist here and are used at
//! different call sites: deformation composition and image warping are
//! corner-aligned, while resolution adjustment resamples in the
//! pixel-center (non-aligned) convention. The two produce measurably
//! different values and are kept distinct.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use crate::error::{MorphError, Result};

/// Padding mode for out-of-range sampling coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingMode {
    /// Out-of-range samples read as zero.
    Zeros,
    /// Out-of-range coordinates clamp to the border value.
    Border,
}

/// Interpolation mode for grid sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Nearest-neighbor sampling.
    Nearest,
    /// Bilinear interpolation.
    Bilinear,
}

/// Configuration for a [`GridSampler2d`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSamplerConfig {
    /// Padding behavior for out-of-range coordinates.
    pub padding_mode: PaddingMode,
    /// Interpolation mode.
    pub interpolation: InterpolationMode,
    /// Corner alignment: `true` maps -1/1 to the corner pixel centers,
    /// `false` to the outer pixel edges.
    pub align_corners: bool,
}

impl Default for GridSamplerConfig {
    fn default() -> Self {
        Self {
            padding_mode: PaddingMode::Border,
            interpolation: InterpolationMode::Bilinear,
            align_corners: true,
        }
    }
}

/// Samples `[N, C, H, W]` tensors at normalized `[N, 2, H', W']`
/// coordinates (channel 0 = x, channel 1 = y, both in `[-1, 1]`).
pub struct GridSampler2d<B: Backend> {
    config: GridSamplerConfig,
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> GridSampler2d<B> {
    /// Sampler with the default configuration (bilinear, border padding,
    /// corner-aligned).
    pub fn new() -> Self {
        Self::with_config(GridSamplerConfig::default())
    }

    /// Sampler with an explicit configuration.
    pub fn with_config(config: GridSamplerConfig) -> Self {
        Self {
            config,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Sample `input` at the absolute normalized coordinates in `grid`.
    pub fn sample(&self, input: Tensor<B, 4>, grid: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let grid_dims = grid.dims();
        if grid_dims[1] != 2 {
            return Err(MorphError::shape_mismatch("[N, 2, H, W]", &grid_dims));
        }
        match self.config.interpolation {
            InterpolationMode::Bilinear => Ok(self.sample_bilinear(input, grid)),
            InterpolationMode::Nearest => Ok(self.sample_nearest(input, grid)),
        }
    }

    fn sample_bilinear(&self, input: Tensor<B, 4>, grid: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, _channels, h_in, w_in] = input.dims();
        let [_, _, h_out, w_out] = grid.dims();

        let (ix, iy) = self.denormalize(grid, w_in, h_in);

        // Validity mask before clamping, for zero padding.
        let mask: Option<Tensor<B, 3>> = if self.config.padding_mode == PaddingMode::Zeros {
            let x_valid = ix.clone().greater_equal_elem(0.0).int()
                * ix.clone().lower_equal_elem((w_in - 1) as f32).int();
            let y_valid = iy.clone().greater_equal_elem(0.0).int()
                * iy.clone().lower_equal_elem((h_in - 1) as f32).int();
            Some((x_valid * y_valid).float())
        } else {
            None
        };

        // Clamp so gathering stays in range (border padding semantics).
        let ix = ix.clamp(0.0, (w_in - 1) as f32);
        let iy = iy.clamp(0.0, (h_in - 1) as f32);

        let ix0 = ix.clone().floor();
        let iy0 = iy.clone().floor();
        let ix1 = (ix0.clone() + 1.0).clamp(0.0, (w_in - 1) as f32);
        let iy1 = (iy0.clone() + 1.0).clamp(0.0, (h_in - 1) as f32);

        let wx1 = ix - ix0.clone();
        let wy1 = iy - iy0.clone();
        let wx0 = wx1.clone().neg().add_scalar(1.0);
        let wy0 = wy1.clone().neg().add_scalar(1.0);

        let ix0_i = ix0.int();
        let iy0_i = iy0.int();
        let ix1_i = ix1.int();
        let iy1_i = iy1.int();

        let v00 = self.gather(&input, &iy0_i, &ix0_i, h_out, w_out);
        let v01 = self.gather(&input, &iy0_i, &ix1_i, h_out, w_out);
        let v10 = self.gather(&input, &iy1_i, &ix0_i, h_out, w_out);
        let v11 = self.gather(&input, &iy1_i, &ix1_i, h_out, w_out);

        let wx0 = wx0.reshape([batch, 1, h_out, w_out]);
        let wx1 = wx1.reshape([batch, 1, h_out, w_out]);
        let wy0 = wy0.reshape([batch, 1, h_out, w_out]);
        let wy1 = wy1.reshape([batch, 1, h_out, w_out]);

        let top = v00 * wx0.clone() + v01 * wx1.clone();
        let bottom = v10 * wx0 + v11 * wx1;
        let result = top * wy0 + bottom * wy1;

        match mask {
            Some(mask) => result * mask.unsqueeze_dim::<4>(1),
            None => result,
        }
    }

    fn sample_nearest(&self, input: Tensor<B, 4>, grid: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_batch, _channels, h_in, w_in] = input.dims();
        let [_, _, h_out, w_out] = grid.dims();

        let (ix, iy) = self.denormalize(grid, w_in, h_in);

        let ix_n = ix.round().clamp(0.0, (w_in - 1) as f32).int();
        let iy_n = iy.round().clamp(0.0, (h_in - 1) as f32).int();

        self.gather(&input, &iy_n, &ix_n, h_out, w_out)
    }

    /// Denormalize coordinates from `[-1, 1]` to `[0, size-1]`.
    fn denormalize(
        &self,
        grid: Tensor<B, 4>,
        w_in: usize,
        h_in: usize,
    ) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let [batch, _, h_out, w_out] = grid.dims();

        let x = grid
            .clone()
            .slice([0..batch, 0..1, 0..h_out, 0..w_out])
            .squeeze::<3>(1);
        let y = grid
            .slice([0..batch, 1..2, 0..h_out, 0..w_out])
            .squeeze::<3>(1);

        if self.config.align_corners {
            let ix = (x + 1.0) * ((w_in - 1) as f32) / 2.0;
            let iy = (y + 1.0) * ((h_in - 1) as f32) / 2.0;
            (ix, iy)
        } else {
            let ix = ((x + 1.0) * (w_in as f32) - 1.0) / 2.0;
            let iy = ((y + 1.0) * (h_in as f32) - 1.0) / 2.0;
            (ix, iy)
        }
    }

    /// Gather input values at integer pixel coordinates.
    fn gather(
        &self,
        input: &Tensor<B, 4>,
        iy: &Tensor<B, 3, Int>,
        ix: &Tensor<B, 3, Int>,
        h_out: usize,
        w_out: usize,
    ) -> Tensor<B, 4> {
        let [batch, channels, h_in, w_in] = input.dims();

        let input_flat = input.clone().reshape([batch, channels, h_in * w_in]);
        let idx = iy.clone().mul_scalar(w_in as i32) + ix.clone();

        let idx_flat = idx.reshape([batch, 1, h_out * w_out]);
        let idx_rep = idx_flat.repeat(&[1, channels, 1]);

        let gathered = input_flat.gather(2, idx_rep);
        gathered.reshape([batch, channels, h_out, w_out])
    }
}

impl<B: Backend> Default for GridSampler2d<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Functional composition of two deformation fields.
///
/// Treats `flow_b` as absolute sampling coordinates and resamples `flow_a`
/// at them (bilinear, border padding, corner-aligned), realizing
/// `result(x) = flow_a(flow_b(x))`. Interpolation makes the composition
/// only approximately associative.
pub fn compose<B: Backend>(flow_a: Tensor<B, 4>, flow_b: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
    let sampler = GridSampler2d::with_config(GridSamplerConfig {
        padding_mode: PaddingMode::Border,
        interpolation: InterpolationMode::Bilinear,
        align_corners: true,
    });
    sampler.sample(flow_a, flow_b)
}

/// Bilinear resampling of a field to a new spatial resolution in the
/// pixel-center (non-corner-aligned) convention.
pub fn resize_bilinear<B: Backend>(field: Tensor<B, 4>, size: [usize; 2]) -> Result<Tensor<B, 4>> {
    let [batch, _channels, h, w] = field.dims();
    let [h_out, w_out] = size;
    if [h, w] == size {
        return Ok(field);
    }

    let device = field.device();
    let grid = center_grid::<B>(batch, h_out, w_out, &device);

    let sampler = GridSampler2d::with_config(GridSamplerConfig {
        padding_mode: PaddingMode::Border,
        interpolation: InterpolationMode::Bilinear,
        align_corners: false,
    });
    sampler.sample(field, grid)
}

/// Identity grid in the pixel-center convention: `x_i = (2i + 1) / n - 1`.
fn center_grid<B: Backend>(batch: usize, h: usize, w: usize, device: &B::Device) -> Tensor<B, 4> {
    let x = Tensor::arange(0..w as i64, device)
        .float()
        .mul_scalar(2.0 / w as f32)
        .add_scalar(1.0 / w as f32 - 1.0);
    let y = Tensor::arange(0..h as i64, device)
        .float()
        .mul_scalar(2.0 / h as f32)
        .add_scalar(1.0 / h as f32 - 1.0);

    let x_grid = x.reshape([1, 1, 1, w]).repeat(&[batch, 1, h, 1]);
    let y_grid = y.reshape([1, 1, h, 1]).repeat(&[batch, 1, 1, w]);

    Tensor::cat(vec![x_grid, y_grid], 1)
}
