//! Normalized coordinate grids.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Generate the identity sampling grid for a batch of 2-D images.
///
/// Returns a tensor of shape `[N, 2, H, W]` where channel 0 holds the
/// horizontal coordinates linearly spaced in `[-1, 1]` (repeated across
/// rows) and channel 1 the vertical coordinates (repeated across columns).
///
/// Pure function of `(batch, h, w)`: identical arguments yield identical
/// tensors.
pub fn base_grid<B: Backend>(
    batch: usize,
    h: usize,
    w: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let x = linspace_normalized::<B>(w, device);
    let y = linspace_normalized::<B>(h, device);

    let x_grid = x.reshape([1, 1, 1, w]).repeat(&[batch, 1, h, 1]);
    let y_grid = y.reshape([1, 1, h, 1]).repeat(&[batch, 1, 1, w]);

    Tensor::cat(vec![x_grid, y_grid], 1)
}

/// `n` coordinates linearly spaced over `[-1, 1]`.
///
/// A degenerate axis of length 1 maps to `-1`.
fn linspace_normalized<B: Backend>(n: usize, device: &B::Device) -> Tensor<B, 1> {
    if n < 2 {
        return Tensor::from_floats([-1.0], device);
    }
    Tensor::arange(0..n as i64, device)
        .float()
        .mul_scalar(2.0 / (n as f32 - 1.0))
        .sub_scalar(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_grid_shape_and_corners() {
        let device = Default::default();
        let grid = base_grid::<TestBackend>(2, 4, 6, &device);
        assert_eq!(grid.dims(), [2, 2, 4, 6]);

        let data = grid.into_data();
        let values = data.as_slice::<f32>().unwrap();
        // Channel 0, first row: linspace(-1, 1, 6).
        assert!((values[0] + 1.0).abs() < 1e-6);
        assert!((values[5] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_grid_determinism() {
        let device = Default::default();
        let a = base_grid::<TestBackend>(1, 8, 8, &device).into_data();
        let b = base_grid::<TestBackend>(1, 8, 8, &device).into_data();
        assert_eq!(
            a.as_slice::<f32>().unwrap(),
            b.as_slice::<f32>().unwrap()
        );
    }

    #[test]
    fn test_degenerate_axis() {
        let device = Default::default();
        let grid = base_grid::<TestBackend>(1, 1, 3, &device);
        let data = grid.into_data();
        let values = data.as_slice::<f32>().unwrap();
        // Vertical channel collapses to -1 everywhere.
        assert!(values[3..6].iter().all(|v| (*v + 1.0).abs() < 1e-6));
    }
}
