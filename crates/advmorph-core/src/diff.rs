//! Finite-difference spatial derivatives and the Jacobian-determinant
//! diagnostic.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::{MorphError, Result};

/// Finite-difference derivatives of a `[N, C, H, W]` field.
///
/// Interior cells use the central difference `0.5 * (f[i+1] - f[i-1])`;
/// the two boundary cells of each axis use one-sided forward/backward
/// differences. Returns `(dx, dy)` with the same shape as the input.
pub fn image_diff<B: Backend>(field: Tensor<B, 4>) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
    let [n, c, h, w] = field.dims();
    if h < 2 || w < 2 {
        return Err(MorphError::shape_mismatch(
            "[N, C, H >= 2, W >= 2]",
            &[n, c, h, w],
        ));
    }

    // Horizontal derivative along the width axis.
    let first = field.clone().slice([0..n, 0..c, 0..h, 1..2])
        - field.clone().slice([0..n, 0..c, 0..h, 0..1]);
    let last = field.clone().slice([0..n, 0..c, 0..h, w - 1..w])
        - field.clone().slice([0..n, 0..c, 0..h, w - 2..w - 1]);
    let dx = if w > 2 {
        let central = (field.clone().slice([0..n, 0..c, 0..h, 2..w])
            - field.clone().slice([0..n, 0..c, 0..h, 0..w - 2]))
        .mul_scalar(0.5);
        Tensor::cat(vec![first, central, last], 3)
    } else {
        Tensor::cat(vec![first, last], 3)
    };

    // Vertical derivative along the height axis.
    let first = field.clone().slice([0..n, 0..c, 1..2, 0..w])
        - field.clone().slice([0..n, 0..c, 0..1, 0..w]);
    let last = field.clone().slice([0..n, 0..c, h - 1..h, 0..w])
        - field.clone().slice([0..n, 0..c, h - 2..h - 1, 0..w]);
    let dy = if h > 2 {
        let central = (field.clone().slice([0..n, 0..c, 2..h, 0..w])
            - field.slice([0..n, 0..c, 0..h - 2, 0..w]))
        .mul_scalar(0.5);
        Tensor::cat(vec![first, central, last], 2)
    } else {
        Tensor::cat(vec![first, last], 2)
    };

    Ok((dx, dy))
}

/// Jacobian determinant of a 2-channel displacement field `[N, 2, H, W]`.
///
/// Returns `(1 + dxx) * (1 + dyy) - dxy * dyx` per pixel, the local
/// area-scaling factor of the induced mapping. Values <= 0 indicate
/// non-invertible folding; this is a diagnostic only and never gates the
/// deformation pipeline.
pub fn jacobian_determinant<B: Backend>(displacement: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
    let [n, c, h, w] = displacement.dims();
    if c != 2 {
        return Err(MorphError::shape_mismatch("[N, 2, H, W]", &[n, c, h, w]));
    }

    let du = displacement.clone().slice([0..n, 0..1, 0..h, 0..w]);
    let dv = displacement.slice([0..n, 1..2, 0..h, 0..w]);

    let (dxx, dxy) = image_diff(du)?;
    let (dyx, dyy) = image_diff(dv)?;

    Ok((dxx + 1.0) * (dyy + 1.0) - dxy * dyx)
}
