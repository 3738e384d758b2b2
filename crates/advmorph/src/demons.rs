//! Demons-style deformation composition.
//!
//! Orchestrates the per-call pipeline: smooth the velocity, resample it to
//! the image resolution, exponentiate it, compose with the running
//! deformation, optionally re-smooth, clamp.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use advmorph_core::sampling::{compose, resize_bilinear};
use advmorph_core::{GaussianSmoother, Result};

use crate::config::MorphConfig;
use crate::integration::integrate_velocity;

/// Builds a deformation grid from a velocity field and a running
/// deformation.
pub struct DemonsComposer<B: Backend> {
    smoother: GaussianSmoother<B>,
    config: MorphConfig,
}

impl<B: Backend> DemonsComposer<B> {
    /// Create a composer; the Gaussian weights are precomputed here and
    /// read-only afterwards.
    pub fn new(config: MorphConfig, device: &B::Device) -> Result<Self> {
        let smoother = GaussianSmoother::new(config.kernel_size, config.sigma, 2, device)?;
        Ok(Self { smoother, config })
    }

    /// Compose `velocity` onto `current_deformation`.
    ///
    /// The returned grid holds absolute sampling coordinates, hard-clamped
    /// to `[-1, 1]` per coordinate. When `smooth` is set the composed
    /// displacement is low-passed once more before clamping, suppressing
    /// high-frequency folding.
    pub fn compose(
        &self,
        velocity: Tensor<B, 4>,
        current_deformation: Tensor<B, 4>,
        base_grid: Tensor<B, 4>,
        smooth: bool,
    ) -> Result<Tensor<B, 4>> {
        let image_size = self.config.image_size();

        let velocity = self.smoother.apply(velocity, self.config.smooth_iter)?;
        let velocity = resize_bilinear(velocity, image_size)?;

        let mut displacement = integrate_velocity(
            velocity,
            base_grid.clone(),
            self.config.num_steps,
            self.config.integration_type,
        )?;
        let disp_dims = displacement.dims();
        if [disp_dims[2], disp_dims[3]] != image_size {
            displacement = resize_bilinear(displacement, image_size)?;
        }

        let mut deformation = compose(current_deformation, displacement + base_grid.clone())?;

        if smooth {
            let smoothed = self
                .smoother
                .apply(deformation - base_grid.clone(), 1)?;
            deformation = smoothed + base_grid;
        }

        Ok(deformation.clamp(-1.0, 1.0))
    }
}
