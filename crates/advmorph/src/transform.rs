//! The adversarial morph transform.
//!
//! Owns the low-resolution velocity parameter and drives its lifecycle:
//! uninitialized -> initialized -> training -> optimized, with the
//! training/optimized cycle repeating across adversarial steps. The
//! parameter is the only mutable state besides the per-call diagnostic
//! fields.

use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Distribution, Tensor};
use tracing::{debug, info};

use advmorph_core::sampling::{
    GridSampler2d, GridSamplerConfig, InterpolationMode, PaddingMode,
};
use advmorph_core::{base_grid, MorphError, Result};

use crate::config::{InterpolatorMode, MorphConfig};
use crate::demons::DemonsComposer;

/// Normalize a field per batch element: divide by the absolute maximum,
/// then by the L2 norm. The result has unit magnitude in the sense used by
/// the power-iteration update.
pub fn unit_normalize<B: Backend>(field: Tensor<B, 4>) -> Tensor<B, 4> {
    let [n, c, h, w] = field.dims();
    let numel = c * h * w;

    let flat = field.reshape([n, numel]);
    let abs_max = flat.clone().abs().max_dim(1);
    let flat = flat / (abs_max + 1e-20);
    let l2 = (flat.clone().powf_scalar(2.0).sum_dim(1) + 1e-6).sqrt();
    let flat = flat / l2;

    flat.reshape([n, c, h, w])
}

/// Rescale a velocity field so the displacement it induces respects the
/// epsilon-ball constraint: unit-normalize, then scale by `epsilon`.
pub fn rescale_parameters<B: Backend>(field: Tensor<B, 4>, epsilon: f64) -> Tensor<B, 4> {
    unit_normalize(field).mul_scalar(epsilon)
}

/// Stateful adversarial morph transform over an autodiff backend.
pub struct AdvMorph<B: AutodiffBackend> {
    config: MorphConfig,
    power_iteration: bool,
    device: B::Device,
    composer: DemonsComposer<B>,
    /// Identity sampling grid, computed once per instance.
    grid: Tensor<B, 4>,
    /// The velocity parameter; `None` until initialized.
    param: Option<Tensor<B, 4>>,
    is_training: bool,
    last_diff: Option<Tensor<B, 4>>,
    last_displacement: Option<Tensor<B, 4>>,
}

impl<B: AutodiffBackend> AdvMorph<B> {
    /// Validate the configuration and set up the pipeline. The base grid
    /// and the Gaussian weights are built here and never change.
    pub fn new(config: MorphConfig, power_iteration: bool, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let [h, w] = config.image_size();
        let grid = base_grid::<B>(config.batch(), h, w, device);
        let composer = DemonsComposer::new(config.clone(), device)?;

        Ok(Self {
            config,
            power_iteration,
            device: device.clone(),
            composer,
            grid,
            param: None,
            is_training: false,
            last_diff: None,
            last_displacement: None,
        })
    }

    /// Sample a fresh velocity parameter uniformly in `[-1, 1]` at the
    /// configured `vector_size` and rescale it to the epsilon constraint.
    ///
    /// Transition: uninitialized -> initialized.
    pub fn init_parameters(&mut self) -> Result<Tensor<B, 4>> {
        let [hv, wv] = self.config.vector_size;
        let velocity = Tensor::random(
            [self.config.batch(), 2, hv, wv],
            Distribution::Uniform(-1.0, 1.0),
            &self.device,
        );
        let velocity = rescale_parameters(velocity, self.config.epsilon);

        info!(
            shape = ?velocity.dims(),
            epsilon = self.config.epsilon,
            "initialized morph velocity parameter"
        );
        self.param = Some(velocity.clone());
        Ok(velocity)
    }

    /// Replace the velocity parameter with a caller-supplied field, e.g. a
    /// zero field for deterministic warm starts. Shape-checked against the
    /// configured `vector_size`.
    pub fn set_parameters(&mut self, velocity: Tensor<B, 4>) -> Result<()> {
        let [hv, wv] = self.config.vector_size;
        let expected = [self.config.batch(), 2, hv, wv];
        if velocity.dims() != expected {
            return Err(MorphError::shape_mismatch(
                format!("{expected:?}"),
                &velocity.dims(),
            ));
        }
        self.param = Some(velocity.detach());
        Ok(())
    }

    /// Warp an image batch with the deformation induced by the current
    /// velocity. Initializes the parameter lazily on first use.
    ///
    /// Records the difference image and the displacement field as
    /// diagnostics; the parameter itself is not mutated.
    pub fn forward(&mut self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        if self.param.is_none() {
            self.init_parameters()?;
        }
        let duv = self.effective_velocity(false)?;

        let (grid, displacement) = self.deformation_for(duv)?;
        let warped = self.warp(images.clone(), grid, self.config.interpolator_mode)?;

        self.last_diff = Some(warped.clone() - images);
        self.last_displacement = Some(displacement);
        Ok(warped)
    }

    /// Approximate inverse warp: the identical pipeline driven by the
    /// negated velocity. Exactness degrades with velocity magnitude; the
    /// residual is second-order in the epsilon bound.
    pub fn backward(&mut self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let duv = self.effective_velocity(true)?;
        let (grid, _displacement) = self.deformation_for(duv)?;
        debug!("morph: inverse warp");
        self.warp(images, grid, self.config.interpolator_mode)
    }

    /// Enter the training state: renormalize first in power-iteration
    /// mode, then mark the parameter as gradient-tracked.
    pub fn train(&mut self) -> Result<()> {
        if self.param.is_none() {
            self.init_parameters()?;
        }
        let mut param = self
            .param
            .take()
            .ok_or_else(|| MorphError::state_violation("parameter is not initialized"))?;
        if self.power_iteration {
            param = unit_normalize(param);
        }
        self.param = Some(param.detach().require_grad());
        self.is_training = true;
        Ok(())
    }

    /// Leave the training state.
    pub fn eval(&mut self) {
        self.is_training = false;
    }

    /// Projected-gradient update of the velocity parameter.
    ///
    /// Requires a gradient populated by backpropagating through a prior
    /// forward/backward pass; fails with a state violation otherwise. In
    /// power-iteration mode the parameter is replaced by the
    /// unit-normalized gradient direction and `step_size` is ignored;
    /// otherwise the parameter moves `step_size` along the normalized
    /// gradient. Either way the new value is rebuilt from the inner
    /// backend, cutting the autodiff graph at this boundary. Without the
    /// cut the graph would grow without bound across iterations.
    ///
    /// Transition: training -> optimized.
    pub fn optimize_parameters(
        &mut self,
        grads: &B::Gradients,
        step_size: f64,
    ) -> Result<Tensor<B, 4>> {
        let param = self
            .param
            .as_ref()
            .ok_or_else(|| MorphError::state_violation("parameter is not initialized"))?;

        let grad = param.grad(grads).ok_or_else(|| {
            MorphError::state_violation(
                "no gradient for the velocity parameter; run forward and backpropagate first",
            )
        })?;

        let direction = unit_normalize(grad);
        let updated = if self.power_iteration {
            Tensor::from_inner(direction)
        } else {
            Tensor::from_inner(param.clone().inner() + direction.mul_scalar(step_size))
        };

        debug!(
            power_iteration = self.power_iteration,
            step_size, "morph: optimized velocity parameter"
        );
        self.param = Some(updated.clone());
        Ok(updated)
    }

    /// Stateless application of a caller-supplied sampling grid to an
    /// image batch.
    pub fn warp(
        &self,
        images: Tensor<B, 4>,
        grid: Tensor<B, 4>,
        mode: InterpolatorMode,
    ) -> Result<Tensor<B, 4>> {
        let sampler = GridSampler2d::with_config(GridSamplerConfig {
            padding_mode: PaddingMode::Zeros,
            interpolation: match mode {
                InterpolatorMode::Bilinear => InterpolationMode::Bilinear,
                InterpolatorMode::Nearest => InterpolationMode::Nearest,
            },
            align_corners: true,
        });
        sampler.sample(images, grid)
    }

    /// Deformation grid and displacement field for the current parameter.
    pub fn deformation_field(&self) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
        let param = self
            .param
            .as_ref()
            .ok_or_else(|| MorphError::state_violation("parameter is not initialized"))?;
        self.deformation_for(param.clone())
    }

    /// Difference image recorded by the last forward call.
    pub fn last_diff(&self) -> Option<&Tensor<B, 4>> {
        self.last_diff.as_ref()
    }

    /// Displacement field recorded by the last forward call.
    pub fn last_displacement(&self) -> Option<&Tensor<B, 4>> {
        self.last_displacement.as_ref()
    }

    /// Whether the transform is in the training state.
    pub fn is_training(&self) -> bool {
        self.is_training
    }

    /// The immutable base grid.
    pub fn base_grid(&self) -> &Tensor<B, 4> {
        &self.grid
    }

    /// Current velocity parameter, if initialized.
    pub fn parameters(&self) -> Option<&Tensor<B, 4>> {
        self.param.as_ref()
    }

    fn effective_velocity(&self, negate: bool) -> Result<Tensor<B, 4>> {
        let param = self
            .param
            .as_ref()
            .ok_or_else(|| MorphError::state_violation("parameter is not initialized"))?;

        let mut duv = if self.power_iteration && self.is_training {
            param.clone().mul_scalar(self.config.xi)
        } else {
            param.clone()
        };
        if negate {
            duv = duv.neg();
        }
        Ok(duv)
    }

    fn deformation_for(&self, duv: Tensor<B, 4>) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
        let grid = self
            .composer
            .compose(duv, self.grid.clone(), self.grid.clone(), true)?;
        let displacement = grid.clone() - self.grid.clone();
        Ok((grid, displacement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn transform(power_iteration: bool) -> AdvMorph<TestBackend> {
        let config = MorphConfig::new(0.1, [2, 1, 8, 8], [4, 4]);
        AdvMorph::new(config, power_iteration, &Default::default()).unwrap()
    }

    #[test]
    fn test_unit_normalize_bounds_magnitude() {
        let device = Default::default();
        let field =
            Tensor::<TestBackend, 4>::ones([2, 2, 4, 4], &device).mul_scalar(37.0);
        let normalized = unit_normalize(field);

        let max = normalized.clone().abs().max().into_data();
        assert!(max.as_slice::<f32>().unwrap()[0] <= 1.0 + 1e-5);

        // Per-element L2 norm close to 1.
        let l2 = normalized
            .powf_scalar(2.0)
            .reshape([2, 32])
            .sum_dim(1)
            .sqrt()
            .into_data();
        assert!(l2
            .as_slice::<f32>()
            .unwrap()
            .iter()
            .all(|v| (v - 1.0).abs() < 1e-2));
    }

    #[test]
    fn test_set_parameters_checks_shape() {
        let mut morph = transform(false);
        let device = Default::default();
        let bad = Tensor::<TestBackend, 4>::zeros([2, 2, 8, 8], &device);
        assert!(matches!(
            morph.set_parameters(bad),
            Err(MorphError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_train_initializes_and_tracks_parameter() {
        let mut morph = transform(false);
        assert!(morph.parameters().is_none());

        morph.train().unwrap();
        assert!(morph.is_training());
        assert!(morph.parameters().unwrap().is_require_grad());
    }

    #[test]
    fn test_optimize_before_gradient_fails() {
        let mut morph = transform(false);
        morph.train().unwrap();

        // Gradients from an unrelated computation carry nothing for the
        // velocity parameter.
        let device = Default::default();
        let unrelated = Tensor::<TestBackend, 1>::ones([4], &device)
            .require_grad()
            .sum();
        let grads = unrelated.backward();

        let err = morph.optimize_parameters(&grads, 0.1).unwrap_err();
        assert!(matches!(err, MorphError::StateViolation(_)));
    }

    #[test]
    fn test_power_iteration_update_is_detached_unit_direction() {
        let mut morph = transform(true);
        morph.train().unwrap();

        let device = Default::default();
        TestBackend::seed(5);
        let images = Tensor::<TestBackend, 4>::random(
            [2, 1, 8, 8],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let warped = morph.forward(images).unwrap();
        let loss = warped.powf_scalar(2.0).sum();
        let grads = loss.backward();

        let updated = morph.optimize_parameters(&grads, 123.0).unwrap();
        // Direction-only update: unit magnitude regardless of step size.
        let max = updated.clone().abs().max().into_data();
        assert!(max.as_slice::<f32>().unwrap()[0] <= 1.0 + 1e-5);
        // Detach boundary: the stored parameter no longer tracks a graph.
        assert!(!updated.is_require_grad());
    }
}
