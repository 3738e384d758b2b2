//! Shared capability interface for adversarial augmentation transforms.
//!
//! Sibling variants (intensity, noise, affine) plug into the same training
//! loop through this trait rather than through inheritance; the morph
//! transform is the only implementation in this crate.

use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;

use advmorph_core::Result;

use crate::transform::AdvMorph;

/// Capabilities every adversarial augmentation transform exposes to the
/// training loop.
pub trait AdvTransform<B: AutodiffBackend> {
    /// Sample fresh transform parameters; returns the new parameter value.
    fn init_parameters(&mut self) -> Result<Tensor<B, 4>>;

    /// Apply the transform to an image batch.
    fn forward(&mut self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>>;

    /// Apply the (approximate) inverse transform.
    fn backward(&mut self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>>;

    /// Update the parameters from gradients accumulated on them.
    fn optimize_parameters(
        &mut self,
        grads: &B::Gradients,
        step_size: f64,
    ) -> Result<Tensor<B, 4>>;

    /// Short identifier for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the transform moves pixels (geometric) rather than altering
    /// their values.
    fn is_geometric(&self) -> bool;
}

impl<B: AutodiffBackend> AdvTransform<B> for AdvMorph<B> {
    fn init_parameters(&mut self) -> Result<Tensor<B, 4>> {
        AdvMorph::init_parameters(self)
    }

    fn forward(&mut self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        AdvMorph::forward(self, images)
    }

    fn backward(&mut self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        AdvMorph::backward(self, images)
    }

    fn optimize_parameters(
        &mut self,
        grads: &B::Gradients,
        step_size: f64,
    ) -> Result<Tensor<B, 4>> {
        AdvMorph::optimize_parameters(self, grads, step_size)
    }

    fn name(&self) -> &'static str {
        "morph"
    }

    fn is_geometric(&self) -> bool {
        true
    }
}
