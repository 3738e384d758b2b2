//! Smooth, approximately invertible (diffeomorphic) spatial deformations
//! for adversarial robustness training.
//!
//! A low-resolution velocity field is the sole optimizable parameter. Each
//! forward pass smooths it, integrates it into a diffeomorphic
//! displacement (scaling-and-squaring or Euler), composes it with the
//! running deformation, clamps the result to the normalized coordinate
//! range and warps the image batch with it. [`AdvMorph`] drives the
//! projected-gradient optimization lifecycle around that pipeline,
//! including a power-iteration variant.

pub mod augment;
pub mod config;
pub mod demons;
pub mod integration;
pub mod transform;

pub use advmorph_core::{MorphError, Result};
pub use augment::AdvTransform;
pub use config::{IntegrationType, InterpolatorMode, MorphConfig};
pub use demons::DemonsComposer;
pub use integration::integrate_velocity;
pub use transform::AdvMorph;
