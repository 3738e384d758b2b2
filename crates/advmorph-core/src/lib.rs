//! Core tensor utilities for smooth, approximately invertible 2-D
//! deformation fields.
//!
//! Everything in this crate is a pure function of its tensor inputs and is
//! generic over the Burn backend, so the same numeric contracts hold on CPU
//! and accelerator backends.

pub mod diff;
pub mod error;
pub mod filter;
pub mod grid;
pub mod sampling;

pub use error::{MorphError, Result};
pub use filter::GaussianSmoother;
pub use grid::base_grid;
pub use sampling::{GridSampler2d, InterpolationMode, PaddingMode};
