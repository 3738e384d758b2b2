//! Transform configuration.

use std::str::FromStr;

use serde::Deserialize;

use advmorph_core::{MorphError, Result};

/// Interpolation mode for the image warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolatorMode {
    Bilinear,
    Nearest,
}

impl FromStr for InterpolatorMode {
    type Err = MorphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bilinear" => Ok(Self::Bilinear),
            "nearest" => Ok(Self::Nearest),
            other => Err(MorphError::UnsupportedOption {
                option: "interpolator_mode",
                value: other.into(),
                valid: "bilinear, nearest",
            }),
        }
    }
}

/// Velocity-field integration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum IntegrationType {
    /// Scaling-and-squaring: repeated self-composition, doubling the
    /// effective integration time each step.
    #[serde(rename = "ss")]
    ScalingSquaring,
    /// Euler integration: linear accumulation of a fixed interval flow.
    /// Cheaper per step but less accurate than squaring.
    #[serde(rename = "euler")]
    Euler,
}

impl FromStr for IntegrationType {
    type Err = MorphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ss" => Ok(Self::ScalingSquaring),
            "euler" => Ok(Self::Euler),
            other => Err(MorphError::UnsupportedOption {
                option: "integration_type",
                value: other.into(),
                valid: "ss, euler",
            }),
        }
    }
}

/// Configuration of the morph transform, fixed at construction.
///
/// Deserialization goes through [`PartialMorphConfig`], so an absent
/// required key fails fast as [`MorphError::MissingConfig`] naming the
/// key, and value consistency is checked before any computation.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "PartialMorphConfig")]
pub struct MorphConfig {
    /// Maximum displacement magnitude of the induced deformation.
    pub epsilon: f64,
    /// Image batch shape `[N, C, H, W]`.
    pub data_size: [usize; 4],
    /// Resolution `[Hv, Wv]` of the optimizable velocity field, typically
    /// coarser than the image.
    pub vector_size: [usize; 2],
    /// Interpolation mode for the image warp.
    pub interpolator_mode: InterpolatorMode,
    /// Power-iteration step fraction.
    pub xi: f64,
    /// Gaussian smoothing standard deviation.
    pub sigma: f64,
    /// Gaussian kernel side length (enlarged automatically when too small
    /// for `sigma`).
    pub kernel_size: usize,
    /// Smoothing iterations applied to the velocity field.
    pub smooth_iter: usize,
    /// Integration steps for the vector-field exponentiation.
    pub num_steps: usize,
    /// Integration scheme.
    pub integration_type: IntegrationType,
}

/// Raw deserialization target: required keys are optional here so their
/// absence can be reported as a [`MorphError::MissingConfig`] instead of a
/// format-specific deserializer message.
#[derive(Debug, Default, Deserialize)]
struct PartialMorphConfig {
    epsilon: Option<f64>,
    data_size: Option<[usize; 4]>,
    vector_size: Option<[usize; 2]>,
    #[serde(default)]
    interpolator_mode: Option<InterpolatorMode>,
    #[serde(default)]
    xi: Option<f64>,
    #[serde(default)]
    sigma: Option<f64>,
    #[serde(default)]
    kernel_size: Option<usize>,
    #[serde(default)]
    smooth_iter: Option<usize>,
    #[serde(default)]
    num_steps: Option<usize>,
    #[serde(default)]
    integration_type: Option<IntegrationType>,
}

impl TryFrom<PartialMorphConfig> for MorphConfig {
    type Error = MorphError;

    fn try_from(raw: PartialMorphConfig) -> Result<Self> {
        let config = Self {
            epsilon: raw
                .epsilon
                .ok_or(MorphError::MissingConfig { key: "epsilon" })?,
            data_size: raw
                .data_size
                .ok_or(MorphError::MissingConfig { key: "data_size" })?,
            vector_size: raw
                .vector_size
                .ok_or(MorphError::MissingConfig { key: "vector_size" })?,
            interpolator_mode: raw.interpolator_mode.unwrap_or_else(default_interpolator),
            xi: raw.xi.unwrap_or_else(default_xi),
            sigma: raw.sigma.unwrap_or_else(default_sigma),
            kernel_size: raw.kernel_size.unwrap_or_else(default_kernel_size),
            smooth_iter: raw.smooth_iter.unwrap_or_else(default_smooth_iter),
            num_steps: raw.num_steps.unwrap_or_else(default_num_steps),
            integration_type: raw.integration_type.unwrap_or_else(default_integration),
        };
        config.validate()?;
        Ok(config)
    }
}

fn default_interpolator() -> InterpolatorMode {
    InterpolatorMode::Bilinear
}

fn default_xi() -> f64 {
    0.5
}

fn default_sigma() -> f64 {
    1.0
}

fn default_kernel_size() -> usize {
    3
}

fn default_smooth_iter() -> usize {
    1
}

fn default_num_steps() -> usize {
    8
}

fn default_integration() -> IntegrationType {
    IntegrationType::ScalingSquaring
}

impl MorphConfig {
    /// Minimal configuration with the defaults recommended by the demons
    /// literature (sigma 1, kernel 3, one smoothing pass, eight
    /// integration steps, scaling-and-squaring).
    pub fn new(epsilon: f64, data_size: [usize; 4], vector_size: [usize; 2]) -> Self {
        Self {
            epsilon,
            data_size,
            vector_size,
            interpolator_mode: default_interpolator(),
            xi: default_xi(),
            sigma: default_sigma(),
            kernel_size: default_kernel_size(),
            smooth_iter: default_smooth_iter(),
            num_steps: default_num_steps(),
            integration_type: default_integration(),
        }
    }

    /// Check value consistency. Called by the transform constructor before
    /// any tensor is allocated.
    pub fn validate(&self) -> Result<()> {
        if self.epsilon <= 0.0 {
            return Err(MorphError::invalid_configuration(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.data_size.iter().any(|&d| d == 0) {
            return Err(MorphError::invalid_configuration(format!(
                "data_size must be nonzero in every dimension, got {:?}",
                self.data_size
            )));
        }
        if self.vector_size.iter().any(|&d| d == 0) {
            return Err(MorphError::invalid_configuration(format!(
                "vector_size must be nonzero, got {:?}",
                self.vector_size
            )));
        }
        if self.vector_size[0] > self.data_size[2] || self.vector_size[1] > self.data_size[3] {
            return Err(MorphError::invalid_configuration(format!(
                "vector_size {:?} exceeds image resolution {:?}",
                self.vector_size,
                [self.data_size[2], self.data_size[3]]
            )));
        }
        if !(0.0..=1.0).contains(&self.xi) {
            return Err(MorphError::invalid_configuration(format!(
                "xi must lie in [0, 1], got {}",
                self.xi
            )));
        }
        if self.sigma <= 0.0 {
            return Err(MorphError::invalid_configuration(format!(
                "sigma must be positive, got {}",
                self.sigma
            )));
        }
        if self.smooth_iter == 0 {
            return Err(MorphError::invalid_configuration(
                "smooth_iter must be >= 1",
            ));
        }
        if self.num_steps == 0 {
            return Err(MorphError::invalid_configuration(
                "num_steps must be >= 1",
            ));
        }
        Ok(())
    }

    /// Image batch size.
    pub fn batch(&self) -> usize {
        self.data_size[0]
    }

    /// Image spatial resolution `[H, W]`.
    pub fn image_size(&self) -> [usize; 2] {
        [self.data_size[2], self.data_size[3]]
    }
}
