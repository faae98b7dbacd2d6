//! Configuration for a round-trip run.
//!
//! Every field has a default, so an empty TOML document (or no file at all)
//! reproduces the reference run: a 5×5 grid, batch 1, all-ones input on the
//! host-emulated device, unnormalized inverse output.
//!
//! # Example TOML
//!
//! ```toml
//! backend = "cuda"
//! device = 0
//! normalize = false
//! reupload_frequency = false
//! tolerance = 1e-4
//!
//! [shape]
//! dims = [64, 48]
//! batch = 4
//!
//! [signal]
//! kind = "ramp"
//! ```

use serde::{Deserialize, Serialize};

use crate::driver::RoundTripOptions;
use crate::shape::{for_each_index, LayoutDescriptor, TransformShape};

// ============================================================================
// Backend Selection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Host-emulated device built on rustfft.
    #[default]
    Cpu,
    /// cuFFT on a CUDA device.
    Cuda,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Cpu => write!(f, "cpu"),
            BackendKind::Cuda => write!(f, "cuda"),
        }
    }
}

// ============================================================================
// Input Signal
// ============================================================================

/// Synthetic real input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignalSpec {
    /// Every sample equals `value`.
    Constant {
        #[serde(default = "default_signal_value")]
        value: f32,
    },
    /// Samples count up from 0 in row-major order across all batches.
    Ramp,
}

impl Default for SignalSpec {
    fn default() -> Self {
        SignalSpec::Constant {
            value: default_signal_value(),
        }
    }
}

impl SignalSpec {
    /// Host input buffer for `shape` placed per `layout`; padding stays zero.
    ///
    /// The layout must already have been accepted by a plan for `shape`;
    /// [`RoundTrip::run_signal`](crate::driver::RoundTrip::run_signal) only
    /// calls this after planning.
    pub fn generate(&self, shape: &TransformShape, layout: &LayoutDescriptor) -> Vec<f32> {
        let mut data = vec![0.0f32; layout.required_len(shape.dims(), shape.batch())];
        let mut counter = 0usize;
        for batch in 0..shape.batch() {
            for_each_index(shape.dims(), |index| {
                data[layout.offset(batch, index)] = match *self {
                    SignalSpec::Constant { value } => value,
                    SignalSpec::Ramp => counter as f32,
                };
                counter += 1;
            });
        }
        data
    }
}

fn default_signal_value() -> f32 {
    1.0
}

// ============================================================================
// Round-Trip Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTripConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Device ordinal (CUDA backend only).
    #[serde(default)]
    pub device: usize,

    #[serde(default = "default_shape")]
    pub shape: TransformShape,

    #[serde(default)]
    pub signal: SignalSpec,

    /// Divide the inverse output by `prod(dims)` on the host.
    #[serde(default)]
    pub normalize: bool,

    /// Upload the host spectrum again before the inverse transform.
    #[serde(default)]
    pub reupload_frequency: bool,

    /// Relative tolerance used when verifying the round trip.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for RoundTripConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            device: 0,
            shape: default_shape(),
            signal: SignalSpec::default(),
            normalize: false,
            reupload_frequency: false,
            tolerance: default_tolerance(),
        }
    }
}

fn default_shape() -> TransformShape {
    TransformShape::new_2d(5, 5, 1)
}

fn default_tolerance() -> f64 {
    1e-4
}

impl RoundTripConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: RoundTripConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no backend could ever accept. Rank and layout limits are
    /// left to the plan builder so they surface as plan errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shape.dims().is_empty() {
            return Err(ConfigError::Invalid("shape.dims must not be empty".into()));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if let SignalSpec::Constant { value } = self.signal {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "signal value must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn options(&self) -> RoundTripOptions {
        RoundTripOptions {
            normalize: self.normalize,
            reupload_frequency: self.reupload_frequency,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Tests
// ============================================================================
