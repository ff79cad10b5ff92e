//! Cell-level configuration shared by the f64 reference implementation and
//! the fused GPU kernels.

use burn::tensor::DType;
use serde::{Deserialize, Serialize};

use crate::error::LigruError;

/// Slope of the negative branch of leaky ReLU.
pub const LEAKY_SLOPE: f64 = 0.01;

/// Epsilon added to the variance in the recurrent layer-norm sub-step.
pub const LN_EPSILON: f32 = 1e-5;

/// Pointwise nonlinearity applied to the candidate pre-activation.
///
/// The wire codes (0..=3) match the integer selector used by host bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    LeakyRelu,
    Sin,
    Tanh,
}

impl Activation {
    /// Decode an integer activation selector. Unknown codes are a
    /// configuration error, never a silent no-op.
    pub fn from_code(code: u32) -> Result<Self, LigruError> {
        match code {
            0 => Ok(Self::Relu),
            1 => Ok(Self::LeakyRelu),
            2 => Ok(Self::Sin),
            3 => Ok(Self::Tanh),
            _ => Err(LigruError::UnknownActivation(code)),
        }
    }

    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Relu => 0,
            Self::LeakyRelu => 1,
            Self::Sin => 2,
            Self::Tanh => 3,
        }
    }

    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Relu => x.max(0.0),
            Self::LeakyRelu => {
                if x > 0.0 {
                    x
                } else {
                    x * LEAKY_SLOPE
                }
            }
            Self::Sin => x.sin(),
            Self::Tanh => x.tanh(),
        }
    }

    /// Derivative at `x`, given `fx = apply(x)`. Tanh reuses the forward
    /// value, matching what the gradient kernel reads from the save buffer.
    #[must_use]
    pub fn derivative(self, x: f64, fx: f64) -> f64 {
        match self {
            Self::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::LeakyRelu => {
                if x > 0.0 {
                    1.0
                } else {
                    LEAKY_SLOPE
                }
            }
            Self::Sin => x.cos(),
            Self::Tanh => 1.0 - fx * fx,
        }
    }
}

/// Whether the recurrent contribution is layer-normalized before the
/// pointwise step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellVariant {
    Plain,
    Normalized,
}

/// Configuration for one cell invocation. Dimensions are fixed for the
/// lifetime of a pass object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LigruConfig {
    pub seq_len: usize,
    pub batch: usize,
    pub hidden: usize,
    pub activation: Activation,
    pub variant: CellVariant,
    /// Training mode populates the [T, N, 3H] save buffer the backward pass
    /// reads from.
    pub training: bool,
}

impl LigruConfig {
    #[must_use]
    pub fn new(
        seq_len: usize,
        batch: usize,
        hidden: usize,
        activation: Activation,
        variant: CellVariant,
        training: bool,
    ) -> Self {
        Self {
            seq_len,
            batch,
            hidden,
            activation,
            variant,
            training,
        }
    }

    /// Fail fast on configurations the kernels cannot execute. Inference
    /// mode supports only relu, leaky_relu and tanh.
    pub fn validate(&self) -> Result<(), LigruError> {
        if self.seq_len == 0 || self.batch == 0 || self.hidden == 0 {
            return Err(LigruError::InvalidDims {
                seq_len: self.seq_len,
                batch: self.batch,
                hidden: self.hidden,
            });
        }
        if !self.training && self.activation == Activation::Sin {
            return Err(LigruError::UnsupportedActivation {
                activation: self.activation,
            });
        }
        Ok(())
    }

    /// The normalized cell has no f16 backward path; reject it up front
    /// rather than miscompute.
    pub fn validate_backward_dtype(&self, dtype: DType) -> Result<(), LigruError> {
        if self.variant == CellVariant::Normalized && dtype == DType::F16 {
            return Err(LigruError::UnsupportedPrecision {
                dtype,
                variant: self.variant,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_codes_round_trip() {
        for code in 0..4 {
            assert_eq!(Activation::from_code(code).unwrap().code(), code);
        }
    }

    #[test]
    fn unknown_activation_code_is_an_error() {
        assert_eq!(
            Activation::from_code(7),
            Err(LigruError::UnknownActivation(7))
        );
    }

    #[test]
    fn sin_rejected_in_inference_mode() {
        let config = LigruConfig::new(4, 2, 8, Activation::Sin, CellVariant::Plain, false);
        assert_eq!(
            config.validate(),
            Err(LigruError::UnsupportedActivation {
                activation: Activation::Sin
            })
        );
        let training = LigruConfig { training: true, ..config };
        assert_eq!(training.validate(), Ok(()));
    }

    #[test]
    fn zero_dims_rejected() {
        let config = LigruConfig::new(0, 2, 8, Activation::Tanh, CellVariant::Plain, true);
        assert!(matches!(
            config.validate(),
            Err(LigruError::InvalidDims { .. })
        ));
    }

    #[test]
    fn f16_normalized_backward_rejected() {
        let config = LigruConfig::new(4, 2, 8, Activation::Tanh, CellVariant::Normalized, true);
        assert!(matches!(
            config.validate_backward_dtype(DType::F16),
            Err(LigruError::UnsupportedPrecision { .. })
        ));
        assert_eq!(config.validate_backward_dtype(DType::F32), Ok(()));

        let plain = LigruConfig {
            variant: CellVariant::Plain,
            ..config
        };
        assert_eq!(plain.validate_backward_dtype(DType::F16), Ok(()));
    }
}
