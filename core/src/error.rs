use burn::tensor::DType;
use thiserror::Error;

use crate::cell::{Activation, CellVariant};

/// Errors surfaced by pass construction and configuration validation.
///
/// Device-side failures (launch errors, sync errors) are not represented here;
/// they propagate as `cubecl` execution errors from the sync points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LigruError {
    #[error("unknown activation code {0} (expected 0=relu, 1=leaky_relu, 2=sin, 3=tanh)")]
    UnknownActivation(u32),

    #[error("activation {activation:?} is not supported in inference mode")]
    UnsupportedActivation { activation: Activation },

    #[error("dtype {dtype:?} is not supported by the {variant:?} cell backward pass")]
    UnsupportedPrecision { dtype: DType, variant: CellVariant },

    #[error("invalid dimensions: seq_len={seq_len}, batch={batch}, hidden={hidden}")]
    InvalidDims {
        seq_len: usize,
        batch: usize,
        hidden: usize,
    },

    #[error(
        "input shapes disagree: wx {wx:?} must be [T, N, 2H], h_init {h_init:?} [N, H], u {u:?} [H, 2H]"
    )]
    ShapeMismatch {
        wx: [usize; 3],
        h_init: [usize; 2],
        u: [usize; 2],
    },

    #[error("backward pass requires the save buffer from a training-mode forward")]
    MissingSaveBuffer,
}
