//! High-level tensor entry points for the fused Li-GRU cell.

use burn::tensor::{Tensor, TensorPrimitive};
use ligru_core::{Activation, CellVariant, LigruConfig, LigruError};
use ligru_kernels::FusedKernelBackend;

use crate::{
    LigruKernel, LigruNormKernel,
    cell::LigruInputs,
};

fn check_shapes(
    wx: [usize; 3],
    h_init: [usize; 2],
    u: [usize; 2],
) -> Result<(usize, usize, usize), LigruError> {
    let [seq_len, batch, two_h] = wx;
    let [batch_h, hidden] = h_init;
    if batch != batch_h || two_h != 2 * hidden || u != [hidden, 2 * hidden] {
        return Err(LigruError::ShapeMismatch { wx, h_init, u });
    }
    Ok((seq_len, batch, hidden))
}

/// Run the plain fused Li-GRU cell over a sequence.
///
/// - `wx`: precomputed input projections `[T, N, 2H]`
/// - `h_init`: initial hidden state `[N, H]`
/// - `u`: recurrent weights `[H, 2H]`
///
/// Returns the hidden trajectory `[T + 1, N, H]` with `h_init` at step 0.
/// On an autodiff backend the output is tracked and gradients flow to all
/// three inputs.
pub fn ligru_forward<B: FusedKernelBackend<LigruKernel>>(
    wx: Tensor<B, 3>,
    h_init: Tensor<B, 2>,
    u: Tensor<B, 2>,
    activation: Activation,
    training: bool,
) -> Result<Tensor<B, 3>, LigruError> {
    let (seq_len, batch, hidden) = check_shapes(wx.dims(), h_init.dims(), u.dims())?;

    let config = LigruConfig::new(
        seq_len,
        batch,
        hidden,
        activation,
        CellVariant::Plain,
        training,
    );
    config.validate()?;

    let inputs = LigruInputs {
        wx: wx.into_primitive().tensor(),
        h_init: h_init.into_primitive().tensor(),
        u: u.into_primitive().tensor(),
    };
    let (outputs, _saved) = <B as FusedKernelBackend<LigruKernel>>::forward(inputs, config);
    Ok(Tensor::from_primitive(TensorPrimitive::Float(outputs.h)))
}

/// Run the fused Li-GRU cell with layer-normalized recurrent
/// pre-activations.
///
/// Same shapes and tracking behavior as [`ligru_forward`]. In training mode
/// the backward pass is rejected up front for f16, which loses too much
/// precision in the recomputed layer-norm statistics.
pub fn ligru_norm_forward<B: FusedKernelBackend<LigruNormKernel>>(
    wx: Tensor<B, 3>,
    h_init: Tensor<B, 2>,
    u: Tensor<B, 2>,
    activation: Activation,
    training: bool,
) -> Result<Tensor<B, 3>, LigruError> {
    let (seq_len, batch, hidden) = check_shapes(wx.dims(), h_init.dims(), u.dims())?;

    let config = LigruConfig::new(
        seq_len,
        batch,
        hidden,
        activation,
        CellVariant::Normalized,
        training,
    );
    config.validate()?;
    if training {
        config.validate_backward_dtype(wx.dtype())?;
    }

    let inputs = LigruInputs {
        wx: wx.into_primitive().tensor(),
        h_init: h_init.into_primitive().tensor(),
        u: u.into_primitive().tensor(),
    };
    let (outputs, _saved) = <B as FusedKernelBackend<LigruNormKernel>>::forward(inputs, config);
    Ok(Tensor::from_primitive(TensorPrimitive::Float(outputs.h)))
}
