//! Tensor bundles crossing the kernel boundary.

use ligru_kernels::tensor_bundle;

tensor_bundle! {
    /// Inputs to the fused Li-GRU cell.
    ///
    /// - `wx`: precomputed input projections `[T, N, 2H]`, candidate half at
    ///   offset 0 and update half at offset `H`
    /// - `h_init`: initial hidden state `[N, H]`
    /// - `u`: recurrent weights `[H, 2H]`, same half layout as `wx`
    pub struct LigruInputs { wx, h_init, u }
}

tensor_bundle! {
    /// Output of the fused Li-GRU cell: the full hidden trajectory
    /// `[T + 1, N, H]` with `h_init` at step 0.
    pub struct LigruOutputs { h }
}

tensor_bundle! {
    /// State saved by the plain cell forward pass.
    ///
    /// `v` is the save buffer `[T, N, 3H]` holding, per step, the candidate
    /// pre-activation `a`, the update gate `z`, and the candidate `hcand`.
    pub struct LigruSavedState { u, h, v }
}

tensor_bundle! {
    /// State saved by the normalized cell forward pass.
    ///
    /// Extends [`LigruSavedState`] with `uh_cache` `[T, N, 2H]`, the pre-norm
    /// recurrent projections needed to rebuild layer-norm statistics in
    /// backward.
    pub struct LigruNormSavedState { u, h, v, uh_cache }
}
