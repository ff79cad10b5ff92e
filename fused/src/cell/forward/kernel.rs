//! Pointwise Li-GRU step kernel.
//!
//! One launch advances the recurrence by a single timestep. The recurrent
//! projection `uh = h[t] @ u` has already been computed (and, for the
//! normalized variant, layer-normalized) into a `[N, 2H]` scratch buffer, so
//! each thread handles one `(batch, unit)` pair:
//!
//! 1. `a = wx[t, n, j] + uh[n, j]` (candidate pre-activation)
//! 2. `z = sigmoid(wx[t, n, H + j] + uh[n, H + j])` (update gate)
//! 3. `hcand = act(a)`
//! 4. `h[t + 1] = z * h[t] + (1 - z) * hcand`
//!
//! In training mode the kernel also writes `(a, z, hcand)` into the save
//! buffer `v` at layout `[T, N, 3H]`.

use cubecl::prelude::*;

use crate::LigruKernelConfig;

pub const LEAKY_SLOPE: f32 = 0.01;

#[cube]
pub fn sigmoid<F: Float>(x: F) -> F {
    F::new(1.0) / (F::new(1.0) + F::exp(-x))
}

/// Candidate activation, specialized at compile time on the activation code
/// (0 = relu, 1 = leaky_relu, 2 = sin, 3 = tanh).
#[cube]
pub fn candidate<F: Float>(a: F, #[comptime] code: u32) -> F {
    let mut out = F::new(0.0);
    if comptime!(code == 0) {
        out = F::max(a, F::new(0.0));
    }
    if comptime!(code == 1) {
        out = a * F::new(LEAKY_SLOPE);
        if a > F::new(0.0) {
            out = a;
        }
    }
    if comptime!(code == 2) {
        out = F::sin(a);
    }
    if comptime!(code == 3) {
        out = F::tanh(a);
    }
    out
}

#[cube(launch, launch_unchecked)]
pub fn ligru_step_kernel<F: Float>(
    wx: &Tensor<F>,
    uh: &Tensor<F>,
    h: &mut Tensor<F>,
    v: &mut Tensor<F>,
    step: u32,
    #[comptime] config: LigruKernelConfig,
) {
    let j = ABSOLUTE_POS_X as usize;
    let n = ABSOLUTE_POS_Y as usize;
    let batch = config.batch;
    let hidden = config.hidden;
    let t = step as usize;

    if n < batch && j < hidden {
        let state_size = batch * hidden;
        let wx_row = t * batch * 2 * hidden + n * 2 * hidden;
        let uh_row = n * 2 * hidden;

        let a = wx[wx_row + j] + uh[uh_row + j];
        let z = sigmoid::<F>(wx[wx_row + hidden + j] + uh[uh_row + hidden + j]);
        let hcand = candidate::<F>(a, config.activation_code);

        let h_prev = h[t * state_size + n * hidden + j];
        h[(t + 1) * state_size + n * hidden + j] = z * h_prev + (F::new(1.0) - z) * hcand;

        if comptime!(config.training) {
            let v_row = t * batch * 3 * hidden + n * 3 * hidden;
            v[v_row + j] = a;
            v[v_row + hidden + j] = z;
            v[v_row + 2 * hidden + j] = hcand;
        }
    }
}

/// Copy the initial hidden state `[N, H]` into step 0 of the trajectory
/// buffer `[T + 1, N, H]`.
#[cube(launch, launch_unchecked)]
pub fn write_initial_state_kernel<F: Float>(h_init: &Tensor<F>, h: &mut Tensor<F>) {
    let idx = ABSOLUTE_POS;
    if idx < h_init.len() {
        h[idx] = h_init[idx];
    }
}
