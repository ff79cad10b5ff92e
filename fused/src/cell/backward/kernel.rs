//! Pointwise Li-GRU gradient kernel.
//!
//! One launch consumes a single timestep in reverse order. Each thread
//! handles one `(batch, unit)` pair: it folds the upstream gradient for
//! `h[t + 1]` into the running carry, emits the gradients of the two
//! pre-activation halves into `dwx[t]`, and updates the carry for step
//! `t - 1`:
//!
//! ```text
//! dh_total = grad_h[t + 1] + carry
//! d_a      = act'(a) * (1 - z) * dh_total      -> dwx[t, n, j]
//! d_z      = (h[t] - hcand) * z'(.) * dh_total -> dwx[t, n, H + j]
//! carry    = dh_total * z
//! ```
//!
//! The two variants factor `d_z` differently (the plain cell folds `(1 - z)`
//! in via the shared `tmp` product, the normalized cell uses the explicit
//! `z * (1 - z)` sigmoid derivative); the results are algebraically equal.

use cubecl::prelude::*;

use super::super::forward::kernel::LEAKY_SLOPE;
use crate::LigruKernelConfig;

/// Derivative of the candidate activation, specialized at compile time.
/// `hcand` is the saved forward value, reused for the tanh derivative.
#[cube]
fn candidate_derivative<F: Float>(a: F, hcand: F, #[comptime] code: u32) -> F {
    let mut out = F::new(0.0);
    if comptime!(code == 0) {
        if a > F::new(0.0) {
            out = F::new(1.0);
        }
    }
    if comptime!(code == 1) {
        out = F::new(LEAKY_SLOPE);
        if a > F::new(0.0) {
            out = F::new(1.0);
        }
    }
    if comptime!(code == 2) {
        out = F::cos(a);
    }
    if comptime!(code == 3) {
        out = F::new(1.0) - hcand * hcand;
    }
    out
}

#[cube(launch, launch_unchecked)]
pub fn ligru_grad_kernel<F: Float>(
    h: &Tensor<F>,
    v: &Tensor<F>,
    grad_h: &Tensor<F>,
    dh: &mut Tensor<F>,
    dwx: &mut Tensor<F>,
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
        let v_row = t * batch * 3 * hidden + n * 3 * hidden;
        let dwx_row = t * batch * 2 * hidden + n * 2 * hidden;

        let a = v[v_row + j];
        let z = v[v_row + hidden + j];
        let hcand = v[v_row + 2 * hidden + j];
        let h_prev = h[t * state_size + n * hidden + j];

        let carry = dh[n * hidden + j];
        let dh_total = grad_h[(t + 1) * state_size + n * hidden + j] + carry;

        let d_act = candidate_derivative::<F>(a, hcand, config.activation_code);
        let mut d_a = F::new(0.0);
        let mut d_z = F::new(0.0);
        if comptime!(config.normalized) {
            d_a = d_act * (F::new(1.0) - z) * dh_total;
            d_z = (h_prev - hcand) * dh_total * (z * (F::new(1.0) - z));
        }
        if comptime!(!config.normalized) {
            let tmp = (F::new(1.0) - z) * dh_total;
            d_a = d_act * tmp;
            d_z = (h_prev - hcand) * z * tmp;
        }

        dwx[dwx_row + j] = d_a;
        dwx[dwx_row + hidden + j] = d_z;

        dh[n * hidden + j] = dh_total * z;
    }
}

/// Fold the upstream gradient for the initial state (`grad_h[0]`) into the
/// carry after the reverse sweep.
#[cube(launch, launch_unchecked)]
pub fn accumulate_initial_grad_kernel<F: Float>(grad_h: &Tensor<F>, dh: &mut Tensor<F>) {
    let idx = ABSOLUTE_POS;
    if idx < dh.len() {
        dh[idx] += grad_h[idx];
    }
}
