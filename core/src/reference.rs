//! Sequential f64 reference implementation of the Li-GRU cell.
//!
//! This is the numeric oracle: the forward and backward recurrences computed
//! step by step on the host, with the exact save-buffer layout and gradient
//! factorizations the fused kernels use. GPU tests compare kernel output
//! against this module.
//!
//! Buffer layouts (row-major, T = seq_len, N = batch, H = hidden):
//! - `wx`, `dwx`: `[T, N, 2H]`, the 2H axis ordered `[candidate, update]`
//! - `u`, `du`: `[H, 2H]`
//! - `h`: `[T+1, N, H]`, row 0 is the initial state
//! - `v`: `[T, N, 3H]`, the 3H axis ordered `[a, z, hcand]`

use crate::{
    cell::{CellVariant, LN_EPSILON, LigruConfig},
    error::LigruError,
};

/// Result of a reference forward run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefForward {
    /// Hidden-state trajectory, `[T+1, N, H]`.
    pub h: Vec<f64>,
    /// Save buffer `[T, N, 3H]`; empty unless the config is in training mode.
    pub v: Vec<f64>,
    /// Pre-normalization recurrent contribution per step, `[T, N, 2H]`;
    /// empty for the plain variant.
    pub uh_cache: Vec<f64>,
}

/// Gradients produced by a reference backward run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefGrads {
    /// Gradient w.r.t. the input projection, `[T, N, 2H]`.
    pub dwx: Vec<f64>,
    /// Gradient w.r.t. the recurrent weights, `[H, 2H]`.
    pub du: Vec<f64>,
    /// Gradient w.r.t. the initial hidden state, `[N, H]`.
    pub dh: Vec<f64>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Non-affine layer norm over the last axis of a `[N, C]` row block.
fn layer_norm_rows(x: &[f64], n: usize, c: usize, out: &mut [f64]) {
    for row in 0..n {
        let base = row * c;
        let mean = x[base..base + c].iter().sum::<f64>() / c as f64;
        let var = x[base..base + c]
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / c as f64;
        let std = (var + f64::from(LN_EPSILON)).sqrt();
        for col in 0..c {
            out[base + col] = (x[base + col] - mean) / std;
        }
    }
}

/// Backward of [`layer_norm_rows`]: maps `dy` to `dx` given the pre-norm
/// input `x`, recomputing the row statistics.
///
/// `dx = (dy*C - sum(dy) - x_hat*sum(dy*x_hat)) / (std*C)`
fn layer_norm_rows_backward(x: &[f64], dy: &[f64], n: usize, c: usize, dx: &mut [f64]) {
    for row in 0..n {
        let base = row * c;
        let mean = x[base..base + c].iter().sum::<f64>() / c as f64;
        let var = x[base..base + c]
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / c as f64;
        let std = (var + f64::from(LN_EPSILON)).sqrt();

        let mut sum_dy = 0.0;
        let mut sum_dy_xhat = 0.0;
        for col in 0..c {
            let x_hat = (x[base + col] - mean) / std;
            sum_dy += dy[base + col];
            sum_dy_xhat += dy[base + col] * x_hat;
        }

        let c_f = c as f64;
        for col in 0..c {
            let x_hat = (x[base + col] - mean) / std;
            dx[base + col] =
                (dy[base + col] * c_f - sum_dy - x_hat * sum_dy_xhat) / (std * c_f);
        }
    }
}

/// Run the forward recurrence.
///
/// `wx` is `[T, N, 2H]`, `u` is `[H, 2H]`, `h_init` is `[N, H]`.
pub fn forward(config: &LigruConfig, wx: &[f64], u: &[f64], h_init: &[f64]) -> RefForward {
    let (t_len, n, h_dim) = (config.seq_len, config.batch, config.hidden);
    let nh = n * h_dim;
    let normalized = config.variant == CellVariant::Normalized;

    let mut h = vec![0.0; (t_len + 1) * nh];
    h[..nh].copy_from_slice(h_init);

    let mut v = if config.training {
        vec![0.0; t_len * nh * 3]
    } else {
        Vec::new()
    };
    let mut uh_cache = if normalized {
        vec![0.0; t_len * nh * 2]
    } else {
        Vec::new()
    };

    let mut uh = vec![0.0; nh * 2];
    let mut uh_norm = vec![0.0; nh * 2];

    for t in 0..t_len {
        let h_prev = t * nh;

        // uh = h[t] @ u
        for row in 0..n {
            for col in 0..2 * h_dim {
                let mut acc = 0.0;
                for k in 0..h_dim {
                    acc += h[h_prev + row * h_dim + k] * u[k * 2 * h_dim + col];
                }
                uh[row * 2 * h_dim + col] = acc;
            }
        }

        let uh_step: &[f64] = if normalized {
            uh_cache[t * nh * 2..(t + 1) * nh * 2].copy_from_slice(&uh);
            layer_norm_rows(&uh, n, 2 * h_dim, &mut uh_norm);
            &uh_norm
        } else {
            &uh
        };

        for row in 0..n {
            for j in 0..h_dim {
                let wx_base = t * nh * 2 + row * 2 * h_dim;
                let uh_base = row * 2 * h_dim;

                let a = wx[wx_base + j] + uh_step[uh_base + j];
                let z = sigmoid(wx[wx_base + h_dim + j] + uh_step[uh_base + h_dim + j]);
                let hcand = config.activation.apply(a);

                let prev = h[h_prev + row * h_dim + j];
                h[(t + 1) * nh + row * h_dim + j] = z * prev + (1.0 - z) * hcand;

                if config.training {
                    let v_base = t * nh * 3 + row * 3 * h_dim;
                    v[v_base + j] = a;
                    v[v_base + h_dim + j] = z;
                    v[v_base + 2 * h_dim + j] = hcand;
                }
            }
        }
    }

    RefForward { h, v, uh_cache }
}

/// Run the backward recurrence over a training-mode forward result.
///
/// `grad_h` is the upstream gradient for the full trajectory, `[T+1, N, H]`.
/// Requires `saved.v` to be populated; fails with `MissingSaveBuffer`
/// otherwise.
pub fn backward(
    config: &LigruConfig,
    u: &[f64],
    saved: &RefForward,
    grad_h: &[f64],
) -> Result<RefGrads, LigruError> {
    if saved.v.is_empty() {
        return Err(LigruError::MissingSaveBuffer);
    }

    let (t_len, n, h_dim) = (config.seq_len, config.batch, config.hidden);
    let nh = n * h_dim;
    let normalized = config.variant == CellVariant::Normalized;

    let mut dwx = vec![0.0; t_len * nh * 2];
    let mut du = vec![0.0; h_dim * 2 * h_dim];
    let mut dh = vec![0.0; nh];
    let mut g = vec![0.0; nh * 2];

    for t in (0..t_len).rev() {
        // Pointwise gradient: writes dwx[t] and updates the dh carry in place.
        for row in 0..n {
            for j in 0..h_dim {
                let v_base = t * nh * 3 + row * 3 * h_dim;
                let a = saved.v[v_base + j];
                let z = saved.v[v_base + h_dim + j];
                let hcand = saved.v[v_base + 2 * h_dim + j];
                let h_prev = saved.h[t * nh + row * h_dim + j];
                let d_act = config.activation.derivative(a, hcand);

                let dh_total = grad_h[(t + 1) * nh + row * h_dim + j] + dh[row * h_dim + j];

                // The two variants factor d_z differently; both orderings are
                // kept as-is and checked against numeric gradients.
                let (d_a, d_z) = if normalized {
                    (
                        d_act * (1.0 - z) * dh_total,
                        (h_prev - hcand) * dh_total * (z * (1.0 - z)),
                    )
                } else {
                    let tmp = (1.0 - z) * dh_total;
                    (d_act * tmp, (h_prev - hcand) * z * tmp)
                };

                let wx_base = t * nh * 2 + row * 2 * h_dim;
                dwx[wx_base + j] = d_a;
                dwx[wx_base + h_dim + j] = d_z;
                dh[row * h_dim + j] = dh_total * z;
            }
        }

        // For the normalized variant the recurrent-weight path sees the
        // layer-norm backward of dwx[t]; the plain variant uses dwx[t] as-is.
        let dwx_t = &dwx[t * nh * 2..(t + 1) * nh * 2];
        if normalized {
            let uh_t = &saved.uh_cache[t * nh * 2..(t + 1) * nh * 2];
            layer_norm_rows_backward(uh_t, dwx_t, n, 2 * h_dim, &mut g);
        } else {
            g.copy_from_slice(dwx_t);
        }

        // dh += g @ u^T
        for row in 0..n {
            for k in 0..h_dim {
                let mut acc = 0.0;
                for col in 0..2 * h_dim {
                    acc += g[row * 2 * h_dim + col] * u[k * 2 * h_dim + col];
                }
                dh[row * h_dim + k] += acc;
            }
        }

        // du += h[t]^T @ g
        for k in 0..h_dim {
            for col in 0..2 * h_dim {
                let mut acc = 0.0;
                for row in 0..n {
                    acc += saved.h[t * nh + row * h_dim + k] * g[row * 2 * h_dim + col];
                }
                du[k * 2 * h_dim + col] += acc;
            }
        }
    }

    // Row 0 of the trajectory is the initial state itself.
    for i in 0..nh {
        dh[i] += grad_h[i];
    }

    Ok(RefGrads { dwx, du, dh })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::cell::Activation;

    /// splitmix64, mapped to uniform [-1, 1).
    struct Rng(u64);

    impl Rng {
        fn next_u64(&mut self) -> u64 {
            self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = self.0;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^ (z >> 31)
        }

        fn uniform(&mut self) -> f64 {
            (self.next_u64() >> 11) as f64 / (1u64 << 52) as f64 * 2.0 - 1.0
        }

        fn fill(&mut self, len: usize) -> Vec<f64> {
            (0..len).map(|_| self.uniform()).collect()
        }
    }

    fn config(
        seq_len: usize,
        batch: usize,
        hidden: usize,
        activation: Activation,
        variant: CellVariant,
    ) -> LigruConfig {
        LigruConfig::new(seq_len, batch, hidden, activation, variant, true)
    }

    #[test_case(Activation::Relu)]
    #[test_case(Activation::LeakyRelu)]
    #[test_case(Activation::Sin)]
    #[test_case(Activation::Tanh)]
    fn one_step_scalar_recurrence(activation: Activation) {
        // T=1, N=1, H=1: h_out = z*h0 + (1-z)*act(a0 + uh_a), all scalars
        // written out by hand.
        let cfg = config(1, 1, 1, activation, CellVariant::Plain);
        let wx = [0.3, -0.4]; // [a0, z0]
        let u = [0.7, -0.2]; // [u_a, u_z], one hidden unit -> 2 columns
        let h0 = [0.5];

        let out = forward(&cfg, &wx, &u, &h0);

        let a = 0.3 + 0.5 * 0.7;
        let z = sigmoid(-0.4 + 0.5 * (-0.2));
        let expected = z * 0.5 + (1.0 - z) * activation.apply(a);

        assert!((out.h[1] - expected).abs() < 1e-14);
        assert_eq!(out.v.len(), 3);
        assert!((out.v[0] - a).abs() < 1e-14);
        assert!((out.v[1] - z).abs() < 1e-14);
        assert!((out.v[2] - activation.apply(a)).abs() < 1e-14);
    }

    /// Scalar loss: a fixed linear functional over the produced trajectory
    /// rows (t >= 1). Its gradient w.r.t. h is the coefficient vector.
    fn loss(cfg: &LigruConfig, h: &[f64], coeffs: &[f64]) -> f64 {
        let nh = cfg.batch * cfg.hidden;
        h[nh..]
            .iter()
            .zip(coeffs.iter())
            .map(|(h, c)| h * c)
            .sum()
    }

    #[test_case(Activation::Relu, CellVariant::Plain)]
    #[test_case(Activation::LeakyRelu, CellVariant::Plain)]
    #[test_case(Activation::Sin, CellVariant::Plain)]
    #[test_case(Activation::Tanh, CellVariant::Plain)]
    #[test_case(Activation::Relu, CellVariant::Normalized)]
    #[test_case(Activation::LeakyRelu, CellVariant::Normalized)]
    #[test_case(Activation::Sin, CellVariant::Normalized)]
    #[test_case(Activation::Tanh, CellVariant::Normalized)]
    fn gradients_match_central_differences(activation: Activation, variant: CellVariant) {
        let cfg = config(3, 2, 4, activation, variant);
        let (t_len, n, h_dim) = (cfg.seq_len, cfg.batch, cfg.hidden);
        let nh = n * h_dim;

        let mut rng = Rng(0x11f2_u64);
        let wx = rng.fill(t_len * nh * 2);
        let u = rng.fill(h_dim * 2 * h_dim);
        let h0 = rng.fill(nh);
        let coeffs = rng.fill(t_len * nh);

        let fwd = forward(&cfg, &wx, &u, &h0);

        // Upstream gradient: zero for row 0, coeffs for rows 1..=T.
        let mut grad_h = vec![0.0; (t_len + 1) * nh];
        grad_h[nh..].copy_from_slice(&coeffs);
        let grads = backward(&cfg, &u, &fwd, &grad_h).unwrap();

        let eps = 1e-5;
        let tol = 1e-7;
        let check = |analytic: f64, plus: f64, minus: f64, what: &str, i: usize| {
            let numeric = (plus - minus) / (2.0 * eps);
            let err = (analytic - numeric).abs();
            assert!(
                err < tol * (1.0 + numeric.abs().max(analytic.abs())),
                "{what}[{i}]: analytic={analytic}, numeric={numeric}"
            );
        };

        for i in 0..wx.len() {
            let mut wx_p = wx.clone();
            wx_p[i] += eps;
            let mut wx_m = wx.clone();
            wx_m[i] -= eps;
            let plus = loss(&cfg, &forward(&cfg, &wx_p, &u, &h0).h, &coeffs);
            let minus = loss(&cfg, &forward(&cfg, &wx_m, &u, &h0).h, &coeffs);
            check(grads.dwx[i], plus, minus, "dwx", i);
        }

        for i in 0..u.len() {
            let mut u_p = u.clone();
            u_p[i] += eps;
            let mut u_m = u.clone();
            u_m[i] -= eps;
            let plus = loss(&cfg, &forward(&cfg, &wx, &u_p, &h0).h, &coeffs);
            let minus = loss(&cfg, &forward(&cfg, &wx, &u_m, &h0).h, &coeffs);
            check(grads.du[i], plus, minus, "du", i);
        }

        for i in 0..h0.len() {
            let mut h0_p = h0.clone();
            h0_p[i] += eps;
            let mut h0_m = h0.clone();
            h0_m[i] -= eps;
            let plus = loss(&cfg, &forward(&cfg, &wx, &u, &h0_p).h, &coeffs);
            let minus = loss(&cfg, &forward(&cfg, &wx, &u, &h0_m).h, &coeffs);
            check(grads.dh[i], plus, minus, "dh", i);
        }
    }

    #[test_case(CellVariant::Plain)]
    #[test_case(CellVariant::Normalized)]
    fn save_buffer_reconstructs_trajectory(variant: CellVariant) {
        // v holds [a, z, hcand] per step; blending them with h[t] must
        // reproduce the stored h[t+1] exactly.
        let cfg = config(4, 3, 5, Activation::Tanh, variant);
        let nh = cfg.batch * cfg.hidden;

        let mut rng = Rng(42);
        let wx = rng.fill(cfg.seq_len * nh * 2);
        let u = rng.fill(cfg.hidden * 2 * cfg.hidden);
        let h0 = rng.fill(nh);

        let fwd = forward(&cfg, &wx, &u, &h0);
        for t in 0..cfg.seq_len {
            for row in 0..cfg.batch {
                for j in 0..cfg.hidden {
                    let v_base = t * nh * 3 + row * 3 * cfg.hidden;
                    let z = fwd.v[v_base + cfg.hidden + j];
                    let hcand = fwd.v[v_base + 2 * cfg.hidden + j];
                    let prev = fwd.h[t * nh + row * cfg.hidden + j];
                    let expected = z * prev + (1.0 - z) * hcand;
                    let got = fwd.h[(t + 1) * nh + row * cfg.hidden + j];
                    assert!((got - expected).abs() < 1e-15);
                }
            }
        }
    }

    #[test]
    fn shape_invariants() {
        let cfg = config(6, 3, 7, Activation::Relu, CellVariant::Normalized);
        let nh = cfg.batch * cfg.hidden;

        let mut rng = Rng(7);
        let wx = rng.fill(cfg.seq_len * nh * 2);
        let u = rng.fill(cfg.hidden * 2 * cfg.hidden);
        let h0 = rng.fill(nh);

        let fwd = forward(&cfg, &wx, &u, &h0);
        assert_eq!(fwd.h.len(), (cfg.seq_len + 1) * nh);
        assert_eq!(&fwd.h[..nh], &h0[..], "row 0 must be the initial state");
        assert_eq!(fwd.v.len(), cfg.seq_len * nh * 3);
        assert_eq!(fwd.uh_cache.len(), cfg.seq_len * nh * 2);

        let grad_h = vec![0.5; (cfg.seq_len + 1) * nh];
        let grads = backward(&cfg, &u, &fwd, &grad_h).unwrap();
        assert_eq!(grads.dwx.len(), cfg.seq_len * nh * 2);
        assert_eq!(grads.du.len(), cfg.hidden * 2 * cfg.hidden);
        assert_eq!(grads.dh.len(), nh);
    }

    #[test]
    fn forward_is_deterministic() {
        let cfg = config(5, 2, 6, Activation::Sin, CellVariant::Plain);
        let nh = cfg.batch * cfg.hidden;

        let mut rng = Rng(99);
        let wx = rng.fill(cfg.seq_len * nh * 2);
        let u = rng.fill(cfg.hidden * 2 * cfg.hidden);
        let h0 = rng.fill(nh);

        let first = forward(&cfg, &wx, &u, &h0);
        let second = forward(&cfg, &wx, &u, &h0);
        assert_eq!(first, second, "re-runs must be bit-identical");
    }

    #[test]
    fn backward_without_save_buffer_fails() {
        let cfg = LigruConfig::new(2, 1, 3, Activation::Tanh, CellVariant::Plain, false);
        let nh = cfg.batch * cfg.hidden;

        let mut rng = Rng(3);
        let wx = rng.fill(cfg.seq_len * nh * 2);
        let u = rng.fill(cfg.hidden * 2 * cfg.hidden);
        let h0 = rng.fill(nh);

        let fwd = forward(&cfg, &wx, &u, &h0);
        assert!(fwd.v.is_empty());

        let grad_h = vec![1.0; (cfg.seq_len + 1) * nh];
        assert_eq!(
            backward(&cfg, &u, &fwd, &grad_h),
            Err(LigruError::MissingSaveBuffer)
        );
    }

    #[test]
    fn end_to_end_tanh_bounded() {
        let cfg = config(5, 8, 16, Activation::Tanh, CellVariant::Plain);
        let nh = cfg.batch * cfg.hidden;

        let mut rng = Rng(0xe2e);
        let wx = rng.fill(cfg.seq_len * nh * 2);
        let u = rng.fill(cfg.hidden * 2 * cfg.hidden);
        let h0 = rng.fill(nh);

        let fwd = forward(&cfg, &wx, &u, &h0);
        let grad_h = vec![1.0; (cfg.seq_len + 1) * nh];
        let grads = backward(&cfg, &u, &fwd, &grad_h).unwrap();

        let finite = |xs: &[f64]| xs.iter().all(|x| x.is_finite());
        assert!(finite(&fwd.h));
        assert!(finite(&fwd.v));
        assert!(finite(&grads.dwx));
        assert!(finite(&grads.du));
        assert!(finite(&grads.dh));

        let norm = |xs: &[f64]| xs.iter().map(|x| x * x).sum::<f64>().sqrt();
        // Tanh keeps the state in [-1, 1]; the gradient norms stay modest for
        // these dimensions. Bounds are loose regression guards.
        assert!(norm(&fwd.h) < (fwd.h.len() as f64).sqrt() + 1.0);
        assert!(norm(&grads.dwx) > 0.0 && norm(&grads.dwx) < 1e3);
        assert!(norm(&grads.du) > 0.0 && norm(&grads.du) < 1e4);
        assert!(norm(&grads.dh) > 0.0 && norm(&grads.dh) < 1e3);
    }
}
