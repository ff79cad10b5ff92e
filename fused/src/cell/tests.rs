//! GPU tests for the fused Li-GRU cell, checked against the scalar f64
//! reference recurrence.

use burn::tensor::{Tensor, TensorData};
use ligru_core::{
    Activation, CellVariant, GpuAutodiffBackend, GpuBackend, LigruConfig, LigruError, reference,
};
use test_case::test_case;

use crate::api::{ligru_forward, ligru_norm_forward};

const RTOL: f32 = 1e-3;
const ATOL: f32 = 1e-4;
const BACKWARD_RTOL: f32 = 2e-2;
const BACKWARD_ATOL: f32 = 1e-3;

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

    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 11) as f32 / (1u64 << 52) as f32 * 2.0 - 1.0
    }

    fn vec(&mut self, len: usize) -> Vec<f32> {
        (0..len).map(|_| self.next_f32()).collect()
    }
}

struct CellData {
    wx: Vec<f32>,
    h_init: Vec<f32>,
    u: Vec<f32>,
}

fn generate_data(seed: u64, t: usize, n: usize, h: usize) -> CellData {
    let mut rng = Rng(seed);
    CellData {
        wx: rng.vec(t * n * 2 * h),
        h_init: rng.vec(n * h),
        // Keep the recurrent weights small so long trajectories stay tame.
        u: rng.vec(h * 2 * h).iter().map(|x| x * 0.3).collect(),
    }
}

fn as_f64(data: &[f32]) -> Vec<f64> {
    data.iter().map(|&x| f64::from(x)).collect()
}

fn assert_close(a: &[f32], b: &[f64], rtol: f32, atol: f32, name: &str) {
    assert_eq!(a.len(), b.len(), "{name}: sizes differ");
    let mut max_diff = 0.0f32;
    let mut max_idx = 0;
    for (i, (&av, &bv)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (av - bv as f32).abs();
        if diff > max_diff {
            max_diff = diff;
            max_idx = i;
        }
    }
    let tolerance = atol + rtol * (b[max_idx] as f32).abs();
    assert!(
        max_diff <= tolerance,
        "{name}: max_diff={max_diff:.6} exceeds tolerance={tolerance:.6} at idx {max_idx}: \
         tested={:.6} ref={:.6}",
        a[max_idx],
        b[max_idx],
    );
}

fn run_forward_gpu(
    data: &CellData,
    t: usize,
    n: usize,
    h: usize,
    activation: Activation,
    variant: CellVariant,
) -> Vec<f32> {
    let device = Default::default();
    let wx = Tensor::<GpuBackend, 3>::from_data(
        TensorData::new(data.wx.clone(), [t, n, 2 * h]),
        &device,
    );
    let h_init =
        Tensor::<GpuBackend, 2>::from_data(TensorData::new(data.h_init.clone(), [n, h]), &device);
    let u =
        Tensor::<GpuBackend, 2>::from_data(TensorData::new(data.u.clone(), [h, 2 * h]), &device);

    let out = match variant {
        CellVariant::Plain => ligru_forward(wx, h_init, u, activation, true),
        CellVariant::Normalized => ligru_norm_forward(wx, h_init, u, activation, true),
    }
    .unwrap();

    out.to_data().convert::<f32>().to_vec().unwrap()
}

// =============================================================================
// Forward tests
// =============================================================================

#[test_case(3, 2, 4, Activation::Relu, CellVariant::Plain ; "relu_plain_small")]
#[test_case(3, 2, 4, Activation::LeakyRelu, CellVariant::Plain ; "leaky_plain_small")]
#[test_case(3, 2, 4, Activation::Sin, CellVariant::Plain ; "sin_plain_small")]
#[test_case(3, 2, 4, Activation::Tanh, CellVariant::Plain ; "tanh_plain_small")]
#[test_case(3, 2, 4, Activation::Tanh, CellVariant::Normalized ; "tanh_norm_small")]
#[test_case(3, 2, 4, Activation::Relu, CellVariant::Normalized ; "relu_norm_small")]
#[test_case(5, 8, 16, Activation::Tanh, CellVariant::Plain ; "tanh_plain_end_to_end")]
#[test_case(5, 8, 16, Activation::Tanh, CellVariant::Normalized ; "tanh_norm_end_to_end")]
fn forward_matches_reference(
    t: usize,
    n: usize,
    h: usize,
    activation: Activation,
    variant: CellVariant,
) {
    let data = generate_data(0x11 + t as u64, t, n, h);
    let config = LigruConfig::new(t, n, h, activation, variant, true);
    let expected = reference::forward(
        &config,
        &as_f64(&data.wx),
        &as_f64(&data.u),
        &as_f64(&data.h_init),
    );

    let actual = run_forward_gpu(&data, t, n, h, activation, variant);

    assert_eq!(actual.len(), (t + 1) * n * h);
    assert_close(&actual, &expected.h, RTOL, ATOL, "forward trajectory");
}

#[test_case(CellVariant::Plain ; "plain")]
#[test_case(CellVariant::Normalized ; "normalized")]
fn forward_is_bitwise_deterministic(variant: CellVariant) {
    let (t, n, h) = (4, 3, 8);
    let data = generate_data(0x22, t, n, h);

    let first = run_forward_gpu(&data, t, n, h, Activation::Tanh, variant);
    let second = run_forward_gpu(&data, t, n, h, Activation::Tanh, variant);

    assert_eq!(first, second);
}

// =============================================================================
// Backward tests
// =============================================================================

#[test_case(3, 2, 4, Activation::Relu, CellVariant::Plain ; "relu_plain_small")]
#[test_case(3, 2, 4, Activation::Sin, CellVariant::Plain ; "sin_plain_small")]
#[test_case(3, 2, 4, Activation::Tanh, CellVariant::Plain ; "tanh_plain_small")]
#[test_case(3, 2, 4, Activation::Tanh, CellVariant::Normalized ; "tanh_norm_small")]
#[test_case(5, 8, 16, Activation::Tanh, CellVariant::Plain ; "tanh_plain_end_to_end")]
#[test_case(5, 8, 16, Activation::Tanh, CellVariant::Normalized ; "tanh_norm_end_to_end")]
fn backward_matches_reference(
    t: usize,
    n: usize,
    h: usize,
    activation: Activation,
    variant: CellVariant,
) {
    let data = generate_data(0x33 + t as u64, t, n, h);
    let device = Default::default();

    let wx = Tensor::<GpuAutodiffBackend, 3>::from_data(
        TensorData::new(data.wx.clone(), [t, n, 2 * h]),
        &device,
    )
    .require_grad();
    let h_init = Tensor::<GpuAutodiffBackend, 2>::from_data(
        TensorData::new(data.h_init.clone(), [n, h]),
        &device,
    )
    .require_grad();
    let u = Tensor::<GpuAutodiffBackend, 2>::from_data(
        TensorData::new(data.u.clone(), [h, 2 * h]),
        &device,
    )
    .require_grad();

    let out = match variant {
        CellVariant::Plain => {
            ligru_forward(wx.clone(), h_init.clone(), u.clone(), activation, true)
        }
        CellVariant::Normalized => {
            ligru_norm_forward(wx.clone(), h_init.clone(), u.clone(), activation, true)
        }
    }
    .unwrap();
    let grads = out.sum().backward();

    // sum() makes the upstream gradient all ones over the trajectory.
    let config = LigruConfig::new(t, n, h, activation, variant, true);
    let saved = reference::forward(
        &config,
        &as_f64(&data.wx),
        &as_f64(&data.u),
        &as_f64(&data.h_init),
    );
    let grad_h = vec![1.0f64; (t + 1) * n * h];
    let expected = reference::backward(&config, &as_f64(&data.u), &saved, &grad_h).unwrap();

    let dwx = wx
        .grad(&grads)
        .unwrap()
        .to_data()
        .convert::<f32>()
        .to_vec()
        .unwrap();
    let dh_init = h_init
        .grad(&grads)
        .unwrap()
        .to_data()
        .convert::<f32>()
        .to_vec()
        .unwrap();
    let du = u
        .grad(&grads)
        .unwrap()
        .to_data()
        .convert::<f32>()
        .to_vec()
        .unwrap();

    assert_close(&dwx, &expected.dwx, BACKWARD_RTOL, BACKWARD_ATOL, "dwx");
    assert_close(&dh_init, &expected.dh, BACKWARD_RTOL, BACKWARD_ATOL, "dh_init");
    assert_close(&du, &expected.du, BACKWARD_RTOL, BACKWARD_ATOL, "du");
}

// =============================================================================
// Fail-fast paths
// =============================================================================

#[test]
fn sin_is_rejected_in_inference_mode() {
    let (t, n, h) = (2, 1, 4);
    let data = generate_data(0x44, t, n, h);
    let device = Default::default();

    let wx = Tensor::<GpuBackend, 3>::from_data(
        TensorData::new(data.wx.clone(), [t, n, 2 * h]),
        &device,
    );
    let h_init =
        Tensor::<GpuBackend, 2>::from_data(TensorData::new(data.h_init.clone(), [n, h]), &device);
    let u =
        Tensor::<GpuBackend, 2>::from_data(TensorData::new(data.u.clone(), [h, 2 * h]), &device);

    let result = ligru_forward(wx, h_init, u, Activation::Sin, false);
    assert!(matches!(
        result,
        Err(LigruError::UnsupportedActivation { .. })
    ));
}

#[test]
fn f16_normalized_training_is_rejected() {
    type F16Backend = GpuBackend<half::f16>;

    let (t, n, h) = (2, 1, 4);
    let data = generate_data(0x55, t, n, h);
    let device = Default::default();

    let wx = Tensor::<F16Backend, 3>::from_data(
        TensorData::new(data.wx.clone(), [t, n, 2 * h]),
        &device,
    );
    let h_init =
        Tensor::<F16Backend, 2>::from_data(TensorData::new(data.h_init.clone(), [n, h]), &device);
    let u =
        Tensor::<F16Backend, 2>::from_data(TensorData::new(data.u.clone(), [h, 2 * h]), &device);

    // The normalized cell has no f16 backward path; training mode must be
    // rejected before anything is launched.
    let result = ligru_norm_forward(wx, h_init, u, Activation::Tanh, true);
    assert!(matches!(
        result,
        Err(LigruError::UnsupportedPrecision { .. })
    ));
}

#[test]
fn mismatched_input_shapes_are_rejected() {
    let (t, n, h) = (2, 3, 4);
    let data = generate_data(0x66, t, n, h);
    let device = Default::default();

    let wx = Tensor::<GpuBackend, 3>::from_data(
        TensorData::new(data.wx.clone(), [t, n, 2 * h]),
        &device,
    );
    let h_init =
        Tensor::<GpuBackend, 2>::from_data(TensorData::new(data.h_init.clone(), [n, h]), &device);
    // Recurrent weights transposed relative to the [H, 2H] contract.
    let u =
        Tensor::<GpuBackend, 2>::from_data(TensorData::new(data.u.clone(), [2 * h, h]), &device);

    let result = ligru_forward(wx, h_init, u, Activation::Tanh, true);
    assert!(matches!(result, Err(LigruError::ShapeMismatch { .. })));
}
