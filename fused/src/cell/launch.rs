//! [`FusedKernel`] implementations wiring the cell drivers into the kernel
//! boundary: buffer allocation, contiguity, and stream lifetime.

use std::fmt::Debug;

use burn_cubecl::{CubeRuntime, FloatElement, kernel::into_contiguous, tensor::CubeTensor};
use ligru_core::LigruConfig;
use ligru_kernels::{
    FusedKernel,
    util::{empty_like, zeros_like},
};

use super::{
    LigruInputs, LigruNormSavedState, LigruOutputs, LigruSavedState, backward::BackwardPass,
    forward::ForwardPass,
};
use crate::{LigruKernel, LigruNormKernel};

impl FusedKernel for LigruKernel {
    type Inputs<T: Debug + Clone + Send> = LigruInputs<T>;
    type Outputs<T: Debug + Clone + Send> = LigruOutputs<T>;
    type SavedState<T: Debug + Clone + Send> = LigruSavedState<T>;
    type Config = LigruConfig;

    fn forward_launch<R: CubeRuntime, F: FloatElement>(
        inputs: LigruInputs<CubeTensor<R>>,
        config: LigruConfig,
    ) -> (LigruOutputs<CubeTensor<R>>, LigruSavedState<CubeTensor<R>>) {
        let inputs = inputs.map(into_contiguous);
        let LigruConfig {
            seq_len,
            batch,
            hidden,
            ..
        } = config;

        let h = empty_like::<R, F>(&inputs.wx, [seq_len + 1, batch, hidden]);
        let v = if config.training {
            empty_like::<R, F>(&inputs.wx, [seq_len, batch, 3 * hidden])
        } else {
            // Placeholder; the step kernel never touches it outside training.
            empty_like::<R, F>(&inputs.wx, [1])
        };
        let uh = empty_like::<R, F>(&inputs.wx, [batch, 2 * hidden]);

        let pass = ForwardPass::<R, F>::new(&inputs.wx.client, None, config)
            .expect("invalid Li-GRU configuration");
        pass.run(&inputs.wx, &inputs.u, &inputs.h_init, &h, &v, &uh, None);
        // Dropping the pass drains both streams before the buffers escape.
        drop(pass);

        (
            LigruOutputs { h: h.clone() },
            LigruSavedState {
                u: inputs.u,
                h,
                v,
            },
        )
    }

    fn backward_launch<R: CubeRuntime, F: FloatElement>(
        saved: LigruSavedState<CubeTensor<R>>,
        grad_outputs: LigruOutputs<CubeTensor<R>>,
        config: LigruConfig,
    ) -> LigruInputs<CubeTensor<R>> {
        let saved = saved.map(into_contiguous);
        let grad_h = into_contiguous(grad_outputs.h);
        let LigruConfig {
            seq_len,
            batch,
            hidden,
            ..
        } = config;

        let dh = zeros_like::<R, F>(&saved.u, [batch, hidden]);
        let dwx = empty_like::<R, F>(&saved.u, [seq_len, batch, 2 * hidden]);
        let du = empty_like::<R, F>(&saved.u, [hidden, 2 * hidden]);

        let pass = BackwardPass::<R, F>::new(&saved.u.client, None, config)
            .expect("invalid Li-GRU configuration");
        pass.run(&saved.u, &saved.h, &saved.v, &grad_h, &dh, &dwx, &du, None)
            .expect("backward sweep failed");
        drop(pass);

        LigruInputs {
            wx: dwx,
            h_init: dh,
            u: du,
        }
    }
}

impl FusedKernel for LigruNormKernel {
    type Inputs<T: Debug + Clone + Send> = LigruInputs<T>;
    type Outputs<T: Debug + Clone + Send> = LigruOutputs<T>;
    type SavedState<T: Debug + Clone + Send> = LigruNormSavedState<T>;
    type Config = LigruConfig;

    fn forward_launch<R: CubeRuntime, F: FloatElement>(
        inputs: LigruInputs<CubeTensor<R>>,
        config: LigruConfig,
    ) -> (
        LigruOutputs<CubeTensor<R>>,
        LigruNormSavedState<CubeTensor<R>>,
    ) {
        let inputs = inputs.map(into_contiguous);
        let LigruConfig {
            seq_len,
            batch,
            hidden,
            ..
        } = config;

        let h = empty_like::<R, F>(&inputs.wx, [seq_len + 1, batch, hidden]);
        let v = if config.training {
            empty_like::<R, F>(&inputs.wx, [seq_len, batch, 3 * hidden])
        } else {
            empty_like::<R, F>(&inputs.wx, [1])
        };
        let uh = empty_like::<R, F>(&inputs.wx, [batch, 2 * hidden]);
        let uh_cache = empty_like::<R, F>(&inputs.wx, [seq_len, batch, 2 * hidden]);

        let pass = ForwardPass::<R, F>::new(&inputs.wx.client, None, config)
            .expect("invalid Li-GRU configuration");
        pass.run(
            &inputs.wx,
            &inputs.u,
            &inputs.h_init,
            &h,
            &v,
            &uh,
            Some(&uh_cache),
        );
        drop(pass);

        (
            LigruOutputs { h: h.clone() },
            LigruNormSavedState {
                u: inputs.u,
                h,
                v,
                uh_cache,
            },
        )
    }

    fn backward_launch<R: CubeRuntime, F: FloatElement>(
        saved: LigruNormSavedState<CubeTensor<R>>,
        grad_outputs: LigruOutputs<CubeTensor<R>>,
        config: LigruConfig,
    ) -> LigruInputs<CubeTensor<R>> {
        let saved = saved.map(into_contiguous);
        let grad_h = into_contiguous(grad_outputs.h);
        let LigruConfig {
            seq_len,
            batch,
            hidden,
            ..
        } = config;

        let dh = zeros_like::<R, F>(&saved.u, [batch, hidden]);
        let dwx = empty_like::<R, F>(&saved.u, [seq_len, batch, 2 * hidden]);
        let du = empty_like::<R, F>(&saved.u, [hidden, 2 * hidden]);
        // Pre-activation gradients after the layer-norm backward map.
        let g = empty_like::<R, F>(&saved.u, [seq_len, batch, 2 * hidden]);

        let pass = BackwardPass::<R, F>::new(&saved.u.client, None, config)
            .expect("invalid Li-GRU configuration");
        pass.run(
            &saved.u,
            &saved.h,
            &saved.v,
            &grad_h,
            &dh,
            &dwx,
            &du,
            Some((&saved.uh_cache, &g)),
        )
        .expect("backward sweep failed");
        drop(pass);

        LigruInputs {
            wx: dwx,
            h_init: dh,
            u: du,
        }
    }
}
