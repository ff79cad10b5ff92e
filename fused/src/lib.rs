#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(
    clippy::trivially_copy_pass_by_ref,
    reason = "erroneous false positives on #[cube] functions"
)]
#![allow(non_camel_case_types, non_snake_case)]
#![allow(
    clippy::similar_names,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::default_trait_access,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::too_many_lines,
    clippy::type_complexity
)]
//! Fused Li-GRU kernels
//!
//! This crate provides fused GPU implementations of the Li-GRU recurrence:
//! - `LigruKernel` - plain Li-GRU cell (forward + backward)
//! - `LigruNormKernel` - Li-GRU cell with layer-normalized recurrent
//!   pre-activations
//!
//! Both run a per-timestep pipeline of a recurrent GEMM, an optional
//! layer-norm sub-step, and a fused pointwise step kernel, orchestrated
//! across two compute streams.

use burn::prelude::*;
use ligru_core::{CellVariant, LigruConfig};
use ligru_kernels::FusedKernelBackend;

/// Launch a CubeCL kernel with bounds checking in debug builds,
/// unchecked in release builds for performance. Must be called inside `unsafe`.
macro_rules! cube_launch {
    ($kernel:ident :: < $($ty:ty),+ > ( $($args:expr),* $(,)? )) => {{
        #[cfg(debug_assertions)]
        { $kernel::launch::< $($ty),+ >( $($args),* ).unwrap() }
        #[cfg(not(debug_assertions))]
        { $kernel::launch_unchecked::< $($ty),+ >( $($args),* ).unwrap() }
    }};
}

pub mod api;
pub mod cell;
pub mod gemm;
pub mod layer_norm;
pub mod stream;

pub use api::{ligru_forward, ligru_norm_forward};
pub use cell::{LigruInputs, LigruNormSavedState, LigruOutputs, LigruSavedState};
pub use stream::{CellStreams, wait_for_sync};

// ============================================================================
// Kernel marker types
// ============================================================================

/// Marker for the plain fused Li-GRU cell kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LigruKernel;

/// Marker for the fused Li-GRU cell kernel with layer-normalized
/// recurrent pre-activations.
#[derive(Debug, Clone, Copy, Default)]
pub struct LigruNormKernel;

// ============================================================================
// LigruBackend trait
// ============================================================================

/// Unified backend trait for fused Li-GRU kernels.
pub trait LigruBackend:
    FusedKernelBackend<LigruKernel> + FusedKernelBackend<LigruNormKernel>
{
}

impl<B> LigruBackend for B where
    B: Backend + FusedKernelBackend<LigruKernel> + FusedKernelBackend<LigruNormKernel>
{
}

// ============================================================================
// LigruKernelConfig
// ============================================================================

const EPSILON_SCALE_INV: f32 = 1e-9;

/// Comptime configuration shared by the pointwise step and gradient kernels.
///
/// `epsilon` is stored scaled to an integer so the config can be hashed for
/// kernel caching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LigruKernelConfig {
    pub batch: usize,
    pub hidden: usize,
    pub activation_code: u32,
    pub training: bool,
    pub normalized: bool,
    pub epsilon_scaled: u32,
}

impl LigruKernelConfig {
    #[must_use]
    pub fn from_cell(config: &LigruConfig) -> Self {
        Self {
            batch: config.batch,
            hidden: config.hidden,
            activation_code: config.activation.code(),
            training: config.training,
            normalized: config.variant == CellVariant::Normalized,
            epsilon_scaled: (ligru_core::LN_EPSILON / EPSILON_SCALE_INV) as u32,
        }
    }

    #[must_use]
    pub fn epsilon(&self) -> f32 {
        self.epsilon_scaled as f32 * EPSILON_SCALE_INV
    }
}
