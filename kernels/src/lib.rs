#![warn(clippy::pedantic)]
#![allow(
    clippy::too_many_arguments,
    clippy::similar_names,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::type_complexity
)]

//! Kernel plumbing shared by the fused Li-GRU operators.
//!
//! This crate provides:
//! - [`FusedKernel`] / [`FusedKernelBackend`] - the boundary between burn
//!   tensors and raw `CubeTensor` kernel launches
//! - [`TensorBundle`] and the [`tensor_bundle!`] macro - one struct
//!   definition usable with any tensor wrapper type
//! - backend implementations for `CubeBackend` and `Autodiff`

pub mod bundle;
pub mod impls;
pub mod kernel;
pub mod util;

pub use bundle::TensorBundle;
pub use kernel::{FusedKernel, FusedKernelBackend};
