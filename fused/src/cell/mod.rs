//! Fused Li-GRU cell: bundles, pointwise kernels, and the sequential
//! forward/backward drivers.

pub mod backward;
pub mod forward;
mod launch;
mod types;

#[cfg(test)]
mod tests;

pub use types::{LigruInputs, LigruNormSavedState, LigruOutputs, LigruSavedState};
