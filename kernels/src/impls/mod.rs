//! [`FusedKernelBackend`](crate::FusedKernelBackend) implementations for the
//! supported backend wrappers.

mod autodiff;
mod cube;
