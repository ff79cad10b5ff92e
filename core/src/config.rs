#[cfg(feature = "rocm")]
pub type GpuBackend<F = DType> = burn::backend::Rocm<F>;

#[cfg(feature = "cuda")]
pub type GpuBackend<F = DType> = burn::backend::Cuda<F>;

#[cfg(feature = "wgpu")]
pub type GpuBackend<F = DType> = burn::backend::Wgpu<F>;

#[cfg(feature = "cpu")]
pub type GpuBackend<F = DType> = burn::backend::Cpu<F>;

#[cfg(not(any(feature = "rocm", feature = "cuda", feature = "wgpu", feature = "cpu")))]
pub type GpuBackend<F = DType> =
    compile_error!("One of the features 'rocm', 'cuda', 'wgpu' or 'cpu' must be enabled");

#[cfg(feature = "f16")]
pub type DType = half::f16;

#[cfg(all(feature = "f32", not(feature = "f16")))]
pub type DType = f32;

#[cfg(not(any(feature = "f16", feature = "f32")))]
pub type DType = compile_error!("One of the features 'f16' or 'f32' must be enabled");

pub type GpuAutodiffBackend<F = DType> = burn::backend::Autodiff<GpuBackend<F>>;
