//! Tensor bundle abstraction for working with multiple tensor types.
//!
//! Burn has multiple tensor wrapper types: `CubeTensor` (raw GPU),
//! `FloatTensor<Autodiff<B>>` (gradient tracking), etc. A fused kernel needs
//! to work with all of them using a single struct definition.
//!
//! [`TensorBundle<T>`] is generic over the tensor type. The [`tensor_bundle!`]
//! macro generates a struct that implements it:
//!
//! ```ignore
//! tensor_bundle! {
//!     pub struct MyInputs { wx, h_init, u }
//! }
//!
//! // Same struct, different tensor types:
//! let cube_inputs: MyInputs<CubeTensor<R>> = ...;
//! let autodiff_inputs: MyInputs<FloatTensor<Autodiff<B>>> = ...;
//!
//! // Convert between types with map():
//! let primitives = autodiff_inputs.map(|t| t.primitive);
//! ```
//!
//! The `Mapped<U>` associated type ensures the struct type is preserved
//! across conversions. The `Array` associated type encodes the tensor count,
//! avoiding const generics on [`FusedKernel`](crate::FusedKernel). `Mapped<U>`
//! is always `Self<U>` and `Array` is always `[T; N]`; they are associated
//! types only because Rust cannot express the higher-kinded bound
//! `Bundle: for<T> TensorBundle<T>` directly.

use std::fmt::Debug;

/// Generic trait for tensor bundles.
pub trait TensorBundle<T: Debug + Clone + Send>: Sized + Clone + Send + Debug {
    /// The array type for this bundle, e.g. `[T; 3]` for a 3-tensor bundle.
    type Array;
    /// The bundle type with a different element type.
    type Mapped<U: Debug + Clone + Send>: TensorBundle<U, Array = Self::ArrayMapped<U>>;
    /// The array type with a different element type.
    type ArrayMapped<U>;

    fn map<U: Debug + Clone + Send>(self, f: impl FnMut(T) -> U) -> Self::Mapped<U>;
    fn into_array(self) -> Self::Array;
    fn from_array(arr: Self::Array) -> Self;
}

/// Helper macro to replace a token with an expression (used for counting).
#[doc(hidden)]
#[macro_export]
macro_rules! __replace_expr {
    ($_t:tt, $sub:expr) => {
        $sub
    };
}

/// Declares a tensor bundle struct with automatic `TensorBundle` implementation.
///
/// # Example
/// ```ignore
/// tensor_bundle! {
///     /// My bundle of tensors
///     pub struct MyInputs { wx, h_init, u }
/// }
/// ```
///
/// This generates the struct with all fields public and a `TensorBundle<T>`
/// impl with `map`, `into_array`, `from_array`.
#[macro_export]
macro_rules! tensor_bundle {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident { $first_field:ident $(, $field:ident)* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name<T> {
            pub $first_field: T,
            $(pub $field: T,)*
        }

        impl<T: std::fmt::Debug + Clone + Send> $crate::TensorBundle<T> for $name<T> {
            type Array = [T; 1usize $(+ $crate::__replace_expr!($field, 1usize))*];
            type Mapped<U: std::fmt::Debug + Clone + Send> = $name<U>;
            type ArrayMapped<U> = [U; 1usize $(+ $crate::__replace_expr!($field, 1usize))*];

            fn map<U: std::fmt::Debug + Clone + Send>(self, mut f: impl FnMut(T) -> U) -> $name<U> {
                $name {
                    $first_field: f(self.$first_field),
                    $($field: f(self.$field),)*
                }
            }

            fn into_array(self) -> [T; 1usize $(+ $crate::__replace_expr!($field, 1usize))*] {
                [self.$first_field $(, self.$field)*]
            }

            fn from_array(arr: [T; 1usize $(+ $crate::__replace_expr!($field, 1usize))*]) -> Self {
                let [$first_field $(, $field)*] = arr;
                $name {
                    $first_field,
                    $($field,)*
                }
            }
        }
    };
}

pub use crate::tensor_bundle;
