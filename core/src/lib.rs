#![warn(clippy::pedantic)]
#![allow(
    clippy::too_many_arguments,
    clippy::similar_names,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::default_trait_access,
    //
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    //
    clippy::too_many_lines,
    clippy::type_complexity,
)]

//! Li-GRU Core
//!
//! Backend-agnostic pieces of the Li-GRU cell:
//! - `LigruConfig`, `Activation`, `CellVariant` - cell configuration
//! - `LigruError` - configuration and contract errors
//! - `reference` - sequential f64 implementation used as the numeric oracle
//! - feature-gated `GpuBackend` / `GpuAutodiffBackend` aliases

pub mod cell;
pub mod config;
pub mod error;
pub mod reference;

pub use cell::{Activation, CellVariant, LEAKY_SLOPE, LN_EPSILON, LigruConfig};
pub use config::{GpuAutodiffBackend, GpuBackend};
pub use error::LigruError;
