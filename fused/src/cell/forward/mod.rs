pub mod kernel;
pub mod launch;

pub use launch::ForwardPass;
