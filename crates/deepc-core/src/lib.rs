// deepc-core: Dimensions, Hankel data matrices, config, and errors for DeePC formulation.

pub mod config;
pub mod dims;
pub mod error;
pub mod hankel;
pub mod types;
