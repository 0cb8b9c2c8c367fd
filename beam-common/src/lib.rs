//! Common types shared across Beam components

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
