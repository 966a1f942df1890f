//! CLI command implementations.

pub mod load;
pub mod requires;
pub mod resolve;
pub mod scripts;
pub mod transform;
