//! Shared utilities
//!
//! Seeded random number generation used for classifier weights and the
//! initial dummy state.

pub mod rng;

pub use rng::SimpleRng;
