//! Configuration module for mtcopy
//!
//! Provides the transfer tunables, CLI arguments, and their defaults.

mod settings;

pub use settings::*;
