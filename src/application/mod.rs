//! Application layer exposing typed preferences.
//!
//! This module wraps the stores provided by the infrastructure layer with
//! typed accessors, default fallback and object serialization.

pub mod preferences;

pub use preferences::*;
